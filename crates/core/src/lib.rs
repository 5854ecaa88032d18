//! Tienda Core - Shared types library.
//!
//! This crate provides the types and pure rules shared by every Tienda
//! component:
//! - `server` - Storefront and back-office JSON API
//! - `shipping` - Carrier integrations (Envia, Skydropx)
//! - `printer` - Thermal receipt printing
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and arithmetic - no I/O, no database
//! access, no HTTP clients.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, and statuses
//! - [`coupon`] - Coupon validity rules and discount computation
//! - [`cart`] - Checkout totals and cash change

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod coupon;
pub mod types;

pub use cart::{CartError, CartLine, CartTotals, cash_change, compute_totals};
pub use coupon::{CouponError, CouponKind, CouponRules};
pub use types::*;
