//! Business logic services.
//!
//! # Services
//!
//! - `checkout` - Cart pricing from the catalog, coupons and totals
//! - `email` - Order confirmations and shipment notices via SMTP
//! - `realtime` - Ably relay for support chat
//! - `shipping` - Carrier clients, shipment building and quote cache

pub mod checkout;
pub mod email;
pub mod realtime;
pub mod shipping;

pub use checkout::{AppliedCoupon, CartItemInput, PricedCart, PricedLine, price_cart};
pub use email::{EmailError, EmailService};
pub use realtime::{AblyClient, RealtimeError, TokenRequest};
pub use shipping::ShippingService;
