//! Domain models returned by repositories and serialized by handlers.

pub mod chat;
pub mod coupon;
pub mod order;
pub mod product;

pub use chat::{Conversation, Message};
pub use coupon::Coupon;
pub use order::{Order, OrderItem, OrderLabel, OrderWithItems};
pub use product::{PricedVariant, Product, ProductDetail, StockMovement, StockReason, Variant};
