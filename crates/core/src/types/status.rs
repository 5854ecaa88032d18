//! Status enums for orders, payments and chat.
//!
//! All of these are stored as lower-case `TEXT` columns and travel over the
//! API in the same spelling, so `Display` and `FromStr` agree with serde.

use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The stored/wire spelling of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout, awaiting payment confirmation.
    #[default]
    Pending,
    /// Payment received.
    Paid,
    /// A shipping label exists and the parcel left the store.
    Shipped,
    /// Delivered to the customer, or handed over at the counter.
    Delivered,
    /// Cancelled before shipping.
    Cancelled,
}

text_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether an order in this status may move to `next`.
    ///
    /// Staying in the same status is always allowed so repeated updates are
    /// harmless.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Paid | Self::Cancelled)
                | (
                    Self::Paid,
                    Self::Paid | Self::Shipped | Self::Delivered | Self::Cancelled
                )
                | (Self::Shipped, Self::Shipped | Self::Delivered)
                | (Self::Delivered, Self::Delivered)
                | (Self::Cancelled, Self::Cancelled)
        )
    }

    /// Terminal statuses accept no further changes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether a shipping label may be requested for an order in this status.
    ///
    /// `Shipped` is included so a repeated request returns the stored label.
    #[must_use]
    pub const fn is_shippable(self) -> bool {
        matches!(self, Self::Paid | Self::Shipped)
    }
}

/// Where an order was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderChannel {
    /// Web storefront checkout.
    #[default]
    Online,
    /// Physical point of sale.
    Pos,
}

text_enum!(OrderChannel {
    Online => "online",
    Pos => "pos",
});

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    Cash,
    Transfer,
    /// Card terminal at the counter.
    Terminal,
}

text_enum!(PaymentMethod {
    Card => "card",
    Cash => "cash",
    Transfer => "transfer",
    Terminal => "terminal",
});

/// State of a support conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Open,
    Closed,
}

text_enum!(ConversationStatus {
    Open => "open",
    Closed => "closed",
});

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Customer,
    Agent,
}

text_enum!(MessageSender {
    Customer => "customer",
    Agent => "agent",
});
