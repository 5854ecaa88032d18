//! Email service for order confirmations and shipment notices.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use tienda_core::format_amount;

use crate::config::EmailConfig;
use crate::models::{OrderLabel, OrderWithItems};

/// A line as shown in an email.
struct EmailLine {
    name: String,
    quantity: i32,
    total: String,
}

/// Money and item fields shared by the order templates.
struct OrderSummary {
    number: i64,
    customer_name: String,
    lines: Vec<EmailLine>,
    subtotal: String,
    discount: Option<String>,
    shipping: String,
    total: String,
}

impl OrderSummary {
    fn new(order: &OrderWithItems) -> Self {
        let o = &order.order;
        Self {
            number: o.number,
            customer_name: o.customer_name.clone(),
            lines: order
                .items
                .iter()
                .map(|item| EmailLine {
                    name: item.display_name(),
                    quantity: item.quantity,
                    total: format_amount(item.line_total),
                })
                .collect(),
            subtotal: format_amount(o.subtotal),
            discount: (!o.discount.is_zero()).then(|| format_amount(o.discount)),
            shipping: format_amount(o.shipping_cost),
            total: format_amount(o.total),
        }
    }
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    store_name: &'a str,
    order_url: &'a str,
    summary: &'a OrderSummary,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    store_name: &'a str,
    order_url: &'a str,
    summary: &'a OrderSummary,
}

#[derive(Template)]
#[template(path = "email/shipment_notification.html")]
struct ShipmentNotificationHtml<'a> {
    store_name: &'a str,
    customer_name: &'a str,
    number: i64,
    carrier: &'a str,
    tracking_number: &'a str,
    tracking_url: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/shipment_notification.txt")]
struct ShipmentNotificationText<'a> {
    store_name: &'a str,
    customer_name: &'a str,
    number: i64,
    carrier: &'a str,
    tracking_number: &'a str,
    tracking_url: Option<&'a str>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    store_name: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be set up.
    pub fn new(config: &EmailConfig, store_name: &str, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            store_name: store_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send the order confirmation to the customer, if they left an email.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &OrderWithItems) -> Result<(), EmailError> {
        let Some(to) = order.order.customer_email.as_deref() else {
            return Ok(());
        };

        let summary = OrderSummary::new(order);
        let order_url = order_url(&self.base_url, order.order.number, to);
        let store_name = self.store_name.as_str();

        let html = OrderConfirmationHtml {
            store_name,
            order_url: &order_url,
            summary: &summary,
        }
        .render()?;
        let text = OrderConfirmationText {
            store_name,
            order_url: &order_url,
            summary: &summary,
        }
        .render()?;

        let subject = format!("{store_name}: pedido #{} recibido", summary.number);
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Tell the customer their parcel is on its way.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_shipment_notification(
        &self,
        to: &str,
        customer_name: &str,
        number: i64,
        label: &OrderLabel,
    ) -> Result<(), EmailError> {
        let store_name = self.store_name.as_str();
        let tracking_url = label.tracking_url.as_deref();

        let html = ShipmentNotificationHtml {
            store_name,
            customer_name,
            number,
            carrier: &label.carrier,
            tracking_number: &label.tracking_number,
            tracking_url,
        }
        .render()?;
        let text = ShipmentNotificationText {
            store_name,
            customer_name,
            number,
            carrier: &label.carrier,
            tracking_number: &label.tracking_number,
            tracking_url,
        }
        .render()?;

        let subject = format!("{store_name}: tu pedido #{number} va en camino");
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Public order lookup link included in confirmations.
fn order_url(base_url: &str, number: i64, email: &str) -> String {
    format!(
        "{base_url}/api/ordenes/{number}?email={}",
        urlencoding::encode(email)
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tienda_core::{OrderChannel, OrderId, OrderItemId, OrderStatus, PaymentMethod, VariantId};

    use super::*;
    use crate::models::{Order, OrderItem};

    fn order() -> OrderWithItems {
        let now = Utc::now();
        OrderWithItems {
            order: Order {
                id: OrderId::new(1),
                number: 1042,
                channel: OrderChannel::Online,
                status: OrderStatus::Pending,
                payment_method: PaymentMethod::Card,
                customer_name: "Ana López".to_string(),
                customer_email: Some("ana+tienda@example.com".to_string()),
                customer_phone: None,
                shipping_address: None,
                subtotal: Decimal::new(69900, 2),
                discount: Decimal::new(6990, 2),
                shipping_cost: Decimal::new(9900, 2),
                total: Decimal::new(72810, 2),
                coupon_id: None,
                amount_received: None,
                change_given: None,
                shipping_provider: None,
                shipping_carrier: None,
                shipping_service: None,
                label: None,
                notes: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(1),
                variant_id: Some(VariantId::new(3)),
                product_name: "Blusa bordada".to_string(),
                variant_name: Some("M / Rojo".to_string()),
                sku: "BLU-M-RJ".to_string(),
                unit_price: Decimal::new(69900, 2),
                quantity: 1,
                line_total: Decimal::new(69900, 2),
            }],
        }
    }

    #[test]
    fn test_order_url_encodes_email() {
        assert_eq!(
            order_url("https://tienda.mx", 1042, "ana+tienda@example.com"),
            "https://tienda.mx/api/ordenes/1042?email=ana%2Btienda%40example.com"
        );
    }

    #[test]
    fn test_confirmation_text_lists_items_and_totals() {
        let summary = OrderSummary::new(&order());
        let text = OrderConfirmationText {
            store_name: "Tienda",
            order_url: "https://tienda.mx/api/ordenes/1042",
            summary: &summary,
        }
        .render()
        .expect("render");

        assert!(text.contains("#1042"));
        assert!(text.contains("Blusa bordada (M / Rojo)"));
        assert!(text.contains("$699.00"));
        assert!(text.contains("-$69.90"));
        assert!(text.contains("$728.10"));
    }

    #[test]
    fn test_confirmation_without_discount_omits_line() {
        let mut order = order();
        order.order.discount = Decimal::ZERO;
        let summary = OrderSummary::new(&order);
        assert!(summary.discount.is_none());
    }

    #[test]
    fn test_shipment_html_escapes_names() {
        let html = ShipmentNotificationHtml {
            store_name: "Tienda",
            customer_name: "<Ana>",
            number: 1042,
            carrier: "estafeta",
            tracking_number: "EST123",
            tracking_url: Some("https://track.example/EST123"),
        }
        .render()
        .expect("render");

        assert!(html.contains("&#60;Ana&#62;") || html.contains("&lt;Ana&gt;"));
        assert!(html.contains("EST123"));
    }
}
