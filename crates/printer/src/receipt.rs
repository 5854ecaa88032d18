//! Receipt layout for 58 mm and 80 mm paper.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tienda_core::{PaymentMethod, format_amount};

use crate::escpos::{Align, EscPos};

/// Paper roll width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperWidth {
    /// 58 mm, 32 columns in font A.
    #[default]
    #[serde(rename = "58mm")]
    Mm58,
    /// 80 mm, 48 columns in font A.
    #[serde(rename = "80mm")]
    Mm80,
}

impl PaperWidth {
    #[must_use]
    pub const fn columns(self) -> usize {
        match self {
            Self::Mm58 => 32,
            Self::Mm80 => 48,
        }
    }
}

/// One sold line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Everything printed on a sale receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub store_name: String,
    #[serde(default)]
    pub header_lines: Vec<String>,
    pub order_number: String,
    pub issued_at: DateTime<Utc>,
    pub items: Vec<ReceiptItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub amount_received: Option<Decimal>,
    pub change: Option<Decimal>,
    #[serde(default)]
    pub footer_lines: Vec<String>,
}

fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "Tarjeta",
        PaymentMethod::Cash => "Efectivo",
        PaymentMethod::Transfer => "Transferencia",
        PaymentMethod::Terminal => "Terminal",
    }
}

/// Lays a [`Receipt`] out for a paper width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiptLayout {
    pub width: PaperWidth,
}

/// A laid-out line and how to print it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Styled {
    text: String,
    align: Align,
    bold: bool,
    large: bool,
}

impl Styled {
    fn plain(text: String) -> Self {
        Self {
            text,
            align: Align::Left,
            bold: false,
            large: false,
        }
    }

    fn centered(text: String) -> Self {
        Self {
            align: Align::Center,
            ..Self::plain(text)
        }
    }
}

impl ReceiptLayout {
    #[must_use]
    pub const fn new(width: PaperWidth) -> Self {
        Self { width }
    }

    fn styled_lines(&self, receipt: &Receipt) -> Vec<Styled> {
        let cols = self.width.columns();
        let rule = "-".repeat(cols);
        let mut lines = Vec::new();

        // Double-size text takes two columns per character.
        for part in wrap(&receipt.store_name, cols / 2) {
            lines.push(Styled {
                bold: true,
                large: true,
                ..Styled::centered(part)
            });
        }
        for header in &receipt.header_lines {
            lines.extend(wrap(header, cols).into_iter().map(Styled::centered));
        }
        lines.push(Styled::plain(rule.clone()));
        lines.push(Styled::plain(two_columns(
            &format!("Venta #{}", receipt.order_number),
            &receipt.issued_at.format("%d/%m/%Y %H:%M").to_string(),
            cols,
        )));
        lines.push(Styled::plain(rule.clone()));

        for item in &receipt.items {
            lines.extend(wrap(&item.name, cols).into_iter().map(Styled::plain));
            lines.push(Styled::plain(two_columns(
                &format!("  {} x {}", item.quantity, format_amount(item.unit_price)),
                &format_amount(item.line_total),
                cols,
            )));
        }

        lines.push(Styled::plain(rule.clone()));
        lines.push(Styled::plain(two_columns(
            "Subtotal",
            &format_amount(receipt.subtotal),
            cols,
        )));
        if receipt.discount > Decimal::ZERO {
            lines.push(Styled::plain(two_columns(
                "Descuento",
                &format!("-{}", format_amount(receipt.discount)),
                cols,
            )));
        }
        lines.push(Styled {
            bold: true,
            ..Styled::plain(two_columns("TOTAL", &format_amount(receipt.total), cols))
        });
        lines.push(Styled::plain(two_columns(
            "Pago",
            payment_label(receipt.payment_method),
            cols,
        )));
        if let Some(received) = receipt.amount_received {
            lines.push(Styled::plain(two_columns(
                "Recibido",
                &format_amount(received),
                cols,
            )));
        }
        if let Some(change) = receipt.change {
            lines.push(Styled::plain(two_columns("Cambio", &format_amount(change), cols)));
        }

        if !receipt.footer_lines.is_empty() {
            lines.push(Styled::plain(rule));
            for footer in &receipt.footer_lines {
                lines.extend(wrap(footer, cols).into_iter().map(Styled::centered));
            }
        }

        lines
    }

    /// The receipt as plain text lines, for previews.
    #[must_use]
    pub fn text_lines(&self, receipt: &Receipt) -> Vec<String> {
        self.styled_lines(receipt)
            .into_iter()
            .map(|line| line.text)
            .collect()
    }

    /// The receipt as ESC/POS bytes, ending with a feed and cut.
    #[must_use]
    pub fn render(&self, receipt: &Receipt) -> Vec<u8> {
        let mut out = EscPos::new().init().code_page_pc850();
        for line in self.styled_lines(receipt) {
            out = out
                .align(line.align)
                .bold(line.bold)
                .double_size(line.large)
                .line(&line.text);
        }
        out.bold(false)
            .double_size(false)
            .align(Align::Left)
            .feed(4)
            .cut()
            .build()
    }
}

/// Left text and right text on one line of `width` columns.
///
/// The left side is truncated when both do not fit.
#[must_use]
pub fn two_columns(left: &str, right: &str, width: usize) -> String {
    let right_len = right.chars().count();
    let room = width.saturating_sub(right_len + 1);
    let left: String = left.chars().take(room).collect();
    let gap = width.saturating_sub(left.chars().count() + right_len);
    format!("{left}{}{right}", " ".repeat(gap.max(1)))
}

/// Word-wrap to `width` columns, splitting words longer than a line.
#[must_use]
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
