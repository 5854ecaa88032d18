//! Tienda Printer - receipts for Bluetooth thermal printers.
//!
//! - [`escpos`] builds ESC/POS byte streams with PC850 text
//! - [`receipt`] lays sales out for 58 mm and 80 mm paper
//! - [`transport`] is the BLE seam the host application implements
//! - [`profile`] holds per-model chunking and retry parameters
//! - [`driver`] negotiates a writable characteristic and sends chunks

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod driver;
pub mod escpos;
pub mod profile;
pub mod receipt;
pub mod transport;

pub use driver::{PrintReport, ThermalPrinter, WriteTarget, negotiate};
pub use escpos::{Align, EscPos};
pub use profile::DeviceProfile;
pub use receipt::{PaperWidth, Receipt, ReceiptItem, ReceiptLayout};
pub use transport::{BleTransport, CharacteristicInfo, ServiceInfo, WriteMode};

use thiserror::Error;

/// Errors from printer negotiation and writes.
#[derive(Debug, Error)]
pub enum PrinterError {
    /// The BLE stack reported an error.
    #[error("Bluetooth transport error: {0}")]
    Transport(String),

    /// No service exposes a characteristic we can write to.
    #[error("No writable characteristic found on the printer")]
    NoWritableCharacteristic,

    /// A chunk kept failing after every retry.
    #[error("Chunk {chunk} failed after {attempts} attempts: {reason}")]
    WriteFailed {
        chunk: usize,
        attempts: u32,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failed_display() {
        let err = PrinterError::WriteFailed {
            chunk: 4,
            attempts: 3,
            reason: "GATT busy".to_string(),
        };
        assert_eq!(err.to_string(), "Chunk 4 failed after 3 attempts: GATT busy");
    }
}
