//! The Bluetooth LE seam.
//!
//! The driver never talks to a radio directly. Whatever owns the BLE stack
//! (a desktop BLE library, a mobile bridge, a test double) implements
//! [`BleTransport`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PrinterError;

/// Bluetooth base UUID, `00000000-0000-1000-8000-00805f9b34fb`.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit assigned number to a full 128-bit UUID.
#[must_use]
pub const fn short_uuid(value: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((value as u128) << 96))
}

/// How a chunk is written to a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// ATT write request; the peripheral acknowledges each chunk.
    WithResponse,
    /// ATT write command; faster, no acknowledgement.
    WithoutResponse,
}

/// A GATT characteristic and the write operations it allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub write: bool,
    pub write_without_response: bool,
}

impl CharacteristicInfo {
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }

    #[must_use]
    pub const fn supports(&self, mode: WriteMode) -> bool {
        match mode {
            WriteMode::WithResponse => self.write,
            WriteMode::WithoutResponse => self.write_without_response,
        }
    }
}

/// A GATT service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

/// A connected BLE peripheral.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Advertised device name, used to pick a profile.
    fn device_name(&self) -> Option<String>;

    /// List the peripheral's GATT services.
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, PrinterError>;

    /// Write one chunk to a characteristic.
    async fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), PrinterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_expansion() {
        assert_eq!(
            short_uuid(0x18F0).to_string(),
            "000018f0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            short_uuid(0xFF02).to_string(),
            "0000ff02-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_characteristic_write_support() {
        let characteristic = CharacteristicInfo {
            uuid: short_uuid(0x2AF1),
            write: false,
            write_without_response: true,
        };
        assert!(characteristic.is_writable());
        assert!(characteristic.supports(WriteMode::WithoutResponse));
        assert!(!characteristic.supports(WriteMode::WithResponse));
    }
}
