//! Per-model chunking and retry parameters.
//!
//! Cheap BLE printers drop data when written too fast, and each model has
//! its own tolerance. Profiles are matched by the advertised name prefix.

use std::time::Duration;

use serde::Serialize;

use crate::transport::WriteMode;

/// Chunking and backoff parameters for one printer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub name: &'static str,
    /// Advertised name prefixes, compared case-insensitively.
    pub prefixes: &'static [&'static str],
    /// Bytes per write.
    pub chunk_size: usize,
    /// Pause between chunks, in milliseconds.
    pub chunk_delay_ms: u64,
    /// Preferred write mode when the characteristic supports both.
    pub write_mode: WriteMode,
    /// Retries per chunk after the first attempt.
    pub max_retries: u32,
    /// First retry delay in milliseconds; doubles on each retry.
    pub backoff_base_ms: u64,
}

impl DeviceProfile {
    #[must_use]
    pub const fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// Backoff before retry number `retry` (0-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Pick the profile for an advertised name, falling back to [`GENERIC`].
    #[must_use]
    pub fn for_name(name: Option<&str>) -> &'static Self {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return &GENERIC;
        };
        let upper = name.to_ascii_uppercase();
        PROFILES
            .iter()
            .find(|profile| profile.prefixes.iter().any(|p| upper.starts_with(*p)))
            .unwrap_or(&GENERIC)
    }
}

/// Conservative defaults for unknown printers: 20-byte writes fit the
/// minimum BLE MTU.
pub const GENERIC: DeviceProfile = DeviceProfile {
    name: "generic",
    prefixes: &[],
    chunk_size: 20,
    chunk_delay_ms: 30,
    write_mode: WriteMode::WithResponse,
    max_retries: 3,
    backoff_base_ms: 100,
};

/// Known printer families.
pub const PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "goojprt-mtp",
        prefixes: &["MTP", "MPT"],
        chunk_size: 100,
        chunk_delay_ms: 20,
        write_mode: WriteMode::WithoutResponse,
        max_retries: 3,
        backoff_base_ms: 50,
    },
    DeviceProfile {
        name: "pt-210",
        prefixes: &["PT-210", "PT210", "PT-200"],
        chunk_size: 128,
        chunk_delay_ms: 15,
        write_mode: WriteMode::WithoutResponse,
        max_retries: 3,
        backoff_base_ms: 50,
    },
    DeviceProfile {
        name: "rongta-rpp",
        prefixes: &["RPP"],
        chunk_size: 180,
        chunk_delay_ms: 10,
        write_mode: WriteMode::WithoutResponse,
        max_retries: 4,
        backoff_base_ms: 40,
    },
    DeviceProfile {
        name: "xprinter",
        prefixes: &["XP-", "XPRINTER"],
        chunk_size: 256,
        chunk_delay_ms: 10,
        write_mode: WriteMode::WithResponse,
        max_retries: 3,
        backoff_base_ms: 80,
    },
    DeviceProfile {
        name: "munbyn",
        prefixes: &["MUNBYN", "IMP"],
        chunk_size: 182,
        chunk_delay_ms: 8,
        write_mode: WriteMode::WithResponse,
        max_retries: 3,
        backoff_base_ms: 60,
    },
    DeviceProfile {
        name: "generic-ble-printer",
        prefixes: &["BLUETOOTH PRINTER", "BLE PRINTER", "PRINTER"],
        chunk_size: 20,
        chunk_delay_ms: 40,
        write_mode: WriteMode::WithResponse,
        max_retries: 5,
        backoff_base_ms: 120,
    },
];
