//! Thermal printer driver over a [`BleTransport`].

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::PrinterError;
use crate::profile::DeviceProfile;
use crate::transport::{BleTransport, CharacteristicInfo, ServiceInfo, WriteMode, short_uuid};

/// Known (service, characteristic) pairs, most common first.
pub const KNOWN_PRINTER_SERVICES: &[(Uuid, Uuid)] = &[
    // Generic Chinese printers (MTP, PT-210)
    (short_uuid(0x18F0), short_uuid(0x2AF1)),
    // Bixolon, Zebra and other SPP-over-BLE bridges
    (
        Uuid::from_u128(0xe781_0a71_73ae_499d_8c15_faa9_aef0_c3f2),
        Uuid::from_u128(0xbef8_d6c9_9c21_4c9e_b632_bd58_c100_9f9f),
    ),
    // Microchip ISSC transparent UART
    (
        Uuid::from_u128(0x4953_5343_fe7d_4ae5_8fa9_9faf_d205_e455),
        Uuid::from_u128(0x4953_5343_8841_43f4_a8d4_ecbe_3472_9bb3),
    ),
    (short_uuid(0xFF00), short_uuid(0xFF02)),
    // HM-10 style modules
    (short_uuid(0xFFE0), short_uuid(0xFFE1)),
];

/// Standard services that never accept print data.
const IGNORED_SERVICES: &[Uuid] = &[
    short_uuid(0x1800), // Generic Access
    short_uuid(0x1801), // Generic Attribute
    short_uuid(0x180A), // Device Information
    short_uuid(0x180F), // Battery
];

/// The characteristic print data goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTarget {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub mode: WriteMode,
}

/// What happened during a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrintReport {
    pub bytes: usize,
    pub chunks: usize,
    pub retries: u32,
}

fn choose_mode(characteristic: &CharacteristicInfo, preferred: WriteMode) -> Option<WriteMode> {
    if characteristic.supports(preferred) {
        return Some(preferred);
    }
    [WriteMode::WithResponse, WriteMode::WithoutResponse]
        .into_iter()
        .find(|mode| characteristic.supports(*mode))
}

/// Pick the characteristic to print to.
///
/// Known printer services are tried in preference order, first their
/// expected characteristic and then any writable one in the same service.
/// Failing that, the first writable characteristic of any non-standard
/// service is used.
///
/// # Errors
///
/// Returns `PrinterError::NoWritableCharacteristic` when nothing is writable.
pub fn negotiate(
    services: &[ServiceInfo],
    preferred: WriteMode,
) -> Result<WriteTarget, PrinterError> {
    let target = |service: &ServiceInfo, characteristic: &CharacteristicInfo| {
        choose_mode(characteristic, preferred).map(|mode| WriteTarget {
            service: service.uuid,
            characteristic: characteristic.uuid,
            mode,
        })
    };

    for (service_uuid, characteristic_uuid) in KNOWN_PRINTER_SERVICES {
        let Some(service) = services.iter().find(|s| s.uuid == *service_uuid) else {
            continue;
        };
        let expected = service
            .characteristics
            .iter()
            .find(|c| c.uuid == *characteristic_uuid)
            .and_then(|c| target(service, c));
        if let Some(found) = expected.or_else(|| {
            service
                .characteristics
                .iter()
                .find_map(|c| target(service, c))
        }) {
            return Ok(found);
        }
    }

    services
        .iter()
        .filter(|s| !IGNORED_SERVICES.contains(&s.uuid))
        .find_map(|service| {
            service
                .characteristics
                .iter()
                .find_map(|c| target(service, c))
        })
        .ok_or(PrinterError::NoWritableCharacteristic)
}

/// A printer with a negotiated write target.
pub struct ThermalPrinter<T> {
    transport: T,
    profile: DeviceProfile,
    target: WriteTarget,
}

impl<T> std::fmt::Debug for ThermalPrinter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThermalPrinter")
            .field("profile", &self.profile.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<T: BleTransport> ThermalPrinter<T> {
    /// Discover services and pick a profile from the advertised name.
    ///
    /// # Errors
    ///
    /// Returns transport errors from discovery and
    /// `PrinterError::NoWritableCharacteristic` when negotiation fails.
    pub async fn connect(transport: T) -> Result<Self, PrinterError> {
        let profile = *DeviceProfile::for_name(transport.device_name().as_deref());
        Self::connect_with_profile(transport, profile).await
    }

    /// Like [`Self::connect`] with an explicit profile.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    #[instrument(skip(transport, profile), fields(profile = profile.name))]
    pub async fn connect_with_profile(
        transport: T,
        profile: DeviceProfile,
    ) -> Result<Self, PrinterError> {
        let services = transport.discover_services().await?;
        let target = negotiate(&services, profile.write_mode)?;

        info!(
            service = %target.service,
            characteristic = %target.characteristic,
            mode = ?target.mode,
            "Printer connected"
        );

        Ok(Self {
            transport,
            profile,
            target,
        })
    }

    #[must_use]
    pub const fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    #[must_use]
    pub const fn target(&self) -> WriteTarget {
        self.target
    }

    /// Send bytes in profile-sized chunks.
    ///
    /// A failed chunk is retried with exponential backoff; chunks already
    /// written are not resent.
    ///
    /// # Errors
    ///
    /// Returns `PrinterError::WriteFailed` when a chunk still fails after
    /// the profile's retry limit.
    #[instrument(skip(self, data), fields(bytes = data.len(), profile = self.profile.name))]
    pub async fn print(&self, data: &[u8]) -> Result<PrintReport, PrinterError> {
        let chunk_size = self.profile.chunk_size.max(1);
        let total = data.len().div_ceil(chunk_size);
        let mut report = PrintReport {
            bytes: data.len(),
            ..PrintReport::default()
        };

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            report.retries += self.write_chunk(index, chunk).await?;
            report.chunks += 1;

            if index + 1 < total && self.profile.chunk_delay_ms > 0 {
                tokio::time::sleep(self.profile.chunk_delay()).await;
            }
        }

        debug!(chunks = report.chunks, retries = report.retries, "Print job sent");
        Ok(report)
    }

    /// Write one chunk, returning how many retries it took.
    async fn write_chunk(&self, index: usize, chunk: &[u8]) -> Result<u32, PrinterError> {
        let mut retry = 0;
        loop {
            let result = self
                .transport
                .write(
                    self.target.service,
                    self.target.characteristic,
                    chunk,
                    self.target.mode,
                )
                .await;

            match result {
                Ok(()) => return Ok(retry),
                Err(e) if retry < self.profile.max_retries => {
                    let delay = self.profile.backoff(retry);
                    warn!(chunk = index, retry, error = %e, delay = ?delay, "Chunk write failed, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    return Err(PrinterError::WriteFailed {
                        chunk: index,
                        attempts: retry + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    fn writable(uuid: Uuid, write: bool, without_response: bool) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid,
            write,
            write_without_response: without_response,
        }
    }

    fn service(uuid: Uuid, characteristics: Vec<CharacteristicInfo>) -> ServiceInfo {
        ServiceInfo {
            uuid,
            characteristics,
        }
    }

    struct FakeTransport {
        name: Option<String>,
        services: Vec<ServiceInfo>,
        /// Fail this many writes before succeeding.
        failures: Mutex<u32>,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeTransport {
        fn new(services: Vec<ServiceInfo>, failures: u32) -> Self {
            Self {
                name: Some("MTP-II".to_string()),
                services,
                failures: Mutex::new(failures),
                writes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BleTransport for FakeTransport {
        fn device_name(&self) -> Option<String> {
            self.name.clone()
        }

        async fn discover_services(&self) -> Result<Vec<ServiceInfo>, PrinterError> {
            Ok(self.services.clone())
        }

        async fn write(
            &self,
            _service: Uuid,
            _characteristic: Uuid,
            data: &[u8],
            _mode: WriteMode,
        ) -> Result<(), PrinterError> {
            let mut failures = self.failures.lock().expect("lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(PrinterError::Transport("GATT busy".to_string()));
            }
            self.writes.lock().expect("lock").push(data.to_vec());
            Ok(())
        }
    }

    fn fast_profile(chunk_size: usize, max_retries: u32) -> DeviceProfile {
        DeviceProfile {
            name: "test",
            prefixes: &[],
            chunk_size,
            chunk_delay_ms: 0,
            write_mode: WriteMode::WithoutResponse,
            max_retries,
            backoff_base_ms: 1,
        }
    }

    fn printer_services() -> Vec<ServiceInfo> {
        vec![
            service(short_uuid(0x1800), vec![writable(short_uuid(0x2A00), true, false)]),
            service(short_uuid(0x18F0), vec![writable(short_uuid(0x2AF1), true, true)]),
        ]
    }

    #[test]
    fn test_negotiate_prefers_known_service() {
        let target = negotiate(&printer_services(), WriteMode::WithoutResponse).expect("target");
        assert_eq!(target.service, short_uuid(0x18F0));
        assert_eq!(target.characteristic, short_uuid(0x2AF1));
        assert_eq!(target.mode, WriteMode::WithoutResponse);
    }

    #[test]
    fn test_negotiate_known_service_order() {
        let services = vec![
            service(short_uuid(0xFFE0), vec![writable(short_uuid(0xFFE1), true, false)]),
            service(short_uuid(0xFF00), vec![writable(short_uuid(0xFF02), true, false)]),
        ];
        let target = negotiate(&services, WriteMode::WithResponse).expect("target");
        assert_eq!(target.service, short_uuid(0xFF00));
    }

    #[test]
    fn test_negotiate_falls_back_to_mode_supported() {
        let services = vec![service(
            short_uuid(0x18F0),
            vec![writable(short_uuid(0x2AF1), true, false)],
        )];
        let target = negotiate(&services, WriteMode::WithoutResponse).expect("target");
        assert_eq!(target.mode, WriteMode::WithResponse);
    }

    #[test]
    fn test_negotiate_any_writable_unknown_service() {
        let custom = Uuid::from_u128(0x1234_5678_0000_1000_8000_0080_5f9b_34fb);
        let services = vec![
            service(short_uuid(0x180A), vec![writable(short_uuid(0x2A29), true, false)]),
            service(
                custom,
                vec![
                    writable(short_uuid(0x2A01), false, false),
                    writable(short_uuid(0x2A02), false, true),
                ],
            ),
        ];
        let target = negotiate(&services, WriteMode::WithResponse).expect("target");
        assert_eq!(target.service, custom);
        assert_eq!(target.characteristic, short_uuid(0x2A02));
    }

    #[test]
    fn test_negotiate_nothing_writable() {
        let services = vec![
            service(short_uuid(0x1800), vec![writable(short_uuid(0x2A00), true, false)]),
            service(short_uuid(0x18F0), vec![writable(short_uuid(0x2AF1), false, false)]),
        ];
        assert!(matches!(
            negotiate(&services, WriteMode::WithResponse),
            Err(PrinterError::NoWritableCharacteristic)
        ));
    }

    #[tokio::test]
    async fn test_connect_uses_name_profile() {
        let printer = ThermalPrinter::connect(FakeTransport::new(printer_services(), 0))
            .await
            .expect("connect");
        assert_eq!(printer.profile().name, "goojprt-mtp");
    }

    #[tokio::test]
    async fn test_print_splits_into_chunks() {
        let printer = ThermalPrinter::connect_with_profile(
            FakeTransport::new(printer_services(), 0),
            fast_profile(4, 2),
        )
        .await
        .expect("connect");

        let report = printer.print(b"0123456789").await.expect("print");
        assert_eq!(report.chunks, 3);
        assert_eq!(report.bytes, 10);
        assert_eq!(report.retries, 0);

        let writes = printer.transport.writes.lock().expect("lock").clone();
        assert_eq!(writes, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
    }

    #[tokio::test]
    async fn test_print_retries_failed_chunk() {
        let printer = ThermalPrinter::connect_with_profile(
            FakeTransport::new(printer_services(), 2),
            fast_profile(8, 3),
        )
        .await
        .expect("connect");

        let report = printer.print(b"hola mundo").await.expect("print");
        assert_eq!(report.retries, 2);
        assert_eq!(printer.transport.writes.lock().expect("lock").concat(), b"hola mundo");
    }

    #[tokio::test]
    async fn test_print_gives_up_after_retry_limit() {
        let printer = ThermalPrinter::connect_with_profile(
            FakeTransport::new(printer_services(), 10),
            fast_profile(8, 2),
        )
        .await
        .expect("connect");

        let err = printer.print(b"hola").await.expect_err("should fail");
        assert!(matches!(
            err,
            PrinterError::WriteFailed { chunk: 0, attempts: 3, .. }
        ));
    }
}
