//! Device identity: the radio module's factory DevEUI.
//!
//! The DevEUI is fetched from the module once, at the first boot after
//! manufacture, and persisted.  Every later boot reads it back from the
//! store; the radio is only asked again if the record is missing.
//! The core never mutates it.

use core::fmt::Write;

use log::{info, warn};

use crate::app::ports::{DeviceEui, RadioPort, StorageError, StoragePort};
use crate::error::Error;

const IDENTITY_NAMESPACE: &str = "ident";
const DEVEUI_KEY: &str = "deveui";

/// "70B3D57ED0001234" (16 hex chars).
pub type EuiString = heapless::String<16>;

/// Short operator-facing ID: `GR-` + last 3 EUI bytes.
pub type DeviceIdString = heapless::String<16>;

/// Return the persisted DevEUI, fetching and persisting it on first boot.
pub fn load_or_fetch(
    store: &mut impl StoragePort,
    radio: &mut impl RadioPort,
) -> Result<DeviceEui, Error> {
    let mut eui: DeviceEui = [0; 8];
    match store.read(IDENTITY_NAMESPACE, DEVEUI_KEY, &mut eui) {
        Ok(8) => return Ok(eui),
        Ok(len) => warn!("DevEUI record has {} bytes, refetching", len),
        Err(StorageError::NotFound) => info!("DevEUI not stored yet, asking the radio"),
        Err(e) => return Err(e.into()),
    }

    let eui = radio.device_eui()?;
    store.write(IDENTITY_NAMESPACE, DEVEUI_KEY, &eui)?;
    info!("DevEUI {} persisted", to_hex(&eui));
    Ok(eui)
}

pub fn to_hex(eui: &DeviceEui) -> EuiString {
    let mut s = EuiString::new();
    for b in eui {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// Format: `GR-XXYYZZ` (e.g., `GR-001234`).
pub fn device_id(eui: &DeviceEui) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "GR-{:02X}{:02X}{:02X}", eui[5], eui[6], eui[7]);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvStore;
    use crate::app::ports::{JoinPoll, LinkStatus};
    use crate::error::LinkError;

    struct EuiRadio {
        eui: Result<DeviceEui, LinkError>,
        asked: u32,
    }

    impl RadioPort for EuiRadio {
        fn configure(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn device_eui(&mut self) -> Result<DeviceEui, LinkError> {
            self.asked += 1;
            self.eui
        }
        fn request_join(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
        fn poll_join(&mut self) -> JoinPoll {
            JoinPoll::Pending
        }
        fn send_uplink(&mut self, _port: u8, _payload: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }
        fn query_status(&mut self) -> Result<LinkStatus, LinkError> {
            Ok(LinkStatus::NotJoined)
        }
    }

    const EUI: DeviceEui = [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x12, 0x34];

    #[test]
    fn first_boot_fetches_and_persists() {
        let mut store = NvStore::new();
        let mut radio = EuiRadio { eui: Ok(EUI), asked: 0 };
        assert_eq!(load_or_fetch(&mut store, &mut radio).unwrap(), EUI);
        assert!(store.exists(IDENTITY_NAMESPACE, DEVEUI_KEY));
        assert_eq!(radio.asked, 1);
    }

    #[test]
    fn later_boots_never_ask_the_radio() {
        let mut store = NvStore::new();
        let mut radio = EuiRadio { eui: Ok(EUI), asked: 0 };
        load_or_fetch(&mut store, &mut radio).unwrap();
        radio.eui = Ok([0; 8]);
        assert_eq!(load_or_fetch(&mut store, &mut radio).unwrap(), EUI);
        assert_eq!(radio.asked, 1);
    }

    #[test]
    fn radio_failure_persists_nothing() {
        let mut store = NvStore::new();
        let mut radio = EuiRadio { eui: Err(LinkError::Timeout), asked: 0 };
        assert!(load_or_fetch(&mut store, &mut radio).is_err());
        assert!(!store.exists(IDENTITY_NAMESPACE, DEVEUI_KEY));
    }

    #[test]
    fn formats() {
        assert_eq!(to_hex(&EUI).as_str(), "70B3D57ED0001234");
        assert_eq!(device_id(&EUI).as_str(), "GR-001234");
    }
}
