//! Persisted device settings: the store seam and the record codec.
//!
//! Two flat key=value text records survive reboots, one pair per line,
//! no escaping:
//!
//! - credentials: `SSID`, `Password`
//! - network settings: `useStaticIP` (`"true"`/`"false"`), `staticIP`,
//!   `gateway`, `subnet`, `primaryDNS`, `secondaryDNS` (dotted quads)
//!
//! The codec lives here so every store backend persists the same bytes;
//! [`crate::flash_settings`] holds them in flash sectors on the Pico,
//! [`MemorySettings`] holds them in memory for host tests.

use core::fmt::Write as _;

use crate::Result;
use crate::wifi_config::{NetworkConfig, WifiCredentials, parse_dotted_quad};

/// One encoded record. Both records fit comfortably.
pub type RecordText = heapless::String<256>;

/// Storage seam for the two persisted records.
///
/// A failing backend is expected to recover itself where it can (one-shot
/// reformat on corruption); the manager treats any remaining load error as
/// "no stored value" and continues with in-memory defaults.
pub trait SettingsStore {
    fn load_credentials(&self) -> Result<Option<WifiCredentials>>;
    fn save_credentials(&self, credentials: &WifiCredentials) -> Result<()>;
    fn clear_credentials(&self) -> Result<()>;
    fn load_network_config(&self) -> Result<Option<NetworkConfig>>;
    fn save_network_config(&self, config: &NetworkConfig) -> Result<()>;
    fn clear_network_config(&self) -> Result<()>;
}

// ============================================================================
// Record codec
// ============================================================================

/// Encode credentials as the persisted `SSID=`/`Password=` record.
#[must_use]
pub fn encode_credentials(credentials: &WifiCredentials) -> RecordText {
    let mut text = RecordText::new();
    let _ = writeln!(text, "SSID={}", credentials.ssid);
    let _ = writeln!(text, "Password={}", credentials.password);
    text
}

/// Decode a credentials record. Returns `None` when no usable SSID is
/// present; unknown keys are ignored.
#[must_use]
pub fn decode_credentials(text: &str) -> Option<WifiCredentials> {
    let mut ssid = heapless::String::new();
    let mut password = heapless::String::new();
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "SSID" => {
                let _ = ssid.push_str(value);
            }
            "Password" => {
                let _ = password.push_str(value);
            }
            _ => {}
        }
    }
    if ssid.is_empty() {
        return None;
    }
    Some(WifiCredentials { ssid, password })
}

/// Encode the network settings record.
#[must_use]
pub fn encode_network_config(config: &NetworkConfig) -> RecordText {
    let mut text = RecordText::new();
    let _ = writeln!(
        text,
        "useStaticIP={}",
        if config.use_static_ip { "true" } else { "false" }
    );
    let _ = writeln!(text, "staticIP={}", config.static_ip);
    let _ = writeln!(text, "gateway={}", config.gateway);
    let _ = writeln!(text, "subnet={}", config.subnet);
    let _ = writeln!(text, "primaryDNS={}", config.primary_dns);
    let _ = writeln!(text, "secondaryDNS={}", config.secondary_dns);
    text
}

/// Decode a network settings record over the defaults.
///
/// Missing keys keep their default value; unparseable addresses are ignored
/// so a damaged line cannot displace a valid default.
#[must_use]
pub fn decode_network_config(text: &str) -> NetworkConfig {
    let mut config = NetworkConfig::default();
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "useStaticIP" => config.use_static_ip = value == "true",
            "staticIP" => {
                if let Ok(addr) = parse_dotted_quad(value) {
                    config.static_ip = addr;
                }
            }
            "gateway" => {
                if let Ok(addr) = parse_dotted_quad(value) {
                    config.gateway = addr;
                }
            }
            "subnet" => {
                if let Ok(addr) = parse_dotted_quad(value) {
                    config.subnet = addr;
                }
            }
            "primaryDNS" => {
                if let Ok(addr) = parse_dotted_quad(value) {
                    config.primary_dns = addr;
                }
            }
            "secondaryDNS" => {
                if let Ok(addr) = parse_dotted_quad(value) {
                    config.secondary_dns = addr;
                }
            }
            _ => {}
        }
    }
    config
}

// ============================================================================
// In-memory store (host testing)
// ============================================================================

/// Settings store that keeps the encoded records in memory.
///
/// Survives across manager instances within one process, which is what a
/// "simulated reboot" in a host test needs.
#[cfg(feature = "host")]
pub struct MemorySettings {
    records: embassy_sync::blocking_mutex::Mutex<
        embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
        core::cell::RefCell<MemoryRecords>,
    >,
}

#[cfg(feature = "host")]
#[derive(Default)]
struct MemoryRecords {
    credentials: Option<RecordText>,
    network: Option<RecordText>,
}

#[cfg(feature = "host")]
impl MemorySettings {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: embassy_sync::blocking_mutex::Mutex::new(core::cell::RefCell::new(
                MemoryRecords {
                    credentials: None,
                    network: None,
                },
            )),
        }
    }
}

#[cfg(feature = "host")]
impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "host")]
impl SettingsStore for MemorySettings {
    fn load_credentials(&self) -> Result<Option<WifiCredentials>> {
        Ok(self.records.lock(|cell| {
            cell.borrow()
                .credentials
                .as_ref()
                .and_then(|text| decode_credentials(text))
        }))
    }

    fn save_credentials(&self, credentials: &WifiCredentials) -> Result<()> {
        self.records.lock(|cell| {
            cell.borrow_mut().credentials = Some(encode_credentials(credentials));
        });
        Ok(())
    }

    fn clear_credentials(&self) -> Result<()> {
        self.records.lock(|cell| cell.borrow_mut().credentials = None);
        Ok(())
    }

    fn load_network_config(&self) -> Result<Option<NetworkConfig>> {
        Ok(self.records.lock(|cell| {
            cell.borrow()
                .network
                .as_ref()
                .map(|text| decode_network_config(text))
        }))
    }

    fn save_network_config(&self, config: &NetworkConfig) -> Result<()> {
        self.records.lock(|cell| {
            cell.borrow_mut().network = Some(encode_network_config(config));
        });
        Ok(())
    }

    fn clear_network_config(&self) -> Result<()> {
        self.records.lock(|cell| cell.borrow_mut().network = None);
        Ok(())
    }
}
