//! Scriptable radio driver for host tests.
//!
//! Plays the role the real cyw43 backend plays on hardware: tests script
//! which networks are reachable and how many status polls a join takes,
//! then observe counters instead of radio traffic.

use core::cell::RefCell;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use crate::Result;
use crate::radio::{ConnectionStatus, RadioControl, RadioMode, ScanList};
use crate::wifi_config::{HostNetwork, NetworkConfig, WifiCredentials};

struct Inner {
    mode: RadioMode,
    status: ConnectionStatus,
    reachable: ScanList,
    scan_results: ScanList,
    joining: Option<heapless::String<32>>,
    join_reachable: bool,
    polls_until_connected: u8,
    polls_since_join: u8,
    join_count: u32,
    join_had_static: bool,
    last_static: Option<NetworkConfig>,
    configured_host: Option<HostNetwork>,
    host_up: bool,
    start_host_count: u32,
    stop_host_count: u32,
    status_polls: u32,
    address: Ipv4Addr,
}

/// A virtual radio whose behavior is scripted by the test.
pub struct VirtualRadio {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner>>,
}

impl VirtualRadio {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                mode: RadioMode::Client,
                status: ConnectionStatus::Disconnected,
                reachable: ScanList::new(),
                scan_results: ScanList::new(),
                joining: None,
                join_reachable: false,
                polls_until_connected: 1,
                polls_since_join: 0,
                join_count: 0,
                join_had_static: false,
                last_static: None,
                configured_host: None,
                host_up: false,
                start_host_count: 0,
                stop_host_count: 0,
                status_polls: 0,
                address: Ipv4Addr::new(192, 168, 1, 23),
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    // ------------------------------------------------------------------
    // Test scripting
    // ------------------------------------------------------------------

    /// Make `ssid` accept joins. Reachability is sampled when a join is
    /// issued, like a real driver failing a join against an absent network.
    pub fn make_reachable(&self, ssid: &str) {
        self.with(|inner| {
            let _ = inner.reachable.push(heapless::String::try_from(ssid).unwrap_or_default());
        });
    }

    /// Make every network refuse joins again.
    pub fn clear_reachable(&self) {
        self.with(|inner| {
            inner.reachable.clear();
            inner.join_reachable = false;
        });
    }

    /// Networks the boot-time scan reports.
    pub fn set_scan_results(&self, ssids: &[&str]) {
        self.with(|inner| {
            inner.scan_results.clear();
            for ssid in ssids {
                let _ = inner
                    .scan_results
                    .push(heapless::String::try_from(*ssid).unwrap_or_default());
            }
        });
    }

    /// How many status polls a reachable join needs before it connects.
    pub fn set_polls_until_connected(&self, polls: u8) {
        self.with(|inner| inner.polls_until_connected = polls);
    }

    /// Simulate losing the upstream connection.
    pub fn drop_connection(&self) {
        self.with(|inner| {
            inner.status = ConnectionStatus::Disconnected;
            inner.joining = None;
        });
    }

    // ------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------

    pub fn join_count(&self) -> u32 {
        self.with(|inner| inner.join_count)
    }

    pub fn status_poll_count(&self) -> u32 {
        self.with(|inner| inner.status_polls)
    }

    pub fn reset_status_polls(&self) {
        self.with(|inner| inner.status_polls = 0);
    }

    pub fn start_host_count(&self) -> u32 {
        self.with(|inner| inner.start_host_count)
    }

    pub fn stop_host_count(&self) -> u32 {
        self.with(|inner| inner.stop_host_count)
    }

    pub fn host_up(&self) -> bool {
        self.with(|inner| inner.host_up)
    }

    /// Did the most recent join have static addressing applied first?
    pub fn join_had_static(&self) -> bool {
        self.with(|inner| inner.join_had_static)
    }

    pub fn configured_host(&self) -> Option<HostNetwork> {
        self.with(|inner| inner.configured_host)
    }
}

impl Default for VirtualRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioControl for VirtualRadio {
    async fn set_mode(&self, mode: RadioMode) -> Result<()> {
        self.with(|inner| inner.mode = mode);
        Ok(())
    }

    fn mode(&self) -> RadioMode {
        self.with(|inner| inner.mode)
    }

    async fn configure_static(&self, config: &NetworkConfig) -> Result<()> {
        self.with(|inner| inner.last_static = Some(*config));
        Ok(())
    }

    async fn configure_host(&self, network: &HostNetwork) -> Result<()> {
        self.with(|inner| inner.configured_host = Some(*network));
        Ok(())
    }

    async fn begin_join(&self, credentials: &WifiCredentials) -> Result<()> {
        self.with(|inner| {
            inner.join_count += 1;
            inner.join_had_static = inner.last_static.is_some();
            inner.join_reachable = inner
                .reachable
                .iter()
                .any(|ssid| ssid == &credentials.ssid);
            inner.joining = Some(credentials.ssid.clone());
            inner.polls_since_join = 0;
            inner.status = ConnectionStatus::Connecting;
        });
        Ok(())
    }

    async fn start_host(&self, _ssid: &str) -> Result<()> {
        self.with(|inner| {
            inner.start_host_count += 1;
            inner.host_up = true;
        });
        Ok(())
    }

    async fn stop_host(&self) -> Result<()> {
        self.with(|inner| {
            inner.stop_host_count += 1;
            inner.host_up = false;
        });
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        self.with(|inner| {
            inner.status_polls += 1;
            if inner.status == ConnectionStatus::Connecting && inner.join_reachable {
                inner.polls_since_join += 1;
                if inner.polls_since_join >= inner.polls_until_connected {
                    inner.status = ConnectionStatus::Connected;
                }
            }
            inner.status
        })
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.with(|inner| (inner.status == ConnectionStatus::Connected).then_some(inner.address))
    }

    fn connected_ssid(&self) -> Option<heapless::String<32>> {
        self.with(|inner| {
            (inner.status == ConnectionStatus::Connected)
                .then(|| inner.joining.clone())
                .flatten()
        })
    }

    fn mac_address(&self) -> [u8; 6] {
        [0x28, 0xCD, 0xC1, 0x0A, 0x1B, 0x2C]
    }

    async fn scan(&self, found: &mut ScanList) -> Result<()> {
        self.with(|inner| {
            for ssid in &inner.scan_results {
                let _ = found.push(ssid.clone());
            }
        });
        Ok(())
    }
}
