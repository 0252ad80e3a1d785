//! The seam between the connection state machine and the radio hardware.

use core::net::Ipv4Addr;

use embassy_time::{Duration, Timer};

use crate::Result;
use crate::wifi_config::{HostNetwork, NetworkConfig, WifiCredentials};

/// Radio operating mode.
///
/// One radio is shared between the client role (join an upstream network)
/// and the host role (broadcast the configuration network); the two are
/// mutually exclusive at the hardware level except in [`RadioMode::ClientHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioMode {
    /// Station only.
    Client,
    /// Hosted network only.
    Host,
    /// Both roles at once, used solely for live reconnection attempts while
    /// the configuration session is active.
    ClientHost,
}

/// Upstream connection status, owned by the radio driver and only observed
/// by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Asynchronous events surfaced by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// The client interface acquired an address.
    GotAddress,
    /// The upstream connection dropped.
    Disconnected,
    /// A peer joined the locally hosted network.
    ClientJoined,
}

/// SSIDs discovered by the boot-time scan.
pub type ScanList = heapless::Vec<heapless::String<32>, 16>;

/// Driver contract for the shared radio.
///
/// Implementations keep their own interior mutability so every method takes
/// `&self`; the core shares one driver reference across the event context,
/// the portal task, and the reconnect worker. [`configure_static`] must be
/// applied before [`begin_join`] or the join silently falls back to
/// automatic addressing.
///
/// [`configure_static`]: RadioControl::configure_static
/// [`begin_join`]: RadioControl::begin_join
#[allow(async_fn_in_trait, reason = "single-executor embedded crate")]
pub trait RadioControl {
    /// Write the mode register. Callers go through [`ModeController`].
    async fn set_mode(&self, mode: RadioMode) -> Result<()>;

    /// The mode most recently requested.
    fn mode(&self) -> RadioMode;

    /// Apply static addressing for the client interface.
    async fn configure_static(&self, config: &NetworkConfig) -> Result<()>;

    /// Configure the hosted network's address block.
    async fn configure_host(&self, network: &HostNetwork) -> Result<()>;

    /// Start joining the upstream network. Completion is observed by
    /// polling [`status`](RadioControl::status), never awaited here.
    async fn begin_join(&self, credentials: &WifiCredentials) -> Result<()>;

    /// Bring the hosted network up under `ssid`.
    async fn start_host(&self, ssid: &str) -> Result<()>;

    /// Take the hosted network down. A no-op when it is not up.
    async fn stop_host(&self) -> Result<()>;

    fn status(&self) -> ConnectionStatus;

    /// Address of the client interface once connected.
    fn local_address(&self) -> Option<Ipv4Addr>;

    /// SSID of the upstream network once connected.
    fn connected_ssid(&self) -> Option<heapless::String<32>>;

    fn mac_address(&self) -> [u8; 6];

    /// Scan for nearby networks, appending up to `found`'s capacity.
    async fn scan(&self, found: &mut ScanList) -> Result<()>;
}

/// Settle time after switching into host mode, before the hosted network's
/// address block may be configured.
const HOST_MODE_SETTLE: Duration = Duration::from_millis(200);

/// Serializes mode changes against the driver's mode register.
///
/// Requesting the current mode is a no-op, which avoids redundant radio
/// resets when several callers converge on the same mode.
pub struct ModeController<'a, R: RadioControl> {
    radio: &'a R,
}

impl<'a, R: RadioControl> ModeController<'a, R> {
    #[must_use]
    pub const fn new(radio: &'a R) -> Self {
        Self { radio }
    }

    /// Move the radio into `mode` unless it is already there.
    pub async fn ensure(&self, mode: RadioMode) -> Result<()> {
        if self.radio.mode() == mode {
            return Ok(());
        }
        debug!("radio mode -> {:?}", mode);
        self.radio.set_mode(mode).await?;
        if mode == RadioMode::Host {
            Timer::after(HOST_MODE_SETTLE).await;
        }
        Ok(())
    }
}
