//! The connection state machine.
//!
//! [`WifiManager`] coordinates the credential store, the radio mode
//! controller, the connection attempt engine, and the setup-mode session.
//! It reacts to radio events (got-address, disconnected, client-joined)
//! and decides whether the device should be a client of an upstream
//! network or host its own configuration network.
//!
//! One instance is created by the application entry point and shared by
//! reference with every task that needs it; there is no global singleton.
//!
//! ```text
//! Idle -> Connecting -> { Connected, SetupMode }
//! Connected -> Disconnected -> ( AutoReconnecting | SetupMode )
//! SetupMode -> Connected        (on a successful live attempt)
//! ```

use core::cell::RefCell;
use core::fmt::Write as _;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::Result;
use crate::connect_engine::{ConnectOutcome, RetryPolicy, attempt_connect};
use crate::name_service::NameRegistration;
use crate::observer::WifiObserver;
use crate::radio::{
    ConnectionStatus, ModeController, RadioControl, RadioEvent, RadioMode, ScanList,
};
use crate::settings_store::SettingsStore;
use crate::wifi_config::{
    DEFAULT_DEVICE_NAME, DeviceName, HostNetwork, NetworkConfig, WifiCredentials, device_name,
};

/// Poll interval for the optional blocking wait.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default spacing between setup-mode reconnection sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(5000);

/// In-memory session flags. Reset at boot; written only by the state
/// machine (single writer), read by the portal and worker tasks.
#[derive(Default)]
struct SessionState {
    in_setup_mode: bool,
    ever_connected: bool,
    disconnected_since_last_connect: bool,
    last_sweep: Option<Instant>,
}

/// New credentials plus addressing, handed over by the provisioning
/// endpoint. Always rewrites both persisted records together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningUpdate {
    pub credentials: WifiCredentials,
    pub config: NetworkConfig,
}

/// What a provisioning submission achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Live attempt succeeded; the session should be torn down after the
    /// response has been flushed to the requester.
    Connected { address: Ipv4Addr },
    /// Attempt exhausted its budget; the session stays up and the
    /// requester may retry. Never reboots the device.
    Retry,
}

/// The top-level coordinator. Generic over the radio driver and the
/// settings store so the whole state machine runs unmodified against the
/// host-test fakes.
pub struct WifiManager<'a, R: RadioControl, S: SettingsStore> {
    radio: &'a R,
    modes: ModeController<'a, R>,
    store: &'a S,
    names: &'a NameRegistration,
    session: Mutex<CriticalSectionRawMutex, RefCell<SessionState>>,
    network_config: Mutex<CriticalSectionRawMutex, RefCell<NetworkConfig>>,
    host_network: Mutex<CriticalSectionRawMutex, RefCell<HostNetwork>>,
    name: Mutex<CriticalSectionRawMutex, RefCell<DeviceName>>,
    networks: Mutex<CriticalSectionRawMutex, RefCell<ScanList>>,
    observer: Mutex<CriticalSectionRawMutex, RefCell<Option<&'a dyn WifiObserver>>>,
    boot_policy: Mutex<CriticalSectionRawMutex, RefCell<RetryPolicy>>,
    disconnect_policy: Mutex<CriticalSectionRawMutex, RefCell<RetryPolicy>>,
    sweep_interval: Mutex<CriticalSectionRawMutex, RefCell<Duration>>,
    auto_setup_on_disconnect: AtomicBool,
    auto_reconnect_during_setup: AtomicBool,
    reconnect_pending: AtomicBool,
    reconnect_requests: Channel<CriticalSectionRawMutex, (), 1>,
    setup_entered: Signal<CriticalSectionRawMutex, ()>,
    session_generation: AtomicU32,
}

impl<'a, R: RadioControl, S: SettingsStore> WifiManager<'a, R, S> {
    /// Create a manager around the given driver, store, and name-service
    /// registration. An invalid `name` falls back to
    /// [`DEFAULT_DEVICE_NAME`] with a warning, never an error.
    pub fn new(radio: &'a R, store: &'a S, names: &'a NameRegistration, name: &str) -> Self {
        let name = match device_name(name) {
            Ok(name) => name,
            Err(_) => {
                warn!("invalid device name, using '{}'", DEFAULT_DEVICE_NAME);
                DeviceName::try_from(DEFAULT_DEVICE_NAME).unwrap_or_default()
            }
        };
        Self {
            radio,
            modes: ModeController::new(radio),
            store,
            names,
            session: Mutex::new(RefCell::new(SessionState::default())),
            network_config: Mutex::new(RefCell::new(NetworkConfig::default())),
            host_network: Mutex::new(RefCell::new(HostNetwork::default())),
            name: Mutex::new(RefCell::new(name)),
            networks: Mutex::new(RefCell::new(ScanList::new())),
            observer: Mutex::new(RefCell::new(None)),
            boot_policy: Mutex::new(RefCell::new(RetryPolicy::FOREGROUND)),
            disconnect_policy: Mutex::new(RefCell::new(RetryPolicy::BACKGROUND)),
            sweep_interval: Mutex::new(RefCell::new(DEFAULT_SWEEP_INTERVAL)),
            auto_setup_on_disconnect: AtomicBool::new(true),
            auto_reconnect_during_setup: AtomicBool::new(true),
            reconnect_pending: AtomicBool::new(false),
            reconnect_requests: Channel::new(),
            setup_entered: Signal::new(),
            session_generation: AtomicU32::new(0),
        }
    }

    // ========================================================================
    // Boot
    // ========================================================================

    /// Boot sequence: load settings, scan once, then either connect with
    /// the stored credentials or fall back to setup mode.
    ///
    /// Storage trouble is never fatal here; the machine proceeds with
    /// in-memory defaults and logs the degradation.
    pub async fn start(&self) -> Result<()> {
        match self.store.load_network_config() {
            Ok(Some(config)) => self.network_config.lock(|cell| *cell.borrow_mut() = config),
            Ok(None) => {}
            Err(_) => warn!("network settings unavailable, using defaults"),
        }

        let mut found = ScanList::new();
        match self.radio.scan(&mut found).await {
            Ok(()) => {
                info!("scan found {} networks", found.len());
                self.networks.lock(|cell| *cell.borrow_mut() = found);
            }
            Err(_) => warn!("boot-time scan failed"),
        }

        let credentials = match self.store.load_credentials() {
            Ok(credentials) => credentials,
            Err(_) => {
                warn!("stored credentials unavailable");
                None
            }
        };

        if let Some(credentials) = credentials {
            self.modes.ensure(RadioMode::Client).await?;
            let outcome = attempt_connect(
                self.radio,
                self.names,
                &self.device_name(),
                &credentials,
                &self.network_config(),
                self.boot_retry_policy(),
            )
            .await?;
            if outcome == ConnectOutcome::Connected {
                return Ok(());
            }
        }

        self.enter_setup_mode().await
    }

    /// [`start`](Self::start), then block until connected or `timeout`
    /// elapses (zero waits indefinitely). The setup session keeps serving
    /// in its own task while this polls, so configuration stays possible.
    pub async fn start_blocking(&self, timeout: Duration) -> Result<bool> {
        self.start().await?;
        if self.radio.status() == ConnectionStatus::Connected {
            return Ok(true);
        }
        Ok(self.wait_until_connected(timeout).await)
    }

    /// Poll the connection status until connected or `timeout` elapses
    /// (zero = no timeout). On success an active setup session is torn
    /// down and the radio returns to client-only mode.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let deadline = (timeout.as_ticks() != 0).then(|| Instant::now() + timeout);
        while self.radio.status() != ConnectionStatus::Connected {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }
            Timer::after(STATUS_POLL_INTERVAL).await;
        }
        if self.in_setup_mode() && self.exit_setup_mode().await.is_err() {
            warn!("session teardown after blocking wait failed");
        }
        true
    }

    // ========================================================================
    // Radio events
    // ========================================================================

    /// Handle one radio event. Runs on the event context: the disconnect
    /// path never blocks (recovery is enqueued to the worker), and
    /// observer handlers are expected to return promptly.
    pub async fn handle_radio_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::GotAddress => {
                let reconnected = self.session.lock(|cell| {
                    let mut session = cell.borrow_mut();
                    session.ever_connected = true;
                    core::mem::take(&mut session.disconnected_since_last_connect)
                });
                self.notify(|observer| observer.on_connected());
                if reconnected {
                    info!("upstream connection restored");
                    self.notify(|observer| observer.on_reconnected());
                }
                if self.in_setup_mode() && self.exit_setup_mode().await.is_err() {
                    warn!("session teardown after got-address failed");
                }
            }
            RadioEvent::Disconnected => {
                info!("upstream connection lost");
                self.notify(|observer| observer.on_disconnected());
                self.session.lock(|cell| {
                    let mut session = cell.borrow_mut();
                    if session.ever_connected {
                        session.disconnected_since_last_connect = true;
                    }
                });
                if self.auto_setup_on_disconnect.load(Ordering::Acquire)
                    && !self.reconnect_pending.swap(true, Ordering::AcqRel)
                    && self.reconnect_requests.try_send(()).is_err()
                {
                    self.reconnect_pending.store(false, Ordering::Release);
                }
            }
            RadioEvent::ClientJoined => {
                debug!("client joined the hosted network");
                self.notify(|observer| observer.on_client_joined());
            }
        }
    }

    /// Whether a background reconnect is enqueued or running.
    #[must_use]
    pub fn reconnect_outstanding(&self) -> bool {
        self.reconnect_pending.load(Ordering::Acquire)
    }

    /// Supervised worker loop for background reconnects. Spawned once; at
    /// most one request is ever queued (see
    /// [`handle_radio_event`](Self::handle_radio_event)).
    pub async fn run_reconnect_worker(&self) -> ! {
        loop {
            self.reconnect_requests.receive().await;
            self.background_reconnect().await;
        }
    }

    /// Run at most one queued background reconnect to completion. Returns
    /// whether one was queued. Host tests drive the worker with this.
    pub async fn service_reconnect(&self) -> bool {
        if self.reconnect_requests.try_receive().is_err() {
            return false;
        }
        self.background_reconnect().await;
        true
    }

    async fn background_reconnect(&self) {
        let Some(credentials) = self.stored_credentials() else {
            if self.enter_setup_mode().await.is_err() {
                warn!("setup-mode entry after disconnect failed");
            }
            self.reconnect_pending.store(false, Ordering::Release);
            return;
        };

        let mode = if self.in_setup_mode() {
            RadioMode::ClientHost
        } else {
            RadioMode::Client
        };
        let result: Result<ConnectOutcome> = async {
            self.modes.ensure(mode).await?;
            attempt_connect(
                self.radio,
                self.names,
                &self.device_name(),
                &credentials,
                &self.network_config(),
                self.disconnect_retry_policy(),
            )
            .await
        }
        .await;

        match result {
            Ok(ConnectOutcome::Connected) => info!("background reconnect succeeded"),
            Ok(ConnectOutcome::Failed) | Err(_) => {
                if self.in_setup_mode() {
                    // Dual mode is only held while an attempt is in flight.
                    if self.modes.ensure(RadioMode::Host).await.is_err() {
                        warn!("could not demote radio after failed reconnect");
                    }
                } else if self.enter_setup_mode().await.is_err() {
                    warn!("setup-mode entry after failed reconnect failed");
                }
            }
        }
        self.reconnect_pending.store(false, Ordering::Release);
    }

    // ========================================================================
    // Setup-mode session
    // ========================================================================

    /// Start the hosted configuration session. Idempotent: a second call
    /// while the session is up changes nothing.
    pub async fn enter_setup_mode(&self) -> Result<()> {
        let already = self.session.lock(|cell| {
            let mut session = cell.borrow_mut();
            if session.in_setup_mode {
                true
            } else {
                session.in_setup_mode = true;
                session.last_sweep = None;
                false
            }
        });
        if already {
            return Ok(());
        }

        info!("entering setup mode");
        self.notify(|observer| observer.on_entering_setup_mode());

        if let Err(err) = self.bring_up_host().await {
            self.session.lock(|cell| cell.borrow_mut().in_setup_mode = false);
            return Err(err);
        }

        self.session_generation.fetch_add(1, Ordering::AcqRel);
        self.setup_entered.signal(());
        Ok(())
    }

    async fn bring_up_host(&self) -> Result<()> {
        self.modes.ensure(RadioMode::Host).await?;
        let network = self.host_network();
        self.radio.configure_host(&network).await?;
        let name = self.device_name();
        self.radio.start_host(name.as_str()).await?;
        self.names.announce(&name);
        Ok(())
    }

    /// Stop the hosted session and return to client-only mode. Idempotent.
    /// The portal task observes the cleared flag, releases its listener
    /// and redirect responder, and exits its loop.
    pub async fn exit_setup_mode(&self) -> Result<()> {
        let was_active = self.session.lock(|cell| {
            let mut session = cell.borrow_mut();
            core::mem::replace(&mut session.in_setup_mode, false)
        });
        if !was_active {
            return Ok(());
        }
        info!("leaving setup mode");
        self.radio.stop_host().await?;
        self.modes.ensure(RadioMode::Client).await
    }

    #[must_use]
    pub fn in_setup_mode(&self) -> bool {
        self.session.lock(|cell| cell.borrow().in_setup_mode)
    }

    /// Counts setup-mode entries; one hosted network and one listener per
    /// generation.
    #[must_use]
    pub fn session_generation(&self) -> u32 {
        self.session_generation.load(Ordering::Acquire)
    }

    /// Wake the portal task for a fresh session.
    pub async fn wait_setup_entered(&self) {
        self.setup_entered.wait().await;
    }

    /// Opportunistic reconnection sweep, called from the portal loop. At
    /// most one attempt per sweep interval; each attempt runs in dual mode
    /// with the short background budget so the hosted network is back to
    /// answering quickly.
    pub async fn setup_sweep(&self) {
        if !self.in_setup_mode() || !self.auto_reconnect_during_setup.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        let interval = self.sweep_interval();
        let due = self.session.lock(|cell| {
            let mut session = cell.borrow_mut();
            match session.last_sweep {
                Some(last) if now - last < interval => false,
                _ => {
                    session.last_sweep = Some(now);
                    true
                }
            }
        });
        if !due || self.radio.status() == ConnectionStatus::Connected {
            return;
        }
        let Some(credentials) = self.stored_credentials() else {
            return;
        };

        info!("sweep: retrying stored network");
        let result: Result<ConnectOutcome> = async {
            self.modes.ensure(RadioMode::ClientHost).await?;
            attempt_connect(
                self.radio,
                self.names,
                &self.device_name(),
                &credentials,
                &self.network_config(),
                self.disconnect_retry_policy(),
            )
            .await
        }
        .await;

        match result {
            Ok(ConnectOutcome::Connected) => {
                if self.exit_setup_mode().await.is_err() {
                    warn!("sweep teardown failed");
                }
            }
            Ok(ConnectOutcome::Failed) | Err(_) => {
                // Dual mode is only held while an attempt is in flight.
                if self.modes.ensure(RadioMode::Host).await.is_err() {
                    warn!("could not demote radio after sweep");
                }
            }
        }
    }

    /// Persist a provisioning submission and run a live attempt without
    /// dropping the session. The caller responds to the requester first
    /// and only then, on [`ProvisionOutcome::Connected`], tears the
    /// session down - an in-flight response must not be corrupted.
    pub async fn apply_provisioning(&self, update: ProvisioningUpdate) -> ProvisionOutcome {
        let ProvisioningUpdate {
            credentials,
            config,
        } = update;

        if self.store.save_credentials(&credentials).is_err() {
            warn!("failed to persist credentials; continuing in memory");
        }
        if self.store.save_network_config(&config).is_err() {
            warn!("failed to persist network settings; continuing in memory");
        }
        self.network_config.lock(|cell| *cell.borrow_mut() = config);

        let mode = if self.in_setup_mode() {
            RadioMode::ClientHost
        } else {
            RadioMode::Client
        };
        let result: Result<ConnectOutcome> = async {
            self.modes.ensure(mode).await?;
            attempt_connect(
                self.radio,
                self.names,
                &self.device_name(),
                &credentials,
                &config,
                self.boot_retry_policy(),
            )
            .await
        }
        .await;

        match result {
            Ok(ConnectOutcome::Connected) => ProvisionOutcome::Connected {
                address: self.radio.local_address().unwrap_or(Ipv4Addr::UNSPECIFIED),
            },
            Ok(ConnectOutcome::Failed) | Err(_) => {
                if self.in_setup_mode() && self.modes.ensure(RadioMode::Host).await.is_err() {
                    warn!("could not demote radio after failed attempt");
                }
                ProvisionOutcome::Retry
            }
        }
    }

    // ========================================================================
    // Configuration and introspection
    // ========================================================================

    pub fn set_observer(&self, observer: &'a dyn WifiObserver) {
        self.observer.lock(|cell| *cell.borrow_mut() = Some(observer));
    }

    fn notify(&self, f: impl FnOnce(&dyn WifiObserver)) {
        let observer = self.observer.lock(|cell| *cell.borrow());
        if let Some(observer) = observer {
            f(observer);
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.radio.status()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.radio.status() == ConnectionStatus::Connected
    }

    #[must_use]
    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.radio.local_address()
    }

    #[must_use]
    pub fn connected_ssid(&self) -> Option<heapless::String<32>> {
        self.radio.connected_ssid()
    }

    /// MAC address formatted as `AA:BB:CC:DD:EE:FF`.
    #[must_use]
    pub fn mac_string(&self) -> heapless::String<17> {
        let mac = self.radio.mac_address();
        let mut out = heapless::String::new();
        let _ = write!(
            out,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        );
        out
    }

    #[must_use]
    pub fn device_name(&self) -> DeviceName {
        self.name.lock(|cell| cell.borrow().clone())
    }

    /// Change the device name. An invalid name is rejected and the
    /// previous name retained.
    pub fn set_device_name(&self, name: &str) -> Result<()> {
        let name = device_name(name)?;
        self.name.lock(|cell| *cell.borrow_mut() = name);
        Ok(())
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        self.network_config.lock(|cell| *cell.borrow())
    }

    #[must_use]
    pub fn host_network(&self) -> HostNetwork {
        self.host_network.lock(|cell| *cell.borrow())
    }

    /// Reconfigure the hosted network's address block. Takes effect on the
    /// next setup-mode entry.
    pub fn set_host_network(&self, network: HostNetwork) {
        self.host_network.lock(|cell| *cell.borrow_mut() = network);
    }

    #[must_use]
    pub fn stored_credentials(&self) -> Option<WifiCredentials> {
        self.store.load_credentials().ok().flatten()
    }

    /// Snapshot of the boot-time scan, as served by the list endpoint.
    #[must_use]
    pub fn scanned_networks(&self) -> ScanList {
        self.networks.lock(|cell| cell.borrow().clone())
    }

    #[must_use]
    pub fn boot_retry_policy(&self) -> RetryPolicy {
        self.boot_policy.lock(|cell| *cell.borrow())
    }

    pub fn set_boot_retry_policy(&self, policy: RetryPolicy) {
        self.boot_policy.lock(|cell| *cell.borrow_mut() = policy);
    }

    #[must_use]
    pub fn disconnect_retry_policy(&self) -> RetryPolicy {
        self.disconnect_policy.lock(|cell| *cell.borrow())
    }

    /// Retry budget used after a disconnect and by the portal sweep.
    pub fn set_disconnect_retry_policy(&self, policy: RetryPolicy) {
        self.disconnect_policy.lock(|cell| *cell.borrow_mut() = policy);
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval.lock(|cell| *cell.borrow())
    }

    pub fn set_sweep_interval(&self, interval: Duration) {
        self.sweep_interval.lock(|cell| *cell.borrow_mut() = interval);
    }

    pub fn set_auto_setup_on_disconnect(&self, enable: bool) {
        self.auto_setup_on_disconnect.store(enable, Ordering::Release);
    }

    #[must_use]
    pub fn auto_setup_on_disconnect(&self) -> bool {
        self.auto_setup_on_disconnect.load(Ordering::Acquire)
    }

    pub fn set_auto_reconnect_during_setup(&self, enable: bool) {
        self.auto_reconnect_during_setup.store(enable, Ordering::Release);
    }

    #[must_use]
    pub fn auto_reconnect_during_setup(&self) -> bool {
        self.auto_reconnect_during_setup.load(Ordering::Acquire)
    }

    /// Remove the stored credentials.
    pub fn clear_wifi_settings(&self) -> Result<()> {
        self.store.clear_credentials()
    }

    /// Remove the stored network settings and return the in-memory
    /// configuration to its defaults.
    pub fn clear_network_settings(&self) -> Result<()> {
        self.store.clear_network_config()?;
        self.network_config
            .lock(|cell| *cell.borrow_mut() = NetworkConfig::default());
        Ok(())
    }

    /// Remove both persisted records.
    pub fn clear_all_settings(&self) -> Result<()> {
        self.clear_wifi_settings()?;
        self.clear_network_settings()
    }
}
