//! Setup-mode session lifecycle: idempotence, the sweep, and background
//! reconnects after a disconnect.

use embassy_futures::block_on;
use embassy_time::Duration;
use portable_atomic::{AtomicU32, Ordering};
use wifi_kit::{
    ConnectionStatus, MemorySettings, NameRegistration, RadioControl, RadioEvent, RadioMode,
    RetryPolicy, SettingsStore, VirtualRadio, WifiCredentials, WifiManager, WifiObserver,
};

fn fast_policies(manager: &WifiManager<'_, VirtualRadio, MemorySettings>) {
    manager.set_boot_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));
    manager.set_disconnect_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)));
    manager.set_sweep_interval(Duration::from_millis(1));
}

fn home_credentials() -> WifiCredentials {
    WifiCredentials::new("Home", "secret123").unwrap()
}

#[test]
fn setup_entry_and_exit_are_idempotent() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    assert!(manager.in_setup_mode());
    block_on(manager.enter_setup_mode()).unwrap();

    // One hosted network, one session generation.
    assert_eq!(radio.start_host_count(), 1);
    assert_eq!(manager.session_generation(), 1);

    block_on(manager.exit_setup_mode()).unwrap();
    block_on(manager.exit_setup_mode()).unwrap();

    assert!(!manager.in_setup_mode());
    assert_eq!(radio.stop_host_count(), 1);
    assert_eq!(radio.mode(), RadioMode::Client);
}

#[test]
fn reentry_builds_a_fresh_session() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    block_on(manager.exit_setup_mode()).unwrap();
    block_on(manager.enter_setup_mode()).unwrap();

    assert_eq!(manager.session_generation(), 2);
    assert_eq!(radio.start_host_count(), 2);
}

#[test]
fn sweep_reconnects_and_tears_the_session_down() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    assert!(manager.in_setup_mode());

    // The stored network comes back into range before the next sweep.
    radio.make_reachable("Home");
    block_on(manager.setup_sweep());

    assert!(!manager.in_setup_mode());
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(radio.mode(), RadioMode::Client);
    assert!(!radio.host_up());
}

#[test]
fn failed_sweep_keeps_the_session_and_demotes_to_host() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    block_on(manager.setup_sweep());

    assert!(manager.in_setup_mode());
    assert!(radio.host_up());
    assert_eq!(radio.mode(), RadioMode::Host);
}

#[test]
fn sweep_honors_its_interval() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);
    manager.set_sweep_interval(Duration::from_secs(3600));

    block_on(manager.start()).unwrap();
    let joins_after_boot = radio.join_count();

    block_on(manager.setup_sweep());
    let joins_after_first_sweep = radio.join_count();
    assert_eq!(joins_after_first_sweep, joins_after_boot + 1);

    // Immediately again: not due yet.
    block_on(manager.setup_sweep());
    assert_eq!(radio.join_count(), joins_after_first_sweep);
}

#[test]
fn disconnect_enqueues_exactly_one_background_reconnect() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    radio.make_reachable("Home");
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    radio.drop_connection();
    block_on(manager.handle_radio_event(RadioEvent::Disconnected));
    assert!(manager.reconnect_outstanding());

    // A second disconnect while the first is outstanding adds nothing.
    block_on(manager.handle_radio_event(RadioEvent::Disconnected));

    assert!(block_on(manager.service_reconnect()));
    assert!(!block_on(manager.service_reconnect()));
    assert!(!manager.reconnect_outstanding());
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[test]
fn exhausted_background_reconnect_falls_back_to_setup() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    radio.make_reachable("Home");
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();

    // The network disappears for good.
    radio.clear_reachable();
    radio.drop_connection();
    block_on(manager.handle_radio_event(RadioEvent::Disconnected));
    assert!(block_on(manager.service_reconnect()));

    assert!(manager.in_setup_mode());
    assert!(radio.host_up());
}

#[test]
fn disabled_auto_fallback_never_enqueues_work() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store.save_credentials(&home_credentials()).unwrap();
    radio.make_reachable("Home");
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);
    manager.set_auto_setup_on_disconnect(false);

    block_on(manager.start()).unwrap();
    radio.drop_connection();
    block_on(manager.handle_radio_event(RadioEvent::Disconnected));

    assert!(!manager.reconnect_outstanding());
    assert!(!block_on(manager.service_reconnect()));
}

#[derive(Default)]
struct CountingObserver {
    connected: AtomicU32,
    disconnected: AtomicU32,
    reconnected: AtomicU32,
    entering_setup: AtomicU32,
    client_joined: AtomicU32,
}

impl WifiObserver for CountingObserver {
    fn on_connected(&self) {
        self.connected.fetch_add(1, Ordering::Relaxed);
    }
    fn on_disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::Relaxed);
    }
    fn on_reconnected(&self) {
        self.reconnected.fetch_add(1, Ordering::Relaxed);
    }
    fn on_entering_setup_mode(&self) {
        self.entering_setup.fetch_add(1, Ordering::Relaxed);
    }
    fn on_client_joined(&self) {
        self.client_joined.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn reconnected_notification_fires_once_per_outage() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let observer = CountingObserver::default();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);
    manager.set_observer(&observer);
    manager.set_auto_setup_on_disconnect(false);

    block_on(manager.handle_radio_event(RadioEvent::GotAddress));
    assert_eq!(observer.connected.load(Ordering::Relaxed), 1);
    assert_eq!(observer.reconnected.load(Ordering::Relaxed), 0);

    block_on(manager.handle_radio_event(RadioEvent::Disconnected));
    assert_eq!(observer.disconnected.load(Ordering::Relaxed), 1);

    block_on(manager.handle_radio_event(RadioEvent::GotAddress));
    assert_eq!(observer.connected.load(Ordering::Relaxed), 2);
    assert_eq!(observer.reconnected.load(Ordering::Relaxed), 1);

    // A repeat got-address without an outage is not a reconnect.
    block_on(manager.handle_radio_event(RadioEvent::GotAddress));
    assert_eq!(observer.reconnected.load(Ordering::Relaxed), 1);
}

#[test]
fn got_address_during_setup_tears_the_session_down() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let observer = CountingObserver::default();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);
    manager.set_observer(&observer);

    block_on(manager.start()).unwrap();
    assert!(manager.in_setup_mode());
    assert_eq!(observer.entering_setup.load(Ordering::Relaxed), 1);

    block_on(manager.handle_radio_event(RadioEvent::GotAddress));

    assert!(!manager.in_setup_mode());
    assert_eq!(radio.mode(), RadioMode::Client);
    assert!(!radio.host_up());
}

#[test]
fn client_joined_is_informational_only() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let observer = CountingObserver::default();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);
    manager.set_observer(&observer);

    block_on(manager.start()).unwrap();
    let generation = manager.session_generation();

    block_on(manager.handle_radio_event(RadioEvent::ClientJoined));

    assert_eq!(observer.client_joined.load(Ordering::Relaxed), 1);
    assert!(manager.in_setup_mode());
    assert_eq!(manager.session_generation(), generation);
}
