//! Boot-sequence behavior against the virtual radio.

use embassy_futures::block_on;
use embassy_time::Duration;
use wifi_kit::{
    ConnectionStatus, MemorySettings, NameRegistration, RadioControl, RadioMode, RetryPolicy,
    SettingsStore, VirtualRadio, WifiCredentials, WifiManager,
};

fn fast_policies(manager: &WifiManager<'_, VirtualRadio, MemorySettings>) {
    manager.set_boot_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));
    manager.set_disconnect_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)));
    manager.set_sweep_interval(Duration::from_millis(1));
}

#[test]
fn boot_without_credentials_enters_setup_and_never_joins() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();

    assert!(manager.in_setup_mode());
    assert_eq!(radio.join_count(), 0);
    assert!(radio.host_up());
    assert_eq!(manager.session_generation(), 1);
    assert_eq!(radio.mode(), RadioMode::Host);
}

#[test]
fn boot_with_reachable_credentials_connects_without_hosting() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store
        .save_credentials(&WifiCredentials::new("Home", "secret123").unwrap())
        .unwrap();
    radio.make_reachable("Home");
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();

    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert!(!manager.in_setup_mode());
    assert_eq!(radio.start_host_count(), 0);
    assert_eq!(names.registration_count(), 1);
    assert_eq!(manager.connected_ssid().unwrap().as_str(), "Home");
}

#[test]
fn boot_with_unreachable_credentials_falls_back_to_setup() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    store
        .save_credentials(&WifiCredentials::new("Home", "secret123").unwrap())
        .unwrap();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();

    assert!(manager.in_setup_mode());
    assert_eq!(radio.join_count(), 1);
    assert!(radio.host_up());
}

#[test]
fn blocking_wait_times_out_and_keeps_the_session() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    let connected = block_on(manager.wait_until_connected(Duration::from_millis(150)));

    assert!(!connected);
    assert!(manager.in_setup_mode());
    assert!(radio.host_up());
}

#[test]
fn blocking_wait_exits_setup_once_connected() {
    let radio = VirtualRadio::new();
    let store = MemorySettings::new();
    let names = NameRegistration::new();
    let manager = WifiManager::new(&radio, &store, &names, "unit-box");
    fast_policies(&manager);

    block_on(manager.start()).unwrap();
    assert!(manager.in_setup_mode());

    // A join starts succeeding while the caller is blocked.
    radio.make_reachable("Home");
    block_on(radio.begin_join(&WifiCredentials::new("Home", "secret123").unwrap())).unwrap();

    let connected = block_on(manager.wait_until_connected(Duration::from_secs(5)));

    assert!(connected);
    assert!(!manager.in_setup_mode());
    assert!(!radio.host_up());
    assert_eq!(radio.mode(), RadioMode::Client);
}
