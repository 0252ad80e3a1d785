//! Retry-budget behavior of the connection attempt engine.

use embassy_futures::block_on;
use embassy_time::Duration;
use wifi_kit::{
    ConnectOutcome, NameRegistration, NetworkConfig, RetryPolicy, VirtualRadio, WifiCredentials,
    attempt_connect, device_name,
};

fn credentials(ssid: &str) -> WifiCredentials {
    WifiCredentials::new(ssid, "pw").unwrap()
}

fn policy(attempts: u8) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1))
}

#[test]
fn unreachable_network_polls_exactly_the_budget() {
    let radio = VirtualRadio::new();
    let names = NameRegistration::new();
    let hostname = device_name("unit-box").unwrap();

    let outcome = block_on(attempt_connect(
        &radio,
        &names,
        &hostname,
        &credentials("Nowhere"),
        &NetworkConfig::default(),
        policy(5),
    ))
    .unwrap();

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(radio.status_poll_count(), 5);
    assert_eq!(radio.join_count(), 1);
    assert_eq!(names.registration_count(), 0);
}

#[test]
fn zero_attempts_fails_without_polling() {
    let radio = VirtualRadio::new();
    let names = NameRegistration::new();
    let hostname = device_name("unit-box").unwrap();

    let outcome = block_on(attempt_connect(
        &radio,
        &names,
        &hostname,
        &credentials("Nowhere"),
        &NetworkConfig::default(),
        policy(0),
    ))
    .unwrap();

    assert_eq!(outcome, ConnectOutcome::Failed);
    assert_eq!(radio.status_poll_count(), 0);
    assert_eq!(radio.join_count(), 1);
}

#[test]
fn static_addressing_is_applied_before_the_join() {
    let radio = VirtualRadio::new();
    let names = NameRegistration::new();
    let hostname = device_name("unit-box").unwrap();
    radio.make_reachable("Home");

    let config = NetworkConfig {
        use_static_ip: true,
        ..NetworkConfig::default()
    };
    let outcome = block_on(attempt_connect(
        &radio,
        &names,
        &hostname,
        &credentials("Home"),
        &config,
        policy(3),
    ))
    .unwrap();

    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(radio.join_had_static());
    assert_eq!(names.registration_count(), 1);
    assert_eq!(names.current().unwrap().as_str(), "unit-box");
}

#[test]
fn dhcp_join_carries_no_static_configuration() {
    let radio = VirtualRadio::new();
    let names = NameRegistration::new();
    let hostname = device_name("unit-box").unwrap();
    radio.make_reachable("Home");

    let outcome = block_on(attempt_connect(
        &radio,
        &names,
        &hostname,
        &credentials("Home"),
        &NetworkConfig::default(),
        policy(3),
    ))
    .unwrap();

    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(!radio.join_had_static());
}

#[test]
fn slow_network_connects_within_the_budget() {
    let radio = VirtualRadio::new();
    let names = NameRegistration::new();
    let hostname = device_name("unit-box").unwrap();
    radio.make_reachable("Home");
    radio.set_polls_until_connected(3);

    let outcome = block_on(attempt_connect(
        &radio,
        &names,
        &hostname,
        &credentials("Home"),
        &NetworkConfig::default(),
        policy(5),
    ))
    .unwrap();

    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(radio.status_poll_count(), 3);
}
