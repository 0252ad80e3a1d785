//! HTTP route table and provisioning endpoint behavior.

use embassy_futures::block_on;
use embassy_time::Duration;
use wifi_kit::{
    MemorySettings, NameRegistration, NetworkConfig, PortalAction, RadioControl, RadioMode,
    RetryPolicy, VirtualRadio, WifiManager, handle_request, parse_dotted_quad,
};

fn fast_policies(manager: &WifiManager<'_, VirtualRadio, MemorySettings>) {
    manager.set_boot_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));
    manager.set_disconnect_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)));
    manager.set_sweep_interval(Duration::from_millis(1));
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: 192.168.1.100\r\n\r\n")
}

fn post_setting(body: &str) -> String {
    format!(
        "POST /api/WiFiSetting HTTP/1.1\r\nHost: 192.168.1.100\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

struct Fixture {
    radio: VirtualRadio,
    store: MemorySettings,
    names: NameRegistration,
}

impl Fixture {
    fn new() -> Self {
        Self {
            radio: VirtualRadio::new(),
            store: MemorySettings::new(),
            names: NameRegistration::new(),
        }
    }

    fn manager(&self) -> WifiManager<'_, VirtualRadio, MemorySettings> {
        let manager = WifiManager::new(&self.radio, &self.store, &self.names, "unit-box");
        fast_policies(&manager);
        manager
    }
}

#[test]
fn root_serves_the_setup_page() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let (response, action) = block_on(handle_request(&manager, &get("/")));

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("text/html"));
    assert!(response.contains("WiFi Setup"));
    assert!(response.contains("./api/WiFiSetting"));
    assert_eq!(action, PortalAction::None);
}

#[test]
fn unknown_paths_are_captured_to_the_setup_page() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let (response, _) = block_on(handle_request(
        &manager,
        &get("/generate_204"), // a captive-portal probe
    ));

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("WiFi Setup"));
}

#[test]
fn info_reports_mac_and_device_name() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let (response, _) = block_on(handle_request(&manager, &get("/api/info")));

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("application/json"));
    assert!(response.contains(r#""MAC":"28:CD:C1:0A:1B:2C""#));
    assert!(response.contains(r#""DeviceName":"unit-box""#));
}

#[test]
fn network_list_serves_the_boot_scan() {
    let fixture = Fixture::new();
    fixture.radio.set_scan_results(&["HomeNet", "CafeNet"]);
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();

    let (response, _) = block_on(handle_request(&manager, &get("/api/WiFiList")));

    assert!(response.contains(r#""networks":["HomeNet","CafeNet"]"#));
}

#[test]
fn provisioning_success_responds_before_teardown() {
    let fixture = Fixture::new();
    fixture.radio.make_reachable("HomeNet");
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();
    assert!(manager.in_setup_mode());

    let body = r#"{"ssid":"HomeNet","password":"pw123","useStaticIP":false}"#;
    let (response, action) = block_on(handle_request(&manager, &post_setting(body)));

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#""ip":"192.168.1.23""#));
    assert!(response.contains(r#""ssid":"HomeNet""#));
    assert_eq!(action, PortalAction::TearDown);

    // The session is still alive until the server has flushed the
    // response; only then does it act on the teardown request.
    assert!(manager.in_setup_mode());
    block_on(manager.exit_setup_mode()).unwrap();
    assert_eq!(fixture.radio.mode(), RadioMode::Client);

    let stored = manager.stored_credentials().unwrap();
    assert_eq!(stored.ssid.as_str(), "HomeNet");
    assert_eq!(stored.password.as_str(), "pw123");
}

#[test]
fn provisioning_failure_keeps_the_session_alive() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();

    let body = r#"{"ssid":"Nowhere","password":"pw123","useStaticIP":false}"#;
    let (response, action) = block_on(handle_request(&manager, &post_setting(body)));

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#""status":"error""#));
    assert!(response.contains(r#""retry":true"#));
    assert_eq!(action, PortalAction::None);
    assert!(manager.in_setup_mode());
    assert!(fixture.radio.host_up());
    assert_eq!(fixture.radio.mode(), RadioMode::Host);
}

#[test]
fn malformed_json_gets_400_and_touches_nothing() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();
    let joins = fixture.radio.join_count();

    let (response, action) = block_on(handle_request(&manager, &post_setting("{not json")));

    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(response.contains("text/plain"));
    assert_eq!(action, PortalAction::None);
    assert!(manager.stored_credentials().is_none());
    assert_eq!(fixture.radio.join_count(), joins);
}

#[test]
fn missing_required_field_gets_400() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();

    let (response, _) = block_on(handle_request(
        &manager,
        &post_setting(r#"{"ssid":"HomeNet"}"#),
    ));

    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[test]
fn static_settings_are_stored_and_reset_to_defaults() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();

    let body = r#"{"ssid":"Nowhere","password":"pw","useStaticIP":true,
        "staticIP":"10.0.0.5","gateway":"10.0.0.1","subnet":"255.255.0.0",
        "primaryDNS":"1.1.1.1","secondaryDNS":"9.9.9.9"}"#;
    let (_, _) = block_on(handle_request(&manager, &post_setting(body)));

    let config = manager.network_config();
    assert!(config.use_static_ip);
    assert_eq!(config.static_ip, parse_dotted_quad("10.0.0.5").unwrap());
    assert_eq!(config.subnet, parse_dotted_quad("255.255.0.0").unwrap());

    // Dropping back to DHCP resets every address field to the defaults.
    let body = r#"{"ssid":"Nowhere","password":"pw","useStaticIP":false}"#;
    let (_, _) = block_on(handle_request(&manager, &post_setting(body)));

    assert_eq!(manager.network_config(), NetworkConfig::default());
    assert_eq!(
        manager.network_config().static_ip,
        parse_dotted_quad("192.168.1.200").unwrap()
    );
    assert_eq!(
        manager.network_config().gateway,
        parse_dotted_quad("192.168.1.1").unwrap()
    );
    assert_eq!(
        manager.network_config().subnet,
        parse_dotted_quad("255.255.255.0").unwrap()
    );
    assert_eq!(
        manager.network_config().primary_dns,
        parse_dotted_quad("8.8.8.8").unwrap()
    );
    assert_eq!(
        manager.network_config().secondary_dns,
        parse_dotted_quad("8.8.4.4").unwrap()
    );
}

#[test]
fn invalid_address_gets_400_and_prior_config_is_retained() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    block_on(manager.start()).unwrap();
    let before = manager.network_config();

    let body = r#"{"ssid":"Nowhere","password":"pw","useStaticIP":true,"staticIP":"999.1.2.3"}"#;
    let (response, _) = block_on(handle_request(&manager, &post_setting(body)));

    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    assert_eq!(manager.network_config(), before);
    assert!(manager.stored_credentials().is_none());
}
