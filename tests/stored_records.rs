//! The persisted key=value record layout and its codec.

use wifi_kit::{
    MemorySettings, NetworkConfig, SettingsStore, WifiCredentials, decode_credentials,
    decode_network_config, encode_credentials, encode_network_config, parse_dotted_quad,
};

#[test]
fn credentials_record_layout_is_stable() {
    let credentials = WifiCredentials::new("Home", "secret123").unwrap();
    let text = encode_credentials(&credentials);
    assert_eq!(text.as_str(), "SSID=Home\nPassword=secret123\n");
}

#[test]
fn network_record_layout_is_stable() {
    let text = encode_network_config(&NetworkConfig::default());
    assert_eq!(
        text.as_str(),
        "useStaticIP=false\n\
         staticIP=192.168.1.200\n\
         gateway=192.168.1.1\n\
         subnet=255.255.255.0\n\
         primaryDNS=8.8.8.8\n\
         secondaryDNS=8.8.4.4\n"
    );
}

#[test]
fn credentials_survive_a_simulated_reboot() {
    let store = MemorySettings::new();
    let saved = WifiCredentials::new("Home", "secret123").unwrap();
    store.save_credentials(&saved).unwrap();

    // Nothing but the store survives the "reboot".
    let loaded = store.load_credentials().unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn credentials_round_trip_through_text() {
    let credentials = WifiCredentials::new("with spaces ok", "p=w+d").unwrap();
    let text = encode_credentials(&credentials);
    assert_eq!(decode_credentials(&text).unwrap(), credentials);
}

#[test]
fn credentials_without_ssid_are_absent() {
    assert!(decode_credentials("Password=secret\n").is_none());
    assert!(decode_credentials("").is_none());
    assert!(decode_credentials("SSID=\nPassword=x\n").is_none());
}

#[test]
fn unknown_keys_are_ignored() {
    let decoded = decode_credentials("SSID=Home\nPassword=pw\nChannel=6\n").unwrap();
    assert_eq!(decoded.ssid.as_str(), "Home");

    let config = decode_network_config("useStaticIP=true\nmtu=1400\n");
    assert!(config.use_static_ip);
}

#[test]
fn network_config_round_trips() {
    let config = NetworkConfig {
        use_static_ip: true,
        static_ip: parse_dotted_quad("10.1.2.3").unwrap(),
        gateway: parse_dotted_quad("10.1.2.1").unwrap(),
        subnet: parse_dotted_quad("255.255.0.0").unwrap(),
        primary_dns: parse_dotted_quad("1.1.1.1").unwrap(),
        secondary_dns: parse_dotted_quad("9.9.9.9").unwrap(),
    };
    let text = encode_network_config(&config);
    assert_eq!(decode_network_config(&text), config);
}

#[test]
fn damaged_address_lines_keep_their_defaults() {
    let config = decode_network_config("useStaticIP=true\nstaticIP=not-an-address\n");
    assert!(config.use_static_ip);
    assert_eq!(config.static_ip, NetworkConfig::default().static_ip);
}

#[test]
fn clearing_one_record_leaves_the_other() {
    let store = MemorySettings::new();
    store
        .save_credentials(&WifiCredentials::new("Home", "pw").unwrap())
        .unwrap();
    let config = NetworkConfig {
        use_static_ip: true,
        ..NetworkConfig::default()
    };
    store.save_network_config(&config).unwrap();

    store.clear_network_config().unwrap();

    assert!(store.load_network_config().unwrap().is_none());
    assert!(store.load_credentials().unwrap().is_some());
}
