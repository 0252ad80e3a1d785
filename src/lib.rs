//! WiFi connection management for the Raspberry Pi Pico W.
//!
//! The crate decides, at any moment, whether the device should be a client
//! of an existing network or should fall back to hosting its own
//! configuration network, and it drives the transitions between those modes:
//! boot-time discovery, a captive configuration portal, live reconnection
//! that never drops an active configuration session, and background recovery
//! after a disconnect.
#![no_std]

// Must come first so the logging macros are visible to the rest of the crate.
mod fmt;

mod connect_engine;
mod dns_redirect;
mod error;
mod manager;
mod name_service;
mod observer;
mod portal;
mod radio;
mod settings_store;
mod setup_page;
mod wifi_config;

#[cfg(feature = "host")]
mod virtual_radio;

#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
mod cyw43_radio;
#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
mod dhcp_server;
#[cfg(all(feature = "wifi", any(feature = "pico1", feature = "pico2")))]
mod flash_settings;
#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
mod portal_server;

// Re-export commonly used items
pub use connect_engine::{ConnectOutcome, RetryPolicy, attempt_connect};
pub use dns_redirect::{DNS_REDIRECT_PORT, build_redirect_reply};
pub use error::{Error, Result};
pub use manager::{ProvisionOutcome, ProvisioningUpdate, WifiManager};
pub use name_service::{
    MAX_NAME_REPLY, NAME_SERVICE_GROUP, NAME_SERVICE_PORT, NameRegistration, build_host_reply,
    query_matches_host,
};
pub use observer::WifiObserver;
pub use portal::{HttpBuffer, PortalAction, handle_request, parse_provisioning};
pub use radio::{ConnectionStatus, ModeController, RadioControl, RadioEvent, RadioMode, ScanList};
pub use settings_store::{
    SettingsStore, decode_credentials, decode_network_config, encode_credentials,
    encode_network_config,
};
pub use wifi_config::{
    DEFAULT_DEVICE_NAME, DeviceName, HostNetwork, NetworkConfig, WifiCredentials, device_name,
    is_valid_device_name, parse_dotted_quad,
};

#[cfg(feature = "host")]
pub use settings_store::MemorySettings;
#[cfg(feature = "host")]
pub use virtual_radio::VirtualRadio;

#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
pub use cyw43_radio::{Cyw43Radio, Cyw43RadioStatic};
#[cfg(all(feature = "wifi", any(feature = "pico1", feature = "pico2")))]
pub use flash_settings::FlashSettings;
#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
pub use portal_server::{
    PicoWifiManager, event_pump_task, name_service_task, portal_task, reconnect_worker_task,
};
