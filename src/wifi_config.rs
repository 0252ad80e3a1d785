//! Configuration types shared across the connection manager.

use core::net::Ipv4Addr;
use core::str::FromStr;

use crate::{Error, Result};

/// WiFi network credentials (SSID and password).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WifiCredentials {
    /// Network SSID (up to 32 characters).
    pub ssid: heapless::String<32>,
    /// Network password (up to 64 characters).
    pub password: heapless::String<64>,
}

impl WifiCredentials {
    /// Build credentials from borrowed strings, rejecting over-long values.
    pub fn new(ssid: &str, password: &str) -> Result<Self> {
        let ssid = heapless::String::try_from(ssid).map_err(|()| Error::CredentialsTooLong)?;
        let password =
            heapless::String::try_from(password).map_err(|()| Error::CredentialsTooLong)?;
        Ok(Self { ssid, password })
    }
}

/// Addressing configuration for the upstream (client) connection.
///
/// Defaults to DHCP. The fallback static values are the documented defaults
/// and are what `useStaticIP=false` resets the fields to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    /// When `false`, the client interface uses DHCP and the address fields
    /// below are ignored.
    pub use_static_ip: bool,
    pub static_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub primary_dns: Ipv4Addr,
    pub secondary_dns: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            use_static_ip: false,
            static_ip: Ipv4Addr::new(192, 168, 1, 200),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            primary_dns: Ipv4Addr::new(8, 8, 8, 8),
            secondary_dns: Ipv4Addr::new(8, 8, 4, 4),
        }
    }
}

/// Address block for the locally hosted configuration network.
///
/// The device is its own gateway and DNS server while hosting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostNetwork {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

impl Default for HostNetwork {
    fn default() -> Self {
        let address = Ipv4Addr::new(192, 168, 1, 100);
        Self {
            address,
            gateway: address,
            subnet: Ipv4Addr::new(255, 255, 255, 0),
        }
    }
}

impl HostNetwork {
    /// CIDR prefix length of the hosted block.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        u32::from_be_bytes(self.subnet.octets()).count_ones() as u8
    }
}

/// Maximum length of the advertised device name (a DNS label).
pub const MAX_DEVICE_NAME: usize = 63;

/// Device name used as the hosted-network SSID and the advertised hostname.
pub type DeviceName = heapless::String<MAX_DEVICE_NAME>;

/// Name used when the caller never provides one, or provides an invalid one.
pub const DEFAULT_DEVICE_NAME: &str = "pico-wifi";

/// A device name must be usable as a hostname: 1-63 characters,
/// alphanumeric or hyphen.
#[must_use]
pub fn is_valid_device_name(name: &str) -> bool {
    (1..=MAX_DEVICE_NAME).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Validate `name` and return it as a [`DeviceName`].
pub fn device_name(name: &str) -> Result<DeviceName> {
    if !is_valid_device_name(name) {
        return Err(Error::InvalidDeviceName);
    }
    DeviceName::try_from(name).map_err(|()| Error::InvalidDeviceName)
}

/// Parse a dotted-quad address string such as `"192.168.1.200"`.
pub fn parse_dotted_quad(text: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(text.trim()).map_err(|_| Error::InvalidAddress)
}
