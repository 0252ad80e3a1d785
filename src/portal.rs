//! HTTP routing and JSON bodies for the configuration portal.
//!
//! Everything here is hardware-independent: the portal service loop hands
//! over the raw request text and writes back whatever this module returns,
//! so the whole route table is exercised by host tests.

use core::fmt::Write as _;

use crate::manager::{ProvisionOutcome, ProvisioningUpdate, WifiManager};
use crate::radio::RadioControl;
use crate::settings_store::SettingsStore;
use crate::setup_page::SETUP_PAGE;
use crate::wifi_config::{NetworkConfig, WifiCredentials, parse_dotted_quad};
use crate::{Error, Result};

/// Response buffer; large enough for the embedded setup page.
pub type HttpBuffer = heapless::String<8192>;

/// What the portal server must do after flushing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    None,
    /// A provisioning attempt connected: tear the session down once the
    /// response is on the wire.
    TearDown,
}

#[derive(serde::Deserialize)]
struct WifiSettingRequest<'a> {
    ssid: &'a str,
    password: &'a str,
    #[serde(rename = "useStaticIP")]
    use_static_ip: Option<bool>,
    #[serde(rename = "staticIP")]
    static_ip: Option<&'a str>,
    gateway: Option<&'a str>,
    subnet: Option<&'a str>,
    #[serde(rename = "primaryDNS")]
    primary_dns: Option<&'a str>,
    #[serde(rename = "secondaryDNS")]
    secondary_dns: Option<&'a str>,
}

#[derive(serde::Serialize)]
struct ConnectedReply<'a> {
    message: &'a str,
    ip: &'a str,
    ssid: &'a str,
}

#[derive(serde::Serialize)]
struct RetryReply<'a> {
    message: &'a str,
    status: &'a str,
    retry: bool,
}

#[derive(serde::Serialize)]
struct InfoReply<'a> {
    #[serde(rename = "MAC")]
    mac: &'a str,
    #[serde(rename = "DeviceName")]
    device_name: &'a str,
}

#[derive(serde::Serialize)]
struct NetworkListReply<'a> {
    networks: &'a crate::radio::ScanList,
}

/// Route one HTTP request and build the response.
///
/// Unknown paths land on the setup page - captive-portal probes expect a
/// page, not a 404.
pub async fn handle_request<R: RadioControl, S: SettingsStore>(
    manager: &WifiManager<'_, R, S>,
    raw: &str,
) -> (HttpBuffer, PortalAction) {
    let request_line = raw.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);

    debug!("portal request: {} {}", method, path);

    match (method, path) {
        ("GET", "/api/info") => (info_reply(manager), PortalAction::None),
        ("GET", "/api/WiFiList") => (network_list_reply(manager), PortalAction::None),
        ("POST", "/api/WiFiSetting") => provisioning_reply(manager, raw).await,
        ("GET", "/favicon.ico") => (
            fixed_reply("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n"),
            PortalAction::None,
        ),
        _ => (page_reply(), PortalAction::None),
    }
}

/// Parse a provisioning body into a validated update.
///
/// Malformed JSON, a missing required field, an over-long credential, or a
/// bad address string all reject the submission with no state touched.
/// `useStaticIP=false` resets every address field to the documented
/// defaults; with `useStaticIP=true`, fields absent from the body keep
/// their current values.
pub fn parse_provisioning(body: &[u8], current: &NetworkConfig) -> Result<ProvisioningUpdate> {
    let (request, _) = serde_json_core::de::from_slice::<WifiSettingRequest<'_>>(body)
        .map_err(|_| Error::FormatError)?;
    if request.ssid.is_empty() {
        return Err(Error::FormatError);
    }
    let credentials = WifiCredentials::new(request.ssid, request.password)?;

    let config = if request.use_static_ip.unwrap_or(false) {
        let mut config = *current;
        config.use_static_ip = true;
        if let Some(text) = request.static_ip {
            config.static_ip = parse_dotted_quad(text)?;
        }
        if let Some(text) = request.gateway {
            config.gateway = parse_dotted_quad(text)?;
        }
        if let Some(text) = request.subnet {
            config.subnet = parse_dotted_quad(text)?;
        }
        if let Some(text) = request.primary_dns {
            config.primary_dns = parse_dotted_quad(text)?;
        }
        if let Some(text) = request.secondary_dns {
            config.secondary_dns = parse_dotted_quad(text)?;
        }
        config
    } else {
        NetworkConfig::default()
    };

    Ok(ProvisioningUpdate {
        credentials,
        config,
    })
}

async fn provisioning_reply<R: RadioControl, S: SettingsStore>(
    manager: &WifiManager<'_, R, S>,
    raw: &str,
) -> (HttpBuffer, PortalAction) {
    let body = raw
        .find("\r\n\r\n")
        .map_or("", |start| raw.get(start + 4..).unwrap_or(""));

    let update = match parse_provisioning(body.as_bytes(), &manager.network_config()) {
        Ok(update) => update,
        Err(_) => {
            warn!("rejecting malformed provisioning request");
            return (bad_request_reply(), PortalAction::None);
        }
    };

    let ssid = update.credentials.ssid.clone();
    match manager.apply_provisioning(update).await {
        ProvisionOutcome::Connected { address } => {
            let mut ip = heapless::String::<15>::new();
            let _ = write!(ip, "{}", address);
            let reply = ConnectedReply {
                message: "Connected",
                ip: ip.as_str(),
                ssid: ssid.as_str(),
            };
            (json_reply(&reply), PortalAction::TearDown)
        }
        ProvisionOutcome::Retry => {
            let reply = RetryReply {
                message: "Connection failed, please retry",
                status: "error",
                retry: true,
            };
            (json_reply(&reply), PortalAction::None)
        }
    }
}

fn info_reply<R: RadioControl, S: SettingsStore>(manager: &WifiManager<'_, R, S>) -> HttpBuffer {
    let mac = manager.mac_string();
    let name = manager.device_name();
    json_reply(&InfoReply {
        mac: mac.as_str(),
        device_name: name.as_str(),
    })
}

fn network_list_reply<R: RadioControl, S: SettingsStore>(
    manager: &WifiManager<'_, R, S>,
) -> HttpBuffer {
    let networks = manager.scanned_networks();
    json_reply(&NetworkListReply {
        networks: &networks,
    })
}

fn json_reply<T: serde::Serialize>(value: &T) -> HttpBuffer {
    let mut payload = [0u8; 1024];
    let len = serde_json_core::ser::to_slice(value, &mut payload).unwrap_or(0);
    let body = core::str::from_utf8(payload.get(..len).unwrap_or_default()).unwrap_or("{}");
    let mut page = HttpBuffer::new();
    let _ = write!(
        page,
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body
    );
    page
}

fn page_reply() -> HttpBuffer {
    let mut page = HttpBuffer::new();
    let _ = page.push_str(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html\r\n\
         Connection: close\r\n\
         \r\n",
    );
    let _ = page.push_str(SETUP_PAGE);
    page
}

fn bad_request_reply() -> HttpBuffer {
    fixed_reply(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Connection: close\r\n\
         \r\n\
         Failed to parse JSON",
    )
}

fn fixed_reply(content: &'static str) -> HttpBuffer {
    let mut page = HttpBuffer::new();
    let _ = page.push_str(content);
    page
}
