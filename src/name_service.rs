//! Name-service advertisement: answer multicast DNS queries for
//! `<device-name>.local` with the device's current address.
//!
//! The wire handling is pure so the host can test it; the serving loop runs
//! on hardware only. If the responder cannot initialize it parks itself
//! without affecting the rest of the state machine.

use core::cell::RefCell;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use portable_atomic::{AtomicU32, Ordering};

use crate::wifi_config::DeviceName;

/// mDNS port.
pub const NAME_SERVICE_PORT: u16 = 5353;

/// mDNS IPv4 multicast group.
pub const NAME_SERVICE_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Largest reply we ever build: header + two labels + root + one A record.
pub const MAX_NAME_REPLY: usize = 12 + 1 + 63 + 1 + 5 + 1 + 14;

/// Shared handle between the connection engine (which registers the name on
/// a successful connect) and the advertiser task (which answers queries for
/// whatever name is currently registered).
pub struct NameRegistration {
    hostname: Mutex<CriticalSectionRawMutex, RefCell<Option<DeviceName>>>,
    registrations: AtomicU32,
}

impl NameRegistration {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hostname: Mutex::new(RefCell::new(None)),
            registrations: AtomicU32::new(0),
        }
    }

    /// Register (or re-register) the advertised name.
    pub fn announce(&self, name: &DeviceName) {
        self.hostname.lock(|cell| {
            *cell.borrow_mut() = Some(name.clone());
        });
        self.registrations.fetch_add(1, Ordering::Relaxed);
        info!("advertising '{}.local'", name.as_str());
    }

    /// Stop advertising.
    pub fn clear(&self) {
        self.hostname.lock(|cell| {
            *cell.borrow_mut() = None;
        });
    }

    /// The currently advertised name, if any.
    #[must_use]
    pub fn current(&self) -> Option<DeviceName> {
        self.hostname.lock(|cell| cell.borrow().clone())
    }

    /// How many times a name has been registered since boot.
    #[must_use]
    pub fn registration_count(&self) -> u32 {
        self.registrations.load(Ordering::Relaxed)
    }
}

impl Default for NameRegistration {
    fn default() -> Self {
        Self::new()
    }
}

/// Does `frame` hold a query for `<hostname>.local` (A or ANY, class IN)?
#[must_use]
pub fn query_matches_host(frame: &[u8], hostname: &str) -> bool {
    if frame.len() < 12 || hostname.is_empty() {
        return false;
    }

    // Header: queries only (QR clear), at least one question.
    if frame[2] & 0x80 != 0 {
        return false;
    }
    if u16::from_be_bytes([frame[4], frame[5]]) < 1 {
        return false;
    }

    // First label must be the hostname.
    let name_len = hostname.len();
    let Some(&first) = frame.get(12) else {
        return false;
    };
    if first as usize != name_len {
        return false;
    }
    let Some(label) = frame.get(13..13 + name_len) else {
        return false;
    };
    if !label.eq_ignore_ascii_case(hostname.as_bytes()) {
        return false;
    }

    // Then "local", the root label, and the question footer.
    let mut idx = 13 + name_len;
    let Some(tail) = frame.get(idx..idx + 7) else {
        return false;
    };
    if tail[0] != 5 || !tail[1..6].eq_ignore_ascii_case(b"local") || tail[6] != 0 {
        return false;
    }
    idx += 7;
    let Some(footer) = frame.get(idx..idx + 4) else {
        return false;
    };
    let qtype = u16::from_be_bytes([footer[0], footer[1]]);
    let qclass = u16::from_be_bytes([footer[2], footer[3]]) & 0x7FFF;
    (qtype == 1 || qtype == 255) && qclass == 1
}

/// Build an authoritative A-record reply for `<hostname>.local`.
///
/// Returns the reply length, or `None` when `reply` is too small or the
/// hostname is not a legal label.
#[must_use]
pub fn build_host_reply(reply: &mut [u8], hostname: &str, address: Ipv4Addr) -> Option<usize> {
    let name_len = hostname.len();
    if name_len == 0 || name_len > 63 {
        return None;
    }
    let total = 12 + 1 + name_len + 7 + 14;
    let out = reply.get_mut(..total)?;
    out.fill(0);

    // Header: ID 0, authoritative response, one answer.
    out[2] = 0x84;
    out[7] = 0x01;

    let mut idx = 12;
    out[idx] = name_len as u8;
    out[idx + 1..idx + 1 + name_len].copy_from_slice(hostname.as_bytes());
    idx += 1 + name_len;
    out[idx] = 5;
    out[idx + 1..idx + 6].copy_from_slice(b"local");
    idx += 7; // root label already zero

    out[idx + 1] = 0x01; // TYPE A
    out[idx + 2] = 0x80; // cache-flush
    out[idx + 3] = 0x01; // CLASS IN
    out[idx + 7] = 120; // TTL
    out[idx + 9] = 0x04; // RDLENGTH
    out[idx + 10..idx + 14].copy_from_slice(&address.octets());

    Some(total)
}

#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
pub(crate) async fn serve_names(
    stack: embassy_net::Stack<'static>,
    names: &NameRegistration,
) -> ! {
    use embassy_net::udp::{PacketMetadata, UdpSocket};
    use embassy_time::Timer;

    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 512];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; 256];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    let joined = stack
        .join_multicast_group(embassy_net::IpAddress::Ipv4(NAME_SERVICE_GROUP))
        .is_ok();
    if !joined || socket.bind(NAME_SERVICE_PORT).is_err() {
        // Unrecoverable for this service only; park without taking the
        // state machine down.
        error!("name service failed to start; parking");
        loop {
            Timer::after_secs(3600).await;
        }
    }

    info!("name service listening");

    let mut frame = [0u8; 512];
    let mut reply = [0u8; MAX_NAME_REPLY];
    loop {
        let Ok((len, _remote)) = socket.recv_from(&mut frame).await else {
            continue;
        };
        let Some(hostname) = names.current() else {
            continue;
        };
        let Some(config) = stack.config_v4() else {
            continue;
        };
        if !query_matches_host(&frame[..len], hostname.as_str()) {
            continue;
        }
        let address = config.address.address();
        if let Some(reply_len) = build_host_reply(&mut reply, hostname.as_str(), address) {
            let group = (NAME_SERVICE_GROUP, NAME_SERVICE_PORT);
            if socket.send_to(&reply[..reply_len], group).await.is_ok() {
                debug!("answered name query");
            }
        }
    }
}
