//! DHCP lease service for the hosted configuration network.
//!
//! Just enough of the protocol to hand portal clients an address next to
//! ours: OFFER on DISCOVER, ACK on REQUEST, forget on RELEASE. Short
//! leases keep clients refreshing while the session lasts.

use core::net::Ipv4Addr;

use embassy_net::udp::UdpSocket;
use embassy_time::{Duration, Instant};

use crate::wifi_config::HostNetwork;

pub(crate) const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const LEASE_SECONDS: u32 = 120;
const POOL_SIZE: u32 = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Discover,
    Request,
    Release,
}

struct Request {
    kind: MessageKind,
    transaction_id: u32,
    flags: u16,
    client_mac: [u8; 6],
    requested_ip: Option<Ipv4Addr>,
}

struct Lease {
    mac: [u8; 6],
    ip: Ipv4Addr,
    expires: Instant,
}

/// Active leases; kept by the portal task for the life of one session.
pub(crate) struct LeaseTable {
    leases: heapless::Vec<Lease, 8>,
}

impl LeaseTable {
    pub(crate) const fn new() -> Self {
        Self {
            leases: heapless::Vec::new(),
        }
    }

    fn assign(&mut self, mac: [u8; 6], requested: Option<Ipv4Addr>, network: &HostNetwork) -> Option<(Ipv4Addr, bool)> {
        let now = Instant::now();
        self.leases.retain(|lease| lease.expires > now);
        let expires = now + Duration::from_secs(LEASE_SECONDS as u64);

        if let Some(existing) = self.leases.iter_mut().find(|lease| lease.mac == mac) {
            existing.expires = expires;
            return Some((existing.ip, false));
        }

        let base = u32::from_be_bytes(network.address.octets());
        let wanted = requested.map(|ip| u32::from_be_bytes(ip.octets()));
        let free = |leases: &heapless::Vec<Lease, 8>, candidate: Ipv4Addr| {
            leases.iter().all(|lease| lease.ip != candidate)
        };

        let ip = (1..=POOL_SIZE)
            .map(|offset| Ipv4Addr::from((base + offset).to_be_bytes()))
            .find(|candidate| {
                free(&self.leases, *candidate)
                    && wanted.is_none_or(|w| w == u32::from_be_bytes(candidate.octets()))
            })
            .or_else(|| {
                (1..=POOL_SIZE)
                    .map(|offset| Ipv4Addr::from((base + offset).to_be_bytes()))
                    .find(|candidate| free(&self.leases, *candidate))
            })?;

        self.leases.push(Lease { mac, ip, expires }).ok()?;
        Some((ip, true))
    }

    fn release(&mut self, mac: [u8; 6]) {
        self.leases.retain(|lease| lease.mac != mac);
    }
}

fn parse_request(frame: &[u8]) -> Option<Request> {
    if frame.len() < 240 || frame[0] != 1 {
        return None; // BOOTREQUEST only
    }
    if frame[1] != 1 || frame[2] != 6 {
        return None; // Ethernet clients with 6-byte MACs only
    }
    if frame[236..240] != MAGIC_COOKIE {
        return None;
    }

    let transaction_id = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let flags = u16::from_be_bytes([frame[10], frame[11]]);
    let mut client_mac = [0u8; 6];
    client_mac.copy_from_slice(&frame[28..34]);

    let mut kind = None;
    let mut requested_ip = None;
    let mut idx = 240;
    while idx < frame.len() {
        let option = frame[idx];
        idx += 1;
        match option {
            0 => continue,
            255 => break,
            _ => {
                let len = *frame.get(idx)? as usize;
                idx += 1;
                let data = frame.get(idx..idx + len)?;
                match option {
                    50 if len == 4 => {
                        requested_ip = Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]));
                    }
                    53 if len == 1 => {
                        kind = match data[0] {
                            1 => Some(MessageKind::Discover),
                            3 => Some(MessageKind::Request),
                            7 => Some(MessageKind::Release),
                            _ => None,
                        };
                    }
                    _ => {}
                }
                idx += len;
            }
        }
    }

    Some(Request {
        kind: kind?,
        transaction_id,
        flags,
        client_mac,
        requested_ip,
    })
}

fn push_option(buffer: &mut [u8], idx: usize, code: u8, payload: &[u8]) -> Option<usize> {
    let end = idx + 2 + payload.len();
    let slot = buffer.get_mut(idx..end)?;
    slot[0] = code;
    slot[1] = payload.len() as u8;
    slot[2..].copy_from_slice(payload);
    Some(end)
}

fn build_reply(
    buffer: &mut [u8; 512],
    request: &Request,
    offered: Ipv4Addr,
    network: &HostNetwork,
    ack: bool,
) -> Option<usize> {
    buffer.fill(0);
    buffer[0] = 2; // BOOTREPLY
    buffer[1] = 1;
    buffer[2] = 6;
    buffer[4..8].copy_from_slice(&request.transaction_id.to_be_bytes());
    buffer[10..12].copy_from_slice(&request.flags.to_be_bytes());
    buffer[16..20].copy_from_slice(&offered.octets());
    buffer[20..24].copy_from_slice(&network.address.octets());
    buffer[28..34].copy_from_slice(&request.client_mac);
    buffer[236..240].copy_from_slice(&MAGIC_COOKIE);

    let server = network.address.octets();
    let mut idx = 240;
    idx = push_option(buffer, idx, 53, &[if ack { 5 } else { 2 }])?;
    idx = push_option(buffer, idx, 54, &server)?;
    idx = push_option(buffer, idx, 51, &LEASE_SECONDS.to_be_bytes())?;
    idx = push_option(buffer, idx, 1, &network.subnet.octets())?;
    idx = push_option(buffer, idx, 3, &server)?;
    idx = push_option(buffer, idx, 6, &server)?; // DNS: the redirect responder
    *buffer.get_mut(idx)? = 255;
    Some(idx + 1)
}

/// Serve one DHCP request. Returns `true` when a new client took its first
/// lease, which the portal reports as a client-joined event.
pub(crate) async fn serve_dhcp_once(
    socket: &mut UdpSocket<'_>,
    leases: &mut LeaseTable,
    network: &HostNetwork,
) -> bool {
    let mut frame = [0u8; 512];
    let Ok((len, _remote)) = socket.recv_from(&mut frame).await else {
        return false;
    };
    let Some(request) = parse_request(&frame[..len]) else {
        return false;
    };

    match request.kind {
        MessageKind::Release => {
            leases.release(request.client_mac);
            false
        }
        MessageKind::Discover | MessageKind::Request => {
            let Some((offered, fresh)) =
                leases.assign(request.client_mac, request.requested_ip, network)
            else {
                return false;
            };
            let ack = request.kind == MessageKind::Request;
            let mut reply = [0u8; 512];
            let Some(reply_len) = build_reply(&mut reply, &request, offered, network, ack) else {
                return false;
            };
            let destination = (Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT);
            if socket.send_to(&reply[..reply_len], destination).await.is_err() {
                warn!("DHCP send failed");
                return false;
            }
            debug!("DHCP {} a lease", if ack { "acked" } else { "offered" });
            ack && fresh
        }
    }
}
