//! Catch-all DNS responder for the captive portal.
//!
//! Answers every A query with the portal's own address so that clients of
//! the hosted network are steered toward the configuration page.

use core::net::Ipv4Addr;

/// Port the redirect responder listens on.
pub const DNS_REDIRECT_PORT: u16 = 53;

/// Maximum DNS frame we handle.
pub const MAX_DNS_FRAME: usize = 512;

/// Turn `query` into a response claiming `answer` for whatever was asked.
///
/// The query is echoed back with the response/authoritative flags set, the
/// answer count forced to one, and a single A record appended whose name is
/// a pointer to the question. Returns the response length, or `None` for
/// frames too short to be DNS or too long to extend.
#[must_use]
pub fn build_redirect_reply(
    query: &[u8],
    reply: &mut [u8; MAX_DNS_FRAME],
    answer: Ipv4Addr,
) -> Option<usize> {
    let len = query.len();
    if len < 12 || len + 16 > MAX_DNS_FRAME {
        return None;
    }

    reply[..len].copy_from_slice(query);

    // QR=1, AA=1, no error.
    reply[2] = 0x84;
    reply[3] = 0x00;

    // Answer count = 1.
    reply[6] = 0x00;
    reply[7] = 0x01;

    let mut idx = len;

    // NAME: pointer to the question name.
    reply[idx] = 0xC0;
    reply[idx + 1] = 0x0C;
    idx += 2;

    // TYPE A, CLASS IN.
    reply[idx..idx + 4].copy_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    idx += 4;

    // TTL: 60 seconds.
    reply[idx..idx + 4].copy_from_slice(&[0x00, 0x00, 0x00, 0x3C]);
    idx += 4;

    // RDLENGTH + RDATA.
    reply[idx] = 0x00;
    reply[idx + 1] = 0x04;
    idx += 2;
    reply[idx..idx + 4].copy_from_slice(&answer.octets());
    idx += 4;

    Some(idx)
}

/// Serve a single redirect query. Used by the portal service loop so one
/// loop iteration never blocks on more than one datagram.
#[cfg(all(feature = "wifi", feature = "arm", any(feature = "pico1", feature = "pico2")))]
pub(crate) async fn serve_redirect_once(
    socket: &mut embassy_net::udp::UdpSocket<'_>,
    answer: Ipv4Addr,
) {
    let mut frame = [0u8; MAX_DNS_FRAME];
    let Ok((len, remote)) = socket.recv_from(&mut frame).await else {
        return;
    };
    let mut reply = [0u8; MAX_DNS_FRAME];
    if let Some(reply_len) = build_redirect_reply(&frame[..len], &mut reply, answer) {
        if socket.send_to(&reply[..reply_len], remote).await.is_err() {
            warn!("redirect send failed");
        }
    }
}
