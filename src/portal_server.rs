//! Hardware service tasks tying the manager to the network stack.
//!
//! The portal task owns the setup-mode service loop: one iteration serves
//! at most one redirect query, one DHCP exchange, or one HTTP connection,
//! or runs the reconnection sweep - so the hosted network keeps answering
//! while the manager opportunistically retries the upstream connection.
//! Sockets are constructed when a session starts and dropped when it ends;
//! re-entry builds fresh ones.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::net::Ipv4Addr;

use embassy_futures::select::{Either4, select4};
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write as _;

use crate::cyw43_radio::Cyw43Radio;
use crate::dhcp_server::{DHCP_SERVER_PORT, LeaseTable, serve_dhcp_once};
use crate::dns_redirect::{DNS_REDIRECT_PORT, serve_redirect_once};
use crate::flash_settings::FlashSettings;
use crate::manager::WifiManager;
use crate::name_service::{NameRegistration, serve_names};
use crate::portal::{PortalAction, handle_request};

/// The manager as instantiated on the Pico W.
pub type PicoWifiManager = WifiManager<'static, Cyw43Radio, FlashSettings>;

/// Feeds radio events into the state machine.
#[embassy_executor::task]
pub async fn event_pump_task(manager: &'static PicoWifiManager, radio: &'static Cyw43Radio) -> ! {
    loop {
        let event = radio.next_event().await;
        manager.handle_radio_event(event).await;
    }
}

/// Supervised worker for background reconnects.
#[embassy_executor::task]
pub async fn reconnect_worker_task(manager: &'static PicoWifiManager) -> ! {
    manager.run_reconnect_worker().await
}

/// Answers name queries for the registered device name.
#[embassy_executor::task]
pub async fn name_service_task(
    radio: &'static Cyw43Radio,
    names: &'static NameRegistration,
) -> ! {
    serve_names(radio.stack(), names).await
}

/// The portal's dedicated execution context.
#[embassy_executor::task]
pub async fn portal_task(manager: &'static PicoWifiManager, radio: &'static Cyw43Radio) -> ! {
    loop {
        manager.wait_setup_entered().await;
        if !manager.in_setup_mode() {
            continue;
        }
        info!("portal session starting");
        serve_session(manager, radio).await;
        info!("portal session released its listeners");
    }
}

async fn serve_session(manager: &'static PicoWifiManager, radio: &'static Cyw43Radio) {
    let stack = radio.stack();
    let portal_ip = manager.host_network().address;

    let mut dns_rx_meta = [PacketMetadata::EMPTY; 4];
    let mut dns_rx = [0u8; 512];
    let mut dns_tx_meta = [PacketMetadata::EMPTY; 4];
    let mut dns_tx = [0u8; 512];
    let mut dns_socket = UdpSocket::new(
        stack,
        &mut dns_rx_meta,
        &mut dns_rx,
        &mut dns_tx_meta,
        &mut dns_tx,
    );
    let dns_bound = dns_socket.bind(DNS_REDIRECT_PORT).is_ok();
    if !dns_bound {
        error!("redirect responder failed to bind; portal continues without it");
    }

    let mut dhcp_rx_meta = [PacketMetadata::EMPTY; 4];
    let mut dhcp_rx = [0u8; 768];
    let mut dhcp_tx_meta = [PacketMetadata::EMPTY; 4];
    let mut dhcp_tx = [0u8; 768];
    let mut dhcp_socket = UdpSocket::new(
        stack,
        &mut dhcp_rx_meta,
        &mut dhcp_rx,
        &mut dhcp_tx_meta,
        &mut dhcp_tx,
    );
    let dhcp_bound = dhcp_socket.bind(DHCP_SERVER_PORT).is_ok();
    if !dhcp_bound {
        error!("DHCP service failed to bind; portal continues without it");
    }
    let mut leases = LeaseTable::new();

    let mut rx_buffer = [0u8; 2048];
    let mut tx_buffer = [0u8; 4096];
    let mut request = [0u8; 2048];

    let mut next_sweep = Instant::now() + manager.sweep_interval();

    while manager.in_setup_mode() {
        let mut http_socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        http_socket.set_timeout(Some(Duration::from_secs(10)));

        let host_network = manager.host_network();
        match select4(
            http_socket.accept(80),
            redirect_arm(&mut dns_socket, dns_bound, portal_ip),
            dhcp_arm(&mut dhcp_socket, dhcp_bound, &mut leases, &host_network),
            Timer::at(next_sweep),
        )
        .await
        {
            Either4::First(Ok(())) => {
                // Serve the accepted connection to completion; the sweep
                // never interrupts an in-flight exchange.
                handle_connection(manager, &mut http_socket, &mut request).await;
            }
            Either4::First(Err(_)) => {
                warn!("portal accept failed");
                Timer::after_millis(100).await;
            }
            Either4::Second(()) => {}
            Either4::Third(new_client) => {
                if new_client {
                    radio.note_client_joined();
                }
            }
            Either4::Fourth(()) => {
                manager.setup_sweep().await;
                next_sweep = Instant::now() + manager.sweep_interval();
            }
        }
    }
}

async fn redirect_arm(socket: &mut UdpSocket<'_>, bound: bool, answer: Ipv4Addr) {
    if bound {
        serve_redirect_once(socket, answer).await;
    } else {
        park_forever().await;
    }
}

async fn dhcp_arm(
    socket: &mut UdpSocket<'_>,
    bound: bool,
    leases: &mut LeaseTable,
    network: &crate::wifi_config::HostNetwork,
) -> bool {
    if bound {
        serve_dhcp_once(socket, leases, network).await
    } else {
        park_forever().await;
        false
    }
}

async fn park_forever() {
    loop {
        Timer::after_secs(3600).await;
    }
}

async fn handle_connection(
    manager: &'static PicoWifiManager,
    socket: &mut TcpSocket<'_>,
    request: &mut [u8],
) {
    let request_len = match socket.read(request).await {
        Ok(0) => {
            socket.close();
            return;
        }
        Ok(len) => len,
        Err(_) => {
            warn!("portal read failed");
            socket.close();
            return;
        }
    };

    let text = core::str::from_utf8(request.get(..request_len).unwrap_or_default()).unwrap_or("");
    let (response, action) = handle_request(manager, text).await;

    if socket.write_all(response.as_bytes()).await.is_err() {
        warn!("portal write failed");
    }
    let _ = socket.flush().await;
    socket.close();

    // Only after the response is flushed may a successful provisioning
    // attempt tear the session down.
    if action == PortalAction::TearDown && manager.exit_setup_mode().await.is_err() {
        warn!("session teardown after provisioning failed");
    }
}
