//! cyw43-backed radio driver for the Pico W.
//!
//! Owns the WiFi chip bring-up (power/SPI pins, firmware, runner task) and
//! the embassy network stack, and maps the [`RadioControl`] contract onto
//! them. Joins are issued by a small command task so `begin_join` returns
//! immediately and callers observe progress by polling status; a link
//! watcher turns stack state changes into [`RadioEvent`]s.
//!
//! The CYW43439 has no true concurrent AP+STA: in dual mode the hosted
//! network's configuration is kept and the join attempt runs on the same
//! interface, so portal clients may see a brief gap during an attempt.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::cell::RefCell;
use core::net::Ipv4Addr;

use cyw43::JoinOptions;
use cyw43_pio::{DEFAULT_CLOCK_DIVIDER, PioSpi};
use embassy_executor::Spawner;
use embassy_net::{Config, ConfigV4, Ipv4Cidr, Stack, StackResources, StaticConfigV4};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_rp::{Peri, bind_interrupts};
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Timer};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use static_cell::StaticCell;

use crate::radio::{ConnectionStatus, RadioControl, RadioEvent, RadioMode, ScanList};
use crate::wifi_config::{HostNetwork, NetworkConfig, WifiCredentials};
use crate::{Error, Result};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

const LINK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const HOST_CHANNEL: u8 = 1;

struct JoinCommand {
    credentials: WifiCredentials,
}

/// Resources needed by the radio device.
pub struct Cyw43RadioStatic {
    radio_cell: StaticCell<Cyw43Radio>,
}

/// A device abstraction over the cyw43 control handle and network stack.
pub struct Cyw43Radio {
    control: AsyncMutex<CriticalSectionRawMutex, cyw43::Control<'static>>,
    stack: Stack<'static>,
    mode: Mutex<CriticalSectionRawMutex, RefCell<RadioMode>>,
    status: AtomicU8,
    host_up: AtomicBool,
    mac: [u8; 6],
    joins: Channel<CriticalSectionRawMutex, JoinCommand, 1>,
    events: Channel<CriticalSectionRawMutex, RadioEvent, 4>,
    static_pending: Mutex<CriticalSectionRawMutex, RefCell<Option<StaticConfigV4>>>,
    joined_ssid: Mutex<CriticalSectionRawMutex, RefCell<Option<heapless::String<32>>>>,
}

impl Cyw43Radio {
    /// Create radio resources. Must live in a `static`.
    #[must_use]
    pub const fn new_static() -> Cyw43RadioStatic {
        Cyw43RadioStatic {
            radio_cell: StaticCell::new(),
        }
    }

    /// Initialize the WiFi chip and spawn its service tasks.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        radio_static: &'static Cyw43RadioStatic,
        pin_23: Peri<'static, PIN_23>,
        pin_25: Peri<'static, PIN_25>,
        pio0: Peri<'static, PIO0>,
        pin_24: Peri<'static, PIN_24>,
        pin_29: Peri<'static, PIN_29>,
        dma_ch0: Peri<'static, DMA_CH0>,
        spawner: Spawner,
    ) -> Result<&'static Self> {
        let fw = cyw43_firmware::CYW43_43439A0;
        let clm = cyw43_firmware::CYW43_43439A0_CLM;

        let pwr = Output::new(pin_23, Level::Low);
        let cs = Output::new(pin_25, Level::High);
        let mut pio = Pio::new(pio0, Irqs);
        let spi = PioSpi::new(
            &mut pio.common,
            pio.sm0,
            DEFAULT_CLOCK_DIVIDER,
            pio.irq0,
            cs,
            pin_24,
            pin_29,
            dma_ch0,
        );

        static STATE: StaticCell<cyw43::State> = StaticCell::new();
        let state = STATE.init(cyw43::State::new());
        let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
        spawner.spawn(cyw43_task(runner))?;

        control.init(clm).await;
        control
            .set_power_management(cyw43::PowerManagementMode::PowerSave)
            .await;
        let mac = control.address().await;

        let config = Config::dhcpv4(Default::default());
        let seed = 0x7c8f_3a2e_9d14_6b5a;
        static RESOURCES: StaticCell<StackResources<8>> = StaticCell::new();
        let (stack, net_runner) =
            embassy_net::new(net_device, config, RESOURCES.init(StackResources::new()), seed);
        spawner.spawn(net_task(net_runner))?;

        let radio = radio_static.radio_cell.init(Self {
            control: AsyncMutex::new(control),
            stack,
            mode: Mutex::new(RefCell::new(RadioMode::Client)),
            status: AtomicU8::new(ConnectionStatus::Disconnected as u8),
            host_up: AtomicBool::new(false),
            mac,
            joins: Channel::new(),
            events: Channel::new(),
            static_pending: Mutex::new(RefCell::new(None)),
            joined_ssid: Mutex::new(RefCell::new(None)),
        });
        spawner.spawn(join_task(radio))?;
        spawner.spawn(link_watch_task(radio))?;
        Ok(radio)
    }

    /// The embassy network stack (for the portal's sockets).
    #[must_use]
    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }

    /// Next radio event; consumed by the manager's event pump.
    pub async fn next_event(&self) -> RadioEvent {
        self.events.receive().await
    }

    /// Report a peer joining the hosted network (fed by DHCP activity; the
    /// chip itself does not surface AP associations).
    pub fn note_client_joined(&self) {
        let _ = self.events.try_send(RadioEvent::ClientJoined);
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    async fn close_host(&self) {
        if self.host_up.swap(false, Ordering::AcqRel) {
            let mut control = self.control.lock().await;
            control.close_ap().await;
        }
    }
}

impl RadioControl for Cyw43Radio {
    async fn set_mode(&self, mode: RadioMode) -> Result<()> {
        if self.mode() == mode {
            return Ok(());
        }
        if mode == RadioMode::Client {
            self.close_host().await;
        }
        self.mode.lock(|cell| *cell.borrow_mut() = mode);
        Ok(())
    }

    fn mode(&self) -> RadioMode {
        self.mode.lock(|cell| *cell.borrow())
    }

    async fn configure_static(&self, config: &NetworkConfig) -> Result<()> {
        let mut dns_servers = heapless::Vec::new();
        let _ = dns_servers.push(config.primary_dns);
        let _ = dns_servers.push(config.secondary_dns);
        let prefix = u32::from_be_bytes(config.subnet.octets()).count_ones() as u8;
        let static_config = StaticConfigV4 {
            address: Ipv4Cidr::new(config.static_ip, prefix),
            gateway: Some(config.gateway),
            dns_servers,
        };
        self.static_pending
            .lock(|cell| *cell.borrow_mut() = Some(static_config));
        Ok(())
    }

    async fn configure_host(&self, network: &HostNetwork) -> Result<()> {
        let mut dns_servers = heapless::Vec::new();
        let _ = dns_servers.push(network.address);
        self.stack.set_config_v4(ConfigV4::Static(StaticConfigV4 {
            address: Ipv4Cidr::new(network.address, network.prefix_len()),
            gateway: Some(network.gateway),
            dns_servers,
        }));
        Ok(())
    }

    async fn begin_join(&self, credentials: &WifiCredentials) -> Result<()> {
        self.set_status(ConnectionStatus::Connecting);
        self.joins
            .try_send(JoinCommand {
                credentials: credentials.clone(),
            })
            .map_err(|_| Error::Radio)
    }

    async fn start_host(&self, ssid: &str) -> Result<()> {
        let mut control = self.control.lock().await;
        control.start_ap_open(ssid, HOST_CHANNEL).await;
        self.host_up.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop_host(&self) -> Result<()> {
        self.close_host().await;
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        match self.status.load(Ordering::Acquire) {
            0 => ConnectionStatus::Disconnected,
            1 => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Connected,
        }
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        if self.status() != ConnectionStatus::Connected {
            return None;
        }
        self.stack
            .config_v4()
            .map(|config| config.address.address())
    }

    fn connected_ssid(&self) -> Option<heapless::String<32>> {
        if self.status() != ConnectionStatus::Connected {
            return None;
        }
        self.joined_ssid.lock(|cell| cell.borrow().clone())
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    async fn scan(&self, found: &mut ScanList) -> Result<()> {
        let mut control = self.control.lock().await;
        let mut scanner = control.scan(Default::default()).await;
        while let Some(bss) = scanner.next().await {
            let len = (bss.ssid_len as usize).min(bss.ssid.len());
            let Ok(ssid) = core::str::from_utf8(&bss.ssid[..len]) else {
                continue;
            };
            if ssid.is_empty() || found.iter().any(|known| known.as_str() == ssid) {
                continue;
            }
            let Ok(ssid) = heapless::String::try_from(ssid) else {
                continue;
            };
            if found.push(ssid).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Issues queued joins so `begin_join` never blocks its caller.
#[embassy_executor::task]
async fn join_task(radio: &'static Cyw43Radio) -> ! {
    loop {
        let JoinCommand { credentials } = radio.joins.receive().await;

        // Addressing must be settled before the join completes.
        let pending = radio.static_pending.lock(|cell| cell.borrow_mut().take());
        match pending {
            Some(static_config) => radio.stack.set_config_v4(ConfigV4::Static(static_config)),
            None => radio.stack.set_config_v4(ConfigV4::Dhcp(Default::default())),
        }

        let mut control = radio.control.lock().await;
        match control
            .join(
                credentials.ssid.as_str(),
                JoinOptions::new(credentials.password.as_bytes()),
            )
            .await
        {
            Ok(()) => {
                radio
                    .joined_ssid
                    .lock(|cell| *cell.borrow_mut() = Some(credentials.ssid.clone()));
                info!("join accepted, waiting for address");
            }
            Err(err) => {
                info!("join failed: {}", err.status);
                radio.set_status(ConnectionStatus::Disconnected);
            }
        }
    }
}

/// Polls the stack and turns link transitions into radio events.
#[embassy_executor::task]
async fn link_watch_task(radio: &'static Cyw43Radio) -> ! {
    let mut was_up = false;
    loop {
        Timer::after(LINK_POLL_INTERVAL).await;
        let joined = radio.joined_ssid.lock(|cell| cell.borrow().is_some());
        let up = joined && radio.stack.is_config_up();
        if up && !was_up {
            radio.set_status(ConnectionStatus::Connected);
            let _ = radio.events.try_send(RadioEvent::GotAddress);
        }
        if !up && was_up {
            radio.set_status(ConnectionStatus::Disconnected);
            radio.joined_ssid.lock(|cell| *cell.borrow_mut() = None);
            let _ = radio.events.try_send(RadioEvent::Disconnected);
        }
        was_up = up;
    }
}
