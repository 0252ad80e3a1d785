//! Bring up the WiFi manager on a Pico W.
//!
//! On first boot (no stored credentials) the device hosts an open network
//! and serves the configuration portal; once provisioned it reconnects on
//! its own after every reboot and falls back to the portal when the
//! network goes away.
//!
//! Build: `cargo xtask demo provision`
#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;

use defmt::unwrap;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;
use wifi_kit::{
    Cyw43Radio, Cyw43RadioStatic, FlashSettings, NameRegistration, PicoWifiManager, WifiManager,
    event_pump_task, name_service_task, portal_task, reconnect_worker_task,
};

static RADIO_STATIC: Cyw43RadioStatic = Cyw43Radio::new_static();
static NAMES: NameRegistration = NameRegistration::new();
static SETTINGS: StaticCell<FlashSettings> = StaticCell::new();
static MANAGER: StaticCell<PicoWifiManager> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let radio = unwrap!(
        Cyw43Radio::new(
            &RADIO_STATIC,
            p.PIN_23,
            p.PIN_25,
            p.PIO0,
            p.PIN_24,
            p.PIN_29,
            p.DMA_CH0,
            spawner,
        )
        .await
    );
    let settings = SETTINGS.init(FlashSettings::new(p.FLASH));
    let manager = MANAGER.init(WifiManager::new(radio, settings, &NAMES, "pico-wifi"));

    unwrap!(spawner.spawn(event_pump_task(manager, radio)));
    unwrap!(spawner.spawn(reconnect_worker_task(manager)));
    unwrap!(spawner.spawn(portal_task(manager, radio)));
    unwrap!(spawner.spawn(name_service_task(radio, &NAMES)));

    unwrap!(manager.start().await);

    loop {
        Timer::after(Duration::from_secs(30)).await;
        if manager.is_connected() {
            defmt::info!(
                "up as {} ({})",
                manager.device_name().as_str(),
                manager.mac_string().as_str()
            );
        } else if manager.in_setup_mode() {
            defmt::info!(
                "setup mode: join '{}' to configure",
                manager.device_name().as_str()
            );
        }
    }
}
