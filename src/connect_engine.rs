//! Bounded-retry connection attempts against the radio driver.

use embassy_time::{Duration, Timer};

use crate::Result;
use crate::name_service::NameRegistration;
use crate::radio::{ConnectionStatus, RadioControl};
use crate::wifi_config::{DeviceName, NetworkConfig, WifiCredentials};

/// Retry budget for one attempt sequence. Mutable at runtime and injected
/// into every call so tests can run with millisecond delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of status polls before giving up. Zero fails immediately.
    pub attempts: u8,
    /// Delay between status polls.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Boot-time / provisioning policy: patient.
    pub const FOREGROUND: Self = Self {
        attempts: 20,
        delay: Duration::from_millis(500),
    };

    /// Background reconnect / portal sweep policy: give up quickly so the
    /// hosted network is not left unattended.
    pub const BACKGROUND: Self = Self {
        attempts: 6,
        delay: Duration::from_millis(500),
    };

    #[must_use]
    pub const fn new(attempts: u8, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Result of one attempt sequence. Exhausting the budget is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectOutcome {
    Connected,
    Failed,
}

/// Drive one bounded connect sequence.
///
/// Static addressing is applied before the join is issued - the other order
/// silently falls back to automatic addressing. Status is then polled at
/// `policy.delay` intervals, at most `policy.attempts` times.
///
/// On success the device name is registered with the name-service
/// advertiser. On failure the radio mode is left untouched; the caller
/// decides what happens next.
pub async fn attempt_connect<R: RadioControl>(
    radio: &R,
    names: &NameRegistration,
    hostname: &DeviceName,
    credentials: &WifiCredentials,
    config: &NetworkConfig,
    policy: RetryPolicy,
) -> Result<ConnectOutcome> {
    if config.use_static_ip {
        radio.configure_static(config).await?;
    }
    info!(
        "connecting to '{}' ({} x {} ms)",
        credentials.ssid.as_str(),
        policy.attempts,
        policy.delay.as_millis()
    );
    radio.begin_join(credentials).await?;

    for _ in 0..policy.attempts {
        Timer::after(policy.delay).await;
        if radio.status() == ConnectionStatus::Connected {
            info!("connected to '{}'", credentials.ssid.as_str());
            names.announce(hostname);
            return Ok(ConnectOutcome::Connected);
        }
    }

    warn!("giving up on '{}'", credentials.ssid.as_str());
    Ok(ConnectOutcome::Failed)
}
