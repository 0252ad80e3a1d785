//! Notification dispatch for connection lifecycle events.

/// Receives connection lifecycle notifications from the state machine.
///
/// There is a small closed set of notification kinds, one method per kind,
/// each defaulting to a no-op. At most one observer is registered.
///
/// Handlers run on the event context and must not block: do the minimum
/// (set a flag, signal a task) and return.
pub trait WifiObserver: Sync {
    /// The upstream connection came up (got-address).
    fn on_connected(&self) {}

    /// The upstream connection dropped.
    fn on_disconnected(&self) {}

    /// The connection came back after a disconnect. Fired once per outage,
    /// after [`on_connected`](WifiObserver::on_connected).
    fn on_reconnected(&self) {}

    /// The device is about to start its hosted configuration network.
    fn on_entering_setup_mode(&self) {}

    /// A peer joined the hosted network. Informational only.
    fn on_client_joined(&self) {}
}
