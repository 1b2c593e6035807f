//! Server configuration trait.

use crate::{
    host::{BigSync, GattServer, PeriodicSync},
    time::Timer,
};

/// Trait for BASS server configurations.
///
/// This trait defines the host stack services the server is built on. Every application must
/// define a type implementing this trait and supply one instance of each service to
/// `BassServer::new`.
pub trait Config {
    /// A timesource with microsecond resolution, used for the per-source sync timeout.
    type Timer: Timer;

    /// Periodic advertising sync and PAST.
    type PeriodicSync: PeriodicSync;

    /// BIG sync.
    type BigSync: BigSync;

    /// Attribute server and connection queries.
    type Gatt: GattServer;
}
