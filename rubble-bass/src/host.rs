//! Interfaces to the host stack services BASS builds upon.
//!
//! BASS does not own any radio or attribute transport state. Periodic advertising sync, PAST,
//! BIG sync, notifications and the GATT client procedures are all provided by the surrounding
//! host stack through the traits in this module. Every trait method only *starts* an operation;
//! completions and asynchronous events are fed back through the entry points on
//! [`BassServer`] and [`BassClient`].
//!
//! Resources created by a collaborator (PA syncs, BIGs) are referred to by small copyable handles.
//! BASS stores the handle while the resource is live and forgets it as soon as the resource is
//! deleted or reported terminated. It never assumes a handle stays valid past such an event.
//!
//! [`BassServer`]: ../server/struct.BassServer.html
//! [`BassClient`]: ../client/struct.BassClient.html

use crate::{
    address::DeviceAddress,
    att::{AttHandle, ErrorCode, HandleRange},
    features::FeatureSet,
    gatt::Properties,
    pdu::BroadcastCode,
    uuid::AttUuid,
};
use core::fmt;

/// Identifies an ACL connection to a peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnHandle(pub u16);

/// Identifies a periodic advertising sync owned by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaSyncHandle(pub u16);

/// Identifies a BIG sync owned by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BigHandle(pub u8);

/// Errors reported by host stack collaborators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    /// A conflicting operation is already in progress.
    InProgress,
    /// The controller or host is out of sync or connection resources.
    NoResources,
    /// The referenced connection does not exist (anymore).
    NotConnected,
    /// The operation timed out.
    Timeout,
    /// Any other failure.
    Failed,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostError::InProgress => "operation already in progress",
            HostError::NoResources => "out of resources",
            HostError::NotConnected => "not connected",
            HostError::Timeout => "timed out",
            HostError::Failed => "operation failed",
        })
    }
}

/// Parameters for creating a periodic advertising sync.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaSyncParams {
    pub address: DeviceAddress,
    pub sid: u8,
    /// Number of periodic advertising events that may be skipped.
    pub skip: u16,
    /// Sync timeout in 10 ms units.
    pub timeout: u16,
}

/// Parameters for synchronizing to a BIG.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BigSyncParams {
    /// BIS indices to synchronize to (bit `n` = BIS index `n + 1`).
    pub bis_bitfield: u32,
    /// Broadcast Code, if the BIG is encrypted.
    pub code: Option<BroadcastCode>,
    /// Sync timeout in 10 ms units.
    pub timeout: u16,
}

/// The parts of a received BIGInfo report BASS cares about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BigInfo {
    /// Number of BISes in the BIG.
    pub num_bis: u8,
    /// ISO interval in milliseconds.
    pub iso_interval_ms: u16,
    pub encrypted: bool,
}

/// Reason for a BIG sync to end.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BigTermination {
    /// We terminated the sync ourselves.
    Local,
    /// The controller failed to decrypt the BIG using the supplied Broadcast Code.
    MicFailure,
    /// The sync was lost or the broadcaster ended the BIG.
    Other,
}

/// Periodic advertising sync and PAST reception.
pub trait PeriodicSync {
    /// Starts synchronizing to the periodic advertising train of a source.
    ///
    /// Establishment is reported via `BassServer::pa_synced`.
    fn create_sync(&mut self, params: &PaSyncParams) -> Result<PaSyncHandle, HostError>;

    /// Deletes a pending or established PA sync.
    ///
    /// On success, no further events will be reported for `handle`.
    fn delete_sync(&mut self, handle: PaSyncHandle) -> Result<(), HostError>;

    /// Accepts sync transfers (PAST) from the peer on `conn`.
    fn subscribe_past(&mut self, conn: ConnHandle, skip: u16, timeout: u16)
        -> Result<(), HostError>;

    /// Stops accepting sync transfers from `conn`.
    fn unsubscribe_past(&mut self, conn: ConnHandle) -> Result<(), HostError>;
}

/// Synchronization to Broadcast Isochronous Groups.
pub trait BigSync {
    /// Starts synchronizing to the BIG described by the BIGInfo received on `pa`.
    fn create_sync(
        &mut self,
        pa: PaSyncHandle,
        params: &BigSyncParams,
    ) -> Result<BigHandle, HostError>;

    /// Terminates a pending or established BIG sync.
    fn terminate(&mut self, big: BigHandle) -> Result<(), HostError>;
}

/// The server side of the attribute transport, plus connection queries.
///
/// The host stack owns the attribute table (built from `gatt`) and the client characteristic
/// configuration of each peer.
pub trait GattServer {
    /// Notifies the value of receive state `index` to subscribed peers.
    ///
    /// With `conn` set to `None`, every subscribed peer is notified. An empty `value` signals a
    /// removed source.
    fn notify(&mut self, conn: Option<ConnHandle>, index: u8, value: &[u8]);

    /// Returns the LE features supported by the peer on `conn`.
    fn peer_features(&self, conn: ConnHandle) -> FeatureSet;

    /// Returns the LE features supported by the local controller.
    fn local_features(&self) -> FeatureSet;

    /// Returns whether the peer on `conn` is bonded.
    fn is_bonded(&self, conn: ConnHandle) -> bool;
}

/// The client side of the attribute transport, bound to one connection.
///
/// Every method starts a procedure. Results are delivered by calling the matching completion
/// method of `BassClient`:
///
/// | Procedure | Completion |
/// |---|---|
/// | `discover_service` | `service_discovered` |
/// | `discover_characteristics` | `characteristic_discovered` (per characteristic), then `characteristics_complete` |
/// | `read` | `read_complete` |
/// | `write` | `write_complete` |
///
/// Notifications for subscribed handles are delivered via `BassClient::notification`.
pub trait GattClient {
    fn discover_service(&mut self, uuid: AttUuid) -> Result<(), HostError>;

    fn discover_characteristics(&mut self, range: HandleRange) -> Result<(), HostError>;

    /// Enables notifications for the characteristic with value handle `value_handle`.
    ///
    /// The host locates the client characteristic configuration descriptor itself.
    fn subscribe(&mut self, value_handle: AttHandle) -> Result<(), HostError>;

    fn read(&mut self, handle: AttHandle) -> Result<(), HostError>;

    /// Writes `value` to `handle` using a Write Request.
    fn write(&mut self, handle: AttHandle, value: &[u8]) -> Result<(), HostError>;
}

/// A characteristic found during discovery.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: AttUuid,
    pub properties: Properties,
    pub value_handle: AttHandle,
}

/// Failure of a GATT procedure, as reported to `BassClient`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GattError {
    /// The peer answered with an ATT error response.
    Att(ErrorCode),
    /// The procedure failed locally (disconnect, timeout, ...).
    Host(HostError),
}
