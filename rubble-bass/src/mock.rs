//! Recording host stack doubles for unit tests.

use crate::{
    att::{AttHandle, HandleRange},
    client::{ClientError, ClientHandler},
    config::Config,
    features::FeatureSet,
    host::{
        BigHandle, BigSync, BigSyncParams, ConnHandle, GattClient, GattServer, HostError,
        PaSyncHandle, PaSyncParams, PeriodicSync,
    },
    pdu::ReceiveState,
    time::{Duration, Instant, Timer},
    uuid::AttUuid,
};
use std::cell::Cell;

/// A timer that only moves when told to.
#[derive(Default)]
pub struct MockTimer {
    now: Cell<u32>,
}

impl MockTimer {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().wrapping_add(by.as_micros()));
    }
}

impl Timer for MockTimer {
    fn now(&self) -> Instant {
        Instant::from_raw_micros(self.now.get())
    }
}

#[derive(Default)]
pub struct MockPaSync {
    pub created: Vec<PaSyncParams>,
    pub deleted: Vec<PaSyncHandle>,
    pub past_subscribed: Vec<ConnHandle>,
    pub past_unsubscribed: Vec<ConnHandle>,
    pub fail_create: bool,
    pub fail_delete: bool,
    next: u16,
}

impl PeriodicSync for MockPaSync {
    fn create_sync(&mut self, params: &PaSyncParams) -> Result<PaSyncHandle, HostError> {
        if self.fail_create {
            return Err(HostError::NoResources);
        }
        self.created.push(*params);
        let handle = PaSyncHandle(self.next);
        self.next += 1;
        Ok(handle)
    }

    fn delete_sync(&mut self, handle: PaSyncHandle) -> Result<(), HostError> {
        if self.fail_delete {
            return Err(HostError::Failed);
        }
        self.deleted.push(handle);
        Ok(())
    }

    fn subscribe_past(
        &mut self,
        conn: ConnHandle,
        _skip: u16,
        _timeout: u16,
    ) -> Result<(), HostError> {
        self.past_subscribed.push(conn);
        Ok(())
    }

    fn unsubscribe_past(&mut self, conn: ConnHandle) -> Result<(), HostError> {
        self.past_unsubscribed.push(conn);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockBig {
    pub created: Vec<(PaSyncHandle, BigSyncParams)>,
    pub terminated: Vec<BigHandle>,
    next: u8,
}

impl BigSync for MockBig {
    fn create_sync(
        &mut self,
        pa: PaSyncHandle,
        params: &BigSyncParams,
    ) -> Result<BigHandle, HostError> {
        self.created.push((pa, *params));
        let handle = BigHandle(self.next);
        self.next += 1;
        Ok(handle)
    }

    fn terminate(&mut self, big: BigHandle) -> Result<(), HostError> {
        self.terminated.push(big);
        Ok(())
    }
}

pub struct MockGatt {
    /// `(conn, index, value)` of every notification sent.
    pub notifications: Vec<(Option<ConnHandle>, u8, Vec<u8>)>,
    pub local: FeatureSet,
    pub peer: FeatureSet,
    pub bonded: bool,
}

impl Default for MockGatt {
    fn default() -> Self {
        Self {
            notifications: Vec::new(),
            local: FeatureSet::empty(),
            peer: FeatureSet::empty(),
            bonded: false,
        }
    }
}

impl GattServer for MockGatt {
    fn notify(&mut self, conn: Option<ConnHandle>, index: u8, value: &[u8]) {
        self.notifications.push((conn, index, value.to_vec()));
    }

    fn peer_features(&self, _conn: ConnHandle) -> FeatureSet {
        self.peer
    }

    fn local_features(&self) -> FeatureSet {
        self.local
    }

    fn is_bonded(&self, _conn: ConnHandle) -> bool {
        self.bonded
    }
}

pub enum MockConfig {}

impl Config for MockConfig {
    type Timer = MockTimer;
    type PeriodicSync = MockPaSync;
    type BigSync = MockBig;
    type Gatt = MockGatt;
}

/// A GATT procedure started by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOp {
    DiscoverService(AttUuid),
    DiscoverCharacteristics(HandleRange),
    Subscribe(AttHandle),
    Read(AttHandle),
    Write(AttHandle, Vec<u8>),
}

#[derive(Default)]
pub struct MockGattClient {
    pub ops: Vec<GattOp>,
    pub fail_write: bool,
}

impl GattClient for MockGattClient {
    fn discover_service(&mut self, uuid: AttUuid) -> Result<(), HostError> {
        self.ops.push(GattOp::DiscoverService(uuid));
        Ok(())
    }

    fn discover_characteristics(&mut self, range: HandleRange) -> Result<(), HostError> {
        self.ops.push(GattOp::DiscoverCharacteristics(range));
        Ok(())
    }

    fn subscribe(&mut self, value_handle: AttHandle) -> Result<(), HostError> {
        self.ops.push(GattOp::Subscribe(value_handle));
        Ok(())
    }

    fn read(&mut self, handle: AttHandle) -> Result<(), HostError> {
        self.ops.push(GattOp::Read(handle));
        Ok(())
    }

    fn write(&mut self, handle: AttHandle, value: &[u8]) -> Result<(), HostError> {
        if self.fail_write {
            return Err(HostError::Failed);
        }
        self.ops.push(GattOp::Write(handle, value.to_vec()));
        Ok(())
    }
}

/// A client callback, as recorded by `RecordingHandler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Discovered(Result<u8, ClientError>),
    State(u8, Result<ReceiveState, ClientError>),
    Removed(u8, u8),
    ScanStart(Result<(), ClientError>),
    ScanStop(Result<(), ClientError>),
    AddSource(Result<(), ClientError>),
    ModifySource(Result<(), ClientError>),
    BroadcastCode(Result<(), ClientError>),
    RemoveSource(Result<(), ClientError>),
}

#[derive(Default)]
pub struct RecordingHandler {
    pub events: Vec<ClientEvent>,
}

impl ClientHandler for RecordingHandler {
    fn discovered(&mut self, result: Result<u8, ClientError>) {
        self.events.push(ClientEvent::Discovered(result));
    }

    fn receive_state(&mut self, index: u8, state: Result<&ReceiveState, ClientError>) {
        self.events
            .push(ClientEvent::State(index, state.map(|s| s.clone())));
    }

    fn receive_state_removed(&mut self, index: u8, src_id: u8) {
        self.events.push(ClientEvent::Removed(index, src_id));
    }

    fn scan_start(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::ScanStart(result));
    }

    fn scan_stop(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::ScanStop(result));
    }

    fn add_source(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::AddSource(result));
    }

    fn modify_source(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::ModifySource(result));
    }

    fn broadcast_code(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::BroadcastCode(result));
    }

    fn remove_source(&mut self, result: Result<(), ClientError>) {
        self.events.push(ClientEvent::RemoveSource(result));
    }
}
