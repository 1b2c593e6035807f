//! The BASS client.
//!
//! [`BassClient`] drives a remote BASS server over a [`GattClient`]: it discovers the service,
//! subscribes to and reads the receive states, and writes Control Point commands. All GATT
//! procedures are asynchronous. The host reports their outcome by calling the completion methods
//! (`service_discovered`, `read_complete`, `write_complete`, ...), and the client reports results
//! to the application through its [`ClientHandler`].
//!
//! Only one Control Point write can be outstanding at a time. A command issued while another one
//! is in flight is rejected with `ClientError::Busy` and must be retried by the caller.
//!
//! [`BassClient`]: struct.BassClient.html
//! [`GattClient`]: ../host/trait.GattClient.html
//! [`ClientHandler`]: trait.ClientHandler.html

use crate::{
    att::{AttHandle, ErrorCode, HandleRange},
    bytes::{decode_exact, encode_into},
    gatt::{self, Characteristic, Properties},
    host::{DiscoveredCharacteristic, GattClient, GattError, HostError},
    pdu::{AddSource, BroadcastCode, Command, ModifySource, Opcode, ReceiveState, MAX_COMMAND_LEN},
    Error, RECV_STATE_COUNT,
};
use core::fmt;
use heapless::Vec;

/// Errors reported by the BASS client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Another Control Point write (or discovery) is still in progress.
    Busy,
    /// Discovery has not completed successfully.
    NotDiscovered,
    /// The peer does not expose BASS, or the requested receive state.
    NotFound,
    /// A value could not be encoded or decoded.
    Codec(Error),
    /// A host procedure failed locally.
    Host(HostError),
    /// The server answered with an ATT error.
    Att(ErrorCode),
}

impl From<HostError> for ClientError {
    fn from(e: HostError) -> Self {
        ClientError::Host(e)
    }
}

impl From<GattError> for ClientError {
    fn from(e: GattError) -> Self {
        match e {
            GattError::Att(code) => ClientError::Att(code),
            GattError::Host(e) => ClientError::Host(e),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Busy => f.write_str("busy"),
            ClientError::NotDiscovered => f.write_str("service not discovered"),
            ClientError::NotFound => f.write_str("not found"),
            ClientError::Codec(e) => write!(f, "codec error: {}", e),
            ClientError::Host(e) => write!(f, "host error: {}", e),
            ClientError::Att(code) => write!(f, "ATT error {:?}", code),
        }
    }
}

/// Application callbacks of the BASS client.
///
/// `index` arguments identify a receive state characteristic by its position in discovery order.
pub trait ClientHandler {
    /// Discovery finished, having found `Ok(n)` receive state characteristics.
    fn discovered(&mut self, _result: Result<u8, ClientError>) {}

    /// A receive state was read or notified.
    fn receive_state(&mut self, _index: u8, _state: Result<&ReceiveState, ClientError>) {}

    /// The server removed the source with Source ID `src_id`.
    fn receive_state_removed(&mut self, _index: u8, _src_id: u8) {}

    fn scan_start(&mut self, _result: Result<(), ClientError>) {}

    fn scan_stop(&mut self, _result: Result<(), ClientError>) {}

    fn add_source(&mut self, _result: Result<(), ClientError>) {}

    fn modify_source(&mut self, _result: Result<(), ClientError>) {}

    fn broadcast_code(&mut self, _result: Result<(), ClientError>) {}

    fn remove_source(&mut self, _result: Result<(), ClientError>) {}
}

/// A BASS client bound to one connection.
pub struct BassClient<G: GattClient, H: ClientHandler> {
    gatt: G,
    handler: H,
    discovering: bool,
    /// Next receive state to read during discovery.
    discovery_read: Option<u8>,
    cp_handle: Option<AttHandle>,
    recv_state_handles: Vec<AttHandle, RECV_STATE_COUNT>,
    /// Last Source ID seen on each receive state.
    src_id_cache: [Option<u8>; RECV_STATE_COUNT],
    /// Opcode of the outstanding Control Point write.
    pending: Option<Opcode>,
}

impl<G: GattClient, H: ClientHandler> BassClient<G, H> {
    pub fn new(gatt: G, handler: H) -> Self {
        Self {
            gatt,
            handler,
            discovering: false,
            discovery_read: None,
            cp_handle: None,
            recv_state_handles: Vec::new(),
            src_id_cache: [None; RECV_STATE_COUNT],
            pending: None,
        }
    }

    pub fn gatt(&mut self) -> &mut G {
        &mut self.gatt
    }

    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Returns the number of receive state characteristics found by discovery.
    pub fn receive_state_count(&self) -> usize {
        self.recv_state_handles.len()
    }

    /// Returns whether a Control Point write is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts discovering BASS on the peer.
    ///
    /// Any previously discovered state is forgotten.
    pub fn discover(&mut self) -> Result<(), ClientError> {
        if self.discovering {
            return Err(ClientError::Busy);
        }

        self.gatt.discover_service(gatt::SERVICE_UUID)?;
        self.discovering = true;
        self.discovery_read = None;
        self.cp_handle = None;
        self.recv_state_handles.clear();
        self.src_id_cache = [None; RECV_STATE_COUNT];
        Ok(())
    }

    /// Primary service discovery finished.
    pub fn service_discovered(&mut self, result: Result<Option<HandleRange>, GattError>) {
        if !self.discovering {
            return;
        }

        let range = match result {
            Ok(Some(range)) => range,
            Ok(None) => return self.finish_discovery(Err(ClientError::NotFound)),
            Err(e) => return self.finish_discovery(Err(e.into())),
        };
        debug!("BASS at {:?}", range);

        if let Err(e) = self.gatt.discover_characteristics(range) {
            self.finish_discovery(Err(e.into()));
        }
    }

    /// A characteristic of the service was discovered.
    pub fn characteristic_discovered(&mut self, chr: &DiscoveredCharacteristic) {
        if !self.discovering {
            return;
        }

        if chr.uuid == gatt::ControlPoint::UUID {
            self.cp_handle = Some(chr.value_handle);
        } else if chr.uuid == gatt::ReceiveState::UUID {
            if self.recv_state_handles.push(chr.value_handle).is_err() {
                warn!("ignoring excess receive state at {:?}", chr.value_handle);
                return;
            }
            if chr.properties.contains(Properties::NOTIFY) {
                if let Err(e) = self.gatt.subscribe(chr.value_handle) {
                    warn!("failed to subscribe to {:?}: {}", chr.value_handle, e);
                }
            }
        }
    }

    /// Characteristic discovery finished.
    ///
    /// Every receive state is read once before discovery is reported complete.
    pub fn characteristics_complete(&mut self, result: Result<(), GattError>) {
        if !self.discovering {
            return;
        }
        if let Err(e) = result {
            return self.finish_discovery(Err(e.into()));
        }
        if self.cp_handle.is_none() || self.recv_state_handles.is_empty() {
            return self.finish_discovery(Err(ClientError::NotFound));
        }

        self.read_next(0);
    }

    /// Starts reading receive state `index`.
    pub fn read_receive_state(&mut self, index: u8) -> Result<(), ClientError> {
        if self.discovering {
            return Err(ClientError::Busy);
        }
        if self.cp_handle.is_none() {
            return Err(ClientError::NotDiscovered);
        }
        let handle = *self
            .recv_state_handles
            .get(usize::from(index))
            .ok_or(ClientError::NotFound)?;
        self.gatt.read(handle)?;
        Ok(())
    }

    /// A read of `handle` finished.
    pub fn read_complete(&mut self, handle: AttHandle, result: Result<&[u8], GattError>) {
        let index = match self.index_of(handle) {
            Some(index) => index,
            None => return,
        };

        let in_discovery = self.discovering && self.discovery_read == Some(index);
        match result {
            Ok(value) => self.handle_value(index, value),
            Err(e) if in_discovery => return self.finish_discovery(Err(e.into())),
            Err(e) => self.handler.receive_state(index, Err(e.into())),
        }

        if in_discovery {
            self.read_next(index + 1);
        }
    }

    /// A notification was received for `handle`.
    pub fn notification(&mut self, handle: AttHandle, value: &[u8]) {
        if let Some(index) = self.index_of(handle) {
            self.handle_value(index, value);
        }
    }

    /// Asks the server to start scanning for sources on our behalf.
    pub fn remote_scan_start(&mut self) -> Result<(), ClientError> {
        self.send(&Command::RemoteScanStarted)
    }

    /// Tells the server we stopped scanning for sources.
    pub fn remote_scan_stop(&mut self) -> Result<(), ClientError> {
        self.send(&Command::RemoteScanStopped)
    }

    pub fn add_source(&mut self, params: &AddSource<'_>) -> Result<(), ClientError> {
        self.send(&Command::AddSource(*params))
    }

    pub fn modify_source(&mut self, params: &ModifySource<'_>) -> Result<(), ClientError> {
        self.send(&Command::ModifySource(*params))
    }

    pub fn set_broadcast_code(
        &mut self,
        src_id: u8,
        code: &BroadcastCode,
    ) -> Result<(), ClientError> {
        self.send(&Command::SetBroadcastCode {
            src_id,
            code: *code,
        })
    }

    pub fn remove_source(&mut self, src_id: u8) -> Result<(), ClientError> {
        self.send(&Command::RemoveSource { src_id })
    }

    /// The outstanding Control Point write finished.
    ///
    /// The handler callback is chosen by the opcode of the command that was written.
    pub fn write_complete(&mut self, result: Result<(), GattError>) {
        let opcode = match self.pending.take() {
            Some(opcode) => opcode,
            None => {
                warn!("write completion without pending command");
                return;
            }
        };

        let result = result.map_err(ClientError::from);
        debug!("{:?} complete: {:?}", opcode, result);
        match opcode {
            Opcode::RemoteScanStopped => self.handler.scan_stop(result),
            Opcode::RemoteScanStarted => self.handler.scan_start(result),
            Opcode::AddSource => self.handler.add_source(result),
            Opcode::ModifySource => self.handler.modify_source(result),
            Opcode::SetBroadcastCode => self.handler.broadcast_code(result),
            Opcode::RemoveSource => self.handler.remove_source(result),
        }
    }

    fn send(&mut self, cmd: &Command<'_>) -> Result<(), ClientError> {
        if self.pending.is_some() {
            return Err(ClientError::Busy);
        }
        let handle = self.cp_handle.ok_or(ClientError::NotDiscovered)?;

        let mut buf = [0; MAX_COMMAND_LEN];
        let len = encode_into(cmd, &mut buf).map_err(ClientError::Codec)?;
        self.gatt.write(handle, &buf[..len])?;
        self.pending = Some(cmd.opcode());
        debug!("sent {:?}", cmd.opcode());
        Ok(())
    }

    fn index_of(&self, handle: AttHandle) -> Option<u8> {
        self.recv_state_handles
            .iter()
            .position(|h| *h == handle)
            .map(|i| i as u8)
    }

    fn handle_value(&mut self, index: u8, value: &[u8]) {
        let cached = &mut self.src_id_cache[usize::from(index)];

        if value.is_empty() {
            match cached.take() {
                Some(src_id) => self.handler.receive_state_removed(index, src_id),
                None => debug!("receive state {} is empty", index),
            }
            return;
        }

        match decode_exact::<ReceiveState>(value) {
            Ok(state) => {
                *cached = Some(state.src_id);
                self.handler.receive_state(index, Ok(&state));
            }
            Err(e) => {
                warn!("malformed receive state {}: {}", index, e);
                self.handler.receive_state(index, Err(ClientError::Codec(e)));
            }
        }
    }

    /// Reads receive state `index` as part of discovery, or completes discovery after the last.
    fn read_next(&mut self, index: u8) {
        let handle = match self.recv_state_handles.get(usize::from(index)) {
            Some(handle) => *handle,
            None => {
                let count = self.recv_state_handles.len() as u8;
                return self.finish_discovery(Ok(count));
            }
        };

        self.discovery_read = Some(index);
        if let Err(e) = self.gatt.read(handle) {
            self.finish_discovery(Err(e.into()));
        }
    }

    fn finish_discovery(&mut self, result: Result<u8, ClientError>) {
        self.discovering = false;
        self.discovery_read = None;
        if result.is_err() {
            self.cp_handle = None;
        }
        info!("discovery finished: {:?}", result);
        self.handler.discovered(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{AddressKind, DeviceAddress},
        bytes::BytesOr,
        mock::{ClientEvent, GattOp, MockGattClient, RecordingHandler},
        pdu::{
            BigEncryption, BisSync, BroadcastId, PaSyncRequest, PaSyncState, SubgroupParams,
            MAX_RECV_STATE_LEN,
        },
    };

    const CP: AttHandle = AttHandle::from_raw(0x0010);
    const RS1: AttHandle = AttHandle::from_raw(0x0012);
    const RS2: AttHandle = AttHandle::from_raw(0x0015);

    type Client = BassClient<MockGattClient, RecordingHandler>;

    fn client() -> Client {
        BassClient::new(MockGattClient::default(), RecordingHandler::default())
    }

    fn chr<C: Characteristic>(value_handle: AttHandle) -> DiscoveredCharacteristic {
        DiscoveredCharacteristic {
            uuid: C::UUID,
            properties: C::PROPS,
            value_handle,
        }
    }

    fn state(src_id: u8) -> std::vec::Vec<u8> {
        let state = ReceiveState {
            src_id,
            address: DeviceAddress::new([1, 2, 3, 4, 5, 6], AddressKind::Public),
            adv_sid: 0,
            broadcast_id: BroadcastId::new(0x123456),
            pa_sync_state: PaSyncState::Synced,
            big_encryption: BigEncryption::NotEncrypted,
            subgroups: Default::default(),
        };
        let mut buf = [0; MAX_RECV_STATE_LEN];
        let len = encode_into(&state, &mut buf).unwrap();
        buf[..len].to_vec()
    }

    /// Runs discovery against a server with two receive states that are both empty.
    fn discovered() -> Client {
        let mut client = client();
        client.discover().unwrap();
        let range = HandleRange::new(AttHandle::from_raw(0x000E), AttHandle::from_raw(0x0020));
        client.service_discovered(Ok(range));
        client.characteristic_discovered(&chr::<gatt::ControlPoint>(CP));
        client.characteristic_discovered(&chr::<gatt::ReceiveState>(RS1));
        client.characteristic_discovered(&chr::<gatt::ReceiveState>(RS2));
        client.characteristics_complete(Ok(()));
        client.read_complete(RS1, Ok(&[]));
        client.read_complete(RS2, Ok(&[]));
        client.gatt().ops.clear();
        client.handler().events.clear();
        client
    }

    #[test]
    fn discovery() {
        let mut client = client();
        client.discover().unwrap();
        assert_eq!(client.discover(), Err(ClientError::Busy));
        assert_eq!(
            client.gatt().ops,
            vec![GattOp::DiscoverService(gatt::SERVICE_UUID)]
        );

        let range = HandleRange::new(AttHandle::from_raw(0x000E), AttHandle::from_raw(0x0020));
        client.service_discovered(Ok(range));
        client.characteristic_discovered(&chr::<gatt::ControlPoint>(CP));
        client.characteristic_discovered(&chr::<gatt::ReceiveState>(RS1));
        // Not notifiable, so not subscribed
        client.characteristic_discovered(&DiscoveredCharacteristic {
            properties: Properties::READ,
            ..chr::<gatt::ReceiveState>(RS2)
        });
        client.characteristics_complete(Ok(()));

        client.read_complete(RS1, Ok(&state(4)[..]));
        client.read_complete(RS2, Ok(&[]));

        let range = range.unwrap();
        assert_eq!(
            client.gatt().ops[1..],
            [
                GattOp::DiscoverCharacteristics(range),
                GattOp::Subscribe(RS1),
                GattOp::Read(RS1),
                GattOp::Read(RS2),
            ]
        );
        assert_eq!(client.receive_state_count(), 2);

        let events = &client.handler().events;
        assert_eq!(events.len(), 2);
        match &events[0] {
            ClientEvent::State(0, Ok(state)) => assert_eq!(state.src_id, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], ClientEvent::Discovered(Ok(2)));
    }

    #[test]
    fn missing_service() {
        let mut client = client();
        client.discover().unwrap();
        client.service_discovered(Ok(None));
        assert_eq!(
            client.handler().events,
            vec![ClientEvent::Discovered(Err(ClientError::NotFound))]
        );
        assert_eq!(client.remove_source(0), Err(ClientError::NotDiscovered));
    }

    #[test]
    fn missing_control_point() {
        let mut client = client();
        client.discover().unwrap();
        client.service_discovered(Ok(HandleRange::new(CP, RS2)));
        client.characteristic_discovered(&chr::<gatt::ReceiveState>(RS1));
        client.characteristics_complete(Ok(()));
        assert_eq!(
            client.handler().events,
            vec![ClientEvent::Discovered(Err(ClientError::NotFound))]
        );
    }

    #[test]
    fn discovery_read_failure() {
        let mut client = client();
        client.discover().unwrap();
        client.service_discovered(Ok(HandleRange::new(CP, RS2)));
        client.characteristic_discovered(&chr::<gatt::ControlPoint>(CP));
        client.characteristic_discovered(&chr::<gatt::ReceiveState>(RS1));
        client.characteristics_complete(Ok(()));
        client.read_complete(RS1, Err(GattError::Att(ErrorCode::InsufficientEncryption)));
        assert_eq!(
            client.handler().events,
            vec![ClientEvent::Discovered(Err(ClientError::Att(
                ErrorCode::InsufficientEncryption
            )))]
        );
    }

    #[test]
    fn one_command_at_a_time() {
        let mut client = discovered();
        client.remote_scan_start().unwrap();
        assert!(client.is_busy());
        assert_eq!(client.remove_source(1), Err(ClientError::Busy));
        assert_eq!(client.gatt().ops, vec![GattOp::Write(CP, vec![0x01])]);

        client.write_complete(Ok(()));
        assert_eq!(client.handler().events, vec![ClientEvent::ScanStart(Ok(()))]);
        assert!(!client.is_busy());

        client.remove_source(1).unwrap();
        client.write_complete(Err(GattError::Att(ErrorCode::InvalidSourceId)));
        assert_eq!(
            client.handler().events[1],
            ClientEvent::RemoveSource(Err(ClientError::Att(ErrorCode::InvalidSourceId)))
        );
    }

    #[test]
    fn failed_write_is_not_pending() {
        let mut client = discovered();
        client.gatt().fail_write = true;
        assert_eq!(
            client.remote_scan_stop(),
            Err(ClientError::Host(HostError::Failed))
        );
        assert!(!client.is_busy());
    }

    #[test]
    fn command_encoding() {
        let mut client = discovered();
        let sgs = [SubgroupParams {
            bis_sync: BisSync::NO_PREFERENCE,
            metadata: &[0x01, 0x02],
        }];
        let add = AddSource {
            address: DeviceAddress::new([1, 2, 3, 4, 5, 6], AddressKind::Random),
            adv_sid: 3,
            broadcast_id: BroadcastId::new(0xABCDEF),
            pa_sync: PaSyncRequest::SyncPast,
            pa_interval: 0x0050,
            subgroups: BytesOr::from_ref(&sgs[..]),
        };
        client.add_source(&add).unwrap();
        client.write_complete(Ok(()));

        let code = BroadcastCode::new([0x42; 16]);
        client.set_broadcast_code(7, &code).unwrap();
        client.write_complete(Ok(()));

        let mut expected_code = vec![0x04, 7];
        expected_code.extend_from_slice(&[0x42; 16]);
        assert_eq!(
            client.gatt().ops,
            vec![
                GattOp::Write(
                    CP,
                    vec![
                        0x02, 0x01, 1, 2, 3, 4, 5, 6, 0x03, 0xEF, 0xCD, 0xAB, 0x01, 0x50, 0x00,
                        0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0x01, 0x02
                    ]
                ),
                GattOp::Write(CP, expected_code),
            ]
        );
        assert_eq!(
            client.handler().events,
            vec![
                ClientEvent::AddSource(Ok(())),
                ClientEvent::BroadcastCode(Ok(()))
            ]
        );
    }

    #[test]
    fn empty_notification_reports_removal() {
        let mut client = discovered();
        client.notification(RS2, &state(7));
        client.notification(RS2, &[]);
        // Already gone
        client.notification(RS2, &[]);

        let events = &client.handler().events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ClientEvent::Removed(1, 7));
    }

    #[test]
    fn malformed_notification() {
        let mut client = discovered();
        client.notification(RS1, &[0x00, 0x01]);
        client.notification(AttHandle::from_raw(0x0099), &state(1));
        assert_eq!(
            client.handler().events,
            vec![ClientEvent::State(
                0,
                Err(ClientError::Codec(Error::InvalidLength))
            )]
        );
    }

    #[test]
    fn explicit_reads() {
        let mut client = client();
        assert_eq!(client.read_receive_state(0), Err(ClientError::NotDiscovered));

        let mut client = discovered();
        assert_eq!(client.read_receive_state(2), Err(ClientError::NotFound));
        client.read_receive_state(1).unwrap();
        assert_eq!(client.gatt().ops, vec![GattOp::Read(RS2)]);

        client.read_complete(RS2, Ok(&state(9)[..]));
        client.read_complete(RS2, Err(GattError::Host(HostError::Timeout)));
        let events = &client.handler().events;
        match &events[0] {
            ClientEvent::State(1, Ok(state)) => assert_eq!(state.src_id, 9),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            events[1],
            ClientEvent::State(1, Err(ClientError::Host(HostError::Timeout)))
        );
    }
}
