//! The BASS server.
//!
//! [`BassServer`] owns the receive state table and processes Control Point writes against it. It
//! also receives the asynchronous events of the host's PA and BIG sync procedures and turns them
//! into receive state updates, which are notified to every subscribed client.
//!
//! Control Point commands are fully decoded and validated before any state is touched. A rejected
//! command leaves the server exactly as it was and is answered with an ATT error code:
//!
//! | Failure | Error code |
//! |---|---|
//! | Unknown opcode | `OpcodeNotSupported` |
//! | Truncated or overlong PDU, subgroup count mismatch | `InvalidAttributeValueLength` |
//! | Field out of range, conflicting BIS requests, duplicate source | `ValueNotAllowed` |
//! | No free receive state, too many subgroups, oversized metadata | `InsufficientResources` |
//! | Unknown Source ID | `InvalidSourceId` |
//! | Host failed to create or tear down a sync | `UnlikelyError` |
//!
//! [`BassServer`]: struct.BassServer.html

use crate::{
    address::DeviceAddress,
    att::{AttError, ErrorCode},
    bytes::{decode_exact, encode_into},
    config::Config,
    host::{BigHandle, BigInfo, BigTermination, ConnHandle, GattServer, PaSyncHandle},
    pdu::{
        AddSource, BisSync, BroadcastCode, Command, ModifySource, PaSyncRequest, PaSyncState,
        ReceiveState, Subgroup, SubgroupList, MAX_ADV_SID, MAX_RECV_STATE_LEN,
    },
    store::{Slot, Store},
    sync::{self, BisSyncPolicy},
    time::{Duration, Instant, Timer},
    Error, MAX_SUBGROUPS, RECV_STATE_COUNT,
};
use heapless::{LinearMap, Vec};

/// Maximum number of simultaneously connected clients whose scan state is tracked.
pub const MAX_CLIENTS: usize = 4;

/// Maps a PDU decoding error to the ATT error code reported to the writer.
fn codec_error(e: Error) -> ErrorCode {
    match e {
        Error::UnsupportedOpcode => ErrorCode::OpcodeNotSupported,
        Error::InvalidValue => ErrorCode::ValueNotAllowed,
        _ => ErrorCode::InvalidAttributeValueLength,
    }
}

/// Builds the stored subgroups and requested BIS bitfields from a command's subgroup list.
fn build_subgroups(
    list: &SubgroupList<'_>,
) -> Result<(Vec<Subgroup, MAX_SUBGROUPS>, [BisSync; MAX_SUBGROUPS]), ErrorCode> {
    let mut subgroups = Vec::new();
    let mut requested = [BisSync::NONE; MAX_SUBGROUPS];

    for (i, params) in list.iter().enumerate() {
        let mut metadata = Vec::new();
        metadata
            .extend_from_slice(params.metadata)
            .map_err(|()| ErrorCode::InsufficientResources)?;
        subgroups
            .push(Subgroup {
                bis_sync: BisSync::NONE,
                metadata,
            })
            .map_err(|_| ErrorCode::InsufficientResources)?;
        requested[i] = params.bis_sync;
    }

    check_bis_requests(&requested[..subgroups.len()])?;
    Ok((subgroups, requested))
}

/// Checks that every BIS request is valid and no two subgroups ask for the same BIS.
fn check_bis_requests(requested: &[BisSync]) -> Result<(), ErrorCode> {
    for (i, bis) in requested.iter().enumerate() {
        if !bis.is_valid_request() {
            return Err(ErrorCode::ValueNotAllowed);
        }
        if requested[i + 1..].iter().any(|other| bis.conflicts_with(*other)) {
            return Err(ErrorCode::ValueNotAllowed);
        }
    }
    Ok(())
}

/// A Broadcast Audio Scan Service server.
pub struct BassServer<C: Config> {
    timer: C::Timer,
    pa: C::PeriodicSync,
    big: C::BigSync,
    gatt: C::Gatt,
    store: Store,
    /// Remote scan state of each connected client.
    clients: LinearMap<ConnHandle, bool, MAX_CLIENTS>,
    policy: BisSyncPolicy,
}

impl<C: Config> BassServer<C> {
    /// Creates a server with all receive states empty.
    pub fn new(timer: C::Timer, pa: C::PeriodicSync, big: C::BigSync, gatt: C::Gatt) -> Self {
        Self {
            timer,
            pa,
            big,
            gatt,
            store: Store::new(),
            clients: LinearMap::new(),
            policy: BisSyncPolicy::default(),
        }
    }

    /// Changes how requested BISes are selected when a BIG is synchronized to.
    pub fn set_bis_sync_policy(&mut self, policy: BisSyncPolicy) {
        self.policy = policy;
    }

    pub fn timer(&self) -> &C::Timer {
        &self.timer
    }

    pub fn periodic_sync(&mut self) -> &mut C::PeriodicSync {
        &mut self.pa
    }

    pub fn big_sync(&mut self) -> &mut C::BigSync {
        &mut self.big
    }

    pub fn gatt(&mut self) -> &mut C::Gatt {
        &mut self.gatt
    }

    /// Iterates over the receive states of all tracked sources.
    pub fn receive_states(&self) -> impl Iterator<Item = &ReceiveState> {
        self.store.iter().map(Slot::receive_state)
    }

    /// Returns whether the client on `conn` is scanning for sources on our behalf.
    pub fn is_scanning(&self, conn: ConnHandle) -> bool {
        self.clients.get(&conn).copied().unwrap_or(false)
    }

    /// Processes a write to the Control Point.
    pub fn write_control_point(&mut self, conn: ConnHandle, value: &[u8]) -> Result<(), AttError> {
        let cmd = decode_exact::<Command<'_>>(value).map_err(|e| {
            warn!("{:?}: malformed control point write: {}", conn, e);
            AttError::from_code(codec_error(e))
        })?;
        debug!("{:?}: {:?}", conn, cmd);

        let result = match cmd {
            Command::RemoteScanStopped => {
                self.set_scanning(conn, false);
                Ok(())
            }
            Command::RemoteScanStarted => {
                self.set_scanning(conn, true);
                Ok(())
            }
            Command::AddSource(add) => self.add_source(&add, Some(conn)).map(|_| ()),
            Command::ModifySource(modify) => self.modify_source(&modify, Some(conn)),
            Command::SetBroadcastCode { src_id, code } => self.set_broadcast_code(src_id, code),
            Command::RemoveSource { src_id } => self.remove_source(src_id),
        };

        result.map_err(|code| {
            warn!("{:?}: {:?} rejected: {:?}", conn, cmd.opcode(), code);
            AttError::from_code(code)
        })
    }

    /// Reads receive state `index` into `buf`, returning the number of bytes written.
    ///
    /// An unused receive state reads as an empty value.
    pub fn read_receive_state(&self, index: u8, buf: &mut [u8]) -> Result<usize, AttError> {
        let slot = self
            .store
            .get(index)
            .ok_or(AttError::from_code(ErrorCode::InvalidHandle))?;
        if !slot.is_active() {
            return Ok(0);
        }

        encode_into(slot.receive_state(), buf).map_err(|e| {
            error!("failed to encode receive state {}: {}", index, e);
            AttError::from_code(ErrorCode::UnlikelyError)
        })
    }

    /// Adds a source on behalf of the local application, returning its Source ID.
    ///
    /// Without a connection, PAST cannot be used and the source is synchronized to directly.
    pub fn add_local_source(&mut self, add: &AddSource<'_>) -> Result<u8, AttError> {
        self.add_source(add, None).map_err(AttError::from_code)
    }

    /// Removes a source on behalf of the local application.
    pub fn remove_local_source(&mut self, src_id: u8) -> Result<(), AttError> {
        self.remove_source(src_id).map_err(AttError::from_code)
    }

    /// A client connected.
    ///
    /// Bonded clients may have missed updates while disconnected, so they are sent every
    /// receive state.
    pub fn connected(&mut self, conn: ConnHandle) {
        if self.clients.insert(conn, false).is_err() {
            warn!("too many clients, not tracking scan state of {:?}", conn);
        }

        if self.gatt.is_bonded(conn) {
            for index in 0..RECV_STATE_COUNT as u8 {
                if self.store.get(index).map_or(false, Slot::is_active) {
                    self.notify_slot(index, Some(conn));
                }
            }
        }
    }

    /// A client disconnected.
    pub fn disconnected(&mut self, conn: ConnHandle) {
        self.clients.remove(&conn);
    }

    /// The host established a PA sync, either directly or via PAST.
    ///
    /// A transferred sync is not known by handle yet and is matched to the source waiting for it
    /// by advertiser address and SID. Sources that are not waiting for a transfer ignore it.
    pub fn pa_synced(
        &mut self,
        handle: PaSyncHandle,
        address: DeviceAddress,
        sid: u8,
        interval: u16,
    ) {
        let index = self
            .store
            .iter()
            .find(|slot| {
                slot.pa_sync == Some(handle)
                    || (slot.pa_sync.is_none()
                        && slot.state.pa_sync_state == PaSyncState::InfoRequest
                        && slot.state.address == address
                        && slot.state.adv_sid == sid)
            })
            .map(Slot::index);

        let index = match index {
            Some(index) => index,
            None => {
                debug!("ignoring PA sync {:?} to {:?}", handle, address);
                return;
            }
        };

        if let Some(slot) = self.store.get_mut(index) {
            slot.pa_interval = interval;
            sync::on_pa_synced(slot, &mut self.pa, handle);
            self.notify_slot(index, None);
        }
    }

    /// A PA sync was lost or deleted.
    pub fn pa_terminated(&mut self, handle: PaSyncHandle) {
        if let Some(slot) = self.store.lookup_by_pa_sync_handle(handle) {
            sync::on_pa_terminated(slot, &mut self.big);
            let index = slot.index();
            self.notify_slot(index, None);
        }
    }

    /// A BIGInfo report was received on a PA sync.
    pub fn biginfo_received(&mut self, handle: PaSyncHandle, info: BigInfo) {
        if let Some(slot) = self.store.lookup_by_pa_sync_handle(handle) {
            let before = slot.state.big_encryption;
            if let Err(e) = sync::on_biginfo(slot, &mut self.big, info, self.policy) {
                error!("src {}: BIS sync failed: {}", slot.state.src_id, e);
            }
            if slot.state.big_encryption != before {
                let index = slot.index();
                self.notify_slot(index, None);
            }
        }
    }

    /// A BIG sync was established, synchronized to the BISes in `bis_bitfield`.
    pub fn big_synced(&mut self, big: BigHandle, bis_bitfield: u32) {
        if let Some(slot) = self.store.lookup_by_big_handle(big) {
            sync::on_big_synced(slot, bis_bitfield);
            let index = slot.index();
            self.notify_slot(index, None);
        }
    }

    /// A BIG sync failed to be established, or ended.
    pub fn big_terminated(&mut self, big: BigHandle, reason: BigTermination) {
        if let Some(slot) = self.store.lookup_by_big_handle(big) {
            sync::on_big_terminated(slot, reason);
            let index = slot.index();
            self.notify_slot(index, None);
        }
    }

    /// Handles expired sync timeouts.
    ///
    /// Must be called at or after the instant returned by `next_deadline`.
    pub fn poll(&mut self) {
        let now = self.timer.now();
        for index in 0..RECV_STATE_COUNT as u8 {
            if let Some(slot) = self.store.get_mut(index) {
                if slot.is_active() && sync::timeout_expired(slot, now) {
                    sync::on_timeout(slot, &mut self.pa);
                    self.notify_slot(index, None);
                }
            }
        }
    }

    /// Returns the instant at which the earliest pending sync timeout expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        let now = self.timer.now();
        self.store
            .iter()
            .filter_map(|slot| slot.timeout)
            .map(|timeout| timeout.remaining(now))
            .min()
            .map(|remaining: Duration| now + remaining)
    }

    fn set_scanning(&mut self, conn: ConnHandle, scanning: bool) {
        info!("{:?}: remote scan {}", conn, if scanning { "started" } else { "stopped" });
        if self.clients.insert(conn, scanning).is_err() {
            warn!("too many clients, not tracking scan state of {:?}", conn);
        }
    }

    /// Returns the connection a PA sync should be transferred over, if PAST can be used.
    fn past_conn(&self, conn: Option<ConnHandle>, request: PaSyncRequest) -> Option<ConnHandle> {
        let conn = conn?;
        let supported = self
            .gatt
            .local_features()
            .can_receive_past_from(self.gatt.peer_features(conn));
        if request == PaSyncRequest::SyncPast && supported {
            Some(conn)
        } else {
            None
        }
    }

    fn add_source(
        &mut self,
        add: &AddSource<'_>,
        conn: Option<ConnHandle>,
    ) -> Result<u8, ErrorCode> {
        let (subgroups, requested) = build_subgroups(&add.subgroups)?;
        if add.adv_sid > MAX_ADV_SID {
            return Err(ErrorCode::ValueNotAllowed);
        }
        if self
            .store
            .lookup_by_address(&add.address, add.adv_sid)
            .is_some()
        {
            return Err(ErrorCode::ValueNotAllowed);
        }

        let past_conn = self.past_conn(conn, add.pa_sync);
        let now = self.timer.now();
        let slot = self.store.allocate()?;

        slot.state.address = add.address;
        slot.state.adv_sid = add.adv_sid;
        slot.state.broadcast_id = add.broadcast_id;
        slot.state.subgroups = subgroups;
        slot.requested_bis_sync = requested;
        slot.pa_sync_request = add.pa_sync;
        slot.pa_interval = add.pa_interval;

        let src_id = slot.state.src_id;
        let index = slot.index();
        info!("src {}: added {:?}", src_id, slot.state);

        if add.pa_sync != PaSyncRequest::NoSync {
            if let Err(e) = sync::request_sync(slot, &mut self.pa, past_conn, now) {
                error!("src {}: failed to request PA sync: {}", src_id, e);
                self.store.free(index);
                return Err(ErrorCode::UnlikelyError);
            }
        }

        self.notify_slot(index, None);
        Ok(src_id)
    }

    /// Applies a Modify Source command.
    ///
    /// Changes are not rolled back: if tearing down or re-arming sync fails, the record is left as
    /// far as it got and still notified when it differs from before the command.
    fn modify_source(
        &mut self,
        modify: &ModifySource<'_>,
        conn: Option<ConnHandle>,
    ) -> Result<(), ErrorCode> {
        let past_conn = self.past_conn(conn, modify.pa_sync);
        let now = self.timer.now();
        let slot = self
            .store
            .lookup_by_source_id(modify.src_id)
            .ok_or(ErrorCode::InvalidSourceId)?;
        let (mut subgroups, requested) = build_subgroups(&modify.subgroups)?;

        let sync_changed = subgroups.len() != slot.state.subgroups.len()
            || requested != slot.requested_bis_sync
            || modify.pa_sync != slot.pa_sync_request;

        for (new, old) in subgroups.iter_mut().zip(slot.state.subgroups.iter()) {
            if new.metadata.is_empty() {
                new.metadata = old.metadata.clone();
            }
            if !sync_changed {
                new.bis_sync = old.bis_sync;
            }
        }

        let before = slot.state.clone();
        let (pa, big) = (&mut self.pa, &mut self.big);
        let teardown = if sync_changed {
            sync::bis_sync_cancel(slot, big).and_then(|()| sync::cancel_sync(slot, pa))
        } else {
            Ok(())
        };
        let result = teardown.and_then(|()| {
            slot.state.subgroups = subgroups;
            slot.requested_bis_sync = requested;
            slot.pa_sync_request = modify.pa_sync;
            slot.pa_interval = modify.pa_interval;

            if modify.pa_sync != PaSyncRequest::NoSync {
                sync::request_sync(slot, pa, past_conn, now)
            } else {
                Ok(())
            }
        });

        let index = slot.index();
        if slot.state != before {
            self.notify_slot(index, None);
        } else {
            debug!("src {}: nothing changed", modify.src_id);
        }
        result.map_err(|e| {
            error!("src {}: failed to update sync: {}", modify.src_id, e);
            ErrorCode::UnlikelyError
        })
    }

    fn set_broadcast_code(&mut self, src_id: u8, code: BroadcastCode) -> Result<(), ErrorCode> {
        let slot = self
            .store
            .lookup_by_source_id(src_id)
            .ok_or(ErrorCode::InvalidSourceId)?;
        debug!("src {}: broadcast code received", src_id);

        match slot.biginfo {
            Some(info) if info.encrypted => {
                let old_code = slot.broadcast_code.replace(code);
                let before = slot.state.big_encryption;
                let index = slot.index();

                let result = sync::decrypting_bis_sync(slot, &mut self.big, self.policy);
                if result.is_err() {
                    slot.broadcast_code = old_code;
                }
                if slot.state.big_encryption != before {
                    self.notify_slot(index, None);
                }
                result.map_err(|e| {
                    error!("src {}: BIS sync failed: {}", src_id, e);
                    ErrorCode::UnlikelyError
                })
            }
            _ => {
                slot.broadcast_code = Some(code);
                Ok(())
            }
        }
    }

    fn remove_source(&mut self, src_id: u8) -> Result<(), ErrorCode> {
        let slot = self
            .store
            .lookup_by_source_id(src_id)
            .ok_or(ErrorCode::InvalidSourceId)?;

        let (pa, big) = (&mut self.pa, &mut self.big);
        sync::bis_sync_cancel(slot, big)
            .and_then(|()| sync::cancel_sync(slot, pa))
            .map_err(|e| {
                error!("src {}: failed to tear down sync: {}", src_id, e);
                ErrorCode::UnlikelyError
            })?;

        let index = slot.index();
        self.store.free(index);
        info!("src {}: removed", src_id);
        self.gatt.notify(None, index, &[]);
        Ok(())
    }

    /// Notifies receive state `index` to `conn`, or to every subscribed client.
    fn notify_slot(&mut self, index: u8, conn: Option<ConnHandle>) {
        let slot = match self.store.get(index) {
            Some(slot) => slot,
            None => return,
        };

        let mut buf = [0; MAX_RECV_STATE_LEN];
        let len = if slot.is_active() {
            match encode_into(slot.receive_state(), &mut buf) {
                Ok(len) => len,
                Err(e) => {
                    error!("failed to encode receive state {}: {}", index, e);
                    return;
                }
            }
        } else {
            0
        };
        self.gatt.notify(conn, index, &buf[..len]);
    }
}
