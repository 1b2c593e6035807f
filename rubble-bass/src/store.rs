//! Fixed-capacity table of receive states.
//!
//! Every receive state characteristic of the server is backed by one [`Slot`]. The slot's index
//! never changes and ties it to its characteristic. A slot holds the wire-visible
//! [`ReceiveState`] plus everything the server needs to drive synchronization: the requested
//! BIS bitfields, the (secret) Broadcast Code, handles of host resources and the sync timeout.
//!
//! [`Slot`]: struct.Slot.html
//! [`ReceiveState`]: ../pdu/struct.ReceiveState.html

use crate::{
    address::{AddressKind, DeviceAddress},
    att::ErrorCode,
    host::{BigHandle, BigInfo, ConnHandle, PaSyncHandle},
    pdu::{
        BigEncryption, BisSync, BroadcastCode, BroadcastId, PaSyncRequest, PaSyncState,
        ReceiveState,
    },
    time::{Duration, Instant},
    MAX_SUBGROUPS, RECV_STATE_COUNT,
};
use heapless::Vec;

/// The single pending timeout of a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SyncTimeout {
    armed: Instant,
    after: Duration,
}

impl SyncTimeout {
    pub fn new(armed: Instant, after: Duration) -> Self {
        Self { armed, after }
    }

    /// The point in time at which the timeout fires.
    pub fn deadline(&self) -> Instant {
        self.armed + self.after
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        now.duration_since(self.armed) >= self.after
    }

    /// Time left until the timeout fires, zero if it has expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        let elapsed = now.duration_since(self.armed).as_micros();
        Duration::from_micros(self.after.as_micros().saturating_sub(elapsed))
    }
}

/// State backing one receive state characteristic.
#[derive(Debug)]
pub struct Slot {
    index: u8,
    pub(crate) active: bool,
    pub(crate) state: ReceiveState,
    /// BIS indices requested by the client, per subgroup.
    pub(crate) requested_bis_sync: [BisSync; MAX_SUBGROUPS],
    pub(crate) broadcast_code: Option<BroadcastCode>,
    pub(crate) pa_sync_request: PaSyncRequest,
    pub(crate) pa_interval: u16,
    /// A PA sync or a sync transfer has been requested and not yet established.
    pub(crate) pa_sync_pending: bool,
    pub(crate) pa_sync: Option<PaSyncHandle>,
    /// Connection PAST was subscribed on, while waiting for a transfer.
    pub(crate) past_conn: Option<ConnHandle>,
    pub(crate) timeout: Option<SyncTimeout>,
    pub(crate) biginfo: Option<BigInfo>,
    pub(crate) big: Option<BigHandle>,
}

impl Slot {
    fn new(index: u8) -> Self {
        Self {
            index,
            active: false,
            state: ReceiveState {
                src_id: 0,
                address: DeviceAddress::new([0; 6], AddressKind::Public),
                adv_sid: 0,
                broadcast_id: BroadcastId::new(0),
                pa_sync_state: PaSyncState::NotSynced,
                big_encryption: BigEncryption::NotEncrypted,
                subgroups: Vec::new(),
            },
            requested_bis_sync: [BisSync::NONE; MAX_SUBGROUPS],
            broadcast_code: None,
            pa_sync_request: PaSyncRequest::NoSync,
            pa_interval: 0,
            pa_sync_pending: false,
            pa_sync: None,
            past_conn: None,
            timeout: None,
            biginfo: None,
            big: None,
        }
    }

    /// Index of the receive state characteristic this slot backs.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn receive_state(&self) -> &ReceiveState {
        &self.state
    }

    /// Returns the union of the requested BIS bitfields of all subgroups.
    ///
    /// If any subgroup has no preference, so does the union.
    pub fn requested_bis_sync(&self) -> BisSync {
        let n = self.state.subgroups.len();
        BisSync::from_raw(
            self.requested_bis_sync[..n]
                .iter()
                .fold(0, |acc, bis| acc | bis.raw()),
        )
    }
}

/// The receive state table.
#[derive(Debug)]
pub struct Store {
    slots: [Slot; RECV_STATE_COUNT],
    next_src_id: u8,
}

impl Store {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| Slot::new(i as u8)),
            next_src_id: 0,
        }
    }

    /// Activates the first unused slot and assigns it a fresh Source ID.
    ///
    /// Fails with `InsufficientResources` if every slot is in use.
    pub fn allocate(&mut self) -> Result<&mut Slot, ErrorCode> {
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.active)
            .ok_or(ErrorCode::InsufficientResources)?;
        let src_id = self.next_source_id();

        let slot = &mut self.slots[index];
        slot.active = true;
        slot.state.src_id = src_id;
        Ok(slot)
    }

    /// Returns the next Source ID not used by an active slot.
    ///
    /// IDs are handed out in increasing order and wrap around after 255.
    fn next_source_id(&mut self) -> u8 {
        loop {
            let id = self.next_src_id;
            self.next_src_id = self.next_src_id.wrapping_add(1);
            // There are far fewer slots than IDs, so this terminates quickly
            if !self.iter().any(|slot| slot.state.src_id == id) {
                return id;
            }
        }
    }

    /// Deactivates slot `index` and erases all of its state.
    pub fn free(&mut self, index: u8) {
        if let Some(slot) = self.slots.get_mut(usize::from(index)) {
            // Overwrite the secret in place before the slot is reset
            if let BigEncryption::BadCode(code) = &mut slot.state.big_encryption {
                *code = BroadcastCode::default();
            }
            if let Some(code) = &mut slot.broadcast_code {
                *code = BroadcastCode::default();
            }
            *slot = Slot::new(index);
        }
    }

    /// Returns slot `index`, active or not.
    pub fn get(&self, index: u8) -> Option<&Slot> {
        self.slots.get(usize::from(index))
    }

    pub fn get_mut(&mut self, index: u8) -> Option<&mut Slot> {
        self.slots.get_mut(usize::from(index))
    }

    /// Iterates over the active slots.
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|slot| slot.active)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots.iter_mut().filter(|slot| slot.active)
    }

    pub fn lookup_by_source_id(&mut self, src_id: u8) -> Option<&mut Slot> {
        self.iter_mut().find(|slot| slot.state.src_id == src_id)
    }

    pub fn lookup_by_pa_sync_handle(&mut self, handle: PaSyncHandle) -> Option<&mut Slot> {
        self.iter_mut().find(|slot| slot.pa_sync == Some(handle))
    }

    pub fn lookup_by_big_handle(&mut self, big: BigHandle) -> Option<&mut Slot> {
        self.iter_mut().find(|slot| slot.big == Some(big))
    }

    /// Finds the slot tracking the advertising set `sid` of `address`.
    pub fn lookup_by_address(&mut self, address: &DeviceAddress, sid: u8) -> Option<&mut Slot> {
        self.iter_mut()
            .find(|slot| slot.state.address == *address && slot.state.adv_sid == sid)
    }
}
