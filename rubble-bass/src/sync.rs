//! Per-source PA sync and BIG sync state machine.
//!
//! Each active [`Slot`] moves through the PA sync states of its receive state:
//!
//! ```notrust
//!              request_sync (PAST)                  PA synced
//! NotSynced ------------------------> InfoRequest ------------> Synced
//!     |                                    |                       |
//!     | request_sync (direct)              | timeout               | PA terminated
//!     | (stays NotSynced, pending)         v                       v
//!     +---------------------------->    NoPast                 NotSynced
//!                  timeout
//!     pending ------------------------> Failed
//! ```
//!
//! `Failed` and `NoPast` persist until the next Add/Modify Source command re-arms sync.
//!
//! Once synced, the first BIGInfo report determines the encryption state and triggers the BIG
//! sync if the client requested any BIS. The functions here only talk to the host services that
//! are passed in; notifying the new state to clients is left to the server.
//!
//! [`Slot`]: ../store/struct.Slot.html

use crate::{
    host::{
        BigInfo, BigSync, BigSyncParams, BigTermination, ConnHandle, HostError,
        PaSyncHandle, PaSyncParams, PeriodicSync,
    },
    pdu::{BigEncryption, BisSync, PaSyncState, PA_INTERVAL_UNKNOWN},
    store::{Slot, SyncTimeout},
    time::{Duration, Instant},
};
use core::fmt;

/// Number of periodic advertising events the controller may skip.
pub const PA_SYNC_SKIP: u16 = 5;

/// Number of PA intervals to wait for a sync before giving up.
pub const SYNC_RETRY_COUNT: u32 = 6;

// `sync_timeout` multiplies a 16-bit interval by the retry count in 32 bits
const _: () = assert!(SYNC_RETRY_COUNT <= u32::MAX / u16::MAX as u32);

/// Shortest sync timeout, in 10 ms units.
pub const MIN_SYNC_TIMEOUT: u16 = 0x000A;

/// Longest sync timeout, in 10 ms units.
pub const MAX_SYNC_TIMEOUT: u16 = 0x4000;

/// Errors raised while driving synchronization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A BIG sync already exists for this source.
    AlreadyInProgress,
    /// The source's periodic advertising is not synchronized (or no BIGInfo was received yet).
    NotSynced,
    /// A host service failed.
    Host(HostError),
}

impl From<HostError> for SyncError {
    fn from(e: HostError) -> Self {
        SyncError::Host(e)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AlreadyInProgress => f.write_str("BIG sync already in progress"),
            SyncError::NotSynced => f.write_str("not synchronized to periodic advertising"),
            SyncError::Host(e) => write!(f, "host error: {}", e),
        }
    }
}

/// Selects which of the requested BISes to synchronize to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BisSyncPolicy {
    /// Synchronize to the lowest requested BIS index only.
    LowestIndex,
    /// Synchronize to every requested BIS the BIG carries.
    AllRequested,
}

impl Default for BisSyncPolicy {
    fn default() -> Self {
        BisSyncPolicy::LowestIndex
    }
}

/// Computes the sync timeout (in 10 ms units) for a PA or ISO interval.
///
/// An unknown interval results in the longest timeout. Otherwise the timeout covers
/// `SYNC_RETRY_COUNT` intervals, clamped to the range the controller accepts.
pub fn sync_timeout(interval: u16) -> u16 {
    if interval == PA_INTERVAL_UNKNOWN {
        return MAX_SYNC_TIMEOUT;
    }

    let ticks = u32::from(interval) * SYNC_RETRY_COUNT / 10;
    let clamped = ticks.clamp(u32::from(MIN_SYNC_TIMEOUT), u32::from(MAX_SYNC_TIMEOUT));
    clamped as u16
}

/// Starts synchronizing to the periodic advertising of the source in `slot`.
///
/// When `past_conn` is set, the PA sync is expected to be transferred over that connection.
/// Otherwise the server synchronizes directly. Does nothing if the source is already synced or
/// a sync is pending.
pub fn request_sync<P: PeriodicSync>(
    slot: &mut Slot,
    pa: &mut P,
    past_conn: Option<ConnHandle>,
    now: Instant,
) -> Result<(), SyncError> {
    match slot.state.pa_sync_state {
        PaSyncState::Synced | PaSyncState::InfoRequest => return Ok(()),
        _ if slot.pa_sync_pending => return Ok(()),
        _ => {}
    }

    let timeout = sync_timeout(slot.pa_interval);
    match past_conn {
        Some(conn) => {
            pa.subscribe_past(conn, PA_SYNC_SKIP, timeout)?;
            slot.past_conn = Some(conn);
            slot.state.pa_sync_state = PaSyncState::InfoRequest;
            info!(
                "src {}: waiting for PAST on {:?}",
                slot.state.src_id, conn
            );
        }
        None => {
            let params = PaSyncParams {
                address: slot.state.address,
                sid: slot.state.adv_sid,
                skip: PA_SYNC_SKIP,
                timeout,
            };
            let handle = pa.create_sync(&params)?;
            slot.pa_sync = Some(handle);
            info!(
                "src {}: creating PA sync {:?} to {:?}",
                slot.state.src_id, handle, params.address
            );
        }
    }

    slot.pa_sync_pending = true;
    slot.timeout = Some(SyncTimeout::new(now, Duration::from_10ms_units(timeout)));
    Ok(())
}

/// Stops synchronizing to the source's periodic advertising.
///
/// Cancels the timeout, then deletes the PA sync. On failure, the handle is kept so that the
/// resource is not leaked and the operation can be retried.
pub fn cancel_sync<P: PeriodicSync>(slot: &mut Slot, pa: &mut P) -> Result<(), SyncError> {
    slot.timeout = None;

    if let Some(conn) = slot.past_conn {
        pa.unsubscribe_past(conn)?;
        slot.past_conn = None;
    }
    if let Some(handle) = slot.pa_sync {
        pa.delete_sync(handle)?;
        slot.pa_sync = None;
        debug!("src {}: deleted PA sync {:?}", slot.state.src_id, handle);
    }

    slot.pa_sync_pending = false;
    slot.biginfo = None;
    slot.state.pa_sync_state = PaSyncState::NotSynced;
    Ok(())
}

/// The periodic advertising of the source has been synchronized to via `handle`.
pub fn on_pa_synced<P: PeriodicSync>(slot: &mut Slot, pa: &mut P, handle: PaSyncHandle) {
    slot.timeout = None;
    if let Some(conn) = slot.past_conn.take() {
        if let Err(e) = pa.unsubscribe_past(conn) {
            warn!("failed to unsubscribe PAST on {:?}: {}", conn, e);
        }
    }

    slot.pa_sync = Some(handle);
    slot.pa_sync_pending = false;
    slot.state.pa_sync_state = PaSyncState::Synced;
    info!("src {}: PA synced ({:?})", slot.state.src_id, handle);
}

/// The PA sync of the source was lost or deleted by the host.
///
/// The BIG sync depends on the PA sync and is terminated too.
pub fn on_pa_terminated<B: BigSync>(slot: &mut Slot, big: &mut B) {
    slot.timeout = None;
    if let Err(e) = bis_sync_cancel(slot, big) {
        warn!("src {}: failed to terminate BIG: {}", slot.state.src_id, e);
    }

    slot.pa_sync = None;
    slot.pa_sync_pending = false;
    slot.biginfo = None;
    slot.state.pa_sync_state = PaSyncState::NotSynced;
    info!("src {}: PA sync terminated", slot.state.src_id);
}

/// Handles expiry of the slot's sync timeout.
///
/// A missing PAST is reported as `NoPast`, since the server may still sync directly later. Any
/// other pending sync is abandoned and reported as `Failed`.
pub fn on_timeout<P: PeriodicSync>(slot: &mut Slot, pa: &mut P) {
    slot.timeout = None;
    slot.pa_sync_pending = false;

    if slot.state.pa_sync_state == PaSyncState::InfoRequest {
        if let Some(conn) = slot.past_conn.take() {
            if let Err(e) = pa.unsubscribe_past(conn) {
                warn!("failed to unsubscribe PAST on {:?}: {}", conn, e);
            }
        }
        slot.state.pa_sync_state = PaSyncState::NoPast;
    } else {
        if let Some(handle) = slot.pa_sync {
            match pa.delete_sync(handle) {
                Ok(()) => slot.pa_sync = None,
                Err(e) => error!("failed to delete PA sync {:?}: {}", handle, e),
            }
        }
        slot.state.pa_sync_state = PaSyncState::Failed;
    }

    info!(
        "src {}: sync timed out, now {:?}",
        slot.state.src_id, slot.state.pa_sync_state
    );
}

/// Handles a BIGInfo report received on the source's PA sync.
///
/// Only the first report after the PA sync was established is acted upon.
pub fn on_biginfo<B: BigSync>(
    slot: &mut Slot,
    big: &mut B,
    info: BigInfo,
    policy: BisSyncPolicy,
) -> Result<(), SyncError> {
    if slot.biginfo.is_some() {
        return Ok(());
    }
    slot.biginfo = Some(info);
    debug!("src {}: {:?}", slot.state.src_id, info);

    if info.encrypted {
        slot.state.big_encryption = BigEncryption::BroadcastCodeRequired;
        if slot.broadcast_code.is_none() {
            return Ok(());
        }
        decrypting_bis_sync(slot, big, policy)
    } else {
        slot.state.big_encryption = BigEncryption::NotEncrypted;
        bis_sync(slot, big, policy)
    }
}

/// Attempts the BIS sync of an encrypted BIG using the stored Broadcast Code.
///
/// The source only reports `Decrypting` once a BIG sync was created with the code. If the attempt
/// fails, or no BIS is requested, the encryption state is left as it was.
pub fn decrypting_bis_sync<B: BigSync>(
    slot: &mut Slot,
    big: &mut B,
    policy: BisSyncPolicy,
) -> Result<(), SyncError> {
    bis_sync(slot, big, policy)?;
    if slot.big.is_some() {
        slot.state.big_encryption = BigEncryption::Decrypting;
    }
    Ok(())
}

/// Computes the BIS bitfield to synchronize to.
///
/// `requested` is the union of the client's requests, `num_bis` the number of BISes in the BIG.
/// Returns 0 if nothing should be synchronized to.
pub fn select_bis(requested: BisSync, num_bis: u8, policy: BisSyncPolicy) -> u32 {
    if requested.is_empty() {
        return 0;
    }

    let available = 1u32
        .checked_shl(u32::from(num_bis))
        .map_or(u32::MAX, |bit| bit - 1);
    let bits = if requested.is_no_preference() {
        available
    } else {
        requested.raw() & available
    };

    match policy {
        BisSyncPolicy::LowestIndex => bits & bits.wrapping_neg(),
        BisSyncPolicy::AllRequested => bits,
    }
}

/// Attempts to synchronize to the requested BISes of the source's BIG.
///
/// Requires an established PA sync and a received BIGInfo. Succeeds without doing anything if no
/// BIS is requested.
pub fn bis_sync<B: BigSync>(
    slot: &mut Slot,
    big: &mut B,
    policy: BisSyncPolicy,
) -> Result<(), SyncError> {
    let info = slot.biginfo.ok_or(SyncError::NotSynced)?;
    let pa = match (slot.state.pa_sync_state, slot.pa_sync) {
        (PaSyncState::Synced, Some(pa)) => pa,
        _ => return Err(SyncError::NotSynced),
    };

    let bis_bitfield = select_bis(slot.requested_bis_sync(), info.num_bis, policy);
    if bis_bitfield == 0 {
        return Ok(());
    }
    if slot.big.is_some() {
        return Err(SyncError::AlreadyInProgress);
    }

    let params = BigSyncParams {
        bis_bitfield,
        code: if info.encrypted {
            slot.broadcast_code
        } else {
            None
        },
        timeout: sync_timeout(info.iso_interval_ms),
    };
    let handle = big.create_sync(pa, &params)?;
    slot.big = Some(handle);
    info!(
        "src {}: syncing to BIS {:#010x} ({:?})",
        slot.state.src_id, bis_bitfield, handle
    );
    Ok(())
}

/// Terminates the source's BIG sync, if any.
pub fn bis_sync_cancel<B: BigSync>(slot: &mut Slot, big: &mut B) -> Result<(), SyncError> {
    if let Some(handle) = slot.big {
        big.terminate(handle)?;
        slot.big = None;
        debug!("src {}: terminated {:?}", slot.state.src_id, handle);
    }
    clear_bis_sync(slot);
    Ok(())
}

/// The BIG sync was established with the BISes in `bis_bitfield`.
///
/// Every subgroup reports the synchronized BISes it asked for. A subgroup without preference is
/// credited with the BISes no other subgroup asked for.
pub fn on_big_synced(slot: &mut Slot, bis_bitfield: u32) {
    let n = slot.state.subgroups.len();
    let explicit = slot.requested_bis_sync[..n]
        .iter()
        .filter(|bis| !bis.is_no_preference())
        .fold(0, |acc, bis| acc | bis.raw());

    for (sg, requested) in slot
        .state
        .subgroups
        .iter_mut()
        .zip(slot.requested_bis_sync.iter())
    {
        let synced = if requested.is_no_preference() {
            bis_bitfield & !explicit
        } else {
            bis_bitfield & requested.raw()
        };
        sg.bis_sync = BisSync::from_raw(synced);
    }
    info!(
        "src {}: BIG synced, BIS {:#010x}",
        slot.state.src_id, bis_bitfield
    );
}

/// The BIG sync ended.
///
/// A MIC failure means the stored Broadcast Code is wrong, which is reported back as `BadCode`.
pub fn on_big_terminated(slot: &mut Slot, reason: BigTermination) {
    slot.big = None;
    clear_bis_sync(slot);

    match reason {
        BigTermination::MicFailure => {
            if let Some(code) = slot.broadcast_code {
                slot.state.big_encryption = BigEncryption::BadCode(code);
            }
        }
        // Act on the next BIGInfo report again
        BigTermination::Other => slot.biginfo = None,
        BigTermination::Local => {}
    }
    info!(
        "src {}: BIG terminated ({:?})",
        slot.state.src_id, reason
    );
}

fn clear_bis_sync(slot: &mut Slot) {
    for sg in slot.state.subgroups.iter_mut() {
        sg.bis_sync = BisSync::NONE;
    }
}

/// Returns whether the timeout of `slot` has expired at `now`.
pub fn timeout_expired(slot: &Slot, now: Instant) -> bool {
    slot.timeout.map_or(false, |t| t.has_expired(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{AddressKind, DeviceAddress},
        host::BigHandle,
        mock::{MockBig, MockPaSync},
        pdu::{BroadcastCode, Subgroup},
        store::Store,
    };

    const NOW: Instant = Instant::from_raw_micros(1_000);

    fn source(store: &mut Store, requested: &[BisSync]) -> u8 {
        let slot = store.allocate().unwrap();
        slot.state.address = DeviceAddress::new([6, 5, 4, 3, 2, 1], AddressKind::Random);
        slot.state.adv_sid = 1;
        slot.pa_interval = PA_INTERVAL_UNKNOWN;
        for (i, bis) in requested.iter().enumerate() {
            slot.state.subgroups.push(Subgroup::default()).unwrap();
            slot.requested_bis_sync[i] = *bis;
        }
        slot.index()
    }

    fn synced(store: &mut Store, requested: &[BisSync]) -> u8 {
        let index = source(store, requested);
        let slot = store.get_mut(index).unwrap();
        slot.state.pa_sync_state = PaSyncState::Synced;
        slot.pa_sync = Some(PaSyncHandle(7));
        index
    }

    const PLAIN: BigInfo = BigInfo {
        num_bis: 4,
        iso_interval_ms: 10,
        encrypted: false,
    };

    #[test]
    fn timeout_computation() {
        assert_eq!(sync_timeout(PA_INTERVAL_UNKNOWN), MAX_SYNC_TIMEOUT);
        assert_eq!(sync_timeout(0), MIN_SYNC_TIMEOUT);
        assert_eq!(sync_timeout(10), MIN_SYNC_TIMEOUT);
        assert_eq!(sync_timeout(100), 60);
        assert_eq!(sync_timeout(0xFFFE), MAX_SYNC_TIMEOUT);
    }

    #[test]
    fn bis_selection() {
        let lowest = BisSyncPolicy::LowestIndex;
        let all = BisSyncPolicy::AllRequested;
        assert_eq!(select_bis(BisSync::NONE, 4, lowest), 0);
        assert_eq!(select_bis(BisSync::NO_PREFERENCE, 4, lowest), 0b0001);
        assert_eq!(select_bis(BisSync::NO_PREFERENCE, 4, all), 0b1111);
        assert_eq!(select_bis(BisSync::NO_PREFERENCE, 32, all), u32::MAX);
        assert_eq!(select_bis(BisSync::from_raw(0b1100), 3, lowest), 0b0100);
        assert_eq!(select_bis(BisSync::from_raw(0b1100), 4, all), 0b1100);
        // Requested BIS beyond the BIG
        assert_eq!(select_bis(BisSync::from_raw(0b1000), 3, lowest), 0);
    }

    #[test]
    fn direct_sync() {
        let mut store = Store::new();
        let mut pa = MockPaSync::default();
        let index = source(&mut store, &[]);
        let slot = store.get_mut(index).unwrap();

        request_sync(slot, &mut pa, None, NOW).unwrap();
        assert_eq!(slot.state.pa_sync_state, PaSyncState::NotSynced);
        assert!(slot.pa_sync_pending);
        assert_eq!(pa.created.len(), 1);
        assert_eq!(pa.created[0].skip, PA_SYNC_SKIP);
        assert_eq!(pa.created[0].timeout, MAX_SYNC_TIMEOUT);
        assert_eq!(
            slot.timeout.unwrap().deadline(),
            NOW + Duration::from_10ms_units(MAX_SYNC_TIMEOUT)
        );

        // Pending: not requested again
        request_sync(slot, &mut pa, None, NOW).unwrap();
        assert_eq!(pa.created.len(), 1);

        let handle = slot.pa_sync.unwrap();
        on_pa_synced(slot, &mut pa, handle);
        assert_eq!(slot.state.pa_sync_state, PaSyncState::Synced);
        assert!(!slot.pa_sync_pending);
        assert!(slot.timeout.is_none());
    }

    #[test]
    fn past_times_out_to_no_past() {
        let mut store = Store::new();
        let mut pa = MockPaSync::default();
        let index = source(&mut store, &[]);
        let slot = store.get_mut(index).unwrap();

        request_sync(slot, &mut pa, Some(ConnHandle(1)), NOW).unwrap();
        assert_eq!(slot.state.pa_sync_state, PaSyncState::InfoRequest);
        assert_eq!(pa.past_subscribed, vec![ConnHandle(1)]);
        assert!(pa.created.is_empty());

        on_timeout(slot, &mut pa);
        assert_eq!(slot.state.pa_sync_state, PaSyncState::NoPast);
        assert_eq!(pa.past_unsubscribed, vec![ConnHandle(1)]);
        assert!(!slot.pa_sync_pending);
    }

    #[test]
    fn direct_sync_times_out_to_failed() {
        let mut store = Store::new();
        let mut pa = MockPaSync::default();
        let index = source(&mut store, &[]);
        let slot = store.get_mut(index).unwrap();

        request_sync(slot, &mut pa, None, NOW).unwrap();
        let handle = slot.pa_sync.unwrap();
        assert!(!timeout_expired(slot, NOW));
        assert!(timeout_expired(
            slot,
            NOW + Duration::from_10ms_units(MAX_SYNC_TIMEOUT)
        ));

        on_timeout(slot, &mut pa);
        assert_eq!(slot.state.pa_sync_state, PaSyncState::Failed);
        assert_eq!(pa.deleted, vec![handle]);
        assert_eq!(slot.pa_sync, None);
    }

    #[test]
    fn cancel_keeps_handle_on_failure() {
        let mut store = Store::new();
        let mut pa = MockPaSync::default();
        let index = synced(&mut store, &[]);
        let slot = store.get_mut(index).unwrap();

        pa.fail_delete = true;
        assert_eq!(
            cancel_sync(slot, &mut pa),
            Err(SyncError::Host(HostError::Failed))
        );
        assert_eq!(slot.pa_sync, Some(PaSyncHandle(7)));

        pa.fail_delete = false;
        cancel_sync(slot, &mut pa).unwrap();
        assert_eq!(slot.pa_sync, None);
        assert_eq!(slot.state.pa_sync_state, PaSyncState::NotSynced);
    }

    #[test]
    fn unencrypted_biginfo_syncs_lowest_bis() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::NO_PREFERENCE]);
        let slot = store.get_mut(index).unwrap();

        on_biginfo(slot, &mut big, PLAIN, BisSyncPolicy::LowestIndex).unwrap();
        assert_eq!(slot.state.big_encryption, BigEncryption::NotEncrypted);
        assert_eq!(
            big.created,
            vec![(
                PaSyncHandle(7),
                BigSyncParams {
                    bis_bitfield: 0b0001,
                    code: None,
                    timeout: MIN_SYNC_TIMEOUT,
                }
            )]
        );

        // Subsequent reports are ignored
        on_biginfo(slot, &mut big, PLAIN, BisSyncPolicy::LowestIndex).unwrap();
        assert_eq!(big.created.len(), 1);

        // A BIG already exists
        assert_eq!(
            bis_sync(slot, &mut big, BisSyncPolicy::LowestIndex),
            Err(SyncError::AlreadyInProgress)
        );
    }

    #[test]
    fn encrypted_biginfo_needs_code() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::from_raw(0b10)]);
        let slot = store.get_mut(index).unwrap();
        let info = BigInfo {
            encrypted: true,
            ..PLAIN
        };

        on_biginfo(slot, &mut big, info, BisSyncPolicy::LowestIndex).unwrap();
        assert_eq!(
            slot.state.big_encryption,
            BigEncryption::BroadcastCodeRequired
        );
        assert!(big.created.is_empty());

        let code = BroadcastCode::new([9; 16]);
        slot.broadcast_code = Some(code);
        bis_sync(slot, &mut big, BisSyncPolicy::LowestIndex).unwrap();
        assert_eq!(big.created[0].1.code, Some(code));
        assert_eq!(big.created[0].1.bis_bitfield, 0b10);
    }

    #[test]
    fn nothing_requested_is_not_an_error() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::NONE]);
        let slot = store.get_mut(index).unwrap();

        on_biginfo(slot, &mut big, PLAIN, BisSyncPolicy::AllRequested).unwrap();
        assert!(big.created.is_empty());
    }

    #[test]
    fn decrypting_only_with_a_big() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::NONE]);
        let slot = store.get_mut(index).unwrap();
        slot.broadcast_code = Some(BroadcastCode::new([1; 16]));
        let info = BigInfo {
            encrypted: true,
            ..PLAIN
        };

        // Code present, but nothing to sync to
        on_biginfo(slot, &mut big, info, BisSyncPolicy::LowestIndex).unwrap();
        assert!(big.created.is_empty());
        assert_eq!(
            slot.state.big_encryption,
            BigEncryption::BroadcastCodeRequired
        );

        // A BIG that is already running is not replaced
        slot.requested_bis_sync[0] = BisSync::from_raw(0b1);
        slot.big = Some(BigHandle(3));
        assert_eq!(
            decrypting_bis_sync(slot, &mut big, BisSyncPolicy::LowestIndex),
            Err(SyncError::AlreadyInProgress)
        );
        assert_eq!(
            slot.state.big_encryption,
            BigEncryption::BroadcastCodeRequired
        );

        slot.big = None;
        decrypting_bis_sync(slot, &mut big, BisSyncPolicy::LowestIndex).unwrap();
        assert_eq!(slot.state.big_encryption, BigEncryption::Decrypting);
        assert_eq!(big.created.len(), 1);
    }

    #[test]
    fn bis_sync_requires_pa_sync() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = source(&mut store, &[BisSync::NO_PREFERENCE]);
        let slot = store.get_mut(index).unwrap();
        slot.biginfo = Some(PLAIN);

        assert_eq!(
            bis_sync(slot, &mut big, BisSyncPolicy::LowestIndex),
            Err(SyncError::NotSynced)
        );
    }

    #[test]
    fn synced_bis_respect_requests() {
        let mut store = Store::new();
        let index = synced(
            &mut store,
            &[BisSync::from_raw(0b0011), BisSync::NO_PREFERENCE],
        );
        let slot = store.get_mut(index).unwrap();

        on_big_synced(slot, 0b0110);
        assert_eq!(slot.state.subgroups[0].bis_sync, BisSync::from_raw(0b0010));
        assert_eq!(slot.state.subgroups[1].bis_sync, BisSync::from_raw(0b0100));
    }

    #[test]
    fn mic_failure_reports_bad_code() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::NO_PREFERENCE]);
        let slot = store.get_mut(index).unwrap();
        let code = BroadcastCode::new([3; 16]);
        slot.broadcast_code = Some(code);

        on_biginfo(
            slot,
            &mut big,
            BigInfo {
                encrypted: true,
                ..PLAIN
            },
            BisSyncPolicy::LowestIndex,
        )
        .unwrap();
        assert_eq!(slot.state.big_encryption, BigEncryption::Decrypting);
        on_big_synced(slot, 0b1);

        on_big_terminated(slot, BigTermination::MicFailure);
        assert_eq!(slot.state.big_encryption, BigEncryption::BadCode(code));
        assert_eq!(slot.big, None);
        assert!(slot.state.subgroups[0].bis_sync.is_empty());
    }

    #[test]
    fn pa_loss_tears_down_big() {
        let mut store = Store::new();
        let mut big = MockBig::default();
        let index = synced(&mut store, &[BisSync::NO_PREFERENCE]);
        let slot = store.get_mut(index).unwrap();
        on_biginfo(slot, &mut big, PLAIN, BisSyncPolicy::LowestIndex).unwrap();
        let handle = slot.big.unwrap();

        on_pa_terminated(slot, &mut big);
        assert_eq!(big.terminated, vec![handle]);
        assert_eq!(slot.big, None);
        assert_eq!(slot.biginfo, None);
        assert_eq!(slot.state.pa_sync_state, PaSyncState::NotSynced);
    }
}
