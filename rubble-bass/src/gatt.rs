//! GATT description of the Broadcast Audio Scan Service.
//!
//! The host stack builds the attribute table from this description: one primary service holding
//! a single control point and `RECV_STATE_COUNT` receive state characteristics.

use crate::uuid::{
    AttUuid, BASS_CONTROL_POINT, BROADCAST_AUDIO_SCAN_SERVICE, BROADCAST_RECEIVE_STATE,
};
use bitflags::bitflags;

bitflags! {
    /// Characteristic properties, as found in a characteristic declaration.
    pub struct Properties: u8 {
        const BROADCAST    = 0x01;
        const READ         = 0x02;
        const WRITE_NO_RSP = 0x04;
        const WRITE        = 0x08;
        const NOTIFY       = 0x10;
        const INDICATE     = 0x20;
        const AUTH_WRITES  = 0x40;
        const EXTENDED     = 0x80;
    }
}

pub trait Characteristic {
    const PROPS: Properties;

    /// The UUID assigned to the characteristic type.
    const UUID: AttUuid;
}

/// The Broadcast Audio Scan Control Point.
///
/// Write-only; every state-changing command arrives here.
pub struct ControlPoint;

impl Characteristic for ControlPoint {
    const PROPS: Properties = Properties::from_bits_truncate(
        Properties::WRITE.bits() | Properties::WRITE_NO_RSP.bits(),
    );
    const UUID: AttUuid = AttUuid::Uuid16(BASS_CONTROL_POINT);
}

/// A Broadcast Receive State characteristic.
pub struct ReceiveState;

impl Characteristic for ReceiveState {
    const PROPS: Properties =
        Properties::from_bits_truncate(Properties::READ.bits() | Properties::NOTIFY.bits());
    const UUID: AttUuid = AttUuid::Uuid16(BROADCAST_RECEIVE_STATE);
}

/// UUID of the primary service.
pub const SERVICE_UUID: AttUuid = AttUuid::Uuid16(BROADCAST_AUDIO_SCAN_SERVICE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties() {
        assert!(ControlPoint::PROPS.contains(Properties::WRITE));
        assert!(!ControlPoint::PROPS.contains(Properties::READ));
        assert!(ReceiveState::PROPS.contains(Properties::NOTIFY | Properties::READ));
        assert!(!ReceiveState::PROPS.intersects(Properties::WRITE | Properties::WRITE_NO_RSP));
    }
}
