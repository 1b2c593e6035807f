//! Service and characteristic UUIDs.
//!
//! Bluetooth assigns 16-bit aliases to SIG-defined services and characteristics. The full 128-bit
//! form is obtained by placing the alias into the Bluetooth Base UUID,
//! `00000000-0000-1000-8000-00805F9B34FB`, so that `0x184F` becomes
//! `0000184F-0000-1000-8000-00805F9B34FB`.
//!
//! A GATT client may report a discovered attribute type in either form, so [`AttUuid`] compares
//! equal across both representations.
//!
//! [`AttUuid`]: enum.AttUuid.html

use core::fmt;
use uuid::Uuid;

const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, /*-*/ 0x00, 0x00, /*-*/ 0x10, 0x00, /*-*/ 0x80, 0x00,
    /*-*/ 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// A 16-bit UUID alias.
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Uuid16(pub u16);

/// Broadcast Audio Scan Service.
pub const BROADCAST_AUDIO_SCAN_SERVICE: Uuid16 = Uuid16(0x184F);

/// Broadcast Audio Scan Control Point characteristic.
pub const BASS_CONTROL_POINT: Uuid16 = Uuid16(0x2BC7);

/// Broadcast Receive State characteristic.
pub const BROADCAST_RECEIVE_STATE: Uuid16 = Uuid16(0x2BC8);

impl From<Uuid16> for Uuid {
    fn from(uuid: Uuid16) -> Self {
        let mut buf = BASE_UUID;
        buf[2..4].copy_from_slice(&uuid.0.to_be_bytes());
        Uuid::from_bytes(buf)
    }
}

impl fmt::Debug for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid16({:04x})", self.0)
    }
}

/// ATT protocol UUID (either a 16 or a 128-bit UUID).
#[derive(Copy, Clone, Eq)]
pub enum AttUuid {
    Uuid16(Uuid16),
    Uuid128(Uuid),
}

impl PartialEq for AttUuid {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // 16-bit UUIDs can be compared directly
            (AttUuid::Uuid16(a), AttUuid::Uuid16(b)) => a == b,

            // All other combinations need to convert to 128-bit UUIDs
            (AttUuid::Uuid128(a), b) | (b, AttUuid::Uuid128(a)) => {
                let b: Uuid = (*b).into();
                *a == b
            }
        }
    }
}

impl PartialEq<Uuid16> for AttUuid {
    fn eq(&self, other: &Uuid16) -> bool {
        self == &Self::from(*other)
    }
}

impl From<Uuid16> for AttUuid {
    fn from(uu: Uuid16) -> Self {
        AttUuid::Uuid16(uu)
    }
}

impl From<Uuid> for AttUuid {
    fn from(uu: Uuid) -> Self {
        AttUuid::Uuid128(uu)
    }
}

impl From<AttUuid> for Uuid {
    fn from(uu: AttUuid) -> Self {
        match uu {
            AttUuid::Uuid16(u) => u.into(),
            AttUuid::Uuid128(u) => u,
        }
    }
}

impl fmt::Debug for AttUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttUuid::Uuid16(u) => u.fmt(f),
            AttUuid::Uuid128(u) => write!(f, "{}", u),
        }
    }
}
