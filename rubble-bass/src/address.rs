use crate::{bytes::*, Error};
use core::{convert::TryFrom, fmt};

wire_enum! {
    /// Specifies whether an advertiser address is randomly generated or a LAN MAC address.
    ///
    /// BASS transmits this as the `Advertiser_Address_Type` byte; values above `Random` are
    /// rejected.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub enum AddressKind(u8) {
        /// Publicly registered IEEE 802-2001 LAN MAC address.
        Public = 0x00,
        /// Randomly generated address.
        Random = 0x01,
    }
}

/// The address of a broadcast source (the advertiser carrying its periodic advertising train).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    bytes: [u8; 6],
    kind: AddressKind,
}

impl DeviceAddress {
    /// Create a new device address from 6 raw Bytes and an address kind specifier.
    ///
    /// The `bytes` array contains the address Bytes as they are sent over the air (LSB first).
    pub fn new(bytes: [u8; 6], kind: AddressKind) -> Self {
        DeviceAddress { bytes, kind }
    }

    /// Returns the address kind.
    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Returns the raw bytes making up this address.
    pub fn raw(&self) -> &[u8; 6] {
        &self.bytes
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Conventionally printed MSB first
        for (i, b) in self.bytes.iter().rev().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }

        write!(f, "({:?})", self.kind)
    }
}

/// Encoded as the address type byte followed by the 6 address bytes.
impl ToBytes for DeviceAddress {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.kind.into())?;
        writer.write_slice(&self.bytes)
    }
}

impl FromBytes<'_> for DeviceAddress {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let kind = AddressKind::try_from(bytes.read_u8()?)?;
        let raw = bytes.read_array()?;
        Ok(DeviceAddress::new(raw, kind))
    }
}
