//! Wire format of the Broadcast Receive State value and of Control Point commands.
//!
//! A receive state is encoded as:
//!
//! ```notrust
//! +--------+-----------+------+---------+--------------+---------+------------+----------+-----------+
//! | Src_ID | Addr_Type | Addr | Adv_SID | Broadcast_ID | PA_Sync | BIG_Enc    | Bad_Code | Num_Subgr |
//! |   1    |     1     |  6   |    1    |      3       |    1    |     1      | 0 or 16  |     1     |
//! +--------+-----------+------+---------+--------------+---------+------------+----------+-----------+
//! ```
//!
//! followed by `Num_Subgr` subgroups of `BIS_Sync (4) | Metadata_Length (1) | Metadata`.
//! `Bad_Code` is only present when `BIG_Enc` is *Bad Code*.
//!
//! Control point commands start with an [`Opcode`] byte followed by an opcode-specific body. The
//! command types borrow from the written buffer and are decoded in full (including every subgroup)
//! before anything looks at them, so a truncated or overlong PDU never reaches the server logic.
//!
//! [`Opcode`]: enum.Opcode.html

use crate::{
    address::DeviceAddress,
    bytes::*,
    utils::HexSlice,
    Error, MAX_METADATA_LEN, MAX_SUBGROUPS,
};
use core::{
    convert::{TryFrom, TryInto},
    fmt,
};
use heapless::Vec;

/// Size of a receive state without bad code and without subgroups.
pub const MIN_RECV_STATE_LEN: usize = 15;

/// Largest receive state this implementation can produce or accept.
pub const MAX_RECV_STATE_LEN: usize =
    MIN_RECV_STATE_LEN + BroadcastCode::LEN + MAX_SUBGROUPS * (5 + MAX_METADATA_LEN);

/// Largest control point command this implementation sends (an Add Source with every subgroup
/// carrying maximum-size metadata).
pub const MAX_COMMAND_LEN: usize = 16 + MAX_SUBGROUPS * (5 + MAX_METADATA_LEN);

/// Highest advertising SID an extended advertising set can use.
pub const MAX_ADV_SID: u8 = 0x0F;

/// PA interval value meaning "unknown".
pub const PA_INTERVAL_UNKNOWN: u16 = 0xFFFF;

wire_enum! {
    /// Control point opcodes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum Opcode(u8) {
        /// The client stopped scanning for broadcast sources on our behalf.
        RemoteScanStopped = 0x00,
        /// The client started scanning for broadcast sources on our behalf.
        RemoteScanStarted = 0x01,
        AddSource = 0x02,
        ModifySource = 0x03,
        SetBroadcastCode = 0x04,
        RemoveSource = 0x05,
    }
}

wire_enum! {
    /// The client's request regarding synchronization to a source's periodic advertising.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PaSyncRequest(u8) {
        /// Do not synchronize (or stop synchronizing).
        NoSync = 0x00,
        /// Synchronize, using PAST from the client if possible.
        SyncPast = 0x01,
        /// Synchronize directly, PAST is not available.
        SyncNoPast = 0x02,
    }
}

wire_enum! {
    /// Synchronization state of the server to a source's periodic advertising train.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PaSyncState(u8) {
        NotSynced = 0x00,
        /// Waiting for the client to transfer sync info via PAST.
        InfoRequest = 0x01,
        Synced = 0x02,
        Failed = 0x03,
        /// PAST was requested but did not complete.
        NoPast = 0x04,
    }
}

/// A 24-bit Broadcast ID, identifying a broadcast source.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct BroadcastId(u32);

impl BroadcastId {
    /// Creates a Broadcast ID, discarding bits above bit 23.
    pub const fn new(raw: u32) -> Self {
        BroadcastId(raw & 0x00FF_FFFF)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08X}", self.0)
    }
}

/// A 16-byte Broadcast Code used to decrypt an encrypted BIG.
///
/// This is a secret. Its `Debug` representation does not reveal the value.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct BroadcastCode([u8; 16]);

impl BroadcastCode {
    pub const LEN: usize = 16;

    pub fn new(raw: [u8; 16]) -> Self {
        BroadcastCode(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for BroadcastCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BroadcastCode(..)")
    }
}

/// A bitfield of BIS indices (bit `n` stands for BIS index `n + 1`).
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct BisSync(u32);

impl BisSync {
    /// No BIS.
    pub const NONE: Self = BisSync(0);

    /// "Synchronize to any BIS". Only meaningful as a request.
    pub const NO_PREFERENCE: Self = BisSync(0xFFFF_FFFF);

    pub const fn from_raw(raw: u32) -> Self {
        BisSync(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_no_preference(&self) -> bool {
        *self == Self::NO_PREFERENCE
    }

    /// Returns whether `self` is acceptable as a requested value.
    ///
    /// There are only 31 BIS indices, so bit 31 may only be set as part of `NO_PREFERENCE`.
    pub fn is_valid_request(&self) -> bool {
        self.is_no_preference() || self.0 & 0x8000_0000 == 0
    }

    /// Returns whether two requested bitfields ask for a common BIS.
    ///
    /// `NO_PREFERENCE` never conflicts with anything.
    pub fn conflicts_with(&self, other: BisSync) -> bool {
        !self.is_no_preference() && !other.is_no_preference() && self.0 & other.0 != 0
    }

    /// Returns whether every BIS in `self` is allowed by the request `requested`.
    pub fn is_subset_of(&self, requested: BisSync) -> bool {
        requested.is_no_preference() || self.0 & !requested.0 == 0
    }
}

impl fmt::Debug for BisSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_preference() {
            f.write_str("NoPreference")
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

/// Encryption state of a source's BIG.
///
/// The code that failed to decrypt is carried by the `BadCode` variant, so it can only exist in
/// that state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BigEncryption {
    NotEncrypted,
    /// The BIG is encrypted and the server needs a Broadcast Code.
    BroadcastCodeRequired,
    Decrypting,
    BadCode(BroadcastCode),
}

impl BigEncryption {
    /// Returns the raw `BIG_Encryption` field value.
    pub fn raw(&self) -> u8 {
        match self {
            BigEncryption::NotEncrypted => 0x00,
            BigEncryption::BroadcastCodeRequired => 0x01,
            BigEncryption::Decrypting => 0x02,
            BigEncryption::BadCode(_) => 0x03,
        }
    }
}

impl Default for BigEncryption {
    fn default() -> Self {
        BigEncryption::NotEncrypted
    }
}

/// A subgroup of a receive state.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Subgroup {
    /// BISes the server is currently synchronized to.
    pub bis_sync: BisSync,
    /// LTV-formatted metadata, opaque to BASS.
    pub metadata: Vec<u8, MAX_METADATA_LEN>,
}

impl fmt::Debug for Subgroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subgroup")
            .field("bis_sync", &self.bis_sync)
            .field("metadata", &HexSlice(&self.metadata[..]))
            .finish()
    }
}

/// The value of a Broadcast Receive State characteristic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReceiveState {
    pub src_id: u8,
    pub address: DeviceAddress,
    pub adv_sid: u8,
    pub broadcast_id: BroadcastId,
    pub pa_sync_state: PaSyncState,
    pub big_encryption: BigEncryption,
    pub subgroups: Vec<Subgroup, MAX_SUBGROUPS>,
}

impl ReceiveState {
    /// Returns the union of the BIS bitfields of all subgroups.
    pub fn bis_sync(&self) -> BisSync {
        BisSync(self.subgroups.iter().fold(0, |acc, sg| acc | sg.bis_sync.0))
    }
}

impl ToBytes for ReceiveState {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.src_id)?;
        self.address.to_bytes(writer)?;
        writer.write_u8(self.adv_sid)?;
        writer.write_u24_le(self.broadcast_id.0)?;
        writer.write_u8(self.pa_sync_state.into())?;
        writer.write_u8(self.big_encryption.raw())?;
        if let BigEncryption::BadCode(code) = &self.big_encryption {
            writer.write_slice(code.as_bytes())?;
        }

        // Capacity of `subgroups` and `metadata` is far below 256
        writer.write_u8(self.subgroups.len() as u8)?;
        for sg in &self.subgroups {
            writer.write_u32_le(sg.bis_sync.0)?;
            writer.write_u8(sg.metadata.len() as u8)?;
            writer.write_slice(&sg.metadata)?;
        }
        Ok(())
    }
}

impl<'a> FromBytes<'a> for ReceiveState {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        if bytes.bytes_left() < MIN_RECV_STATE_LEN {
            return Err(Error::InvalidLength);
        }

        read_receive_state(bytes).map_err(|e| match e {
            // Any declared length that runs past the buffer
            Error::Eof => Error::InvalidLength,
            e => e,
        })
    }
}

fn read_receive_state(bytes: &mut ByteReader<'_>) -> Result<ReceiveState, Error> {
    let src_id = bytes.read_u8()?;
    let address = DeviceAddress::from_bytes(bytes)?;
    let adv_sid = bytes.read_u8()?;
    let broadcast_id = BroadcastId(bytes.read_u24_le()?);
    let pa_sync_state = PaSyncState::try_from(bytes.read_u8()?)?;
    let big_encryption = match bytes.read_u8()? {
        0x00 => BigEncryption::NotEncrypted,
        0x01 => BigEncryption::BroadcastCodeRequired,
        0x02 => BigEncryption::Decrypting,
        0x03 => BigEncryption::BadCode(BroadcastCode(bytes.read_array()?)),
        _ => return Err(Error::InvalidValue),
    };

    let num_subgroups = usize::from(bytes.read_u8()?);
    if num_subgroups > MAX_SUBGROUPS {
        return Err(Error::InvalidLength);
    }

    let mut subgroups = Vec::new();
    for _ in 0..num_subgroups {
        let bis_sync = BisSync(bytes.read_u32_le()?);
        let len = usize::from(bytes.read_u8()?);
        if len > MAX_METADATA_LEN {
            return Err(Error::InvalidLength);
        }

        let mut metadata = Vec::new();
        metadata
            .extend_from_slice(bytes.read_slice(len)?)
            .map_err(|()| Error::InvalidLength)?;
        subgroups
            .push(Subgroup { bis_sync, metadata })
            .map_err(|_| Error::InvalidLength)?;
    }

    Ok(ReceiveState {
        src_id,
        address,
        adv_sid,
        broadcast_id,
        pa_sync_state,
        big_encryption,
        subgroups,
    })
}

/// A subgroup as carried by Add Source and Modify Source commands.
///
/// `bis_sync` is the *requested* BIS bitfield. An empty `metadata` in a Modify Source command
/// leaves the stored metadata of that subgroup untouched.
#[derive(Copy, Clone)]
pub struct SubgroupParams<'a> {
    pub bis_sync: BisSync,
    pub metadata: &'a [u8],
}

impl fmt::Debug for SubgroupParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubgroupParams")
            .field("bis_sync", &self.bis_sync)
            .field("metadata", &HexSlice(self.metadata))
            .finish()
    }
}

impl<'a> FromBytes<'a> for SubgroupParams<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let bis_sync = BisSync(bytes.read_u32_le()?);
        let len = bytes.read_u8()?;
        let metadata = bytes.read_slice(usize::from(len))?;
        Ok(SubgroupParams { bis_sync, metadata })
    }
}

impl ToBytes for SubgroupParams<'_> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let len: u8 = self
            .metadata
            .len()
            .try_into()
            .map_err(|_| Error::InvalidLength)?;
        writer.write_u32_le(self.bis_sync.0)?;
        writer.write_u8(len)?;
        writer.write_slice(self.metadata)
    }
}

/// The list of subgroups terminating an Add Source or Modify Source command.
pub type SubgroupList<'a> = BytesOr<'a, [SubgroupParams<'a>]>;

/// Reads `Num_Subgroups` and the subgroups following it, which must span the rest of the command.
fn read_subgroups<'a>(bytes: &mut ByteReader<'a>) -> Result<SubgroupList<'a>, Error> {
    let count = usize::from(bytes.read_u8()?);
    let list = SubgroupList::from_bytes(bytes)?;
    if list.len() == count {
        Ok(list)
    } else {
        Err(Error::InvalidLength)
    }
}

fn write_subgroups(list: &SubgroupList<'_>, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
    let count = u8::try_from(list.len()).map_err(|_| Error::InvalidLength)?;
    writer.write_u8(count)?;
    list.to_bytes(writer)
}

/// Body of the *Add Source* operation.
#[derive(Copy, Clone, Debug)]
pub struct AddSource<'a> {
    pub address: DeviceAddress,
    pub adv_sid: u8,
    pub broadcast_id: BroadcastId,
    pub pa_sync: PaSyncRequest,
    /// PA interval in 1.25 ms units, or `PA_INTERVAL_UNKNOWN`.
    pub pa_interval: u16,
    pub subgroups: SubgroupList<'a>,
}

impl<'a> FromBytes<'a> for AddSource<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(AddSource {
            address: DeviceAddress::from_bytes(bytes)?,
            adv_sid: bytes.read_u8()?,
            broadcast_id: BroadcastId(bytes.read_u24_le()?),
            pa_sync: PaSyncRequest::try_from(bytes.read_u8()?)?,
            pa_interval: bytes.read_u16_le()?,
            subgroups: read_subgroups(bytes)?,
        })
    }
}

impl ToBytes for AddSource<'_> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        self.address.to_bytes(writer)?;
        writer.write_u8(self.adv_sid)?;
        writer.write_u24_le(self.broadcast_id.0)?;
        writer.write_u8(self.pa_sync.into())?;
        writer.write_u16_le(self.pa_interval)?;
        write_subgroups(&self.subgroups, writer)
    }
}

/// Body of the *Modify Source* operation.
#[derive(Copy, Clone, Debug)]
pub struct ModifySource<'a> {
    pub src_id: u8,
    pub pa_sync: PaSyncRequest,
    pub pa_interval: u16,
    pub subgroups: SubgroupList<'a>,
}

impl<'a> FromBytes<'a> for ModifySource<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(ModifySource {
            src_id: bytes.read_u8()?,
            pa_sync: PaSyncRequest::try_from(bytes.read_u8()?)?,
            pa_interval: bytes.read_u16_le()?,
            subgroups: read_subgroups(bytes)?,
        })
    }
}

impl ToBytes for ModifySource<'_> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.src_id)?;
        writer.write_u8(self.pa_sync.into())?;
        writer.write_u16_le(self.pa_interval)?;
        write_subgroups(&self.subgroups, writer)
    }
}

/// A control point command.
#[derive(Copy, Clone, Debug)]
pub enum Command<'a> {
    RemoteScanStopped,
    RemoteScanStarted,
    AddSource(AddSource<'a>),
    ModifySource(ModifySource<'a>),
    SetBroadcastCode { src_id: u8, code: BroadcastCode },
    RemoveSource { src_id: u8 },
}

impl Command<'_> {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::RemoteScanStopped => Opcode::RemoteScanStopped,
            Command::RemoteScanStarted => Opcode::RemoteScanStarted,
            Command::AddSource(_) => Opcode::AddSource,
            Command::ModifySource(_) => Opcode::ModifySource,
            Command::SetBroadcastCode { .. } => Opcode::SetBroadcastCode,
            Command::RemoveSource { .. } => Opcode::RemoveSource,
        }
    }
}

impl<'a> FromBytes<'a> for Command<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let opcode = Opcode::try_from(bytes.read_u8()?).map_err(|_| Error::UnsupportedOpcode)?;
        Ok(match opcode {
            Opcode::RemoteScanStopped => Command::RemoteScanStopped,
            Opcode::RemoteScanStarted => Command::RemoteScanStarted,
            Opcode::AddSource => Command::AddSource(AddSource::from_bytes(bytes)?),
            Opcode::ModifySource => Command::ModifySource(ModifySource::from_bytes(bytes)?),
            Opcode::SetBroadcastCode => Command::SetBroadcastCode {
                src_id: bytes.read_u8()?,
                code: BroadcastCode(bytes.read_array()?),
            },
            Opcode::RemoveSource => Command::RemoveSource {
                src_id: bytes.read_u8()?,
            },
        })
    }
}

impl ToBytes for Command<'_> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.opcode().into())?;
        match self {
            Command::RemoteScanStopped | Command::RemoteScanStarted => Ok(()),
            Command::AddSource(add) => add.to_bytes(writer),
            Command::ModifySource(modify) => modify.to_bytes(writer),
            Command::SetBroadcastCode { src_id, code } => {
                writer.write_u8(*src_id)?;
                writer.write_slice(code.as_bytes())
            }
            Command::RemoveSource { src_id } => writer.write_u8(*src_id),
        }
    }
}
