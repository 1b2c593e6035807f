//! Attribute Protocol vocabulary shared by the BASS server and client.
//!
//! The attribute transport itself (PDU framing, permissions, CCCD bookkeeping) lives in the host
//! stack. This module only defines what BASS needs to talk about it: attribute handles, handle
//! ranges for discovery, and the error codes a control point write can be rejected with.

use core::fmt;

/// A 16-bit handle uniquely identifying an attribute on an ATT server.
///
/// The `0x0000` handle (`NULL`) is invalid and must not be used.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AttHandle(u16);

impl AttHandle {
    /// The `0x0000` handle is not used for actual attributes, but as a special placeholder when no
    /// attribute handle is valid (eg. in error responses).
    pub const NULL: Self = AttHandle(0x0000);

    /// Returns the raw 16-bit integer representing this handle.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Create an attribute handle from a raw u16
    pub const fn from_raw(raw: u16) -> Self {
        AttHandle(raw)
    }
}

impl fmt::Debug for AttHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// An inclusive range of attribute handles, as reported by primary service discovery.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HandleRange {
    start: AttHandle,
    end: AttHandle,
}

impl HandleRange {
    /// Creates a handle range, checking it for validity.
    ///
    /// Returns `None` if `start` is the `NULL` handle or lies past `end`.
    pub fn new(start: AttHandle, end: AttHandle) -> Option<Self> {
        if start.0 == 0 || start.0 > end.0 {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn start(&self) -> AttHandle {
        self.start
    }

    pub fn end(&self) -> AttHandle {
        self.end
    }

    /// Checks if an `AttHandle` is in this range.
    pub fn contains(&self, handle: AttHandle) -> bool {
        self.start.0 <= handle.0 && handle.0 <= self.end.0
    }
}

enum_with_unknown! {
    /// Error codes that can be returned to the writer of a BASS attribute.
    ///
    /// Includes the generic ATT codes BASS makes use of, the common profile `ValueNotAllowed`
    /// code, and the two BASS application error codes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ErrorCode(u8) {
        /// Attempted to use an `AttHandle` that isn't valid on this server.
        InvalidHandle = 0x01,
        /// Attribute isn't readable.
        ReadNotPermitted = 0x02,
        /// Attribute isn't writable.
        WriteNotPermitted = 0x03,
        /// Attribute PDU is invalid.
        InvalidPdu = 0x04,
        /// Authentication needed before attribute can be read/written.
        InsufficientAuthentication = 0x05,
        /// Server doesn't support this operation.
        RequestNotSupported = 0x06,
        /// Offset was past the end of the attribute.
        InvalidOffset = 0x07,
        /// Attribute value has an incorrect length for the operation.
        InvalidAttributeValueLength = 0x0D,
        /// Request has encountered an "unlikely" error and could not be completed.
        UnlikelyError = 0x0E,
        /// Attribute cannot be read/written without an encrypted connection.
        InsufficientEncryption = 0x0F,
        /// Server didn't have enough resources to complete a request.
        InsufficientResources = 0x11,
        /// A well-formed value that the profile does not allow.
        ValueNotAllowed = 0x13,
        /// BASS: the control point opcode is not supported.
        OpcodeNotSupported = 0x80,
        /// BASS: the `Source_ID` does not match any receive state.
        InvalidSourceId = 0x81,
    }
}

/// An error on the ATT protocol layer. Can be sent as a response.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttError {
    code: ErrorCode,
    handle: AttHandle,
}

impl AttError {
    pub fn new(code: ErrorCode, handle: AttHandle) -> Self {
        Self { code, handle }
    }

    /// Creates an error that does not blame a specific attribute.
    ///
    /// The host stack fills in the handle of the attribute that was written.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, AttHandle::NULL)
    }

    /// The error code describing this error.
    pub fn error_code(&self) -> ErrorCode {
        self.code
    }

    /// The handle of the attribute causing the error.
    ///
    /// This can be the `NULL` handle if there's no attribute to blame.
    pub fn handle(&self) -> AttHandle {
        self.handle
    }
}

impl From<ErrorCode> for AttError {
    fn from(code: ErrorCode) -> Self {
        AttError::from_code(code)
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#04x})", self.code, u8::from(self.code))
    }
}
