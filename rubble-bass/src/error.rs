use core::fmt;

/// Errors returned while encoding or decoding BASS PDUs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A PDU was too short, or a declared length (metadata, subgroup count) does not match the
    /// data that follows it.
    ///
    /// This is a protocol violation and always rejects the whole PDU.
    InvalidLength,

    /// A field holds a value outside of its defined range (eg. an address type of 2).
    InvalidValue,

    /// Unexpectedly reached the end of the buffer while reading or writing.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// The control point opcode is not one defined by BASS.
    UnsupportedOpcode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
            Error::UnsupportedOpcode => "unsupported control point opcode",
        })
    }
}
