//! This is the module that contains the error types used in `nflogd`
//!
//! There are several main types:
//! * [`SerError`] - error while serializing a netlink message
//! * [`DeError`] - error while deserializing a netlink message
//! * [`SocketError`] - a general netlink socket error wrapping
//!   IO errors, serialization and deserialization errors and error
//!   codes sent back by the kernel
//! * [`ConfigError`] - an invalid setting detected before anything is
//!   opened
//! * [`SessionError`] - a fatal failure while opening or registering a
//!   capture session
//! * [`DeliveryError`] - a failure while delivering records that does
//!   not end the session
//!
//! # Design decisions
//! All errors implement `std::error::Error` in an attempt to allow
//! them to be used in conjunction with `Result` for easier error
//! management even at the protocol error level.

use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use derive_builder::UninitializedFieldError;

macro_rules! err_from {
    ($err:ident, $($from_err:path { $from_impl:expr }),+) => {
        $(
            impl From<$from_err> for $err {
                fn from(e: $from_err) -> Self {
                    $from_impl(e)
                }
            }
        )*
    };
}

/// Serialization error
#[derive(Debug)]
pub enum SerError {
    /// Abitrary error message.
    Msg(String),
    /// A wrapped IO error.
    Io(io::Error),
}

err_from!(SerError, io::Error { SerError::Io });

impl SerError {
    /// Create a new error with the given message as description.
    pub fn new<D>(msg: D) -> Self
    where
        D: Display,
    {
        SerError::Msg(msg.to_string())
    }
}

impl Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SerError::Msg(ref s) => write!(f, "{s}"),
            SerError::Io(ref e) => write!(f, "Error while serializing: {e}"),
        }
    }
}

impl Error for SerError {}

/// Deserialization error
#[derive(Debug)]
pub enum DeError {
    /// Abitrary error message.
    Msg(String),
    /// A wrapped IO error.
    Io(io::Error),
    /// The end of the buffer was reached before deserialization
    /// finished.
    UnexpectedEOB,
    /// A length field was smaller than the header it describes or
    /// larger than the remaining buffer.
    InvalidLength(usize),
}

impl From<io::Error> for DeError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DeError::UnexpectedEOB
        } else {
            DeError::Io(e)
        }
    }
}

impl DeError {
    /// Create new error from a type implementing
    /// [`Display`][std::fmt::Display]
    pub fn new<D>(s: D) -> Self
    where
        D: Display,
    {
        DeError::Msg(s.to_string())
    }
}

impl Display for DeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DeError::Msg(ref s) => write!(f, "{s}"),
            DeError::Io(ref e) => write!(f, "Error while deserializing: {e}"),
            DeError::UnexpectedEOB => write!(
                f,
                "The buffer was not large enough to complete the deserialize \
                 operation",
            ),
            DeError::InvalidLength(len) => write!(f, "Invalid length field: {len}"),
        }
    }
}

impl Error for DeError {}

/// General netlink socket error
#[derive(Debug)]
pub enum SocketError {
    /// Variant for [`String`]-based messages.
    Msg(String),
    /// An error code sent back by netlink in an `NLMSG_ERROR`
    /// message, as a positive errno value.
    Nlmsgerr(i32),
    /// A serialization error.
    Ser(SerError),
    /// A deserialization error.
    De(DeError),
    /// IO error.
    Io(io::Error),
}

err_from!(
    SocketError,
    SerError { SocketError::Ser },
    DeError { SocketError::De },
    io::Error { SocketError::Io }
);

impl SocketError {
    /// Create new error from a data type implementing
    /// [`Display`][std::fmt::Display]
    pub fn new<D>(s: D) -> Self
    where
        D: Display,
    {
        SocketError::Msg(s.to_string())
    }
}

impl Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SocketError::Msg(ref msg) => write!(f, "{msg}"),
            SocketError::Nlmsgerr(code) => write!(
                f,
                "Error response received from netlink: {}",
                io::Error::from_raw_os_error(code)
            ),
            SocketError::Ser(ref err) => write!(f, "Serialization error: {err}"),
            SocketError::De(ref err) => write!(f, "Deserialization error: {err}"),
            SocketError::Io(ref err) => write!(f, "IO error: {err}"),
        }
    }
}

impl Error for SocketError {}

/// Invalid configuration detected before a session is opened
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The requested NFLOG group does not fit in 16 bits.
    GroupOutOfRange(u64),
    /// A required setting was not provided.
    Missing(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::GroupOutOfRange(group) => write!(
                f,
                "invalid group id {group} (must be between 0 and {})",
                u16::MAX
            ),
            ConfigError::Missing(ref what) => write!(f, "missing setting: {what}"),
        }
    }
}

impl Error for ConfigError {}

impl From<UninitializedFieldError> for ConfigError {
    fn from(e: UninitializedFieldError) -> Self {
        ConfigError::Missing(e.field_name().to_string())
    }
}

/// Fatal failure of a capture session
#[derive(Debug)]
pub enum SessionError {
    /// The netlink channel could not be opened.
    Open(SocketError),
    /// The handler could not be registered with the channel. The
    /// channel has already been released when this is returned.
    Register(SocketError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SessionError::Open(ref e) => write!(f, "could not open nflog socket: {e}"),
            SessionError::Register(ref e) => {
                write!(f, "failed to register hook function: {e}")
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            SessionError::Open(ref e) | SessionError::Register(ref e) => Some(e),
        }
    }
}

/// Failure while delivering records from the kernel. These are
/// reported to the handler. Only a failure to wait on the socket ends
/// delivery without the handler asking for it.
#[derive(Debug)]
pub enum DeliveryError {
    /// Reading from the socket failed, for example with `ENOBUFS`
    /// when the kernel had to drop records.
    Recv(io::Error),
    /// A message could not be decoded.
    Decode(DeError),
    /// The kernel sent an `NLMSG_ERROR` message with a non-zero code.
    Netlink(i32),
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DeliveryError::Recv(ref e) => write!(f, "receive failed: {e}"),
            DeliveryError::Decode(ref e) => write!(f, "malformed message: {e}"),
            DeliveryError::Netlink(code) => write!(
                f,
                "netlink error: {}",
                io::Error::from_raw_os_error(code)
            ),
        }
    }
}

impl Error for DeliveryError {}
