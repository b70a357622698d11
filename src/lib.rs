//! # Netfilter packet logging for the weary firewall operator
//!
//! ## Rationale
//!
//! `nflogd` subscribes to an NFLOG group through `NETLINK_NETFILTER`
//! and turns each logged packet into one line in the format of the
//! classic `iptables LOG` target:
//!
//! ```text
//! 2024-05-02 13:37:00  DROP IN=eth0 OUT= HWTYPE=ETHER HWPROTO=IPv4 LEN=60 SRC=10.0.0.1 DST=10.0.0.2 PROTO=TCP
//! ```
//!
//! ## Layout
//!
//! * [`consts`], [`nl`], [`attr`] and [`socket`] are the netlink wire
//!   layer: constants, message headers, attributes and the raw socket.
//! * [`netfilter`] speaks the `nfnetlink_log` protocol: configuration
//!   requests and decoding of logged packets into a
//!   [`LogRecord`][crate::record::LogRecord].
//! * [`format`] turns a record into a line, using [`iface`] for
//!   interface names and [`ipv4`] for the network header.
//! * [`session`] owns the subscription to one group and drives the
//!   delivery thread until it is cancelled.
//!
//! ## Design decisions
//!
//! Every field of a decoded record is an [`Option`]. A field that
//! cannot be resolved while formatting is replaced by a fixed
//! placeholder so that each record produces exactly one line.

#![deny(missing_docs)]

pub mod consts;

/// Netlink attribute handling
pub mod attr;
/// Error module
pub mod err;
/// Record formatting
pub mod format;
/// Interface name lookup
pub mod iface;
/// IPv4 header summary
pub mod ipv4;
pub mod netfilter;
/// Top-level netlink header
pub mod nl;
/// Logged packet records
pub mod record;
pub mod session;
/// Wrapper for `libc` sockets
pub mod socket;

use std::io::{Cursor, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    consts::alignto,
    err::{DeError, SerError},
};

/// Size of the receive buffer used for netlink reads.
pub const MAX_NL_LENGTH: usize = 128 * 1024;

/// A trait defining methods that apply to all netlink data
/// structures related to sizing of data types.
pub trait Size {
    /// Size of the unpadded data structure. This will usually
    /// only be unaligned for variable length types like
    /// strings or byte buffers.
    fn unpadded_size(&self) -> usize;

    /// Get the size of the payload and align it to
    /// the required netlink byte alignment.
    fn padded_size(&self) -> usize {
        alignto(self.unpadded_size())
    }
}

/// A trait defining how to convert from a byte buffer to a netlink
/// data structure.
pub trait ToBytes: Size {
    /// Takes a byte buffer and serializes the data structure into
    /// it.
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError>;

    /// Pad a netlink message to the appropriate alignment.
    fn pad(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        let num_pad_bytes = self.padded_size() - self.unpadded_size();
        buffer.write_all(&[0; libc::NLA_ALIGNTO as usize][..num_pad_bytes])?;
        Ok(())
    }
}

/// A trait defining how to convert from a byte buffer to a netlink
/// data structure with a constant size.
pub trait FromBytes: Sized {
    /// Takes a byte buffer and returns the deserialized data
    /// structure.
    fn from_bytes(buffer: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, DeError>;
}

/// Takes an arbitrary input which serves as additional information
/// for guiding the conversion from a byte buffer to a data
/// structure. A common workflow is a data structure that has a size
/// to determine how much more of the data in the byte buffer is part
/// of a given data structure.
pub trait FromBytesWithInput: Sized {
    /// The type of the additional input.
    type Input: Copy;

    /// Takes a byte buffer and an additional input and returns
    /// the deserialized data structure.
    fn from_bytes_with_input(
        buffer: &mut Cursor<impl AsRef<[u8]>>,
        input: Self::Input,
    ) -> Result<Self, DeError>;
}

macro_rules! impl_nl_int {
    ($ty:ty, $read:ident, $write:ident $(, $endian:ty)?) => {
        impl Size for $ty {
            fn unpadded_size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }
        }

        impl ToBytes for $ty {
            fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
                buffer.$write$(::<$endian>)?(*self)?;
                Ok(())
            }
        }

        impl FromBytes for $ty {
            fn from_bytes(buffer: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, DeError> {
                Ok(buffer.$read$(::<$endian>)?()?)
            }
        }
    };
}

impl_nl_int!(u8, read_u8, write_u8);
impl_nl_int!(u16, read_u16, write_u16, NativeEndian);
impl_nl_int!(u32, read_u32, write_u32, NativeEndian);
impl_nl_int!(i32, read_i32, write_i32, NativeEndian);
impl_nl_int!(u64, read_u64, write_u64, NativeEndian);

impl Size for Vec<u8> {
    fn unpadded_size(&self) -> usize {
        self.len()
    }
}

impl ToBytes for Vec<u8> {
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        buffer.write_all(self)?;
        Ok(())
    }
}

impl FromBytesWithInput for Vec<u8> {
    type Input = usize;

    fn from_bytes_with_input(
        buffer: &mut Cursor<impl AsRef<[u8]>>,
        input: usize,
    ) -> Result<Self, DeError> {
        let len = buffer.get_ref().as_ref().len();
        if (buffer.position() as usize).saturating_add(input) > len {
            return Err(DeError::UnexpectedEOB);
        }
        let mut vec = vec![0; input];
        buffer.read_exact(&mut vec)?;
        Ok(vec)
    }
}
