//! Netlink attributes as used by `nfnetlink_log`.
//!
//! An attribute is a type-length-value triple aligned to
//! `NLA_ALIGNTO`. The payload is always kept as a byte buffer and
//! converted on access with [`Nlattr::get_payload_as`]. Integers in
//! `nfnetlink_log` payloads are big endian, so callers convert with
//! `u32::from_be` and friends after reading.
//!
//! # Design decisions
//!
//! The upper two bits of the attribute type (`NLA_F_NESTED` and
//! `NLA_F_NET_BYTEORDER`) are kept separate from the type so that
//! matching on the type enum works no matter how the kernel flagged
//! the attribute.

use std::{io::Cursor, marker::PhantomData};

use derive_builder::Builder;
use getset::Getters;

use crate::{
    err::{DeError, SerError},
    FromBytes, FromBytesWithInput, Size, ToBytes,
};

/// Length of the attribute header.
pub const NLA_HDRLEN: usize = 4;

const NLA_TYPE_MASK: u16 = !((libc::NLA_F_NESTED | libc::NLA_F_NET_BYTEORDER) as u16);

/// A single netlink attribute
#[derive(Builder, Getters, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct Nlattr<T> {
    /// Type of the attribute with the flag bits removed
    #[getset(get = "pub")]
    nla_type: T,
    /// Flag bits of the attribute type
    #[builder(default)]
    #[getset(get = "pub")]
    nla_flags: u16,
    /// Payload of the attribute without padding
    #[builder(setter(into))]
    #[getset(get = "pub")]
    nla_payload: Vec<u8>,
}

impl<T> Nlattr<T> {
    /// Create an attribute whose payload is the serialized form of
    /// `payload`.
    pub fn new<P>(nla_type: T, payload: &P) -> Result<Self, SerError>
    where
        P: ToBytes,
    {
        let mut buffer = Cursor::new(Vec::with_capacity(payload.unpadded_size()));
        payload.to_bytes(&mut buffer)?;
        Ok(Nlattr {
            nla_type,
            nla_flags: 0,
            nla_payload: buffer.into_inner(),
        })
    }

    /// Get the payload as the provided type parameter, `R`.
    pub fn get_payload_as<R>(&self) -> Result<R, DeError>
    where
        R: FromBytes,
    {
        R::from_bytes(&mut Cursor::new(&self.nla_payload))
    }

    /// Get the payload as a string, dropping trailing null bytes.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn get_payload_as_string(&self) -> String {
        let end = self
            .nla_payload
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&self.nla_payload[..end]).into_owned()
    }

    /// Consume the attribute and return its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.nla_payload
    }
}

impl<T> Size for Nlattr<T> {
    fn unpadded_size(&self) -> usize {
        NLA_HDRLEN + self.nla_payload.len()
    }
}

impl<T> ToBytes for Nlattr<T>
where
    T: Copy + Into<u16>,
{
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        let nla_len = u16::try_from(self.unpadded_size())
            .map_err(|_| SerError::new("Attribute payload too large"))?;
        nla_len.to_bytes(buffer)?;
        let nla_type: u16 = self.nla_type.into();
        (nla_type | self.nla_flags).to_bytes(buffer)?;
        self.nla_payload.to_bytes(buffer)?;
        self.pad(buffer)?;
        Ok(())
    }
}

impl<T> FromBytesWithInput for Nlattr<T>
where
    T: From<u16>,
{
    type Input = usize;

    /// `input` is the number of bytes left in the attribute area.
    fn from_bytes_with_input(
        buffer: &mut Cursor<impl AsRef<[u8]>>,
        input: usize,
    ) -> Result<Self, DeError> {
        if input < NLA_HDRLEN {
            return Err(DeError::UnexpectedEOB);
        }
        let nla_len = u16::from_bytes(buffer)? as usize;
        if nla_len < NLA_HDRLEN || nla_len > input {
            return Err(DeError::InvalidLength(nla_len));
        }
        let raw_type = u16::from_bytes(buffer)?;
        let nla_payload = Vec::<u8>::from_bytes_with_input(buffer, nla_len - NLA_HDRLEN)?;
        Ok(Nlattr {
            nla_type: T::from(raw_type & NLA_TYPE_MASK),
            nla_flags: raw_type & !NLA_TYPE_MASK,
            nla_payload,
        })
    }
}

/// Iterator over the attributes in a byte buffer.
///
/// Like [`NlBufferIter`][crate::nl::NlBufferIter], this stops after
/// the first malformed attribute.
pub struct AttrIter<'a, T> {
    buffer: Cursor<&'a [u8]>,
    done: bool,
    data: PhantomData<T>,
}

impl<'a, T> AttrIter<'a, T> {
    /// Iterate over the attributes in `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        AttrIter {
            buffer: Cursor::new(buffer),
            done: false,
            data: PhantomData,
        }
    }
}

impl<T> Iterator for AttrIter<'_, T>
where
    T: From<u16>,
{
    type Item = Result<Nlattr<T>, DeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.buffer.get_ref().len();
        let start = self.buffer.position() as usize;
        if self.done || start >= len {
            return None;
        }
        match Nlattr::<T>::from_bytes_with_input(&mut self.buffer, len - start) {
            Ok(attr) => {
                let next = (start + attr.padded_size()).min(len);
                self.buffer.set_position(next as u64);
                Some(Ok(attr))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Serialize a list of attributes back to back.
pub(crate) fn attrs_to_bytes<T>(
    attrs: &[Nlattr<T>],
    buffer: &mut Cursor<Vec<u8>>,
) -> Result<(), SerError>
where
    T: Copy + Into<u16>,
{
    attrs.iter().try_for_each(|attr| attr.to_bytes(buffer))
}
