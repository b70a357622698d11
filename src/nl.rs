//! This module contains the top level netlink header code. Every
//! netlink message will be encapsulated in a top level `Nlmsghdr`.
//!
//! [`Nlmsghdr`] is the structure representing a header that all
//! netlink protocols require to be passed to the correct destination.
//!
//! # Design decisions
//!
//! Received messages keep their payload as raw bytes. The payload is
//! interpreted by the caller based on `nl_type` so that one buffer can
//! carry logged packets, ACKs and errors side by side.

use std::io::Cursor;

use derive_builder::Builder;
use getset::Getters;
use log::trace;

use crate::{
    consts::nl::NlmF,
    err::{DeError, SerError},
    FromBytes, FromBytesWithInput, Size, ToBytes,
};

/// Length of the netlink message header.
pub const NLMSG_HDRLEN: usize = 16;

/// Top level netlink header and payload
#[derive(Builder, Getters, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct Nlmsghdr<P> {
    /// Type of the netlink message
    #[getset(get = "pub")]
    nl_type: u16,
    /// Flags indicating properties of the request or response
    #[getset(get = "pub")]
    nl_flags: NlmF,
    /// Sequence number for netlink protocol
    #[builder(default)]
    #[getset(get = "pub")]
    nl_seq: u32,
    /// ID of the netlink destination for requests and source for
    /// responses
    #[builder(default)]
    #[getset(get = "pub")]
    nl_pid: u32,
    /// Payload of netlink message
    #[getset(get = "pub")]
    nl_payload: P,
}

impl<P> Nlmsghdr<P> {
    /// Consume the message and return its payload.
    pub fn into_payload(self) -> P {
        self.nl_payload
    }
}

impl<P> Size for Nlmsghdr<P>
where
    P: Size,
{
    fn unpadded_size(&self) -> usize {
        NLMSG_HDRLEN + self.nl_payload.padded_size()
    }
}

impl<P> ToBytes for Nlmsghdr<P>
where
    P: ToBytes,
{
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        let nl_len = u32::try_from(self.unpadded_size())
            .map_err(|_| SerError::new("Netlink message too large"))?;
        nl_len.to_bytes(buffer)?;
        self.nl_type.to_bytes(buffer)?;
        self.nl_flags.bits().to_bytes(buffer)?;
        self.nl_seq.to_bytes(buffer)?;
        self.nl_pid.to_bytes(buffer)?;
        self.nl_payload.to_bytes(buffer)?;
        self.nl_payload.pad(buffer)?;
        Ok(())
    }
}

impl FromBytesWithInput for Nlmsghdr<Vec<u8>> {
    type Input = usize;

    /// `input` is the number of bytes left in the receive buffer.
    fn from_bytes_with_input(
        buffer: &mut Cursor<impl AsRef<[u8]>>,
        input: usize,
    ) -> Result<Self, DeError> {
        if input < NLMSG_HDRLEN {
            return Err(DeError::UnexpectedEOB);
        }
        let nl_len = u32::from_bytes(buffer)? as usize;
        if nl_len < NLMSG_HDRLEN || nl_len > input {
            return Err(DeError::InvalidLength(nl_len));
        }
        let nl_type = u16::from_bytes(buffer)?;
        let nl_flags = NlmF::from_bits_retain(u16::from_bytes(buffer)?);
        let nl_seq = u32::from_bytes(buffer)?;
        let nl_pid = u32::from_bytes(buffer)?;
        let nl_payload = Vec::<u8>::from_bytes_with_input(buffer, nl_len - NLMSG_HDRLEN)?;
        Ok(Nlmsghdr {
            nl_type,
            nl_flags,
            nl_seq,
            nl_pid,
            nl_payload,
        })
    }
}

/// Iterator over the netlink messages contained in the bytes
/// returned by a single socket read.
///
/// After the first error the iterator is exhausted, because the
/// position of the next message can no longer be trusted.
pub struct NlBufferIter<B> {
    buffer: Cursor<B>,
    done: bool,
}

impl<B> NlBufferIter<B>
where
    B: AsRef<[u8]>,
{
    /// Create a new iterator over the messages in `buffer`.
    pub fn new(buffer: B) -> Self {
        NlBufferIter {
            buffer: Cursor::new(buffer),
            done: false,
        }
    }

    fn remaining(&self) -> usize {
        self.buffer
            .get_ref()
            .as_ref()
            .len()
            .saturating_sub(self.buffer.position() as usize)
    }
}

impl<B> Iterator for NlBufferIter<B>
where
    B: AsRef<[u8]>,
{
    type Item = Result<Nlmsghdr<Vec<u8>>, DeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining() == 0 {
            return None;
        }
        let start = self.buffer.position();
        let remaining = self.remaining();
        match Nlmsghdr::<Vec<u8>>::from_bytes_with_input(&mut self.buffer, remaining) {
            Ok(msg) => {
                let consumed = msg.unpadded_size().min(remaining);
                self.buffer.set_position(start + consumed as u64);
                trace!("Message received: {msg:?}");
                Some(Ok(msg))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Payload of an `NLMSG_ERROR` message. An error code of zero is an
/// ACK.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nlmsgerr {
    /// Error code as sent by the kernel: zero or a negative errno.
    pub error: i32,
    /// Sequence number of the request this error answers.
    pub seq: u32,
}

impl Nlmsgerr {
    /// Returns true if this message acknowledges a request instead
    /// of rejecting it.
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    /// The positive errno value carried by this message.
    pub fn errno(&self) -> i32 {
        -self.error
    }
}

impl FromBytes for Nlmsgerr {
    fn from_bytes(buffer: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, DeError> {
        let error = i32::from_bytes(buffer)?;
        // Header of the request that failed: len, type, flags, seq.
        let _len = u32::from_bytes(buffer)?;
        let _ty = u16::from_bytes(buffer)?;
        let _flags = u16::from_bytes(buffer)?;
        let seq = u32::from_bytes(buffer)?;
        Ok(Nlmsgerr { error, seq })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use byteorder::{NativeEndian, WriteBytesExt};

    use crate::consts::nl::Nlmsg;

    #[test]
    fn test_nlhdr_serialize() {
        let nl = NlmsghdrBuilder::default()
            .nl_type(Nlmsg::Noop.into())
            .nl_flags(NlmF::empty())
            .nl_payload(Vec::<u8>::new())
            .build()
            .unwrap();
        let mut buffer = Cursor::new(Vec::new());
        nl.to_bytes(&mut buffer).unwrap();

        let mut expected = Cursor::new(vec![0; 16]);
        expected.write_u32::<NativeEndian>(16).unwrap();
        expected.write_u16::<NativeEndian>(1).unwrap();
        assert_eq!(expected.get_ref(), buffer.get_ref());
    }

    #[test]
    fn test_nlhdr_serialize_pads_payload() {
        let nl = NlmsghdrBuilder::default()
            .nl_type(0x0401)
            .nl_flags(NlmF::REQUEST | NlmF::ACK)
            .nl_seq(7)
            .nl_payload(vec![1u8, 2, 3])
            .build()
            .unwrap();
        let mut buffer = Cursor::new(Vec::new());
        nl.to_bytes(&mut buffer).unwrap();
        assert_eq!(buffer.get_ref().len(), 20);
        assert_eq!(&buffer.get_ref()[16..], &[1, 2, 3, 0]);
    }

    #[test]
    fn test_nlhdr_deserialize() {
        let mut c = Cursor::new(vec![0; 20]);
        c.write_u32::<NativeEndian>(20).unwrap();
        c.write_u16::<NativeEndian>(1).unwrap();
        c.write_u16::<NativeEndian>(NlmF::ACK.bits()).unwrap();
        c.write_u32::<NativeEndian>(3).unwrap();
        c.write_u32::<NativeEndian>(0).unwrap();
        c.write_u32::<NativeEndian>(0xdeadbeef).unwrap();
        let bytes = c.into_inner();

        let nl = Nlmsghdr::<Vec<u8>>::from_bytes_with_input(&mut Cursor::new(&bytes), bytes.len()).unwrap();
        assert_eq!(*nl.nl_type(), 1);
        assert_eq!(*nl.nl_flags(), NlmF::ACK);
        assert_eq!(*nl.nl_seq(), 3);
        assert_eq!(nl.nl_payload().len(), 4);
    }

    #[test]
    fn test_nlhdr_bad_length() {
        let mut c = Cursor::new(vec![0; 16]);
        c.write_u32::<NativeEndian>(64).unwrap();
        let bytes = c.into_inner();
        let err = Nlmsghdr::<Vec<u8>>::from_bytes_with_input(&mut Cursor::new(&bytes), bytes.len()).unwrap_err();
        assert!(matches!(err, DeError::InvalidLength(64)));
    }

    #[test]
    fn test_buffer_iter_multiple_messages() {
        let mut buffer = Cursor::new(Vec::new());
        for (seq, payload) in [(1u32, vec![1u8]), (2, vec![1, 2, 3, 4, 5])] {
            NlmsghdrBuilder::default()
                .nl_type(Nlmsg::Noop.into())
                .nl_flags(NlmF::empty())
                .nl_seq(seq)
                .nl_payload(payload)
                .build()
                .unwrap()
                .to_bytes(&mut buffer)
                .unwrap();
        }
        let msgs = NlBufferIter::new(buffer.into_inner())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(*msgs[0].nl_seq(), 1);
        assert_eq!(*msgs[1].nl_seq(), 2);
        // Padding is part of the payload as far as the length field
        // is concerned.
        assert_eq!(msgs[1].nl_payload().len(), 8);
    }

    #[test]
    fn test_buffer_iter_stops_after_error() {
        let mut iter = NlBufferIter::new(vec![4u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(iter.next(), Some(Err(_))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_nlmsgerr() {
        let mut c = Cursor::new(Vec::new());
        c.write_i32::<NativeEndian>(-libc::EPERM).unwrap();
        c.write_u32::<NativeEndian>(16).unwrap();
        c.write_u16::<NativeEndian>(0x0401).unwrap();
        c.write_u16::<NativeEndian>(5).unwrap();
        c.write_u32::<NativeEndian>(42).unwrap();
        let err = Nlmsgerr::from_bytes(&mut Cursor::new(c.into_inner())).unwrap();
        assert!(!err.is_ack());
        assert_eq!(err.errno(), libc::EPERM);
        assert_eq!(err.seq, 42);
    }
}
