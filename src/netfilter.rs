//! Netfilter logging protocol
//!
//! Messages exchanged with `nfnetlink_log` on a
//! [`NlFamily::Netfilter`][crate::consts::socket::NlFamily::Netfilter]
//! socket. Userspace sends [`LogConfigReq`] messages to bind to a group
//! and pick a copy mode. The kernel answers with a stream of
//! [`NetfilterMsg::LogPacket`][crate::consts::netfilter::NetfilterMsg::LogPacket]
//! messages, each decoded into a [`LogRecord`].
//!
//! Both directions start with an `nfgenmsg` header (family, version and
//! the group as resource id) followed by attributes. All integers in
//! attribute payloads are big endian.

use std::{
    io::Cursor,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::trace;

use crate::{
    attr::{attrs_to_bytes, AttrIter, Nlattr},
    consts::netfilter::{LogCmd, LogCopyMode, NfLogAttr, NfLogCfg, NFNETLINK_V0},
    err::{DeError, SerError},
    record::{LogRecord, LogRecordBuilder},
    FromBytes, FromBytesWithInput, Size, ToBytes,
};

/// Length of the `nfgenmsg` header.
pub const NFGENMSG_LEN: usize = 4;

impl Size for LogCmd {
    fn unpadded_size(&self) -> usize {
        std::mem::size_of::<u8>()
    }
}

impl ToBytes for LogCmd {
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        u8::from(self).to_bytes(buffer)
    }
}

/// Configuration mode, as a parameter to [`NfLogCfg::Mode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfigMode {
    /// Number of packet bytes to copy to userspace.
    pub copy_range: u32,
    /// What parts should be sent.
    pub copy_mode: LogCopyMode,
}

impl Size for LogConfigMode {
    fn unpadded_size(&self) -> usize {
        self.copy_range.unpadded_size() + 2
    }
}

impl ToBytes for LogConfigMode {
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        u32::to_be(self.copy_range).to_bytes(buffer)?;
        u8::from(self.copy_mode).to_bytes(buffer)?;
        // _pad
        0u8.to_bytes(buffer)?;
        Ok(())
    }
}

impl FromBytes for LogConfigMode {
    fn from_bytes(buffer: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, DeError> {
        let copy_range = u32::from_be(u32::from_bytes(buffer)?);
        let copy_mode = LogCopyMode::from(u8::from_bytes(buffer)?);
        let _pad = u8::from_bytes(buffer)?;
        Ok(LogConfigMode {
            copy_range,
            copy_mode,
        })
    }
}

/// A configuration request for one logging group.
///
/// It should be sent to the kernel in a
/// [`NetfilterMsg::LogConfig`][crate::consts::netfilter::NetfilterMsg::LogConfig]
/// message.
///
/// ```
/// # use nflogd::consts::netfilter::{LogCmd, LogCopyMode};
/// # use nflogd::netfilter::{LogConfigMode, LogConfigReq};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Bind group 10, then ask for whole packets.
/// let bind = LogConfigReq::command(libc::AF_UNSPEC as u8, 10, LogCmd::Bind)?;
/// let mode = LogConfigReq::mode(10, LogConfigMode {
///     copy_mode: LogCopyMode::Packet,
///     copy_range: 0xffff,
/// })?;
/// # let _ = (bind, mode);
/// # Ok(()) }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfigReq {
    family: u8,
    group: u16,
    attrs: Vec<Nlattr<NfLogCfg>>,
}

impl LogConfigReq {
    /// Creates a new log configuration request from raw attributes.
    pub fn new(family: u8, group: u16, attrs: Vec<Nlattr<NfLogCfg>>) -> Self {
        LogConfigReq {
            family,
            group,
            attrs,
        }
    }

    /// A request carrying a single [`NfLogCfg::Cmd`] attribute.
    ///
    /// `PfBind` and `PfUnbind` act on `family` and ignore the group;
    /// `Bind` and `Unbind` act on the group.
    pub fn command(family: u8, group: u16, cmd: LogCmd) -> Result<Self, SerError> {
        Ok(LogConfigReq::new(
            family,
            group,
            vec![Nlattr::new(NfLogCfg::Cmd, &cmd)?],
        ))
    }

    /// A request carrying a single [`NfLogCfg::Mode`] attribute.
    pub fn mode(group: u16, mode: LogConfigMode) -> Result<Self, SerError> {
        Ok(LogConfigReq::new(
            libc::AF_UNSPEC as u8,
            group,
            vec![Nlattr::new(NfLogCfg::Mode, &mode)?],
        ))
    }
}

impl Size for LogConfigReq {
    fn unpadded_size(&self) -> usize {
        NFGENMSG_LEN + self.attrs.iter().map(Size::padded_size).sum::<usize>()
    }
}

impl ToBytes for LogConfigReq {
    fn to_bytes(&self, buffer: &mut Cursor<Vec<u8>>) -> Result<(), SerError> {
        self.family.to_bytes(buffer)?;
        NFNETLINK_V0.to_bytes(buffer)?;
        u16::to_be(self.group).to_bytes(buffer)?;
        attrs_to_bytes(&self.attrs, buffer)?;
        Ok(())
    }
}

struct Timestamp {
    secs: u64,
    usecs: u64,
}

impl FromBytes for Timestamp {
    fn from_bytes(buffer: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, DeError> {
        Ok(Timestamp {
            secs: u64::from_be(u64::from_bytes(buffer)?),
            usecs: u64::from_be(u64::from_bytes(buffer)?),
        })
    }
}

impl Timestamp {
    fn to_system_time(&self) -> Option<SystemTime> {
        let nanos = self.usecs.min(999_999) as u32 * 1000;
        UNIX_EPOCH.checked_add(Duration::new(self.secs, nanos))
    }
}

fn be_u32(attr: &Nlattr<NfLogAttr>) -> Result<u32, DeError> {
    Ok(u32::from_be(attr.get_payload_as()?))
}

fn be_u16(attr: &Nlattr<NfLogAttr>) -> Result<u16, DeError> {
    Ok(u16::from_be(attr.get_payload_as()?))
}

fn hwaddr(payload: &[u8]) -> Result<Vec<u8>, DeError> {
    // struct nfulnl_msg_packet_hw: be16 len, u16 pad, u8 addr[8]
    let mut buffer = Cursor::new(payload);
    let len = u16::from_be(u16::from_bytes(&mut buffer)?) as usize;
    let addr = payload.get(4..).ok_or(DeError::UnexpectedEOB)?;
    Ok(addr[..len.min(addr.len())].to_vec())
}

impl FromBytesWithInput for LogRecord {
    type Input = usize;

    /// `input` is the length of the message payload, starting at the
    /// `nfgenmsg` header.
    fn from_bytes_with_input(
        buffer: &mut Cursor<impl AsRef<[u8]>>,
        input: usize,
    ) -> Result<Self, DeError> {
        if input < NFGENMSG_LEN {
            return Err(DeError::UnexpectedEOB);
        }
        let body = Vec::<u8>::from_bytes_with_input(buffer, input)?;
        let mut builder = LogRecordBuilder::default();
        for attr in AttrIter::<NfLogAttr>::new(&body[NFGENMSG_LEN..]) {
            let attr = attr?;
            builder = match *attr.nla_type() {
                NfLogAttr::PacketHdr => {
                    // struct nfulnl_msg_packet_hdr: be16 hw_protocol, u8 hook, u8 pad
                    let mut hdr = Cursor::new(attr.nla_payload());
                    let hw_protocol = u16::from_be(u16::from_bytes(&mut hdr)?);
                    let hook = u8::from_bytes(&mut hdr)?;
                    builder.hw_protocol(hw_protocol).hook(hook)
                }
                NfLogAttr::Mark => builder.mark(be_u32(&attr)?),
                NfLogAttr::Timestamp => {
                    match attr.get_payload_as::<Timestamp>()?.to_system_time() {
                        Some(ts) => builder.timestamp(ts),
                        None => builder,
                    }
                }
                NfLogAttr::IfindexIndev => builder.ifindex_in(be_u32(&attr)?),
                NfLogAttr::IfindexOutdev => builder.ifindex_out(be_u32(&attr)?),
                NfLogAttr::IfindexPhyindev => builder.ifindex_physin(be_u32(&attr)?),
                NfLogAttr::IfindexPhyoutdev => builder.ifindex_physout(be_u32(&attr)?),
                NfLogAttr::Hwaddr => builder.hwaddr(hwaddr(attr.nla_payload())?),
                NfLogAttr::Payload => builder.payload(attr.into_payload()),
                NfLogAttr::Prefix => builder.prefix(attr.get_payload_as_string()),
                NfLogAttr::Uid => builder.uid(be_u32(&attr)?),
                NfLogAttr::Gid => builder.gid(be_u32(&attr)?),
                NfLogAttr::Seq => builder.seq(be_u32(&attr)?),
                NfLogAttr::Hwtype => builder.hw_type(be_u16(&attr)?),
                other => {
                    trace!("Skipping attribute {other:?}");
                    builder
                }
            };
        }
        builder.build().map_err(DeError::new)
    }
}
