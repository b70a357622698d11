use std::time::SystemTime;

use derive_builder::Builder;
use getset::Getters;

/// One packet logged by the kernel to an NFLOG group.
///
/// Every field the kernel may leave out is an [`Option`]. Records are
/// built by the decoder in [`netfilter`][crate::netfilter] or by hand
/// through [`LogRecordBuilder`]:
///
/// ```
/// use nflogd::record::LogRecordBuilder;
///
/// let record = LogRecordBuilder::default()
///     .prefix("DROP".to_string())
///     .ifindex_in(2)
///     .build()
///     .unwrap();
/// assert_eq!(record.prefix().as_deref(), Some("DROP"));
/// assert!(record.ifindex_out().is_none());
/// ```
#[derive(Builder, Getters, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct LogRecord {
    /// Time the kernel captured the packet, or the time of receipt if
    /// the kernel did not send one.
    #[builder(default = "SystemTime::now()")]
    #[getset(get = "pub")]
    timestamp: SystemTime,
    /// Prefix configured on the logging rule.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    prefix: Option<String>,
    /// Index of the inbound interface.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    ifindex_in: Option<u32>,
    /// Index of the outbound interface.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    ifindex_out: Option<u32>,
    /// Index of the physical inbound interface (bridge port).
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    ifindex_physin: Option<u32>,
    /// Index of the physical outbound interface (bridge port).
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    ifindex_physout: Option<u32>,
    /// Link layer type of the inbound device (`ARPHRD_*`).
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    hw_type: Option<u16>,
    /// Link layer protocol of the packet (`ETH_P_*`).
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    hw_protocol: Option<u16>,
    /// Netfilter hook the packet was logged from.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    hook: Option<u8>,
    /// Packet mark.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    mark: Option<u32>,
    /// UID of the local socket owning the packet.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    uid: Option<u32>,
    /// GID of the local socket owning the packet.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    gid: Option<u32>,
    /// Per-group sequence number, only sent when enabled on the group.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    seq: Option<u32>,
    /// Source hardware address, truncated to its real length.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    hwaddr: Option<Vec<u8>>,
    /// Network layer bytes of the packet, up to the copy range.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    payload: Option<Vec<u8>>,
}
