//! Rendering of a [`LogRecord`] in the style of the `iptables LOG`
//! target.
//!
//! ```text
//! DROP IN=eth0 OUT= HWTYPE=ETHER HWPROTO=IPv4 LEN=60 SRC=10.0.0.1 DST=10.0.0.2 PROTO=TCP
//! ```
//!
//! Fields that cannot be resolved are replaced by placeholders, so
//! formatting never fails.

use chrono::{DateTime, Local};

use crate::{
    consts::link::{ArpHrd, EthType, IpProto},
    iface::InterfaceNames,
    ipv4,
    record::LogRecord,
};

/// Printed in place of an interface name that could not be looked up.
pub const INVALID_INTERFACE: &str = "<invalid>";
/// Printed in place of the network fields when the payload is not an
/// IPv4 header.
pub const INVALID_IPV4: &str = " <invalid not IPv4??>";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn interface<I>(index: Option<u32>, interfaces: &I) -> String
where
    I: InterfaceNames + ?Sized,
{
    match index {
        Some(index) => interfaces
            .name(index)
            .unwrap_or_else(|_| INVALID_INTERFACE.to_string()),
        None => String::new(),
    }
}

fn hw_type(code: u16) -> String {
    match ArpHrd::from(code).mnemonic() {
        Some(name) => name.to_string(),
        None => code.to_string(),
    }
}

fn hw_protocol(hw_type: u16, code: u16) -> String {
    let name = if ArpHrd::from(hw_type).is_unrecognized() {
        None
    } else {
        EthType::from(code).mnemonic()
    };
    match name {
        Some(name) => name.to_string(),
        None => format!("0x{code:04x}"),
    }
}

fn ip_proto(code: u8) -> String {
    match IpProto::from(code).mnemonic() {
        Some(name) => name.to_string(),
        None => code.to_string(),
    }
}

fn network(payload: &[u8]) -> String {
    match ipv4::parse_header(payload) {
        Ok(hdr) => format!(
            " LEN={} SRC={} DST={} PROTO={}",
            hdr.total_len,
            hdr.source,
            hdr.destination,
            ip_proto(hdr.protocol)
        ),
        Err(_) => INVALID_IPV4.to_string(),
    }
}

/// Format `record` as a single line without timestamp or line break.
pub fn format_record<I>(record: &LogRecord, interfaces: &I) -> String
where
    I: InterfaceNames + ?Sized,
{
    let mut line = record.prefix().clone().unwrap_or_default();
    line.push_str(" IN=");
    line.push_str(&interface(*record.ifindex_in(), interfaces));
    line.push_str(" OUT=");
    line.push_str(&interface(*record.ifindex_out(), interfaces));
    line.push_str(" HWTYPE=");
    if let Some(ty) = *record.hw_type() {
        line.push_str(&hw_type(ty));
        line.push_str(" HWPROTO=");
        if let Some(proto) = *record.hw_protocol() {
            line.push_str(&hw_protocol(ty, proto));
        }
    }
    if let Some(ref payload) = *record.payload() {
        line.push_str(&network(payload));
    }
    line
}

/// Format `record` as printed on stdout: the capture time in local
/// time, two spaces and the output of [`format_record`].
pub fn format_line<I>(record: &LogRecord, interfaces: &I) -> String
where
    I: InterfaceNames + ?Sized,
{
    let timestamp = DateTime::<Local>::from(*record.timestamp());
    format!(
        "{}  {}",
        timestamp.format(TIMESTAMP_FORMAT),
        format_record(record, interfaces)
    )
}
