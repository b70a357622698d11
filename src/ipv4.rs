use std::{
    error::Error,
    fmt::{self, Display},
    net::Ipv4Addr,
};

use etherparse::{err::ipv4::HeaderSliceError, Ipv4HeaderSlice};

/// The IPv4 header fields printed in a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Summary {
    /// Total length of the datagram as claimed by the header.
    pub total_len: u16,
    /// Source address.
    pub source: Ipv4Addr,
    /// Destination address.
    pub destination: Ipv4Addr,
    /// Number of the protocol carried in the datagram.
    pub protocol: u8,
}

/// The payload is not a well formed IPv4 header.
#[derive(Debug)]
pub struct Ipv4Error(HeaderSliceError);

impl Display for Ipv4Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "not an IPv4 header: {}", self.0)
    }
}

impl Error for Ipv4Error {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

/// Parse the IPv4 header at the start of `bytes`.
///
/// Fails for buffers shorter than the header, a version other than 4
/// and header lengths that are too small or run past the buffer.
/// Options are skipped and nothing after the header is looked at.
pub fn parse_header(bytes: &[u8]) -> Result<Ipv4Summary, Ipv4Error> {
    let header = Ipv4HeaderSlice::from_slice(bytes).map_err(Ipv4Error)?;
    Ok(Ipv4Summary {
        total_len: header.total_len(),
        source: header.source_addr(),
        destination: header.destination_addr(),
        protocol: header.protocol().0,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A 20 byte header without options.
    pub fn header(total_len: u16, src: [u8; 4], dst: [u8; 4], proto: u8) -> Vec<u8> {
        let mut bytes = vec![0x45, 0];
        bytes.extend_from_slice(&total_len.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0x40, 0, 64, proto, 0, 0]);
        bytes.extend_from_slice(&src);
        bytes.extend_from_slice(&dst);
        bytes
    }

    #[test]
    fn test_parse_header() {
        let bytes = header(60, [10, 0, 0, 1], [10, 0, 0, 2], 6);
        let summary = parse_header(&bytes).unwrap();
        assert_eq!(
            summary,
            Ipv4Summary {
                total_len: 60,
                source: Ipv4Addr::new(10, 0, 0, 1),
                destination: Ipv4Addr::new(10, 0, 0, 2),
                protocol: 6,
            }
        );
    }

    #[test]
    fn test_parse_header_with_trailing_data() {
        let mut bytes = header(28, [192, 168, 1, 1], [8, 8, 8, 8], 17);
        bytes.extend_from_slice(&[0; 8]);
        assert_eq!(parse_header(&bytes).unwrap().protocol, 17);
    }

    #[test]
    fn test_parse_header_rejects() {
        let good = header(60, [10, 0, 0, 1], [10, 0, 0, 2], 6);
        // Too short
        assert!(parse_header(&good[..12]).is_err());
        assert!(parse_header(&[]).is_err());
        // IPv6 version nibble
        let mut v6 = good.clone();
        v6[0] = 0x65;
        assert!(parse_header(&v6).is_err());
        // IHL below minimum
        let mut short_ihl = good.clone();
        short_ihl[0] = 0x44;
        assert!(parse_header(&short_ihl).is_err());
        // IHL past the end of the buffer
        let mut long_ihl = good;
        long_ihl[0] = 0x46;
        assert!(parse_header(&long_ihl).is_err());
    }
}
