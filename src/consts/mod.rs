//! # High level notes
//!
//! The items in this module are created by macros which map each
//! kernel constant to an enum variant. Values the kernel sends that
//! have no variant are kept in `UnrecognizedConst` so nothing is lost
//! while decoding.
//!
//! Most of these constants come from the Linux kernel headers
//! (`linux/netlink.h`, `linux/netfilter/nfnetlink_log.h`,
//! `linux/if_arp.h`, `linux/if_ether.h`, `netinet/in.h`).

#[macro_use]
mod macros;

/// Constants related to link layer hardware types, ethertypes and IP
/// protocol numbers
pub mod link;
pub use crate::consts::link::*;
/// Constants related to netfilter logging
pub mod netfilter;
pub use crate::consts::netfilter::*;
/// Constants related to top level netlink headers
pub mod nl;
pub use crate::consts::nl::*;
/// Constants related to netlink socket operations
pub mod socket;
pub use crate::consts::socket::*;

/// Reimplementation of alignto macro in C
pub fn alignto(len: usize) -> usize {
    (len + libc::NLA_ALIGNTO as usize - 1) & !(libc::NLA_ALIGNTO as usize - 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_documented_conversions() {
        let bind: u8 = LogCmd::Bind.into();
        assert_eq!(bind, libc::NFULNL_CFG_CMD_BIND as u8);

        let bind_variant = LogCmd::from(libc::NFULNL_CFG_CMD_BIND as u8);
        assert_eq!(bind_variant, LogCmd::Bind);
    }

    #[test]
    fn test_alignto() {
        assert_eq!(alignto(0), 0);
        assert_eq!(alignto(5), 8);
        assert_eq!(alignto(8), 8);
        assert_eq!(alignto(10), 12);
    }

    #[test]
    fn test_unrecognized_roundtrip() {
        let cmd = LogCmd::from(200u8);
        assert!(cmd.is_unrecognized());
        assert_eq!(u8::from(cmd), 200);
    }
}
