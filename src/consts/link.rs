//! Link layer and network layer codes that show up in logged packets
//! along with the short names printed for them.

impl_var!(
    /// Hardware types (`ARPHRD_*`) reported in
    /// [`NfLogAttr::Hwtype`][crate::consts::netfilter::NfLogAttr::Hwtype].
    pub ArpHrd, u16,
    Netrom => 0,
    Ether => 1,
    Eether => 2,
    Ax25 => 3,
    Pronet => 4,
    Chaos => 5,
    Ieee802 => 6,
    Arcnet => 7,
    Appletlk => 8,
    Dlci => 15,
    Atm => 19,
    Metricom => 23,
    Ieee1394 => 24,
    Eui64 => 27,
    Infiniband => 32,
    Slip => 256,
    Cslip => 257,
    Slip6 => 258,
    Cslip6 => 259,
    Adapt => 264,
    Rose => 270,
    X25 => 271,
    Hwx25 => 272,
    Can => 280,
    Mctp => 290,
    Ppp => 512,
    Hdlc => 513,
    Lapb => 516,
    Ddcmp => 517,
    RawHdlc => 518,
    RawIp => 519,
    Tunnel => 768,
    Tunnel6 => 769,
    Frad => 770,
    Skip => 771,
    Loopback => 772,
    Localtlk => 773,
    Fddi => 774,
    Bif => 775,
    Sit => 776,
    Ipddp => 777,
    IpGre => 778,
    Pimreg => 779,
    Hippi => 780,
    Ash => 781,
    Econet => 782,
    Irda => 783,
    Fcpp => 784,
    Fcal => 785,
    Fcpl => 786,
    Fcfabric => 787,
    Ieee802Tr => 800,
    Ieee80211 => 801,
    Ieee80211Prism => 802,
    Ieee80211Radiotap => 803,
    Ieee802154 => 804,
    Ieee802154Monitor => 805,
    Phonet => 820,
    PhonetPipe => 821,
    Caif => 822,
    Ip6Gre => 823,
    Netlink => 824,
    SixLowpan => 825,
    Vsockmon => 826,
    Void => 0xffff,
    None => 0xfffe
);

impl_mnemonics!(
    ArpHrd,
    Netrom => "NETROM",
    Ether => "ETHER",
    Eether => "EETHER",
    Ax25 => "AX25",
    Pronet => "PRONET",
    Chaos => "CHAOS",
    Ieee802 => "IEEE802",
    Arcnet => "ARCNET",
    Appletlk => "APPLETLK",
    Dlci => "DLCI",
    Atm => "ATM",
    Metricom => "METRICOM",
    Ieee1394 => "IEEE1394",
    Eui64 => "EUI64",
    Infiniband => "INFINIBAND",
    Slip => "SLIP",
    Cslip => "CSLIP",
    Slip6 => "SLIP6",
    Cslip6 => "CSLIP6",
    Adapt => "ADAPT",
    Rose => "ROSE",
    X25 => "X25",
    Hwx25 => "HWX25",
    Can => "CAN",
    Mctp => "MCTP",
    Ppp => "PPP",
    Hdlc => "HDLC",
    Lapb => "LAPB",
    Ddcmp => "DDCMP",
    RawHdlc => "RAWHDLC",
    RawIp => "RAWIP",
    Tunnel => "TUNNEL",
    Tunnel6 => "TUNNEL6",
    Frad => "FRAD",
    Skip => "SKIP",
    Loopback => "LOOPBACK",
    Localtlk => "LOCALTLK",
    Fddi => "FDDI",
    Bif => "BIF",
    Sit => "SIT",
    Ipddp => "IPDDP",
    IpGre => "IPGRE",
    Pimreg => "PIMREG",
    Hippi => "HIPPI",
    Ash => "ASH",
    Econet => "ECONET",
    Irda => "IRDA",
    Fcpp => "FCPP",
    Fcal => "FCAL",
    Fcpl => "FCPL",
    Fcfabric => "FCFABRIC",
    Ieee802Tr => "IEEE802_TR",
    Ieee80211 => "IEEE80211",
    Ieee80211Prism => "IEEE80211_PRISM",
    Ieee80211Radiotap => "IEEE80211_RADIOTAP",
    Ieee802154 => "IEEE802154",
    Ieee802154Monitor => "IEEE802154_MONITOR",
    Phonet => "PHONET",
    PhonetPipe => "PHONET_PIPE",
    Caif => "CAIF",
    Ip6Gre => "IP6GRE",
    Netlink => "NETLINK",
    SixLowpan => "6LOWPAN",
    Vsockmon => "VSOCKMON",
    Void => "VOID",
    None => "NONE",
);

impl_var!(
    /// Link layer protocol identifiers (`ETH_P_*`), the values the
    /// kernel stores in `skb->protocol` and reports as the hardware
    /// protocol of a logged packet.
    pub EthType, u16,
    Ieee8023 => 0x0001,
    All => 0x0003,
    Ieee8022 => 0x0004,
    Can => 0x000c,
    CanFd => 0x000d,
    Ipv4 => 0x0800,
    Arp => 0x0806,
    Rarp => 0x8035,
    Vlan => 0x8100,
    Ipx => 0x8137,
    Ipv6 => 0x86dd,
    PppDisc => 0x8863,
    PppSes => 0x8864,
    MplsUc => 0x8847,
    MplsMc => 0x8848,
    Eapol => 0x888e,
    QinQ => 0x88a8,
    Lldp => 0x88cc,
    Macsec => 0x88e5,
    Ptp => 0x88f7,
    Fcoe => 0x8906
);

impl_mnemonics!(
    EthType,
    Ieee8023 => "802.3",
    All => "ALL",
    Ieee8022 => "802.2",
    Can => "CAN",
    CanFd => "CANFD",
    Ipv4 => "IPv4",
    Arp => "ARP",
    Rarp => "RARP",
    Vlan => "802.1Q",
    Ipx => "IPX",
    Ipv6 => "IPv6",
    PppDisc => "PPPoE-D",
    PppSes => "PPPoE-S",
    MplsUc => "MPLS",
    MplsMc => "MPLS-MC",
    Eapol => "EAPOL",
    QinQ => "802.1AD",
    Lldp => "LLDP",
    Macsec => "MACSEC",
    Ptp => "PTP",
    Fcoe => "FCOE",
);

impl_var!(
    /// IP protocol numbers carried in the IPv4 `protocol` field.
    pub IpProto, u8,
    Icmp => 1,
    Igmp => 2,
    IpIp => 4,
    Tcp => 6,
    Egp => 8,
    Pup => 12,
    Udp => 17,
    Idp => 22,
    Tp => 29,
    Dccp => 33,
    Ipv6 => 41,
    Rsvp => 46,
    Gre => 47,
    Esp => 50,
    Ah => 51,
    Icmpv6 => 58,
    Ospf => 89,
    Mtp => 92,
    Beetph => 94,
    Encap => 98,
    Pim => 103,
    Comp => 108,
    Vrrp => 112,
    L2tp => 115,
    Sctp => 132,
    UdpLite => 136,
    Mpls => 137,
    Ethernet => 143,
    Raw => 255
);

impl_mnemonics!(
    IpProto,
    Icmp => "ICMP",
    Igmp => "IGMP",
    IpIp => "IPIP",
    Tcp => "TCP",
    Egp => "EGP",
    Pup => "PUP",
    Udp => "UDP",
    Idp => "IDP",
    Tp => "TP",
    Dccp => "DCCP",
    Ipv6 => "IPv6",
    Rsvp => "RSVP",
    Gre => "GRE",
    Esp => "ESP",
    Ah => "AH",
    Icmpv6 => "ICMPv6",
    Ospf => "OSPF",
    Mtp => "MTP",
    Beetph => "BEETPH",
    Encap => "ENCAP",
    Pim => "PIM",
    Comp => "COMP",
    Vrrp => "VRRP",
    L2tp => "L2TP",
    Sctp => "SCTP",
    UdpLite => "UDPLITE",
    Mpls => "MPLS",
    Ethernet => "ETHERNET",
    Raw => "RAW",
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arphrd_mnemonics() {
        assert_eq!(ArpHrd::from(1u16).mnemonic(), Some("ETHER"));
        assert_eq!(ArpHrd::from(772u16).mnemonic(), Some("LOOPBACK"));
        assert_eq!(ArpHrd::from(0xfffeu16), ArpHrd::None);
        assert_eq!(ArpHrd::from(4242u16).mnemonic(), None);
    }

    #[test]
    fn test_ethtype_mnemonics() {
        assert_eq!(EthType::from(0x0800u16).mnemonic(), Some("IPv4"));
        assert_eq!(EthType::from(0x86ddu16).mnemonic(), Some("IPv6"));
        assert!(EthType::from(0x88b5u16).is_unrecognized());
    }

    #[test]
    fn test_ip_proto_mnemonics() {
        assert_eq!(IpProto::from(6u8).mnemonic(), Some("TCP"));
        assert_eq!(IpProto::from(17u8).mnemonic(), Some("UDP"));
        assert_eq!(IpProto::from(1u8).mnemonic(), Some("ICMP"));
        assert_eq!(IpProto::from(253u8).mnemonic(), None);
    }
}
