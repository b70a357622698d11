impl_var!(
    /// General address families for sockets
    pub AddrFamily, libc::c_int,
    Unspecified => libc::AF_UNSPEC,
    Inet => libc::AF_INET,
    Inet6 => libc::AF_INET6,
    Netlink => libc::AF_NETLINK,
    Bridge => libc::AF_BRIDGE
);

impl_var!(
    /// Values for `nl_family` in `NlSocket`
    pub NlFamily, libc::c_int,
    Route => libc::NETLINK_ROUTE,
    Netfilter => libc::NETLINK_NETFILTER,
    Generic => libc::NETLINK_GENERIC
);
