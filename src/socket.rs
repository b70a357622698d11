//! This module provides the low level netlink socket used by the
//! capture session.
//!
//! ## Important methods
//! * [`NlSocket::send`] and [`NlSocket::recv`] are meant to be the
//!   most low level calls. They essentially do what the C system
//!   calls `send` and `recv` do with very little abstraction.
//! * [`NlSocket::send_msg`] serializes an
//!   [`Nlmsghdr`][crate::nl::Nlmsghdr] before sending it.
//!
//! ## Design decisions
//!
//! The file descriptor is owned by [`NlSocket`] and closed on drop.
//! Sharing between the session and its delivery thread is done
//! through [`Arc`][std::sync::Arc] so the descriptor is closed exactly
//! once, after the last user is gone.

use std::{
    io::{self, Cursor},
    mem::{size_of, zeroed, MaybeUninit},
    os::unix::io::{AsRawFd, RawFd},
};

use libc::{c_int, c_void};
use log::trace;

use crate::{
    consts::socket::{AddrFamily, NlFamily},
    err::SocketError,
    nl::Nlmsghdr,
    Size, ToBytes,
};

/// Low level access to a netlink socket.
pub struct NlSocket {
    fd: c_int,
}

impl NlSocket {
    /// Wrapper around `socket()` syscall filling in the
    /// netlink-specific information.
    pub fn new(proto: NlFamily) -> Result<Self, io::Error> {
        let fd = match unsafe {
            libc::socket(
                AddrFamily::Netlink.into(),
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                proto.into(),
            )
        } {
            i if i >= 0 => Ok(i),
            _ => Err(io::Error::last_os_error()),
        }?;
        Ok(NlSocket { fd })
    }

    /// Equivalent of `socket` and `bind` calls.
    pub fn connect(proto: NlFamily, pid: Option<u32>) -> Result<Self, io::Error> {
        let s = NlSocket::new(proto)?;
        s.bind(pid)?;
        Ok(s)
    }

    /// Set underlying socket file descriptor to be non blocking.
    pub fn nonblock(&self) -> Result<(), io::Error> {
        match unsafe {
            libc::fcntl(
                self.fd,
                libc::F_SETFL,
                libc::fcntl(self.fd, libc::F_GETFL, 0) | libc::O_NONBLOCK,
            )
        } {
            i if i < 0 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        }
    }

    /// Use this function to bind to a netlink ID. See netlink(7) man
    /// pages for more information on netlink IDs. NFLOG groups are
    /// not multicast groups, so no group membership is requested
    /// here.
    pub fn bind(&self, pid: Option<u32>) -> Result<(), io::Error> {
        let mut nladdr = unsafe { zeroed::<libc::sockaddr_nl>() };
        nladdr.nl_family = c_int::from(AddrFamily::Netlink) as u16;
        nladdr.nl_pid = pid.unwrap_or(0);
        match unsafe {
            libc::bind(
                self.fd,
                &nladdr as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_nl>() as u32,
            )
        } {
            i if i >= 0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Send message encoded as byte slice to the netlink ID
    /// specified in the netlink header
    /// [`Nlmsghdr`][crate::nl::Nlmsghdr]
    pub fn send<B>(&self, buf: B) -> Result<libc::size_t, io::Error>
    where
        B: AsRef<[u8]>,
    {
        match unsafe {
            libc::send(
                self.fd,
                buf.as_ref() as *const _ as *const c_void,
                buf.as_ref().len(),
                0,
            )
        } {
            i if i >= 0 => Ok(i as libc::size_t),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Convenience function to serialize and send an [`Nlmsghdr`]
    /// struct.
    pub fn send_msg<P>(&self, msg: &Nlmsghdr<P>) -> Result<(), SocketError>
    where
        P: ToBytes,
    {
        let mut buffer = Cursor::new(Vec::with_capacity(msg.padded_size()));
        msg.to_bytes(&mut buffer)?;
        trace!("Buffer sent: {:?}", buffer.get_ref());
        self.send(buffer.get_ref())?;
        Ok(())
    }

    /// Receive message encoded as byte slice from the netlink socket.
    ///
    /// Returns the number of bytes written to `buf`. A non-blocking
    /// socket with nothing to read returns
    /// [`io::ErrorKind::WouldBlock`].
    pub fn recv<B>(&self, mut buf: B) -> Result<libc::size_t, io::Error>
    where
        B: AsMut<[u8]>,
    {
        match unsafe {
            libc::recv(
                self.fd,
                buf.as_mut() as *mut _ as *mut c_void,
                buf.as_mut().len(),
                0,
            )
        } {
            i if i >= 0 => Ok(i as libc::size_t),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Get the PID for this socket.
    pub fn pid(&self) -> Result<u32, io::Error> {
        let mut sock_len = size_of::<libc::sockaddr_nl>() as u32;
        let mut sock_addr: MaybeUninit<libc::sockaddr_nl> = MaybeUninit::uninit();
        match unsafe {
            libc::getsockname(
                self.fd,
                sock_addr.as_mut_ptr() as *mut _,
                &mut sock_len as *mut _,
            )
        } {
            i if i >= 0 => Ok(unsafe { sock_addr.assume_init() }.nl_pid),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Set the size of the receive buffer for the socket.
    ///
    /// A larger buffer lowers the chance of the kernel dropping
    /// logged packets (reported as `ENOBUFS`) during bursts. The
    /// kernel doubles the value for bookkeeping overhead and caps it
    /// at `/proc/sys/net/core/rmem_max`.
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), io::Error> {
        let size = c_int::try_from(size).unwrap_or(c_int::MAX);
        match unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &size as *const _ as *const c_void,
                size_of::<c_int>() as libc::socklen_t,
            )
        } {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }
}

impl AsRawFd for NlSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for NlSocket {
    /// Closes underlying file descriptor to avoid file descriptor
    /// leaks.
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        consts::{
            netfilter::{LogCmd, NetfilterMsg},
            nl::NlmF,
        },
        netfilter::LogConfigReq,
        nl::NlmsghdrBuilder,
        test::setup,
    };

    #[test]
    #[ignore = "needs netlink sockets"]
    fn real_test_pid() {
        setup();

        let s = NlSocket::connect(NlFamily::Netfilter, Some(5555)).unwrap();
        assert_eq!(s.pid().unwrap(), 5555);
    }

    #[test]
    #[ignore = "needs netlink sockets"]
    fn real_test_nonblock() {
        setup();

        let s = NlSocket::connect(NlFamily::Netfilter, None).unwrap();
        s.nonblock().unwrap();
        let flags = unsafe { libc::fcntl(s.as_raw_fd(), libc::F_GETFL, 0) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
        let mut buf = [0u8; 64];
        assert_eq!(
            s.recv(&mut buf[..]).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
    }

    #[test]
    #[ignore = "needs netlink sockets"]
    fn real_test_send_msg() {
        setup();

        let s = NlSocket::connect(NlFamily::Netfilter, None).unwrap();
        let msg = NlmsghdrBuilder::default()
            .nl_type(NetfilterMsg::LogConfig.into())
            .nl_flags(NlmF::REQUEST)
            .nl_payload(
                LogConfigReq::command(libc::AF_UNSPEC as u8, 4242, LogCmd::Unbind).unwrap(),
            )
            .build()
            .unwrap();
        let mut buffer = Cursor::new(Vec::new());
        msg.to_bytes(&mut buffer).unwrap();
        assert_eq!(buffer.get_ref().len(), msg.padded_size());
        s.send_msg(&msg).unwrap();
    }
}
