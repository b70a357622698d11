//! Capture sessions
//!
//! A [`CaptureSession`] owns the subscription to one NFLOG group. The
//! life cycle is always the same:
//!
//! 1. [`CaptureSession::open`] opens the netlink channel.
//! 2. [`CaptureSession::register`] binds the group and starts a delivery
//!    thread which hands every logged packet to a [`LogHandler`].
//! 3. [`CaptureSession::run`] blocks until a [`CancellationToken`] is
//!    cancelled, usually from a signal handler.
//! 4. [`CaptureSession::close`] stops the delivery thread and releases
//!    the channel. It runs at most once and also runs on drop.
//!
//! Errors while delivering are passed to [`LogHandler::on_error`] and
//! do not end the subscription unless the handler asks for it.
//!
//! ```no_run
//! use nflogd::{
//!     iface::SystemInterfaces,
//!     session::{AuditWriter, CancellationToken, CaptureSession, SessionConfigBuilder},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfigBuilder::default().group(5).build()?;
//! let mut session = CaptureSession::open(config)?;
//! session.register(AuditWriter::new(
//!     std::io::stdout(),
//!     std::io::stderr(),
//!     SystemInterfaces,
//! ))?;
//! let token = CancellationToken::new();
//! session.run(&token);
//! session.close();
//! # Ok(()) }
//! ```

use std::{
    io::{self, Cursor, Write},
    mem::MaybeUninit,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use derive_builder::Builder;
use getset::Getters;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::{
    consts::{
        netfilter::{LogCmd, LogCopyMode, NetfilterMsg},
        nl::{NlmF, Nlmsg},
        socket::NlFamily,
    },
    err::{ConfigError, DeliveryError, SessionError, SocketError},
    format::format_line,
    iface::InterfaceNames,
    netfilter::{LogConfigMode, LogConfigReq},
    nl::{NlBufferIter, Nlmsgerr, Nlmsghdr, NlmsghdrBuilder},
    record::LogRecord,
    socket::NlSocket,
    FromBytes, FromBytesWithInput, MAX_NL_LENGTH,
};

/// Check that `group` is a valid NFLOG group number.
pub fn validate_group(group: u64) -> Result<u16, ConfigError> {
    u16::try_from(group).map_err(|_| ConfigError::GroupOutOfRange(group))
}

/// Settings of a capture session.
#[derive(Builder, Getters, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "owned", build_fn(error = "ConfigError"))]
pub struct SessionConfig {
    /// NFLOG group to subscribe to.
    #[getset(get = "pub")]
    group: u16,
    /// Which parts of the packet the kernel copies.
    #[builder(default = "LogCopyMode::Packet")]
    #[getset(get = "pub")]
    copy_mode: LogCopyMode,
    /// How many bytes of each packet the kernel copies.
    #[builder(default = "0xffff")]
    #[getset(get = "pub")]
    copy_range: u32,
    /// Socket receive buffer size, kernel default if unset.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    recv_buffer_size: Option<usize>,
    /// Protocol family handed to the logging backend bind.
    #[builder(default = "libc::AF_INET as u8")]
    #[getset(get = "pub")]
    family: u8,
}

/// Clonable flag that can be waited on until it is set.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// A token that is not cancelled yet.
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Cancel the token and wake up every waiter.
    pub fn cancel(&self) {
        let (ref cancelled, ref cvar) = *self.inner;
        *cancelled.lock() = true;
        cvar.notify_all();
    }

    /// Returns true once [`CancellationToken::cancel`] was called on
    /// any clone of this token.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) {
        let (ref cancelled, ref cvar) = *self.inner;
        let mut guard = cancelled.lock();
        while !*guard {
            cvar.wait(&mut guard);
        }
    }
}

/// What the delivery thread does after an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Keep delivering records.
    Continue,
    /// Stop delivering. The session stays open until closed.
    Stop,
}

/// Receives the records of a capture session.
///
/// Both methods are called from the delivery thread, one call at a
/// time.
pub trait LogHandler: Send + Sync {
    /// Called once per logged packet.
    fn on_record(&self, record: LogRecord);

    /// Called once per delivery error.
    fn on_error(&self, err: &DeliveryError) -> Delivery;
}

/// Writes one audit line per record.
///
/// Each line is written with a single `write_all` while holding the
/// lock on the output, so lines from different sessions sharing a sink
/// never interleave.
pub struct AuditWriter<W, E, I> {
    out: Mutex<W>,
    err: Mutex<E>,
    interfaces: I,
}

impl<W, E, I> AuditWriter<W, E, I> {
    /// Write records to `out` and errors to `err`, resolving interface
    /// names with `interfaces`.
    pub fn new(out: W, err: E, interfaces: I) -> Self {
        AuditWriter {
            out: Mutex::new(out),
            err: Mutex::new(err),
            interfaces,
        }
    }
}

impl<W, E, I> LogHandler for AuditWriter<W, E, I>
where
    W: Write + Send,
    E: Write + Send,
    I: InterfaceNames,
{
    fn on_record(&self, record: LogRecord) {
        let mut line = format_line(&record, &self.interfaces);
        line.push('\n');
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
            warn!("Failed to write record: {e}");
        }
    }

    fn on_error(&self, err: &DeliveryError) -> Delivery {
        let mut sink = self.err.lock();
        if let Err(e) = writeln!(sink, "received error on hook: {err}") {
            warn!("Failed to report delivery error: {e}");
        }
        Delivery::Continue
    }
}

/// Hand every message in `buffer`, the result of one socket read, to
/// `handler`.
///
/// Returns [`Delivery::Stop`] as soon as the handler asks to stop.
/// Messages after a framing error are dropped since their boundaries
/// are unknown.
pub fn deliver<H>(buffer: &[u8], handler: &H) -> Delivery
where
    H: LogHandler + ?Sized,
{
    for msg in NlBufferIter::new(buffer) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => return handler.on_error(&DeliveryError::Decode(e)),
        };
        let ty = *msg.nl_type();
        let outcome = if ty == u16::from(NetfilterMsg::LogPacket) {
            let payload = msg.nl_payload();
            match LogRecord::from_bytes_with_input(&mut Cursor::new(payload), payload.len()) {
                Ok(record) => {
                    handler.on_record(record);
                    Delivery::Continue
                }
                Err(e) => handler.on_error(&DeliveryError::Decode(e)),
            }
        } else if ty == u16::from(Nlmsg::Error) {
            match Nlmsgerr::from_bytes(&mut Cursor::new(msg.nl_payload())) {
                Ok(err) if err.is_ack() => {
                    trace!("Late ACK for sequence number {}", err.seq);
                    Delivery::Continue
                }
                Ok(err) => handler.on_error(&DeliveryError::Netlink(err.errno())),
                Err(e) => handler.on_error(&DeliveryError::Decode(e)),
            }
        } else {
            trace!("Skipping message of type {ty}");
            Delivery::Continue
        };
        if outcome == Delivery::Stop {
            return Delivery::Stop;
        }
    }
    Delivery::Continue
}

/// Transport used by a [`CaptureSession`].
pub trait LogChannel: Send {
    /// Start delivering records of the channel's group to `handler`.
    fn register(&mut self, handler: Arc<dyn LogHandler>) -> Result<(), SocketError>;

    /// Stop delivering and release the transport. Failures are logged,
    /// not returned.
    fn close(&mut self);
}

struct Worker {
    event_fd: OwnedFd,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// The stop flag is checked between waits, so the thread exits and
    /// is joined even if the eventfd cannot be written.
    fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        let buffer = 1u64.to_ne_bytes();
        let ret = unsafe {
            libc::write(
                self.event_fd.as_raw_fd(),
                buffer.as_ptr() as *const _,
                buffer.len(),
            )
        };
        if ret < 0 {
            warn!(
                "Failed to signal delivery thread to exit: {}; waiting for it to see the stop flag",
                io::Error::last_os_error()
            );
        }
        if self.handle.join().is_err() {
            warn!("Delivery thread panicked");
        }
    }
}

/// `nfnetlink_log` backed [`LogChannel`].
pub struct NflogChannel {
    socket: Option<Arc<NlSocket>>,
    config: SessionConfig,
    seq: u32,
    bound: bool,
    worker: Option<Worker>,
}

impl NflogChannel {
    /// Open a netfilter netlink socket for the group in `config`.
    pub fn open(config: SessionConfig) -> Result<Self, SocketError> {
        let socket = NlSocket::connect(NlFamily::Netfilter, None)?;
        if let Some(size) = *config.recv_buffer_size() {
            socket.set_recv_buffer_size(size)?;
        }
        debug!(
            "Opened netfilter socket with port ID {} for group {}",
            socket.pid()?,
            config.group()
        );
        Ok(NflogChannel {
            socket: Some(Arc::new(socket)),
            config,
            seq: 0,
            bound: false,
            worker: None,
        })
    }

    fn socket(&self) -> Result<&Arc<NlSocket>, SocketError> {
        self.socket
            .as_ref()
            .ok_or_else(|| SocketError::new("Channel is closed"))
    }

    fn config_msg(
        &mut self,
        req: LogConfigReq,
        flags: NlmF,
    ) -> Result<Nlmsghdr<LogConfigReq>, SocketError> {
        self.seq = self.seq.wrapping_add(1);
        NlmsghdrBuilder::default()
            .nl_type(NetfilterMsg::LogConfig.into())
            .nl_flags(flags)
            .nl_seq(self.seq)
            .nl_payload(req)
            .build()
            .map_err(SocketError::new)
    }

    /// Send a configuration request and wait for the kernel to
    /// acknowledge it.
    fn request(&mut self, req: LogConfigReq) -> Result<(), SocketError> {
        let msg = self.config_msg(req, NlmF::REQUEST | NlmF::ACK)?;
        let seq = *msg.nl_seq();
        let socket = self.socket()?;
        socket.send_msg(&msg)?;

        let mut buffer = vec![0; MAX_NL_LENGTH];
        loop {
            let len = socket.recv(&mut buffer[..])?;
            trace!("Buffer received: {:?}", &buffer[..len]);
            for msg in NlBufferIter::new(&buffer[..len]) {
                let msg = msg?;
                if *msg.nl_type() != u16::from(Nlmsg::Error) {
                    trace!(
                        "Skipping message of type {} while waiting for ACK",
                        msg.nl_type()
                    );
                    continue;
                }
                let err = Nlmsgerr::from_bytes(&mut Cursor::new(msg.nl_payload()))?;
                if err.seq != seq {
                    continue;
                }
                return if err.is_ack() {
                    Ok(())
                } else {
                    Err(SocketError::Nlmsgerr(err.errno()))
                };
            }
        }
    }

    /// Sent without asking for an ACK since nothing is read from the
    /// socket afterwards.
    fn unbind(&mut self) -> Result<(), SocketError> {
        let req = LogConfigReq::command(
            libc::AF_UNSPEC as u8,
            *self.config.group(),
            LogCmd::Unbind,
        )?;
        let msg = self.config_msg(req, NlmF::REQUEST)?;
        self.socket()?.send_msg(&msg)
    }

    fn spawn_delivery_thread(
        &self,
        handler: Arc<dyn LogHandler>,
    ) -> Result<Worker, SocketError> {
        let socket = Arc::clone(self.socket()?);

        let owned_event_fd = {
            let event_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
            if event_fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            unsafe { OwnedFd::from_raw_fd(event_fd) }
        };
        let owned_duped_event_fd = {
            let duped_event_fd = unsafe { libc::dup(owned_event_fd.as_raw_fd()) };
            if duped_event_fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            unsafe { OwnedFd::from_raw_fd(duped_event_fd) }
        };

        socket.nonblock()?;

        let epoll = {
            let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
            if epoll_fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            unsafe { OwnedFd::from_raw_fd(epoll_fd) }
        };
        epoll_add(&epoll, owned_event_fd.as_raw_fd(), EVENT_FD_TOKEN)?;
        epoll_add(&epoll, socket.as_raw_fd(), SOCKET_TOKEN)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("nflog-{}", self.config.group()))
            .spawn(move || {
                delivery_loop(
                    |buf| socket.recv(buf),
                    &epoll,
                    &owned_event_fd,
                    &thread_stop,
                    &*handler,
                )
            })?;
        Ok(Worker {
            event_fd: owned_duped_event_fd,
            stop,
            handle,
        })
    }
}

const EVENT_FD_TOKEN: u64 = 0;
const SOCKET_TOKEN: u64 = 1;
const EPOLL_TIMEOUT_MS: libc::c_int = 100;

fn epoll_add(epoll: &OwnedFd, fd: RawFd, token: u64) -> Result<(), io::Error> {
    let mut event = libc::epoll_event {
        events: libc::EPOLLIN as u32,
        u64: token,
    };
    match unsafe { libc::epoll_ctl(epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event) } {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

fn delivery_loop<R>(
    mut recv: R,
    epoll: &OwnedFd,
    event_fd: &OwnedFd,
    stop: &AtomicBool,
    handler: &dyn LogHandler,
) where
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mut buffer = vec![0; MAX_NL_LENGTH];
    let mut events = vec![MaybeUninit::<libc::epoll_event>::uninit(); 2];
    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("Delivery thread stopped; exiting");
            return;
        }
        let event_count = unsafe {
            libc::epoll_wait(
                epoll.as_raw_fd(),
                events.as_mut_ptr() as *mut _,
                events.len() as libc::c_int,
                EPOLL_TIMEOUT_MS,
            )
        };
        if event_count < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!("Failed to epoll file descriptors; exiting delivery thread");
            handler.on_error(&DeliveryError::Recv(e));
            return;
        }
        for event in events.iter().take(event_count as usize) {
            let token = unsafe { event.assume_init_ref() }.u64;
            if token == EVENT_FD_TOKEN {
                let mut signal = [0u8; 8];
                let ret = unsafe {
                    libc::read(
                        event_fd.as_raw_fd(),
                        signal.as_mut_ptr() as *mut _,
                        signal.len(),
                    )
                };
                if ret > 0 {
                    debug!("Delivery thread signaled to exit; exiting");
                    return;
                }
            } else if token == SOCKET_TOKEN
                && drain(&mut recv, &mut buffer, handler) == Delivery::Stop
            {
                debug!("Handler stopped delivery; exiting delivery thread");
                return;
            }
        }
    }
}

/// Read from the socket until it would block or fails.
fn drain<R>(recv: &mut R, buffer: &mut [u8], handler: &dyn LogHandler) -> Delivery
where
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    loop {
        match recv(&mut *buffer) {
            Ok(len) => {
                trace!("Buffer received: {:?}", &buffer[..len]);
                if deliver(&buffer[..len], handler) == Delivery::Stop {
                    return Delivery::Stop;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Delivery::Continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => (),
            // ENOBUFS is reported once per overrun, the socket stays usable.
            Err(e) => return handler.on_error(&DeliveryError::Recv(e)),
        }
    }
}

impl LogChannel for NflogChannel {
    fn register(&mut self, handler: Arc<dyn LogHandler>) -> Result<(), SocketError> {
        if self.worker.is_some() {
            return Err(SocketError::new("A handler is already registered"));
        }
        let family = *self.config.family();
        let group = *self.config.group();

        // Rebinding the backend fails on kernels that already have it
        // bound or no longer need it; neither is fatal.
        for cmd in [LogCmd::PfUnbind, LogCmd::PfBind] {
            if let Err(e) = self.request(LogConfigReq::command(family, 0, cmd)?) {
                warn!("{cmd:?} for family {family} failed: {e}");
            }
        }
        self.request(LogConfigReq::command(libc::AF_UNSPEC as u8, group, LogCmd::Bind)?)?;
        self.bound = true;
        self.request(LogConfigReq::mode(
            group,
            LogConfigMode {
                copy_range: *self.config.copy_range(),
                copy_mode: *self.config.copy_mode(),
            },
        )?)?;
        debug!("Bound to NFLOG group {group}");

        self.worker = Some(self.spawn_delivery_thread(handler)?);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        if self.bound {
            self.bound = false;
            if let Err(e) = self.unbind() {
                warn!("Failed to unbind NFLOG group {}: {e}", self.config.group());
            }
        }
        if self.socket.take().is_some() {
            debug!("Closed netfilter socket for group {}", self.config.group());
        }
    }
}

impl Drop for NflogChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscription to one NFLOG group.
pub struct CaptureSession<C: LogChannel = NflogChannel> {
    group: u16,
    channel: C,
    closed: bool,
}

impl CaptureSession<NflogChannel> {
    /// Open the netlink channel for the group in `config`.
    pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
        let group = *config.group();
        let channel = NflogChannel::open(config).map_err(SessionError::Open)?;
        Ok(CaptureSession::with_channel(group, channel))
    }
}

impl<C: LogChannel> CaptureSession<C> {
    /// Wrap an already opened channel.
    pub fn with_channel(group: u16, channel: C) -> Self {
        CaptureSession {
            group,
            channel,
            closed: false,
        }
    }

    /// Group this session subscribes to.
    pub fn group(&self) -> u16 {
        self.group
    }

    /// Returns true once the channel has been released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Start delivering records to `handler`.
    ///
    /// On failure the channel is released before the error is
    /// returned.
    pub fn register<H>(&mut self, handler: H) -> Result<(), SessionError>
    where
        H: LogHandler + 'static,
    {
        if self.closed {
            return Err(SessionError::Register(SocketError::new("Session is closed")));
        }
        match self.channel.register(Arc::new(handler)) {
            Ok(()) => {
                debug!("Registered handler for group {}", self.group);
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(SessionError::Register(e))
            }
        }
    }

    /// Block until `token` is cancelled.
    pub fn run(&self, token: &CancellationToken) {
        token.wait();
        debug!("Session for group {} cancelled", self.group);
    }

    /// Release the channel. Only the first call has an effect.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.channel.close();
        }
    }
}

impl<C: LogChannel> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use byteorder::{NativeEndian, WriteBytesExt};

    use crate::{
        attr::NlattrBuilder,
        consts::netfilter::{NfLogAttr, NFNETLINK_V0},
        ipv4::test::header,
        test::setup,
        ToBytes,
    };

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryChannel {
        fail_register: bool,
        closes: Arc<AtomicUsize>,
        handler: Arc<Mutex<Option<Arc<dyn LogHandler>>>>,
    }

    impl LogChannel for MemoryChannel {
        fn register(&mut self, handler: Arc<dyn LogHandler>) -> Result<(), SocketError> {
            if self.fail_register {
                return Err(SocketError::Nlmsgerr(libc::EPERM));
            }
            *self.handler.lock() = Some(handler);
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.handler.lock().take();
        }
    }

    struct StopOnError {
        records: AtomicUsize,
    }

    impl LogHandler for StopOnError {
        fn on_record(&self, _: LogRecord) {
            self.records.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _: &DeliveryError) -> Delivery {
            Delivery::Stop
        }
    }

    #[derive(Default)]
    struct ErrorLog {
        errors: Mutex<Vec<String>>,
    }

    impl LogHandler for ErrorLog {
        fn on_record(&self, _: LogRecord) {}

        fn on_error(&self, err: &DeliveryError) -> Delivery {
            self.errors.lock().push(err.to_string());
            Delivery::Continue
        }
    }

    fn eventfd() -> OwnedFd {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(fd >= 0);
        unsafe { OwnedFd::from_raw_fd(fd) }
    }

    fn writer() -> (SharedBuf, SharedBuf, AuditWriter<SharedBuf, SharedBuf, HashMap<u32, String>>) {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let interfaces = HashMap::from([(2, "eth0".to_string())]);
        (out.clone(), err.clone(), AuditWriter::new(out, err, interfaces))
    }

    fn packet(prefix: &str, payload: Vec<u8>, buffer: &mut Cursor<Vec<u8>>) {
        let mut body = Cursor::new(vec![libc::AF_INET as u8, NFNETLINK_V0, 0, 0]);
        body.set_position(4);
        let mut prefix = prefix.as_bytes().to_vec();
        prefix.push(0);
        for (ty, bytes) in [
            (NfLogAttr::Prefix, prefix),
            (NfLogAttr::IfindexIndev, 2u32.to_be_bytes().to_vec()),
            (NfLogAttr::Payload, payload),
        ] {
            NlattrBuilder::default()
                .nla_type(ty)
                .nla_payload(bytes)
                .build()
                .unwrap()
                .to_bytes(&mut body)
                .unwrap();
        }
        message(NetfilterMsg::LogPacket.into(), body.into_inner(), buffer);
    }

    fn message(ty: u16, payload: Vec<u8>, buffer: &mut Cursor<Vec<u8>>) {
        NlmsghdrBuilder::default()
            .nl_type(ty)
            .nl_flags(NlmF::empty())
            .nl_payload(payload)
            .build()
            .unwrap()
            .to_bytes(buffer)
            .unwrap();
    }

    fn netlink_error(errno: i32, buffer: &mut Cursor<Vec<u8>>) {
        let mut payload = Cursor::new(Vec::new());
        payload.write_i32::<NativeEndian>(-errno).unwrap();
        payload.write_u32::<NativeEndian>(16).unwrap();
        payload.write_u16::<NativeEndian>(NetfilterMsg::LogConfig.into()).unwrap();
        payload.write_u16::<NativeEndian>(0).unwrap();
        payload.write_u32::<NativeEndian>(0).unwrap();
        payload.write_u32::<NativeEndian>(0).unwrap();
        message(Nlmsg::Error.into(), payload.into_inner(), buffer);
    }

    #[test]
    fn test_validate_group() {
        assert_eq!(validate_group(0), Ok(0));
        assert_eq!(validate_group(65535), Ok(65535));
        assert_eq!(validate_group(65536), Err(ConfigError::GroupOutOfRange(65536)));
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfigBuilder::default().group(7).build().unwrap();
        assert_eq!(*config.group(), 7);
        assert_eq!(*config.copy_mode(), LogCopyMode::Packet);
        assert_eq!(*config.copy_range(), 0xffff);
        assert_eq!(*config.recv_buffer_size(), None);
        assert_eq!(*config.family(), libc::AF_INET as u8);

        assert_eq!(
            SessionConfigBuilder::default().build().unwrap_err(),
            ConfigError::Missing("group".to_string())
        );
    }

    #[test]
    fn test_cancellation() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let session = CaptureSession::with_channel(0, MemoryChannel::default());
        session.run(&token);
        assert!(token.is_cancelled());
        handle.join().unwrap();

        // Already cancelled tokens return at once.
        session.run(&token);
    }

    #[test]
    fn test_close_once() {
        setup();

        let channel = MemoryChannel::default();
        let closes = Arc::clone(&channel.closes);
        let handler = Arc::clone(&channel.handler);
        let mut session = CaptureSession::with_channel(3, channel);
        let (_, _, w) = writer();
        session.register(w).unwrap();
        assert!(handler.lock().is_some());

        session.close();
        session.close();
        assert!(session.is_closed());
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(handler.lock().is_none());
    }

    #[test]
    fn test_close_on_drop() {
        let channel = MemoryChannel::default();
        let closes = Arc::clone(&channel.closes);
        drop(CaptureSession::with_channel(3, channel));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_failure_releases_channel() {
        setup();

        let channel = MemoryChannel {
            fail_register: true,
            ..Default::default()
        };
        let closes = Arc::clone(&channel.closes);
        let mut session = CaptureSession::with_channel(3, channel);
        let (_, _, w) = writer();
        let err = session.register(w).unwrap_err();
        assert!(matches!(err, SessionError::Register(SocketError::Nlmsgerr(libc::EPERM))));
        assert!(session.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (_, _, w) = writer();
        assert!(session.register(w).is_err());
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_continues_after_error() {
        setup();

        let mut buffer = Cursor::new(Vec::new());
        packet("first", header(60, [10, 0, 0, 1], [10, 0, 0, 2], 6), &mut buffer);
        // Truncated attribute inside an intact netlink message
        message(NetfilterMsg::LogPacket.into(), vec![2, 0, 0, 0, 8, 0, 1, 0], &mut buffer);
        netlink_error(libc::ENOBUFS, &mut buffer);
        packet("second", vec![0x60, 0], &mut buffer);

        let (out, err, w) = writer();
        assert_eq!(deliver(buffer.get_ref(), &w), Delivery::Continue);

        let lines = out.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(
            "  first IN=eth0 OUT= HWTYPE= LEN=60 SRC=10.0.0.1 DST=10.0.0.2 PROTO=TCP"
        ));
        assert!(lines[1].ends_with("  second IN=eth0 OUT= HWTYPE= <invalid not IPv4??>"));

        let errors = err.lines();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|l| l.starts_with("received error on hook: ")));
    }

    #[test]
    fn test_delivery_stops_when_asked() {
        let mut buffer = Cursor::new(Vec::new());
        packet("a", Vec::new(), &mut buffer);
        netlink_error(libc::ENOBUFS, &mut buffer);
        packet("b", Vec::new(), &mut buffer);

        let handler = StopOnError {
            records: AtomicUsize::new(0),
        };
        assert_eq!(deliver(buffer.get_ref(), &handler), Delivery::Stop);
        assert_eq!(handler.records.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_skips_acks_and_noops() {
        let mut buffer = Cursor::new(Vec::new());
        netlink_error(0, &mut buffer);
        message(Nlmsg::Noop.into(), Vec::new(), &mut buffer);
        packet("x", Vec::new(), &mut buffer);

        let (out, err, w) = writer();
        assert_eq!(deliver(buffer.get_ref(), &w), Delivery::Continue);
        assert_eq!(out.lines().len(), 1);
        assert!(err.lines().is_empty());
    }

    #[test]
    fn test_delivery_framing_error() {
        let (out, err, w) = writer();
        assert_eq!(deliver(&[0xff; 20], &w), Delivery::Continue);
        assert!(out.lines().is_empty());
        assert_eq!(err.lines().len(), 1);
    }

    #[test]
    fn test_stop_joins_when_signal_fails() {
        setup();

        let epoll = unsafe { OwnedFd::from_raw_fd(libc::epoll_create1(libc::EPOLL_CLOEXEC)) };
        let event_fd = eventfd();
        epoll_add(&epoll, event_fd.as_raw_fd(), EVENT_FD_TOKEN).unwrap();

        // Writing to the read end of a pipe fails with EBADF
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        drop(unsafe { OwnedFd::from_raw_fd(fds[1]) });

        let handler = Arc::new(ErrorLog::default());
        let thread_handler = Arc::clone(&handler);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            delivery_loop(
                |_: &mut [u8]| Err(io::ErrorKind::WouldBlock.into()),
                &epoll,
                &event_fd,
                &thread_stop,
                &*thread_handler,
            )
        });
        Worker {
            event_fd: read_end,
            stop,
            handle,
        }
        .stop();

        // The thread has exited and dropped everything it owned.
        assert_eq!(Arc::strong_count(&handler), 1);
        assert!(handler.errors.lock().is_empty());
    }

    #[test]
    fn test_stop_through_event_fd() {
        let epoll = unsafe { OwnedFd::from_raw_fd(libc::epoll_create1(libc::EPOLL_CLOEXEC)) };
        let event_fd = eventfd();
        epoll_add(&epoll, event_fd.as_raw_fd(), EVENT_FD_TOKEN).unwrap();
        let duped = unsafe { OwnedFd::from_raw_fd(libc::dup(event_fd.as_raw_fd())) };

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            delivery_loop(
                |_: &mut [u8]| Ok(0),
                &epoll,
                &event_fd,
                &thread_stop,
                &ErrorLog::default(),
            )
        });
        Worker {
            event_fd: duped,
            stop,
            handle,
        }
        .stop();
    }

    #[test]
    fn test_wait_failure_reported() {
        setup();

        // epoll_wait on a descriptor that is not an epoll instance fails
        // with EINVAL.
        let not_epoll = eventfd();
        let event_fd = eventfd();
        let stop = AtomicBool::new(false);
        let handler = ErrorLog::default();
        delivery_loop(|_: &mut [u8]| Ok(0), &not_epoll, &event_fd, &stop, &handler);

        let errors = handler.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("receive failed: "));
    }

    #[test]
    #[ignore = "needs CAP_NET_ADMIN"]
    fn real_test_open_register_close() {
        setup();

        let config = SessionConfigBuilder::default().group(4242).build().unwrap();
        let mut session = CaptureSession::open(config).unwrap();
        let (_, _, w) = writer();
        session.register(w).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        session.run(&token);
        session.close();
        assert!(session.is_closed());
    }
}
