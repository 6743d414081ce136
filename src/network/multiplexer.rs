//! Readiness multiplexer backends
//!
//! Two backends behind one interface, picked once per process:
//! - `Edge`: mio (epoll/kqueue). Native timeout unit is a `Duration`.
//! - `Classic`: `poll(2)` readiness list. Native timeout unit is milliseconds.
//!
//! Callers always pass a `Duration`; the conversion to the native unit lives in
//! each backend.

use std::io;
use std::os::fd::RawFd;
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, warn};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

const EVENTS_CAPACITY: usize = 16;

/// Which backend a [`Multiplexer`] uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Edge-notification capable (epoll/kqueue through mio)
    Edge,
    /// Classic readiness list (`poll(2)`)
    Classic,
}

/// Readiness of one registered descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub fd: RawFd,
    pub readable: bool,
    pub priority: bool,
    pub error: bool,
    pub hangup: bool,
}

/// Single readiness-wait interface over both backends
pub trait Multiplexer {
    fn kind(&self) -> BackendKind;

    /// Watch `fd` for readable, priority, error and hangup readiness
    fn register(&mut self, fd: RawFd) -> io::Result<()>;

    /// Stop watching `fd`. Unknown descriptors are a no-op.
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block for at most `timeout`
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>>;

    /// Ask to be told again if `fd` is still ready. Level-triggered backends
    /// already do this.
    fn rearm(&mut self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }
}

/// Pick a backend, preferring edge notification. Probed once per process.
pub fn probe() -> BackendKind {
    static PROBED: OnceLock<BackendKind> = OnceLock::new();
    *PROBED.get_or_init(|| match Poll::new() {
        Ok(_) => BackendKind::Edge,
        Err(e) => {
            warn!("edge multiplexer unavailable ({e}), falling back to poll(2)");
            BackendKind::Classic
        }
    })
}

/// Construct a backend of the given kind
pub fn open(kind: BackendKind) -> io::Result<Box<dyn Multiplexer>> {
    debug!("opening {kind:?} multiplexer");
    Ok(match kind {
        BackendKind::Edge => Box::new(EdgeMultiplexer::new()?),
        BackendKind::Classic => Box::new(ClassicMultiplexer::new()),
    })
}

fn interest() -> Interest {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Interest::READABLE | Interest::PRIORITY
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        Interest::READABLE
    }
}

/// mio-backed multiplexer
pub struct EdgeMultiplexer {
    poll: Poll,
    events: Events,
    watched: Vec<RawFd>,
}

impl EdgeMultiplexer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            watched: Vec::new(),
        })
    }

    #[inline(always)]
    fn token(fd: RawFd) -> Token {
        Token(fd as usize)
    }
}

impl Multiplexer for EdgeMultiplexer {
    fn kind(&self) -> BackendKind {
        BackendKind::Edge
    }

    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Self::token(fd), interest())?;
        self.watched.push(fd);
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let Some(pos) = self.watched.iter().position(|&w| w == fd) else {
            return Ok(());
        };
        self.watched.swap_remove(pos);
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        Ok(self
            .events
            .iter()
            .map(|event| Readiness {
                fd: event.token().0 as RawFd,
                readable: event.is_readable(),
                priority: event.is_priority(),
                error: event.is_error(),
                hangup: event.is_read_closed() || event.is_write_closed(),
            })
            .collect())
    }

    /// Re-registering re-evaluates readiness, so data still queued in the
    /// socket produces a fresh notification on the next wait.
    fn rearm(&mut self, fd: RawFd) -> io::Result<()> {
        if !self.watched.contains(&fd) {
            return Ok(());
        }
        self.poll
            .registry()
            .reregister(&mut SourceFd(&fd), Self::token(fd), interest())
    }
}

/// `poll(2)`-backed multiplexer
#[derive(Default)]
pub struct ClassicMultiplexer {
    fds: Vec<libc::pollfd>,
}

impl ClassicMultiplexer {
    const MILLIS_PER_SECOND: u128 = 1000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-millisecond waits round up so a tiny timeout does not become a busy spin
    fn timeout_millis(timeout: Duration) -> libc::c_int {
        let nanos = timeout.as_nanos();
        let per_milli = 1_000_000_000 / Self::MILLIS_PER_SECOND;
        let millis = nanos.div_ceil(per_milli);
        libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
    }
}

impl Multiplexer for ClassicMultiplexer {
    fn kind(&self) -> BackendKind {
        BackendKind::Classic
    }

    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        if self.fds.iter().any(|p| p.fd == fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("fd {fd} already registered"),
            ));
        }
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        });
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.fds.retain(|p| p.fd != fd);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        for p in self.fds.iter_mut() {
            p.revents = 0;
        }
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                Self::timeout_millis(timeout),
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        Ok(self
            .fds
            .iter()
            .filter(|p| p.revents != 0)
            .map(|p| Readiness {
                fd: p.fd,
                readable: p.revents & libc::POLLIN != 0,
                priority: p.revents & libc::POLLPRI != 0,
                error: p.revents & (libc::POLLERR | libc::POLLNVAL) != 0,
                hangup: p.revents & libc::POLLHUP != 0,
            })
            .collect())
    }
}
