//! Connection collaborator
//!
//! The poll loop only needs four things from a connection: its descriptor,
//! whether it is up, one frame on demand, and a way to drop it. Socket setup,
//! sending and reconnect policy live behind this trait.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use log::{debug, info, warn};

use super::config::ClientConfig;
use crate::protocol::{read_frame, RawFrame};

/// Surface of an established admin connection consumed by the poll loop
pub trait AdminConnection {
    fn fileno(&self) -> RawFd;

    fn is_connected(&self) -> bool;

    /// Read one frame. `None` means the connection is gone (EOF, bad framing,
    /// I/O error).
    fn recv_packet(&mut self) -> Option<RawFrame>;

    /// Drop the connection now. Calling it again is a no-op.
    fn force_disconnect(&mut self);

    /// Bound how long `recv_packet` may wait for the rest of a frame.
    /// Connections whose reads never block keep the default.
    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Blocking socket streams: read timeout and shutdown
pub trait SocketStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn shutdown_both(&self) -> io::Result<()>;
}

impl SocketStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl SocketStream for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Blocking stream reading exactly one frame per `recv_packet`.
///
/// Reads stop at the frame boundary, so any further frames stay queued in the
/// socket and keep it readable for the multiplexer. Every read is bounded by a
/// socket read timeout; a frame that does not complete in time drops the
/// connection.
pub struct StreamConnection<S> {
    stream: Option<S>,
    fd: RawFd,
    frames_read: u64,
}

impl<S: Read + AsRawFd + SocketStream> StreamConnection<S> {
    /// Wrap an already connected, blocking stream. The read timeout starts at
    /// the default [`ClientConfig::read_timeout`].
    pub fn new(stream: S) -> io::Result<Self> {
        stream.set_read_timeout(Some(ClientConfig::default().read_timeout()))?;
        let fd = stream.as_raw_fd();
        Ok(Self {
            stream: Some(stream),
            fd,
            frames_read: 0,
        })
    }

    /// Frames successfully read so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Underlying stream, while connected
    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }
}

impl StreamConnection<TcpStream> {
    /// Open a TCP connection to an admin port
    pub fn connect<A: ToSocketAddrs>(addr: A, config: &ClientConfig) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        info!("connected to {}", stream.peer_addr()?);
        let mut conn = Self::new(stream)?;
        conn.set_read_timeout(config.read_timeout())?;
        Ok(conn)
    }
}

impl<S: Read + AsRawFd + SocketStream> AdminConnection for StreamConnection<S> {
    fn fileno(&self) -> RawFd {
        self.fd
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn recv_packet(&mut self) -> Option<RawFrame> {
        let stream = self.stream.as_mut()?;
        match read_frame(stream) {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                debug!("fd {}: frame {} ({} bytes)", self.fd, frame.id, frame.wire_len());
                Some(frame)
            }
            Ok(None) => {
                info!("fd {}: connection closed by peer", self.fd);
                self.stream = None;
                None
            }
            Err(e) => {
                warn!("fd {}: read failed: {}", self.fd, e);
                self.stream = None;
                None
            }
        }
    }

    fn force_disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("fd {}: forcing disconnect", self.fd);
            if let Err(e) = stream.shutdown_both() {
                debug!("fd {}: shutdown failed: {}", self.fd, e);
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        debug!("fd {}: read timeout {:?}", self.fd, timeout);
        SocketStream::set_read_timeout(stream, Some(timeout))
    }
}
