//! Wire frame
//!
//! Layout:
//! ┌──────────────────────┬──────────────┬───────────────────────────┐
//! │ length: u16 LE       │ id: u8       │ payload (length − 3)      │
//! └──────────────────────┴──────────────┴───────────────────────────┘
//!
//! `length` counts the whole frame, header included.

use std::io::{self, Read};

use super::registry::PacketId;

/// Size of the length + identifier header
pub const FRAME_HEADER_SIZE: usize = 3;

/// One undecoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub id: PacketId,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(id: impl Into<PacketId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Total size on the wire
    #[inline(always)]
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// Read exactly one frame.
///
/// Returns `Ok(None)` on a clean end of stream before the first header byte.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<RawFrame>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if filled > 0 => return Err(stalled(e.kind()).into()),
            Err(e) => return Err(e),
        }
    }

    let length = usize::from(u16::from_le_bytes([header[0], header[1]]));
    if length < FRAME_HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {length} is shorter than its header"),
        ));
    }

    let mut payload = vec![0u8; length - FRAME_HEADER_SIZE];
    if let Err(error) = reader.read_exact(&mut payload) {
        return Err(stalled(error.kind()).into());
    }

    Ok(Some(RawFrame {
        id: PacketId(header[2]),
        payload,
    }))
}

/// A read timeout partway through a frame means the peer stopped framing;
/// it is bad data, not a retryable condition.
fn stalled(kind: io::ErrorKind) -> io::ErrorKind {
    match kind {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => io::ErrorKind::InvalidData,
        kind => kind,
    }
}
