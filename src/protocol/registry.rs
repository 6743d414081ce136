//! Packet Registry
//!
//! Maps numeric packet identifiers to their decoders. The server-side table is
//! built once by an explicit startup call and is read-only afterwards, so
//! lookups never race.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use super::errors::{DecodeResult, RegistryError};
use super::fields::FieldMapping;
use super::packets;

/// Numeric tag of a packet type on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(pub u8);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u8> for PacketId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Decoder for one kind of packet.
///
/// `decode` receives the payload only (length and identifier already stripped)
/// and must be a pure function of those bytes.
pub trait PacketType: Send + Sync {
    fn id(&self) -> PacketId;

    fn name(&self) -> &'static str;

    fn decode(&self, payload: &[u8]) -> DecodeResult<FieldMapping>;
}

impl fmt::Debug for dyn PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

/// What a received packet is keyed by: the decoded type, or only its raw identifier
/// when no type is registered for it.
#[derive(Debug, Clone, Copy)]
pub enum DispatchKey {
    Identifier(PacketId),
    Type(&'static dyn PacketType),
}

impl DispatchKey {
    /// Canonical identifier used for dispatch
    #[inline(always)]
    pub fn id(&self) -> PacketId {
        match self {
            Self::Identifier(id) => *id,
            Self::Type(packet) => packet.id(),
        }
    }

    /// The decoder, if this packet was decoded
    pub fn packet_type(&self) -> Option<&'static dyn PacketType> {
        match self {
            Self::Identifier(_) => None,
            Self::Type(packet) => Some(*packet),
        }
    }
}

impl PartialEq for DispatchKey {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.packet_type().is_some() == other.packet_type().is_some()
    }
}

impl Eq for DispatchKey {}

/// Identifier → packet type table
#[derive(Debug, Default)]
pub struct Registry {
    by_id: BTreeMap<PacketId, &'static dyn PacketType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `packet` under its identifier. Duplicate identifiers are rejected.
    pub fn register(&mut self, packet: &'static dyn PacketType) -> Result<(), RegistryError> {
        let id = packet.id();
        if let Some(existing) = self.by_id.get(&id) {
            return Err(RegistryError::Conflict {
                id,
                existing: existing.name(),
                incoming: packet.name(),
            });
        }
        self.by_id.insert(id, packet);
        Ok(())
    }

    /// Absence is normal: the packet is simply unsupported.
    #[inline(always)]
    pub fn lookup(&self, id: PacketId) -> Option<&'static dyn PacketType> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Registered types in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn PacketType> + '_ {
        self.by_id.values().copied()
    }
}

/// Build the table of every packet the server sends to an admin client.
pub fn build_server_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    for packet in packets::SERVER_PACKETS {
        registry.register(*packet)?;
    }
    Ok(registry)
}

static SERVER_REGISTRY: OnceLock<Result<Registry, RegistryError>> = OnceLock::new();

/// Process-wide server packet table, built on first use.
pub fn server_registry() -> Result<&'static Registry, RegistryError> {
    SERVER_REGISTRY
        .get_or_init(build_server_registry)
        .as_ref()
        .map_err(Clone::clone)
}
