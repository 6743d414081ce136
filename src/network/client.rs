//! Admin client: readiness-driven poll loop and packet dispatch
//!
//! Satu koneksi, satu thread. The only blocking point is the multiplexer wait
//! inside [`AdminClient::poll`]; frame reads are bounded by the connection's
//! read timeout, and decoding and every handler run to completion on the
//! caller's thread before `poll` returns.
//!
//! Policy: at most one frame is read per readiness notification per call, even
//! if more are queued. Callers poll again to drain a backlog.

use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;

use log::{debug, info, warn};
use thiserror::Error;

use super::config::{self, ClientConfig, ConfigError};
use super::connection::AdminConnection;
use super::multiplexer::{self, BackendKind, Multiplexer};
use crate::core::{Event, EventError};
use crate::protocol::packets::{ServerProtocol, ServerWelcome};
use crate::protocol::{
    server_registry, DecodeError, DispatchKey, FieldMapping, FieldValue, PacketId, RawFrame,
    Registry, RegistryError,
};

/// Errors surfaced by the poll loop. Connection loss is not one of them; it is
/// reported as [`PollOutcome::ConnectionLost`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to decode packet {id}")]
    Decode {
        id: PacketId,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O failure")]
    Io(#[from] io::Error),
}

/// One received packet: decoded fields keyed by type, or the raw payload under
/// `"data"` keyed by identifier when the type is not registered.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPacket {
    pub key: DispatchKey,
    pub fields: FieldMapping,
}

/// Result of one [`AdminClient::poll`] call
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No registration or not connected; no I/O was attempted
    NotReady,
    /// The connection dropped during this call and has been torn down
    ConnectionLost,
    /// Packets read during this call, in read order (possibly none)
    Packets(Vec<ReceivedPacket>),
}

/// Multiplexer registration of the connection's descriptor
struct Registration {
    mux: Box<dyn Multiplexer>,
    fd: RawFd,
}

pub struct AdminClient<C: AdminConnection> {
    conn: C,
    config: ClientConfig,
    registry: &'static Registry,
    registration: Option<Registration>,
    handlers: BTreeMap<PacketId, Event<FieldMapping>>,
    packet_received: Event<ReceivedPacket>,
    disconnected: Event<()>,
    protocol_info: FieldMapping,
    map_info: FieldMapping,
    unrouted: u64,
}

impl<C: AdminConnection> AdminClient<C> {
    /// Attach to a connection. The connection's read timeout is aligned with
    /// the config; if it is already established, its descriptor is registered
    /// with the multiplexer right away.
    pub fn attach(mut conn: C, config: ClientConfig) -> Result<Self, ClientError> {
        let registry = server_registry()?;
        conn.set_read_timeout(config.read_timeout())?;
        let handlers = registry
            .iter()
            .map(|packet| (packet.id(), Event::new(packet.name())))
            .collect();

        let mut client = Self {
            conn,
            config,
            registry,
            registration: None,
            handlers,
            packet_received: Event::new("packet_received"),
            disconnected: Event::new("disconnected"),
            protocol_info: FieldMapping::new(),
            map_info: FieldMapping::new(),
            unrouted: 0,
        };
        if client.conn.is_connected() {
            client.register()?;
        }
        Ok(client)
    }

    fn register(&mut self) -> io::Result<()> {
        let kind = self.config.backend.unwrap_or_else(multiplexer::probe);
        let mut mux = multiplexer::open(kind)?;
        let fd = self.conn.fileno();
        mux.register(fd)?;
        debug!("fd {fd}: registered with {kind:?} multiplexer");
        self.registration = Some(Registration { mux, fd });
        Ok(())
    }

    /// Remove the registration, returning whether there was one
    fn deregister(&mut self) -> bool {
        let Some(mut registration) = self.registration.take() else {
            return false;
        };
        if let Err(e) = registration.mux.deregister(registration.fd) {
            // Descriptor may already be closed
            debug!("fd {}: deregister failed: {}", registration.fd, e);
        }
        info!("fd {}: poll registration torn down", registration.fd);
        true
    }

    /// Remove the registration. Safe to call any number of times; only the
    /// first call after a registration raises `disconnected`.
    fn teardown(&mut self) -> Result<(), ClientError> {
        if self.deregister() {
            self.disconnected.raise(&())?;
        }
        Ok(())
    }

    /// Deregister while the descriptor is still open, then drop the connection
    fn drop_connection(&mut self) -> Result<(), ClientError> {
        let was_registered = self.deregister();
        self.conn.force_disconnect();
        if was_registered {
            self.disconnected.raise(&())?;
        }
        Ok(())
    }

    /// Explicit disconnect
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        self.drop_connection()
    }

    /// [`poll_timeout`](Self::poll_timeout) with the configured timeout
    pub fn poll(&mut self) -> Result<PollOutcome, ClientError> {
        self.poll_timeout(self.config.timeout())
    }

    /// Wait up to `timeout_secs` for readiness and read at most one frame per
    /// notification. Every frame read is decoded, raised on `packet_received`
    /// and dispatched before this returns.
    pub fn poll_timeout(&mut self, timeout_secs: f64) -> Result<PollOutcome, ClientError> {
        let timeout = config::timeout_duration(timeout_secs)?;
        if self.registration.is_some() && !self.conn.is_connected() {
            self.teardown()?;
        }
        let Some(registration) = self.registration.as_mut() else {
            return Ok(PollOutcome::NotReady);
        };

        let fd = registration.fd;
        let ready = registration.mux.wait(timeout)?;
        let mut packets = Vec::new();
        for readiness in ready.into_iter().filter(|r| r.fd == fd) {
            if readiness.readable || readiness.priority {
                let Some(frame) = self.conn.recv_packet() else {
                    warn!("fd {fd}: connection lost");
                    self.drop_connection()?;
                    return Ok(PollOutcome::ConnectionLost);
                };
                if let Some(registration) = self.registration.as_mut() {
                    registration.mux.rearm(fd)?;
                }
                let packet = self.decode(frame)?;
                self.packet_received.raise(&packet)?;
                self.on_packet(&packet)?;
                packets.push(packet);
            } else if readiness.error || readiness.hangup {
                warn!("fd {fd}: error or hangup reported");
                self.drop_connection()?;
                return Ok(PollOutcome::ConnectionLost);
            }
        }
        Ok(PollOutcome::Packets(packets))
    }

    fn decode(&self, frame: RawFrame) -> Result<ReceivedPacket, ClientError> {
        let RawFrame { id, payload } = frame;
        match self.registry.lookup(id) {
            Some(packet) => {
                let fields = packet
                    .decode(&payload)
                    .map_err(|source| ClientError::Decode { id, source })?;
                Ok(ReceivedPacket {
                    key: DispatchKey::Type(packet),
                    fields,
                })
            }
            None => Ok(ReceivedPacket {
                key: DispatchKey::Identifier(id),
                fields: FieldMapping::new().with("data", FieldValue::Bytes(payload)),
            }),
        }
    }

    /// Route one packet to the Event bound to its identifier. Packets with no
    /// bound Event are dropped (and counted).
    pub fn on_packet(&mut self, packet: &ReceivedPacket) -> Result<(), ClientError> {
        let id = packet.key.id();
        if id == ServerProtocol::ID {
            self.protocol_info = packet.fields.clone();
        } else if id == ServerWelcome::ID {
            self.map_info = packet.fields.clone();
        }

        match self.handlers.get(&id) {
            Some(event) => event.raise(&packet.fields)?,
            None => {
                self.unrouted += 1;
                debug!("packet {id} has no handler, dropped");
            }
        }
        Ok(())
    }

    /// Event for packets with identifier `id`, created if the identifier has none yet
    pub fn event_mut(&mut self, id: PacketId) -> &mut Event<FieldMapping> {
        self.handlers
            .entry(id)
            .or_insert_with(|| Event::new("unregistered_packet"))
    }

    pub fn protocol_received(&mut self) -> &mut Event<FieldMapping> {
        self.event_mut(ServerProtocol::ID)
    }

    pub fn map_info_received(&mut self) -> &mut Event<FieldMapping> {
        self.event_mut(ServerWelcome::ID)
    }

    /// Raised for every packet read, before per-identifier dispatch
    pub fn packet_received(&mut self) -> &mut Event<ReceivedPacket> {
        &mut self.packet_received
    }

    /// Raised once when the poll registration is torn down
    pub fn disconnected(&mut self) -> &mut Event<()> {
        &mut self.disconnected
    }

    /// Latest protocol packet, empty until one arrives
    pub fn protocol_info(&self) -> &FieldMapping {
        &self.protocol_info
    }

    /// Latest welcome packet, empty until one arrives
    pub fn map_info(&self) -> &FieldMapping {
        &self.map_info
    }

    /// Packets dropped for lack of a handler
    pub fn unrouted_count(&self) -> u64 {
        self.unrouted
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.registration.as_ref().map(|r| r.mux.kind())
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Change the poll wait and the connection's read timeout together
    pub fn set_timeout(&mut self, secs: f64) -> Result<(), ClientError> {
        self.config.set_timeout(secs)?;
        self.conn.set_read_timeout(self.config.read_timeout())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Connection that never touches a socket
    struct Offline;

    impl AdminConnection for Offline {
        fn fileno(&self) -> RawFd {
            -1
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn recv_packet(&mut self) -> Option<RawFrame> {
            None
        }

        fn force_disconnect(&mut self) {}
    }

    fn typed(id: u8, fields: FieldMapping) -> ReceivedPacket {
        let registry = server_registry().unwrap();
        ReceivedPacket {
            key: DispatchKey::Type(registry.lookup(PacketId(id)).unwrap()),
            fields,
        }
    }

    /// Offline connection that records every read timeout it is given
    struct Recording(Rc<RefCell<Vec<Duration>>>);

    impl AdminConnection for Recording {
        fn fileno(&self) -> RawFd {
            -1
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn recv_packet(&mut self) -> Option<RawFrame> {
            None
        }

        fn force_disconnect(&mut self) {}

        fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.0.borrow_mut().push(timeout);
            Ok(())
        }
    }

    #[test]
    fn test_read_timeout_follows_config() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let config = ClientConfig::default().with_timeout(0.0).unwrap();
        let mut client = AdminClient::attach(Recording(Rc::clone(&seen)), config).unwrap();
        client.set_timeout(3.0).unwrap();
        // Rejected values leave the connection untouched
        assert!(client.set_timeout(-1.0).is_err());

        assert_eq!(
            *seen.borrow(),
            vec![crate::network::MIN_READ_TIMEOUT, Duration::from_secs(3)]
        );
    }

    #[test]
    fn test_not_ready_without_registration() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        assert!(!client.is_registered());
        assert_eq!(client.backend(), None);
        assert_eq!(client.poll().unwrap(), PollOutcome::NotReady);
        assert_eq!(client.poll_timeout(0.0).unwrap(), PollOutcome::NotReady);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        assert!(matches!(
            client.poll_timeout(-1.0),
            Err(ClientError::Config(ConfigError::InvalidTimeout(_)))
        ));
        assert!(client.set_timeout(f64::NAN).is_err());
        assert_eq!(client.config().timeout(), 1.0);
    }

    #[test]
    fn test_dispatch_table_covers_registry() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        assert_eq!(client.handlers.len(), 25);
        assert_eq!(client.protocol_received().name(), "ServerProtocol");
        assert_eq!(client.map_info_received().name(), "ServerWelcome");
    }

    #[test]
    fn test_snapshots_overwritten_wholesale() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        let first = FieldMapping::new().with("version", FieldValue::UInt(1)).with("extra", true);
        let second = FieldMapping::new().with("version", FieldValue::UInt(2));

        client.on_packet(&typed(103, first)).unwrap();
        client.on_packet(&typed(103, second.clone())).unwrap();
        assert_eq!(client.protocol_info(), &second);
        assert!(client.map_info().is_empty());

        let welcome = FieldMapping::new().with("map_name", "Lakeside".to_string());
        client.on_packet(&typed(104, welcome.clone())).unwrap();
        assert_eq!(client.map_info(), &welcome);
    }

    #[test]
    fn test_identifier_and_type_keys_route_alike() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        client.event_mut(PacketId(107)).on(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        client.on_packet(&typed(107, FieldMapping::new())).unwrap();
        client
            .on_packet(&ReceivedPacket {
                key: DispatchKey::Identifier(PacketId(107)),
                fields: FieldMapping::new(),
            })
            .unwrap();
        assert_eq!(*seen.borrow(), 2);
        assert_eq!(client.unrouted_count(), 0);
    }

    #[test]
    fn test_unrouted_is_dropped_and_counted() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        let packet = ReceivedPacket {
            key: DispatchKey::Identifier(PacketId(200)),
            fields: FieldMapping::new(),
        };
        client.on_packet(&packet).unwrap();
        client.on_packet(&packet).unwrap();
        assert_eq!(client.unrouted_count(), 2);
    }

    #[test]
    fn test_handler_error_surfaces() {
        let mut client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        client.protocol_received().on(|_| Err("rejected".into()));
        let fields = FieldMapping::new().with("version", FieldValue::UInt(3));
        let err = client.on_packet(&typed(103, fields.clone())).unwrap_err();
        assert!(matches!(err, ClientError::Event(_)));
        // The snapshot is updated before handlers run
        assert_eq!(client.protocol_info(), &fields);
    }

    #[test]
    fn test_decode_unregistered_keeps_raw_bytes() {
        let client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        let packet = client.decode(RawFrame::new(200, vec![1, 2, 3])).unwrap();
        assert_eq!(packet.key, DispatchKey::Identifier(PacketId(200)));
        assert_eq!(packet.fields.get("data"), Some(&FieldValue::Bytes(vec![1, 2, 3])));
    }

    #[test]
    fn test_decode_error_names_packet() {
        let client = AdminClient::attach(Offline, ClientConfig::default()).unwrap();
        let err = client.decode(RawFrame::new(107, vec![0, 0])).unwrap_err();
        assert!(matches!(err, ClientError::Decode { id: PacketId(107), .. }));
    }
}
