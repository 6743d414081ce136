//! Server → admin packet types (identifiers 100–124)
//!
//! Setiap tipe paket = unit struct + `const` layouts. Payload layouts:
//!
//! ```text
//! 102 error           B errorcode
//! 103 protocol        B version, B more, { H key, H value, B more }*
//! 104 welcome         name\0 version\0 B dedicated map\0 I seed B landscape I start H x H y
//! 107 date            I date
//! 109 client-info     I id, host\0 name\0 B language I join_date B company
//! 115 company-update  B id, name\0 manager\0 B colour B passworded B bankruptcy B×4 shares
//! 117 company-economy B id Q money Q loan Q income H cargo, 2 × { Q value H perf H cargo }
//! 118 company-stats   B id, 2 × { H train H lorry H bus H plane H ship }
//! ```

use super::errors::DecodeResult;
use super::fields::{FieldMapping, FieldValue};
use super::gamedate;
use super::layout::{Layout, PayloadReader, Primitive::*, Scalar};
use super::registry::{PacketId, PacketType};

const FMT_U8: Layout = Layout::new(&[U8]);
const FMT_U16: Layout = Layout::new(&[U16]);
const FMT_U32: Layout = Layout::new(&[U32]);
const FMT_U64: Layout = Layout::new(&[U64]);

/// Fills in the identity half of [`PacketType`]
macro_rules! identity {
    ($id:expr, $name:expr) => {
        fn id(&self) -> PacketId {
            PacketId($id)
        }

        fn name(&self) -> &'static str {
            $name
        }
    };
}

/// Packet with no payload fields
macro_rules! empty_packet {
    ($(#[$doc:meta])* $ty:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl $ty {
            pub const ID: PacketId = PacketId($id);
        }

        impl PacketType for $ty {
            identity!($id, stringify!($ty));

            fn decode(&self, _payload: &[u8]) -> DecodeResult<FieldMapping> {
                Ok(FieldMapping::new())
            }
        }
    };
}

/// Packet declaring its identity; `decode` supplied by a separate impl block
macro_rules! packet {
    ($(#[$doc:meta])* $ty:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl $ty {
            pub const ID: PacketId = PacketId($id);
        }

        impl PacketType for $ty {
            identity!($id, stringify!($ty));

            fn decode(&self, payload: &[u8]) -> DecodeResult<FieldMapping> {
                Self::decode_payload(payload)
            }
        }
    };
}

fn date(raw: Scalar) -> DecodeResult<FieldValue> {
    gamedate::to_date(raw.as_u64()).map(FieldValue::Date)
}

empty_packet!(
    /// Server refused the connection: no free slots.
    ServerFull, 100
);
empty_packet!(
    /// Admin is banned from the server.
    ServerBanned, 101
);

packet!(
    /// Generic error, carries a network error code.
    ServerError, 102
);

impl ServerError {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let [errorcode] = PayloadReader::new(payload).fixed::<1>(&FMT_U8)?;
        Ok(FieldMapping::new().with("errorcode", errorcode))
    }
}

packet!(
    /// Protocol version and the update frequencies the server supports.
    ServerProtocol, 103
);

impl ServerProtocol {
    const SETTING: Layout = Layout::new(&[U16, U16, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [version] = reader.fixed::<1>(&FMT_U8)?;
        let settings = reader
            .sentinel_list::<2>(&FMT_U8, &Self::SETTING)?
            .into_iter()
            .map(|[key, value]| (key.as_u64(), FieldValue::from(value)))
            .collect();
        Ok(FieldMapping::new()
            .with("version", version)
            .with("settings", FieldValue::Keyed(settings)))
    }
}

packet!(
    /// Map and server description, sent after joining and on every new game.
    ServerWelcome, 104
);

impl ServerWelcome {
    const MAP: Layout = Layout::new(&[U32, U8, U32, U16, U16]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let name = reader.string()?;
        let version = reader.string()?;
        let [dedicated] = reader.fixed::<1>(&FMT_U8)?;
        let map_name = reader.string()?;
        let [seed, landscape, start_year, x, y] = reader.fixed::<5>(&Self::MAP)?;
        Ok(FieldMapping::new()
            .with("name", name)
            .with("version", version)
            .with("dedicated", dedicated.is_set())
            .with("map_name", map_name)
            .with("seed", seed)
            .with("landscape", landscape)
            .with("start_year_raw", start_year)
            .with("start_year", date(start_year)?)
            .with("x", x)
            .with("y", y))
    }
}

empty_packet!(
    /// A new game has started.
    ServerNewGame, 105
);
empty_packet!(
    /// The server is shutting down.
    ServerShutdown, 106
);

packet!(
    /// Current in-game date.
    ServerDate, 107
);

impl ServerDate {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let [raw] = PayloadReader::new(payload).fixed::<1>(&FMT_U32)?;
        Ok(FieldMapping::new().with("date", date(raw)?))
    }
}

fn decode_client_id(payload: &[u8]) -> DecodeResult<FieldMapping> {
    let [client_id] = PayloadReader::new(payload).fixed::<1>(&FMT_U32)?;
    Ok(FieldMapping::new().with("client_id", client_id))
}

packet!(
    /// A client joined the game.
    ServerClientJoin, 108
);

impl ServerClientJoin {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        decode_client_id(payload)
    }
}

packet!(
    /// Details about one client.
    ServerClientInfo, 109
);

impl ServerClientInfo {
    const INFO: Layout = Layout::new(&[U8, U32, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [client_id] = reader.fixed::<1>(&FMT_U32)?;
        let hostname = reader.string()?;
        let name = reader.string()?;
        let [language, join_date, company] = reader.fixed::<3>(&Self::INFO)?;
        Ok(FieldMapping::new()
            .with("client_id", client_id)
            .with("hostname", hostname)
            .with("name", name)
            .with("language", language)
            .with("join_date", date(join_date)?)
            .with("company", company))
    }
}

packet!(
    /// A client changed name or company.
    ServerClientUpdate, 110
);

impl ServerClientUpdate {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [client_id] = reader.fixed::<1>(&FMT_U32)?;
        let name = reader.string()?;
        let [company] = reader.fixed::<1>(&FMT_U8)?;
        Ok(FieldMapping::new()
            .with("client_id", client_id)
            .with("name", name)
            .with("company", company))
    }
}

packet!(
    /// A client left the game.
    ServerClientQuit, 111
);

impl ServerClientQuit {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        decode_client_id(payload)
    }
}

packet!(
    /// A client was dropped because of a network error.
    ServerClientError, 112
);

impl ServerClientError {
    const FORMAT: Layout = Layout::new(&[U32, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let [client_id, errorcode] = PayloadReader::new(payload).fixed::<2>(&Self::FORMAT)?;
        Ok(FieldMapping::new()
            .with("client_id", client_id)
            .with("errorcode", errorcode))
    }
}

packet!(
    /// A company was founded.
    ServerCompanyNew, 113
);

impl ServerCompanyNew {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let [company_id] = PayloadReader::new(payload).fixed::<1>(&FMT_U8)?;
        Ok(FieldMapping::new().with("company_id", company_id))
    }
}

packet!(
    /// Full description of one company.
    ServerCompanyInfo, 114
);

impl ServerCompanyInfo {
    const INFO: Layout = Layout::new(&[U8, U8, U32, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [company_id] = reader.fixed::<1>(&FMT_U8)?;
        let name = reader.string()?;
        let manager = reader.string()?;
        let [colour, passworded, start_year, is_ai] = reader.fixed::<4>(&Self::INFO)?;
        Ok(FieldMapping::new()
            .with("company_id", company_id)
            .with("name", name)
            .with("manager", manager)
            .with("colour", colour)
            .with("passworded", passworded.is_set())
            .with("start_year", start_year)
            .with("is_ai", is_ai.is_set()))
    }
}

packet!(
    /// Changed company details, including the four shareholder slots.
    ServerCompanyUpdate, 115
);

impl ServerCompanyUpdate {
    const INFO: Layout = Layout::new(&[U8, U8, U8, U8, U8, U8, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [company_id] = reader.fixed::<1>(&FMT_U8)?;
        let name = reader.string()?;
        let manager = reader.string()?;
        let [colour, passworded, bankruptcy_counter, s1, s2, s3, s4] =
            reader.fixed::<7>(&Self::INFO)?;
        let shareholders = [s1, s2, s3, s4].into_iter().map(FieldValue::from).collect();
        Ok(FieldMapping::new()
            .with("company_id", company_id)
            .with("name", name)
            .with("manager", manager)
            .with("colour", colour)
            .with("passworded", passworded.is_set())
            .with("bankruptcy_counter", bankruptcy_counter)
            .with("shareholders", FieldValue::List(shareholders)))
    }
}

packet!(
    /// A company went away.
    ServerCompanyRemove, 116
);

impl ServerCompanyRemove {
    const FORMAT: Layout = Layout::new(&[U8, U8]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let [company_id, reason] = PayloadReader::new(payload).fixed::<2>(&Self::FORMAT)?;
        Ok(FieldMapping::new()
            .with("company_id", company_id)
            .with("reason", reason))
    }
}

packet!(
    /// Company finances plus the last two quarters of history.
    ServerCompanyEconomy, 117
);

impl ServerCompanyEconomy {
    const FORMAT: Layout = Layout::new(&[U8, U64, U64, U64, U16]);
    const QUARTER: Layout = Layout::new(&[U64, U16, U16]);
    const QUARTERS: usize = 2;

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [company_id, money, current_loan, income, delivered] =
            reader.fixed::<5>(&Self::FORMAT)?;
        let mut history = Vec::with_capacity(Self::QUARTERS);
        for _ in 0..Self::QUARTERS {
            let [company_value, performance, cargo] = reader.fixed::<3>(&Self::QUARTER)?;
            history.push(FieldValue::Map(
                FieldMapping::new()
                    .with("company_value", company_value)
                    .with("performance_history", performance)
                    .with("delivered_cargo", cargo),
            ));
        }
        Ok(FieldMapping::new()
            .with("company_id", company_id)
            .with("money", money)
            .with("current_loan", current_loan)
            .with("income", income)
            .with("delivered_cargo", delivered)
            .with("history", FieldValue::List(history)))
    }
}

packet!(
    /// Vehicle and station counts of a company, per transport type.
    ServerCompanyStats, 118
);

impl ServerCompanyStats {
    const COUNTS: Layout = Layout::new(&[U16, U16, U16, U16, U16]);
    const CATEGORIES: [&'static str; 2] = ["vehicles", "stations"];

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [company_id] = reader.fixed::<1>(&FMT_U8)?;
        let mut stats = FieldMapping::new();
        for category in Self::CATEGORIES {
            let [train, lorry, bus, plane, ship] = reader.fixed::<5>(&Self::COUNTS)?;
            stats.insert(
                category,
                FieldMapping::new()
                    .with("train", train)
                    .with("lorry", lorry)
                    .with("bus", bus)
                    .with("plane", plane)
                    .with("ship", ship),
            );
        }
        Ok(FieldMapping::new()
            .with("company_id", company_id)
            .with("stats", stats))
    }
}

packet!(
    /// Chat message relayed to the admin.
    ServerChat, 119
);

impl ServerChat {
    const HEADER: Layout = Layout::new(&[U8, U8, U32]);

    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [action, dest_type, client_id] = reader.fixed::<3>(&Self::HEADER)?;
        let message = reader.string()?;
        let [data] = reader.fixed::<1>(&FMT_U64)?;
        Ok(FieldMapping::new()
            .with("action", action)
            .with("dest_type", dest_type)
            .with("client_id", client_id)
            .with("message", message)
            .with("data", data))
    }
}

packet!(
    /// One line of output from a remote console command.
    ServerRcon, 120
);

impl ServerRcon {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let [colour] = reader.fixed::<1>(&FMT_U16)?;
        let result = reader.string()?;
        Ok(FieldMapping::new()
            .with("colour", colour)
            .with("result", result))
    }
}

packet!(
    /// Server console output.
    ServerConsole, 121
);

impl ServerConsole {
    fn decode_payload(payload: &[u8]) -> DecodeResult<FieldMapping> {
        let mut reader = PayloadReader::new(payload);
        let origin = reader.string()?;
        let message = reader.string()?;
        Ok(FieldMapping::new()
            .with("origin", origin)
            .with("message", message))
    }
}

// Not parsed yet; they still decode (to nothing) so they stay routable.
empty_packet!(ServerCmdNames, 122);
empty_packet!(ServerCmdLogging, 123);
empty_packet!(ServerGamescript, 124);

/// Every server packet type, in identifier order
pub static SERVER_PACKETS: &[&dyn PacketType] = &[
    &ServerFull,
    &ServerBanned,
    &ServerError,
    &ServerProtocol,
    &ServerWelcome,
    &ServerNewGame,
    &ServerShutdown,
    &ServerDate,
    &ServerClientJoin,
    &ServerClientInfo,
    &ServerClientUpdate,
    &ServerClientQuit,
    &ServerClientError,
    &ServerCompanyNew,
    &ServerCompanyInfo,
    &ServerCompanyUpdate,
    &ServerCompanyRemove,
    &ServerCompanyEconomy,
    &ServerCompanyStats,
    &ServerChat,
    &ServerRcon,
    &ServerConsole,
    &ServerCmdNames,
    &ServerCmdLogging,
    &ServerGamescript,
];
