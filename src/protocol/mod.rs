//! Protocol Layer: admin-port wire contract
//!
//! Prinsip desain:
//! - Decode-only: frames come in, typed field mappings go out
//! - Explicit registry: packet types are registered by a startup call, not by load order
//! - Bounds-checked: truncated payloads are errors, never silent truncation

mod errors;
mod fields;
mod frame;
pub mod gamedate;
mod layout;
pub mod packets;
mod registry;

pub use errors::{DecodeError, DecodeResult, LayoutError, RegistryError};
pub use fields::{FieldMapping, FieldValue};
pub use frame::{read_frame, RawFrame, FRAME_HEADER_SIZE};
pub use layout::{unpack_sentinel_list, unpack_str, Layout, PayloadReader, Primitive, Scalar};
pub use registry::{
    build_server_registry, server_registry, DispatchKey, PacketId, PacketType, Registry,
};
