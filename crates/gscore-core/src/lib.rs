//! gscore Core - foundation types for the message-routing core.
//!
//! This crate holds everything the upper layers agree on:
//!
//! - **Segments & payloads** ([`Segment`], [`Payload`]): outbound content and its normalization
//! - **Envelope** ([`MessageSend`], [`Route`], [`TargetType`]): the record written to a connection
//! - **Events** ([`MessageReceive`], [`Event`]): decoded inbound messages
//! - **Connections** ([`ConnectionHandle`]): the outbound channel of one backend link
//! - **Configuration store** ([`ConfigStore`]): keyed persistence of named blobs

pub mod connection;
pub mod envelope;
pub mod error;
pub mod event;
pub mod segment;
pub mod store;

pub use connection::ConnectionHandle;
pub use envelope::{MessageSend, Route, TargetType};
pub use error::{
    DecodeError, DecodeResult, SendError, SendResult, StoreError, StoreResult,
};
pub use event::{DEFAULT_USER_PM, Event, MessageReceive, RawSegment};
pub use segment::{BASE64_PREFIX, Payload, Segment};
pub use store::{BoxedConfigStore, ConfigStore, JsonFileStore, MemoryStore};
