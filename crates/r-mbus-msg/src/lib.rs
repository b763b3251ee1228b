//! ---
//! mbus_section: "02-messaging-ipc-data-model"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message entity and gateway wire codec."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! The message entity carried by the bus: an immutable byte payload plus an
//! immutable string property map, shared by reference count so fan-out
//! clones are cheap and concurrent reads need no locking.

pub mod codec;
pub mod logging;
pub mod types;

/// Shared result type for message operations.
pub type Result<T> = std::result::Result<T, MessageError>;

/// Failures raised by the wire codec.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The buffer is shorter than the smallest legal envelope.
    #[error("envelope is shorter than the 14-byte minimum")]
    Truncated,
    /// The two fixed header bytes are wrong.
    #[error("envelope header bytes do not match 0xA1 0x60")]
    InvalidHeader,
    /// The size field disagrees with the buffer that was handed in.
    #[error("declared envelope size {declared} does not match buffer length {actual}")]
    SizeMismatch {
        /// Size recorded in the envelope's own size field.
        declared: u32,
        /// Length of the buffer being decoded.
        actual: usize,
    },
    /// A property key or value ran past the end of the buffer without a NUL.
    #[error("property string is missing its NUL terminator")]
    UnterminatedProperty,
    /// A property key or value is not valid UTF-8.
    #[error("property string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// Property strings are NUL-delimited on the wire and cannot contain one.
    #[error("property strings must not contain interior NUL bytes")]
    EmbeddedNul,
    /// The encoded envelope would not fit the 32-bit size fields.
    #[error("message does not fit the wire format's 32-bit size fields")]
    TooLarge,
}

pub use logging::{log_message, MessageDirection, MessageMetricsExporter};
pub use types::{Message, Properties};
