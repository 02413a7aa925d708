//! Transport layer: sender configurations, the sender registry, the concrete
//! transports and the test-send path.
//!
//! Raw channel properties enter through [`registry::SenderRegistry`], which validates
//! them against the per-type [`schema`] and produces an immutable
//! [`config::SenderConfig`]. The registry's factory turns a config into a
//! [`sender::Sender`], whose `send` always yields a [`message::MessageResponse`].

pub mod config;
pub mod crypto;
pub mod error;
pub mod message;
pub mod properties;
pub mod rate_limit;
pub mod registry;
pub mod schema;
pub mod sender;
pub mod test_send;

pub use config::{SenderConfig, SenderType};
pub use crypto::{CryptoError, PropertyCrypto};
pub use error::{ConfigValidationError, FieldViolation, NotifierError};
pub use message::{MessageRequest, MessageResponse};
pub use registry::SenderRegistry;
pub use sender::Sender;
