//! tally-ai: Wire model and transports for the bookkeeping assistant API
//!
//! This crate defines the request/response shapes, the streaming chunk
//! protocol, cancellation handles, and the transport abstraction used by
//! `tally-assistant`.

pub mod cancel;
pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use cancel::{CancelHandle, abortable};
pub use error::{Error, Result};
pub use providers::AssistantTransport;
pub use stream::{ChunkStream, StreamChunk};
pub use types::*;
