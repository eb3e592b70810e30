pub mod buffer;
pub mod codec;
pub mod legacy;
pub mod protocol;
pub mod recognizer;
pub mod registry;

pub use buffer::{Lookahead, PendingBuffer, PENDING_LIMIT};
pub use codec::*;
pub use protocol::{ByteSink, Protocol, ServerStatus, SharedSink, StatusSource};
pub use recognizer::Recognizer;
pub use registry::{versions, DecoderFactory, VersionRegistry};
