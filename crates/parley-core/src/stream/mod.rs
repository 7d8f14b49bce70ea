//! Streaming response pipeline: wire chunks, line framing, assembly and
//! throttled publication of progress.

pub mod assembler;
pub mod chunk;
pub mod debounce;
pub mod driver;
pub mod lines;
pub mod response;

pub use assembler::{AssembledResponse, AssemblerState, ResponseAssembler, StreamSnapshot};
pub use chunk::{ChunkKind, ChunkMessage, StreamChunk, TokenCounters};
pub use debounce::LeadingDebounce;
pub use driver::drive_stream;
pub use lines::{FramedLine, ndjson_lines};
pub use response::parse_complete_response;
