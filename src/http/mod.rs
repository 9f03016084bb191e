pub mod line_reader;
pub mod message;

pub use line_reader::LineReader;
pub use message::{ChunkMarker, HeaderEvent, HttpMessage};
