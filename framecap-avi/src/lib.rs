//! AVI Container Format
//!
//! Reading and writing of AVI 1.0 files. AVI is based on the RIFF (Resource
//! Interchange File Format) structure: a `hdrl` list with one `strl` list per
//! stream, a `movi` list with the sample chunks and an optional `idx1` index.
//!
//! [`AviWriter`] implements [`MovieWriter`](framecap_containers::MovieWriter)
//! and [`AviReader`] implements [`MovieReader`](framecap_containers::MovieReader).
//! Video tracks are constant frame rate: each chunk lasts one frame.
//!
//! # Example
//!
//! ```no_run
//! use framecap_avi::AviReader;
//! use framecap_containers::MovieReader;
//!
//! let reader = AviReader::open("capture.avi").unwrap();
//! println!("Duration: {} s", reader.movie_duration());
//! ```

mod chunks;
mod error;
mod reader;
mod track;
mod types;
mod writer;

pub use chunks::{
    Chunk, ChunkHeader, ChunkKind, FourCC, IndexEntry, ListChunk, Node, StreamChunk,
};
pub use error::{AviError, Result};
pub use reader::AviReader;
pub use track::{Sample, Track};
pub use types::{AudioFormat, AviFlags, AviHeader, StreamHeader, StreamType, VideoFormat};
pub use writer::{AviWriter, AviWriterConfig};
