//! RIFF/WAVE container codec
//!
//! Reads a container into a windowed sample cursor and writes ordered
//! sample buffers back out.

pub mod reader;
pub mod writer;

pub use reader::WavReader;
pub use writer::{header_bytes, write_wav, write_wav_file, HEADER_LEN};
