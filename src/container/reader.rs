//! RIFF/WAVE reader
//!
//! Parses the header and locates the `data` chunk without loading the
//! payload. Samples are then pulled through a windowed cursor so a file of
//! any size streams with bounded memory.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::audio::AudioDescriptor;
use crate::error::ContainerError;

/// Size of the `fmt ` block body for plain PCM
pub const FMT_BLOCK_LEN: u32 = 16;

/// Streaming reader over a RIFF/WAVE container
pub struct WavReader<R> {
    inner: R,
    descriptor: AudioDescriptor,
    /// Absolute offset of the first sample byte
    data_offset: u64,
    /// Declared size of the data region
    data_len: u64,
    /// Bytes of the data region handed out so far
    consumed: u64,
}

impl WavReader<BufReader<File>> {
    /// Open a container file and position the cursor at its first sample
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> WavReader<R> {
    pub fn new(mut inner: R) -> Result<Self, ContainerError> {
        let mut tag = [0u8; 4];

        read_tag(&mut inner, &mut tag, "RIFF tag")?;
        if &tag != b"RIFF" {
            return Err(ContainerError::Malformed(format!("expected RIFF tag, found {:?}", tag)));
        }
        let _riff_size = read_u32(&mut inner, "RIFF size")?;
        read_tag(&mut inner, &mut tag, "WAVE tag")?;
        if &tag != b"WAVE" {
            return Err(ContainerError::Malformed(format!("expected WAVE tag, found {:?}", tag)));
        }

        let mut descriptor = None;
        loop {
            read_tag(&mut inner, &mut tag, "chunk id (no data chunk before end of file)")?;
            let size = read_u32(&mut inner, "chunk size")?;

            match &tag {
                b"data" => {
                    let Some(descriptor) = descriptor else {
                        return Err(ContainerError::Malformed("data chunk before fmt chunk".into()));
                    };
                    let data_offset = inner.stream_position()?;
                    tracing::debug!(
                        "Located data chunk at offset {} ({} bytes)",
                        data_offset,
                        size
                    );
                    return Ok(Self {
                        inner,
                        descriptor,
                        data_offset,
                        data_len: size as u64,
                        consumed: 0,
                    });
                }
                b"fmt " => {
                    if size < FMT_BLOCK_LEN {
                        return Err(ContainerError::Malformed(format!(
                            "fmt chunk too short: {} bytes",
                            size
                        )));
                    }
                    let parsed = read_fmt(&mut inner)?;
                    parsed.validate()?;
                    descriptor = Some(parsed);
                    skip_chunk(&mut inner, size - FMT_BLOCK_LEN, size)?;
                }
                _ => {
                    tracing::debug!(
                        "Skipping chunk {:?} ({} bytes)",
                        String::from_utf8_lossy(&tag),
                        size
                    );
                    skip_chunk(&mut inner, size, size)?;
                }
            }
        }
    }

    pub fn descriptor(&self) -> AudioDescriptor {
        self.descriptor
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Declared size of the data region in bytes
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Whole frames in the data region
    pub fn total_frames(&self) -> u64 {
        self.data_len / self.descriptor.frame_size() as u64
    }

    /// Bytes of the data region not yet read
    pub fn remaining_bytes(&self) -> u64 {
        self.data_len - self.consumed
    }

    /// Bytes of the data region already read
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.data_len
    }

    /// Read up to `max_bytes` from the data region.
    ///
    /// Returns fewer bytes only at the end of the region. A file shorter
    /// than its declared data size ends the region early.
    pub fn read_window(&mut self, max_bytes: usize) -> Result<Vec<u8>, ContainerError> {
        let want = (max_bytes as u64).min(self.remaining_bytes()) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < want {
            tracing::warn!(
                "Data region truncated: declared {} bytes, file ends after {}",
                self.data_len,
                self.consumed + filled as u64
            );
            buf.truncate(filled);
            self.consumed = self.data_len;
        } else {
            self.consumed += filled as u64;
        }

        Ok(buf)
    }

    /// Move the cursor back to the first sample
    pub fn rewind(&mut self) -> Result<(), ContainerError> {
        self.inner.seek(SeekFrom::Start(self.data_offset))?;
        self.consumed = 0;
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn read_fmt<R: Read>(inner: &mut R) -> Result<AudioDescriptor, ContainerError> {
    let format_code = read_u16(inner, "audio format")?;
    let channels = read_u16(inner, "channel count")?;
    let sample_rate = read_u32(inner, "sample rate")?;
    let byte_rate = read_u32(inner, "byte rate")?;
    let block_align = read_u16(inner, "block align")?;
    let bit_depth = read_u16(inner, "bits per sample")?;

    tracing::debug!(
        "fmt: format {}, {} channels, {} Hz, {} bits, byte rate {}, block align {}",
        format_code,
        channels,
        sample_rate,
        bit_depth,
        byte_rate,
        block_align
    );

    Ok(AudioDescriptor {
        sample_rate,
        channels,
        bit_depth,
        format_code,
    })
}

/// Skip `len` bytes plus the pad byte RIFF adds after odd-sized chunks
fn skip_chunk<R: Seek>(inner: &mut R, len: u32, declared: u32) -> Result<(), ContainerError> {
    let pad = (declared % 2) as i64;
    inner.seek(SeekFrom::Current(len as i64 + pad))?;
    Ok(())
}

fn read_tag<R: Read>(inner: &mut R, tag: &mut [u8; 4], what: &str) -> Result<(), ContainerError> {
    inner.read_exact(tag).map_err(|e| eof_as_malformed(e, what))
}

fn read_u32<R: Read>(inner: &mut R, what: &str) -> Result<u32, ContainerError> {
    inner
        .read_u32::<LittleEndian>()
        .map_err(|e| eof_as_malformed(e, what))
}

fn read_u16<R: Read>(inner: &mut R, what: &str) -> Result<u16, ContainerError> {
    inner
        .read_u16::<LittleEndian>()
        .map_err(|e| eof_as_malformed(e, what))
}

fn eof_as_malformed(e: io::Error, what: &str) -> ContainerError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ContainerError::Malformed(format!("unexpected end of file reading {}", what))
    } else {
        ContainerError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::writer::write_wav;
    use std::io::Cursor;

    fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
    }

    fn fmt_body(channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&sample_rate.to_le_bytes());
        let block_align = channels * bits / 8;
        body.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn container(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = b"WAVE".to_vec();
        for (id, data) in chunks {
            push_chunk(&mut body, id, data);
        }
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_parse_written_container() {
        let desc = AudioDescriptor::pcm(8000, 1, 16);
        let samples: Vec<u8> = (0..200u8).collect();
        let mut bytes = Vec::new();
        write_wav(&mut bytes, &desc, &[&samples]).unwrap();

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.descriptor(), desc);
        assert_eq!(reader.data_offset(), 44);
        assert_eq!(reader.data_len(), 200);
        assert_eq!(reader.total_frames(), 100);
        assert_eq!(reader.read_window(1000).unwrap(), samples);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_skips_odd_sized_chunk_and_pad_byte() {
        let samples = vec![1u8, 2, 3, 4, 5, 6];
        let bytes = container(&[
            (b"fmt ", fmt_body(1, 8000, 16)),
            (b"LIST", vec![0xAA; 7]),
            (b"data", samples.clone()),
        ]);

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        // 12 RIFF + 24 fmt + 8 LIST header + 7 body + 1 pad + 8 data header
        assert_eq!(reader.data_offset(), 60);
        assert_eq!(reader.read_window(6).unwrap(), samples);
    }

    #[test]
    fn test_extended_fmt_block() {
        let mut fmt = fmt_body(2, 44100, 16);
        fmt.extend_from_slice(&[0u8, 0]);
        let bytes = container(&[(b"fmt ", fmt), (b"data", vec![9u8; 8])]);

        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.descriptor(), AudioDescriptor::pcm(44100, 2, 16));
        assert_eq!(reader.data_len(), 8);
    }

    #[test]
    fn test_missing_data_chunk_is_malformed() {
        let bytes = container(&[(b"fmt ", fmt_body(1, 8000, 16)), (b"LIST", vec![0; 4])]);
        let err = WavReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let err = WavReader::new(Cursor::new(b"RIFF\x10\x00".to_vec())).err().unwrap();
        assert!(matches!(err, ContainerError::Malformed(_)));

        let err = WavReader::new(Cursor::new(b"RIFX\x00\x00\x00\x00WAVE".to_vec())).err().unwrap();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn test_oversized_layout_is_unsupported() {
        // 32768 channels x 32 bits: block align would need 131072
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&32_768u16.to_le_bytes());
        fmt.extend_from_slice(&8000u32.to_le_bytes());
        fmt.extend_from_slice(&u32::MAX.to_le_bytes());
        fmt.extend_from_slice(&u16::MAX.to_le_bytes());
        fmt.extend_from_slice(&32u16.to_le_bytes());
        let bytes = container(&[(b"fmt ", fmt), (b"data", vec![0u8; 16_384])]);

        let err = WavReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ContainerError::Unsupported(_)));
    }

    #[test]
    fn test_data_before_fmt_is_malformed() {
        let bytes = container(&[(b"data", vec![0; 4]), (b"fmt ", fmt_body(1, 8000, 16))]);
        let err = WavReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn test_truncated_data_region_ends_early() {
        let mut bytes = container(&[(b"fmt ", fmt_body(1, 8000, 16)), (b"data", vec![7u8; 10])]);
        bytes.truncate(bytes.len() - 4);

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_window(100).unwrap(), vec![7u8; 6]);
        assert!(reader.is_exhausted());
        assert!(reader.read_window(100).unwrap().is_empty());
    }

    #[test]
    fn test_rewind_restarts_data_region() {
        let bytes = container(&[(b"fmt ", fmt_body(1, 8000, 8)), (b"data", vec![1, 2, 3, 4])]);
        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.read_window(3).unwrap(), vec![1, 2, 3]);
        reader.rewind().unwrap();
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_window(4).unwrap(), vec![1, 2, 3, 4]);
    }
}
