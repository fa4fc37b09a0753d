//! RIFF/WAVE writer

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::audio::AudioDescriptor;
use crate::container::reader::FMT_BLOCK_LEN;
use crate::error::ContainerError;

/// Canonical header length: RIFF + fmt block + data chunk header
pub const HEADER_LEN: usize = 44;

/// Build the 44-byte header for a data region of `data_len` bytes
pub fn header_bytes(desc: &AudioDescriptor, data_len: u32) -> Result<Vec<u8>, ContainerError> {
    desc.validate()?;
    let mut header = Vec::with_capacity(HEADER_LEN);

    header.write_all(b"RIFF")?;
    // 4 (WAVE) + 24 (fmt chunk) + 8 (data chunk header)
    let riff_size = data_len
        .checked_add(36)
        .ok_or(ContainerError::TooLarge(data_len as u64))?;
    header.write_u32::<LittleEndian>(riff_size)?;
    header.write_all(b"WAVE")?;

    header.write_all(b"fmt ")?;
    header.write_u32::<LittleEndian>(FMT_BLOCK_LEN)?;
    header.write_u16::<LittleEndian>(desc.format_code)?;
    header.write_u16::<LittleEndian>(desc.channels)?;
    header.write_u32::<LittleEndian>(desc.sample_rate)?;
    header.write_u32::<LittleEndian>(desc.byte_rate())?;
    header.write_u16::<LittleEndian>(desc.block_align())?;
    header.write_u16::<LittleEndian>(desc.bit_depth)?;

    header.write_all(b"data")?;
    header.write_u32::<LittleEndian>(data_len)?;

    Ok(header)
}

/// Write a complete container from ordered sample buffers.
///
/// Returns the size of the data region written.
pub fn write_wav<W, B>(out: &mut W, desc: &AudioDescriptor, buffers: &[B]) -> Result<u64, ContainerError>
where
    W: Write,
    B: AsRef<[u8]>,
{
    let total: u64 = buffers.iter().map(|b| b.as_ref().len() as u64).sum();
    if total > (u32::MAX - 36) as u64 {
        return Err(ContainerError::TooLarge(total));
    }

    out.write_all(&header_bytes(desc, total as u32)?)?;
    for buffer in buffers {
        out.write_all(buffer.as_ref())?;
    }

    Ok(total)
}

/// Create (or truncate) `path` and write a container to it
pub fn write_wav_file<B: AsRef<[u8]>>(
    path: impl AsRef<Path>,
    desc: &AudioDescriptor,
    buffers: &[B],
) -> Result<u64, ContainerError> {
    let path = path.as_ref();
    // Refuse before the file is created
    desc.validate()?;
    let mut out = BufWriter::new(File::create(path)?);
    let written = write_wav(&mut out, desc, buffers)?;
    out.flush()?;

    tracing::info!(
        "Wrote {} ({} bytes of samples, {} buffers)",
        path.display(),
        written,
        buffers.len()
    );
    Ok(written)
}
