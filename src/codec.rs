//! Per-file compression of session logs.
//!
//! Line-delimited logs are stored gzip-compressed; every other file is copied
//! verbatim. All writes land in a temporary file next to the destination and
//! are renamed into place, so a failed write never leaves a truncated artifact.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Compression backend for log artifacts.
pub trait Codec {
    /// Compress `src` into `dest`, returning the compressed size in bytes.
    fn compress_file(&self, src: &Path, dest: &Path) -> Result<u64>;

    /// Stream the decompressed content of `src` into `out`, returning bytes written.
    fn decompress_to(&self, src: &Path, out: &mut dyn Write) -> Result<u64>;

    /// Decompress `src` into `dest`, returning the decompressed size in bytes.
    fn decompress_file(&self, src: &Path, dest: &Path) -> Result<u64> {
        write_atomically(dest, |out| self.decompress_to(src, out))
    }
}

/// Gzip codec backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        GzipCodec {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        GzipCodec {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn compress_file(&self, src: &Path, dest: &Path) -> Result<u64> {
        let input = File::open(src)
            .with_context(|| format!("Failed to open {}", src.display()))?;
        let mut reader = BufReader::new(input);

        write_atomically(dest, |out| {
            let mut encoder = GzEncoder::new(out, self.level);
            io::copy(&mut reader, &mut encoder)
                .with_context(|| format!("Failed to compress {}", src.display()))?;
            encoder.finish().context("Failed to finish gzip stream")?;
            Ok(())
        })?;

        Ok(fs::metadata(dest)?.len())
    }

    fn decompress_to(&self, src: &Path, out: &mut dyn Write) -> Result<u64> {
        let input = File::open(src)
            .with_context(|| format!("Failed to open {}", src.display()))?;
        let mut decoder = GzDecoder::new(BufReader::new(input));
        let written = io::copy(&mut decoder, out)
            .with_context(|| format!("Failed to decompress {}", src.display()))?;
        Ok(written)
    }
}

/// Copy a non-log file verbatim, returning the size in bytes.
pub fn copy_verbatim(src: &Path, dest: &Path) -> Result<u64> {
    let mut input = File::open(src)
        .with_context(|| format!("Failed to open {}", src.display()))?;
    write_atomically(dest, |out| {
        io::copy(&mut input, out)
            .with_context(|| format!("Failed to copy {}", src.display()))?;
        Ok(())
    })?;
    Ok(fs::metadata(dest)?.len())
}

/// Uncompressed size recorded in a gzip trailer (ISIZE, modulo 2^32).
pub fn uncompressed_len(path: &Path) -> Result<u64> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if file.metadata()?.len() < 4 {
        return Ok(0);
    }

    let mut trailer = [0u8; 4];
    file.seek(SeekFrom::End(-4))?;
    file.read_exact(&mut trailer)
        .with_context(|| format!("Failed to read gzip trailer of {}", path.display()))?;
    Ok(u32::from_le_bytes(trailer) as u64)
}

/// Run `write` against a temp file in `dest`'s directory, then rename it over `dest`.
fn write_atomically<T, F>(dest: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut dyn Write) -> Result<T>,
{
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    let mut writer = BufWriter::new(temp);
    let value = write(&mut writer)?;

    let temp = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush temp file")?;
    temp.persist(dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    Ok(value)
}
