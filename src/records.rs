//! Fixed-schema record encoding and the container framing around it.
//!
//! A container file is a plain sequence of framed records:
//!
//! ```text
//! len: u64 LE | masked_crc32c(len): u32 LE | payload | masked_crc32c(payload): u32 LE
//! ```
//!
//! and every payload is
//!
//! ```text
//! height: u32 LE | width: u32 LE | depth: u32 LE | label: i32 LE | raw: height*width*depth f64 LE
//! ```
//!
//! with `raw` holding the sample array flattened in row-major order.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::records::{
    CRC_MASK_DELTA, ELEMENT_BYTES, FRAME_CRC_BYTES, FRAME_LEN_BYTES, IO_BUFFER_BYTES,
    RECORD_HEADER_LEN,
};
use crate::errors::ShardError;
use crate::labels::LabelEncoder;
use crate::source::Sample;
use crate::transport::fs::StagedFile;
use crate::types::LabelCode;

/// Serialized form of one sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Array dimension 0.
    pub height: u32,
    /// Array dimension 1.
    pub width: u32,
    /// Channel count supplied by the writer.
    pub depth: u32,
    /// Encoded class code.
    pub label: LabelCode,
    /// Row-major little-endian `f64` values.
    pub raw: Vec<u8>,
}

impl Record {
    /// Encode `sample` with the declared channel depth.
    ///
    /// Fails when the sample's depth differs from `channels` or its label is
    /// not in the encoder's table.
    pub fn from_sample(
        sample: &Sample,
        channels: u32,
        encoder: &LabelEncoder,
    ) -> Result<Self, ShardError> {
        let (height, width, depth) = sample.data.dim();
        if depth != channels as usize {
            return Err(ShardError::ShapeMismatch {
                context: "record encoding".into(),
                expected: format!("{channels} channels"),
                actual: format!("{height}x{width}x{depth}"),
            });
        }
        let label = encoder.encode(&sample.label)?;
        let mut raw = Vec::with_capacity(sample.data.len() * ELEMENT_BYTES);
        // `iter` walks the logical (row-major) order regardless of memory layout.
        for value in sample.data.iter() {
            raw.extend_from_slice(&value.to_le_bytes());
        }
        Ok(Self {
            height: dim_to_u32(height)?,
            width: dim_to_u32(width)?,
            depth: channels,
            label,
            raw,
        })
    }

    /// Number of `f64` elements the header declares.
    pub fn element_count(&self) -> Option<usize> {
        (self.height as usize)
            .checked_mul(self.width as usize)?
            .checked_mul(self.depth as usize)
    }

    /// Decode `raw` into `f64` values.
    pub fn values(&self) -> Vec<f64> {
        self.raw
            .chunks_exact(ELEMENT_BYTES)
            .map(|bytes| {
                let mut buf = [0u8; ELEMENT_BYTES];
                buf.copy_from_slice(bytes);
                f64::from_le_bytes(buf)
            })
            .collect()
    }

    /// Payload bytes in schema order.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + self.raw.len());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.depth.to_le_bytes());
        out.extend_from_slice(&self.label.to_le_bytes());
        out.extend_from_slice(&self.raw);
        out
    }

    /// Parse a payload, checking that `raw` matches the declared dimensions.
    pub fn from_payload(payload: &[u8]) -> Result<Self, String> {
        if payload.len() < RECORD_HEADER_LEN {
            return Err(format!(
                "payload of {} bytes is shorter than the {RECORD_HEADER_LEN}-byte header",
                payload.len()
            ));
        }
        let word = |idx: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&payload[idx * 4..idx * 4 + 4]);
            buf
        };
        let record = Self {
            height: u32::from_le_bytes(word(0)),
            width: u32::from_le_bytes(word(1)),
            depth: u32::from_le_bytes(word(2)),
            label: i32::from_le_bytes(word(3)),
            raw: payload[RECORD_HEADER_LEN..].to_vec(),
        };
        let expected = record
            .element_count()
            .and_then(|count| count.checked_mul(ELEMENT_BYTES))
            .ok_or_else(|| "declared dimensions overflow".to_string())?;
        if record.raw.len() != expected {
            return Err(format!(
                "raw bytes length {} does not match {}x{}x{} f64 values ({expected} bytes)",
                record.raw.len(),
                record.height,
                record.width,
                record.depth
            ));
        }
        Ok(record)
    }
}

fn dim_to_u32(dim: usize) -> Result<u32, ShardError> {
    u32::try_from(dim).map_err(|_| ShardError::ShapeMismatch {
        context: "record encoding".into(),
        expected: "dimensions that fit in u32".into(),
        actual: dim.to_string(),
    })
}

/// Masked CRC-32C (Castagnoli) stored in frame headers and trailers.
pub fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data).rotate_right(15).wrapping_add(CRC_MASK_DELTA)
}

/// Write one framed payload; returns the bytes written.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<u64> {
    let len = (payload.len() as u64).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&masked_crc32c(payload).to_le_bytes())?;
    Ok((FRAME_LEN_BYTES + 2 * FRAME_CRC_BYTES + payload.len()) as u64)
}

/// Outcome of one completed shard write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSummary {
    /// Final container path.
    pub path: PathBuf,
    /// Records written.
    pub records: usize,
    /// Bytes written.
    pub bytes: u64,
}

/// Scoped container writer.
///
/// Records go to a staging file that only appears at the final path after
/// `finish`; dropping the writer early discards everything written.
pub struct RecordWriter {
    file: StagedFile,
    records: usize,
    bytes: u64,
}

impl RecordWriter {
    /// Begin a container at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ShardError> {
        Ok(Self {
            file: StagedFile::create(path)?,
            records: 0,
            bytes: 0,
        })
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &Record) -> Result<(), ShardError> {
        self.bytes += write_frame(&mut self.file, &record.to_payload())?;
        self.records += 1;
        Ok(())
    }

    /// Flush and move the container into place.
    pub fn finish(self) -> Result<ShardSummary, ShardError> {
        let records = self.records;
        let bytes = self.bytes;
        let path = self.file.commit()?;
        Ok(ShardSummary {
            path,
            records,
            bytes,
        })
    }
}

/// Serialize `samples` in order into the container at `path`.
///
/// The first sample that fails to encode aborts the shard; the error names
/// the sample index and the output path, and nothing appears at `path`.
pub fn write_shard(
    samples: &[Sample],
    path: &Path,
    channels: u32,
    encoder: &LabelEncoder,
) -> Result<ShardSummary, ShardError> {
    let mut writer = RecordWriter::create(path)?;
    for (idx, sample) in samples.iter().enumerate() {
        let record =
            Record::from_sample(sample, channels, encoder).map_err(|err| err.at_sample(path, idx))?;
        writer
            .write_record(&record)
            .map_err(|err| err.at_sample(path, idx))?;
    }
    let summary = writer.finish()?;
    debug!(
        "[shardprep] wrote {} records ({} bytes) to {}",
        summary.records,
        summary.bytes,
        summary.path.display()
    );
    Ok(summary)
}

/// Sequential reader over the records in a container file.
pub struct RecordReader {
    path: PathBuf,
    reader: BufReader<File>,
    next_index: usize,
    done: bool,
}

impl RecordReader {
    /// Open a container for reading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ShardError> {
        let path = path.into();
        let file = File::open(&path).map_err(ShardError::file(&path))?;
        Ok(Self {
            path,
            reader: BufReader::with_capacity(IO_BUFFER_BYTES, file),
            next_index: 0,
            done: false,
        })
    }

    /// Read the next framed payload, or `None` at a clean end of file.
    pub fn next_payload(&mut self) -> Result<Option<Vec<u8>>, ShardError> {
        let mut len_buf = [0u8; FRAME_LEN_BYTES];
        if !self.fill_or_eof(&mut len_buf)? {
            return Ok(None);
        }
        let len_crc = self.read_u32()?;
        if masked_crc32c(&len_buf) != len_crc {
            return Err(self.corrupt("length checksum mismatch"));
        }
        let len = usize::try_from(u64::from_le_bytes(len_buf))
            .map_err(|_| self.corrupt("record length exceeds address space"))?;
        let mut payload = vec![0u8; len];
        self.reader
            .read_exact(&mut payload)
            .map_err(|err| self.corrupt(format!("truncated payload: {err}")))?;
        let payload_crc = self.read_u32()?;
        if masked_crc32c(&payload) != payload_crc {
            return Err(self.corrupt("payload checksum mismatch"));
        }
        self.next_index += 1;
        Ok(Some(payload))
    }

    /// Read and parse the next record.
    pub fn next_record(&mut self) -> Result<Option<Record>, ShardError> {
        let Some(payload) = self.next_payload()? else {
            return Ok(None);
        };
        Record::from_payload(&payload).map(Some).map_err(|reason| {
            ShardError::CorruptRecord {
                path: self.path.clone(),
                record_index: self.next_index - 1,
                reason,
            }
        })
    }

    fn fill_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, ShardError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(self.corrupt("truncated frame header")),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    fn read_u32(&mut self) -> Result<u32, ShardError> {
        let mut buf = [0u8; FRAME_CRC_BYTES];
        self.reader
            .read_exact(&mut buf)
            .map_err(|err| self.corrupt(format!("truncated checksum: {err}")))?;
        Ok(u32::from_le_bytes(buf))
    }

    fn corrupt(&self, reason: impl Into<String>) -> ShardError {
        ShardError::CorruptRecord {
            path: self.path.clone(),
            record_index: self.next_index,
            reason: reason.into(),
        }
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record, ShardError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_record().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
