//! On-disk format of the chunked store.
//!
//! A data file is a 4-byte magic header followed by a sequence of chunk
//! records. Each chunk record is `DataChunkHeader || index_bytes ||
//! compressed_payload`; the store is self-delimiting by the sizes declared
//! in each chunk header. All integers are little-endian.

use std::io::{self, Read, Write};

/// Format version, stored as the fourth magic byte.
pub const FORMAT_VERSION: u8 = b'1';

/// File signature: `QGD` followed by the format version.
pub const DATA_FILE_MAGIC: [u8; 4] = [b'Q', b'G', b'D', FORMAT_VERSION];

/// Target chunk payload size.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Byte budget for chunk data in flight between the reader thread and the
/// scan workers; the block pool blocks the reader beyond this.
pub const MAX_QUEUED_CHUNK_DATA: usize = 128 * 1024 * 1024;

/// Byte budget for per-chunk output held back by the ordered emitter while
/// an earlier chunk is still being scanned.
pub const MAX_BUFFERED_OUTPUT: usize = 32 * 1024 * 1024;

/// Granularity at which buffered output is pushed to the terminal.
pub const OUTPUT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Per-chunk record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataChunkHeader {
    pub file_count: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub index_size: u32,
    pub index_hash_iterations: u32,
}

impl DataChunkHeader {
    pub const SIZE: usize = 20;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let field = |i: usize| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            file_count: field(0),
            uncompressed_size: field(1),
            compressed_size: field(2),
            index_size: field(3),
            index_hash_iterations: field(4),
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.file_count.to_le_bytes())?;
        out.write_all(&self.uncompressed_size.to_le_bytes())?;
        out.write_all(&self.compressed_size.to_le_bytes())?;
        out.write_all(&self.index_size.to_le_bytes())?;
        out.write_all(&self.index_hash_iterations.to_le_bytes())
    }

    #[allow(dead_code)]
    pub fn read_from<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        input.read_exact(&mut buf)?;
        Ok(Self::decode(&buf))
    }
}

/// Per-file record header inside an uncompressed chunk buffer.
///
/// `name_offset` and `data_offset` are absolute offsets within the chunk
/// buffer; name and data regions are densely packed in header order.
/// `start_line` is the 1-based line offset of the record's first byte in
/// the original file (0 means "from the start"), which is how a split file
/// remembers where its tail begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataChunkFileHeader {
    pub name_offset: u32,
    pub name_length: u32,
    pub data_offset: u32,
    pub data_size: u32,
    pub start_line: u32,
    pub reserved: u32,
    pub file_size: u64,
    pub timestamp: u64,
}

impl DataChunkFileHeader {
    pub const SIZE: usize = 40;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let u32_at = |i: usize| u32::from_le_bytes(buf[i..i + 4].try_into().unwrap());
        let u64_at = |i: usize| u64::from_le_bytes(buf[i..i + 8].try_into().unwrap());
        Self {
            name_offset: u32_at(0),
            name_length: u32_at(4),
            data_offset: u32_at(8),
            data_size: u32_at(12),
            start_line: u32_at(16),
            reserved: u32_at(20),
            file_size: u64_at(24),
            timestamp: u64_at(32),
        }
    }

    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.name_offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.name_length.to_le_bytes());
        out[8..12].copy_from_slice(&self.data_offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.data_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.start_line.to_le_bytes());
        out[20..24].copy_from_slice(&self.reserved.to_le_bytes());
        out[24..32].copy_from_slice(&self.file_size.to_le_bytes());
        out[32..40].copy_from_slice(&self.timestamp.to_le_bytes());
    }
}
