//! Sequential reader for the chunked store.

use crate::store::format::{DataChunkHeader, DATA_FILE_MAGIC};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Streaming store reader: verifies the file magic, then yields chunk
/// headers and payloads in on-disk order.
#[derive(Debug)]
pub struct StoreReader {
    path: PathBuf,
    input: BufReader<File>,
}

impl StoreReader {
    pub fn open(data_path: &Path) -> Result<Self> {
        let file = File::open(data_path)
            .with_context(|| format!("Error reading data file {}", data_path.display()))?;
        let mut input = BufReader::new(file);

        let mut magic = [0u8; 4];
        if input.read_exact(&mut magic).is_err() || magic != DATA_FILE_MAGIC {
            bail!(
                "Error reading data file {}: malformed header",
                data_path.display()
            );
        }

        Ok(Self {
            path: data_path.to_path_buf(),
            input,
        })
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next chunk header, or `None` at a clean end of stream.
    /// A partial header is a format error.
    pub fn next_chunk_header(&mut self) -> Result<Option<DataChunkHeader>> {
        let mut buf = [0u8; DataChunkHeader::SIZE];

        let first = self
            .input
            .read(&mut buf)
            .with_context(|| format!("Error reading data file {}", self.path.display()))?;
        if first == 0 {
            return Ok(None);
        }

        if self.input.read_exact(&mut buf[first..]).is_err() {
            bail!(
                "Error reading data file {}: truncated chunk header",
                self.path.display()
            );
        }

        Ok(Some(DataChunkHeader::decode(&buf)))
    }

    /// Skip over the current chunk's index bytes.
    pub fn skip_index(&mut self, header: &DataChunkHeader) -> Result<()> {
        self.input
            .seek_relative(header.index_size as i64)
            .with_context(|| {
                format!("Error reading data file {}: malformed chunk", self.path.display())
            })
    }

    /// Read the current chunk's index bytes.
    #[allow(dead_code)]
    pub fn read_index(&mut self, header: &DataChunkHeader) -> Result<Vec<u8>> {
        let mut index = vec![0u8; header.index_size as usize];
        self.input.read_exact(&mut index).map_err(|_| {
            anyhow::anyhow!("Error reading data file {}: malformed chunk", self.path.display())
        })?;
        Ok(index)
    }

    /// Read the current chunk's compressed payload into `buf`, which must
    /// be exactly `compressed_size` long.
    pub fn read_payload_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf).map_err(|_| {
            anyhow::anyhow!("Error reading data file {}: malformed chunk", self.path.display())
        })
    }

    /// Skip over the current chunk's compressed payload.
    pub fn skip_payload(&mut self, header: &DataChunkHeader) -> Result<()> {
        self.input
            .seek_relative(header.compressed_size as i64)
            .with_context(|| {
                format!("Error reading data file {}: malformed chunk", self.path.display())
            })
    }
}
