//! Chunk packer and stream writer.
//!
//! The builder accumulates file contents in a pending queue and emits
//! fixed-budget chunks from the front, splitting files at line boundaries.
//! Growth rule: after every append, while the pending total is at least
//! twice the chunk budget, a full-sized chunk is emitted. Finalization
//! drains whatever remains. Between appends the pending total therefore
//! stays below twice the budget, typically leaving one budget's worth
//! pending so the next chunk can be built at full size.

use crate::store::format::{DataChunkFileHeader, DataChunkHeader, CHUNK_SIZE, DATA_FILE_MAGIC};
use crate::utils::bloom::build_chunk_index;
use anyhow::Result;
use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

/// A slice of a shared byte buffer.
///
/// The storage is jointly owned so that a split can hand the front of a
/// file to a chunk while the tail stays pending, and so that the last
/// pending record can keep growing without copying the front. Growing is
/// only legal while the slice ends at the buffer's current tail.
struct Blob {
    storage: Rc<RefCell<Vec<u8>>>,
    offset: usize,
    count: usize,
}

impl Blob {
    fn new(bytes: Vec<u8>) -> Self {
        let count = bytes.len();
        Self {
            storage: Rc::new(RefCell::new(bytes)),
            offset: 0,
            count,
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.storage.borrow(), |v| {
            &v[self.offset..self.offset + self.count]
        })
    }

    fn is_at_tail(&self) -> bool {
        self.offset + self.count == self.storage.borrow().len()
    }

    fn append(&mut self, data: &[u8]) {
        debug_assert!(self.is_at_tail());
        self.storage.borrow_mut().extend_from_slice(data);
        self.count += data.len();
    }

    /// Take the first `size` bytes as a new blob sharing the same storage.
    fn split_prefix(&mut self, size: usize) -> Blob {
        debug_assert!(size <= self.count);

        let prefix = Blob {
            storage: Rc::clone(&self.storage),
            offset: self.offset,
            count: size,
        };

        self.offset += size;
        self.count -= size;
        prefix
    }
}

/// A file record awaiting packing, or already placed into a chunk.
struct FileRecord {
    name: String,
    contents: Blob,
    start_line: u32,
    file_size: u64,
    timestamp: u64,
}

impl FileRecord {
    /// Split off the first `size` bytes; the remainder keeps the record's
    /// identity with `start_line` advanced by `lines_taken`.
    fn split_prefix(&mut self, size: usize, lines_taken: u32) -> FileRecord {
        let prefix = FileRecord {
            name: self.name.clone(),
            contents: self.contents.split_prefix(size),
            start_line: self.start_line,
            file_size: self.file_size,
            timestamp: self.timestamp,
        };

        self.start_line += lines_taken;
        prefix
    }
}

#[derive(Default)]
struct Chunk {
    files: Vec<FileRecord>,
    total_size: usize,
}

impl Chunk {
    fn push(&mut self, file: FileRecord) {
        self.total_size += file.contents.len();
        self.files.push(file);
    }
}

/// Cumulative build statistics, reported through the progress printer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub chunks: usize,
    pub files: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Streaming chunk builder.
///
/// Bytes go in through [`append_file_part`](Builder::append_file_part) and
/// come out as `header || index || compressed payload` chunk records on
/// the output stream. The build side is single-threaded by design.
pub struct Builder<W: Write> {
    out: W,
    chunk_size: usize,
    pending: VecDeque<FileRecord>,
    pending_size: usize,
    stats: BuildStats,
}

impl<W: Write> Builder<W> {
    /// Create a builder writing the file magic to `out`.
    pub fn new(out: W) -> Result<Self> {
        Self::with_chunk_size(out, CHUNK_SIZE)
    }

    /// Create a builder with a non-default chunk budget. Stores written
    /// with any budget read back identically; this mainly exists so the
    /// splitting rules can be exercised with small fixtures.
    pub fn with_chunk_size(mut out: W, chunk_size: usize) -> Result<Self> {
        assert!(chunk_size > 0);
        out.write_all(&DATA_FILE_MAGIC)?;

        Ok(Self {
            out,
            chunk_size,
            pending: VecDeque::new(),
            pending_size: 0,
            stats: BuildStats::default(),
        })
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Append raw (already normalized) file bytes.
    ///
    /// Consecutive parts of the same file extend the last pending record
    /// in place; `start_line` must strictly increase across parts and the
    /// file identity fields must match.
    pub fn append_file_part(
        &mut self,
        path: &str,
        start_line: u32,
        data: &[u8],
        timestamp: u64,
        file_size: u64,
    ) -> Result<()> {
        match self.pending.back_mut() {
            Some(last) if last.name == path => {
                debug_assert!(last.start_line < start_line);
                debug_assert!(last.timestamp == timestamp && last.file_size == file_size);
                last.contents.append(data);
            }
            _ => {
                self.pending.push_back(FileRecord {
                    name: path.to_string(),
                    contents: Blob::new(data.to_vec()),
                    start_line,
                    file_size,
                    timestamp,
                });
            }
        }

        self.pending_size += data.len();
        self.flush_if_needed()
    }

    /// Append a pre-built chunk record without decompressing it, used when
    /// copying chunks from one store to another.
    ///
    /// Pending data is drained first so the pass-through chunk lands on a
    /// chunk boundary; the drain must not produce chunks outside the
    /// `[0.75, 1.5]` budget window, so `Ok(false)` is returned (and
    /// nothing is written) when the pending size makes that impossible.
    /// The caller may then fall back to re-extracting files.
    #[allow(dead_code)]
    pub fn append_chunk(
        &mut self,
        header: &DataChunkHeader,
        index: &[u8],
        compressed: &[u8],
        first_file_is_suffix: bool,
    ) -> Result<bool> {
        self.flush_if_needed()?;

        // flush_if_needed leaves chunk_size * m pending, m in [0..2).
        // One chunk is fine up to m = 1.5; past that, split in two.
        let chunk_max_size = self.chunk_size * 3 / 2;
        let chunk_min_size = chunk_max_size / 2;

        if self.pending_size > 0 {
            if self.pending_size > self.chunk_size * 2 {
                return Ok(false);
            }

            if self.pending_size < chunk_min_size {
                return Ok(false);
            }

            if self.pending_size > chunk_max_size {
                self.flush_chunk_of(self.pending_size / 2)?;
            }

            debug_assert!(self.pending_size < chunk_max_size);
            self.flush_chunk_of(self.pending_size)?;
        }

        debug_assert!(self.pending_size == 0 && self.pending.is_empty());
        self.write_chunk_record(header, index, compressed, first_file_is_suffix)?;

        Ok(true)
    }

    fn flush_if_needed(&mut self) -> Result<()> {
        while self.pending_size >= self.chunk_size * 2 {
            self.flush_chunk_of(self.chunk_size)?;
        }
        Ok(())
    }

    /// Drain all pending data into final chunks.
    pub fn flush(&mut self) -> Result<()> {
        while self.pending_size > 0 {
            self.flush_chunk_of(self.chunk_size)?;
        }
        Ok(())
    }

    /// Flush pending data and the underlying stream; returns the output.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        self.out.flush()?;
        Ok(self.out)
    }

    /// Build one chunk of up to (approximately) `size` bytes from the
    /// front of the pending queue.
    fn flush_chunk_of(&mut self, size: usize) -> Result<()> {
        let mut chunk = Chunk::default();

        while chunk.total_size < size {
            let Some(mut file) = self.pending.pop_front() else {
                break;
            };

            let remaining = size - chunk.total_size;

            if file.contents.len() <= remaining {
                chunk.push(file);
            } else {
                Self::split_into_chunk(&mut chunk, &mut file, remaining, self.chunk_size);
                if file.contents.len() > 0 {
                    self.pending.push_front(file);
                }
                // No more files fit without overshooting the budget.
                break;
            }
        }

        debug_assert!(chunk.total_size <= self.pending_size);
        self.pending_size -= chunk.total_size;

        self.write_materialized(chunk)
    }

    /// Move a line-aligned prefix of `file` into `chunk`.
    ///
    /// The split point is just past the last newline within the first
    /// `remaining` bytes. When a single line exceeds the budget the rules
    /// degrade in order of preference: a later chunk gets the whole line
    /// (nothing is taken here), an oversized chunk swallows the record up
    /// to and including its first newline, or - for a record with no
    /// newline at all that could not fit even an oversized chunk - the
    /// line is cut at the budget and the remainder carries on as if a
    /// line had ended.
    fn split_into_chunk(chunk: &mut Chunk, file: &mut FileRecord, remaining: usize, chunk_size: usize) {
        debug_assert!(remaining < file.contents.len());

        let (take, lines_taken) = {
            let bytes = file.contents.bytes();

            match bytes[..remaining].iter().rposition(|&b| b == b'\n') {
                Some(last) => (last + 1, count_lines(&bytes[..last + 1])),
                None if !chunk.files.is_empty() => return,
                None => match bytes[remaining..].iter().position(|&b| b == b'\n') {
                    Some(next) => (remaining + next + 1, 1),
                    None if bytes.len() < chunk_size * 2 => (bytes.len(), 0),
                    None => (remaining, 1),
                },
            }
        };

        chunk.push(file.split_prefix(take, lines_taken));
    }

    /// Materialize a chunk buffer, index it, compress it and write the
    /// chunk record.
    fn write_materialized(&mut self, chunk: Chunk) -> Result<()> {
        if chunk.files.is_empty() {
            return Ok(());
        }

        let header_size = DataChunkFileHeader::SIZE * chunk.files.len();
        let name_size: usize = chunk.files.iter().map(|f| f.name.len()).sum();
        let data_size: usize = chunk.files.iter().map(|f| f.contents.len()).sum();

        let mut data = vec![0u8; header_size + name_size + data_size];

        let mut name_offset = header_size;
        let mut data_offset = header_size + name_size;

        for (i, file) in chunk.files.iter().enumerate() {
            data[name_offset..name_offset + file.name.len()].copy_from_slice(file.name.as_bytes());

            let contents = file.contents.bytes();
            data[data_offset..data_offset + contents.len()].copy_from_slice(&contents);

            let file_header = DataChunkFileHeader {
                name_offset: name_offset as u32,
                name_length: file.name.len() as u32,
                data_offset: data_offset as u32,
                data_size: contents.len() as u32,
                start_line: file.start_line,
                reserved: 0,
                file_size: file.file_size,
                timestamp: file.timestamp,
            };
            file_header.encode_into(&mut data[i * DataChunkFileHeader::SIZE..]);

            name_offset += file.name.len();
            data_offset += contents.len();
        }

        debug_assert!(name_offset == header_size + name_size && data_offset == data.len());

        // The index only covers file contents; headers and names would
        // pollute it with grams no query can ask for.
        let index = build_chunk_index(&data[header_size + name_size..]);
        let compressed = lz4_flex::block::compress(&data);

        let header = DataChunkHeader {
            file_count: chunk.files.len() as u32,
            uncompressed_size: data.len() as u32,
            compressed_size: compressed.len() as u32,
            index_size: index.data.len() as u32,
            index_hash_iterations: index.iterations,
        };

        let first_file_is_suffix = chunk.files[0].start_line != 0;
        self.write_chunk_record(&header, &index.data, &compressed, first_file_is_suffix)
    }

    fn write_chunk_record(
        &mut self,
        header: &DataChunkHeader,
        index: &[u8],
        compressed: &[u8],
        first_file_is_suffix: bool,
    ) -> Result<()> {
        header.write_to(&mut self.out)?;
        self.out.write_all(index)?;
        self.out.write_all(compressed)?;

        self.stats.chunks += 1;
        // The continuation record of a split file only counts in the chunk
        // holding its head.
        self.stats.files += header.file_count as usize - first_file_is_suffix as usize;
        self.stats.bytes_in += header.uncompressed_size as u64;
        self.stats.bytes_out += header.compressed_size as u64;

        Ok(())
    }
}

fn count_lines(data: &[u8]) -> u32 {
    data.iter().filter(|&&b| b == b'\n').count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format::DATA_FILE_MAGIC;

    struct ParsedChunk {
        header: DataChunkHeader,
        files: Vec<(String, u32, Vec<u8>)>,
    }

    /// Decode a serialized store back into per-chunk file records.
    fn parse_store(bytes: &[u8]) -> Vec<ParsedChunk> {
        assert_eq!(&bytes[..4], &DATA_FILE_MAGIC);

        let mut chunks = Vec::new();
        let mut pos = 4;

        while pos < bytes.len() {
            let header =
                DataChunkHeader::decode(&bytes[pos..pos + DataChunkHeader::SIZE].try_into().unwrap());
            pos += DataChunkHeader::SIZE + header.index_size as usize;

            let compressed = &bytes[pos..pos + header.compressed_size as usize];
            pos += header.compressed_size as usize;

            let data =
                lz4_flex::block::decompress(compressed, header.uncompressed_size as usize).unwrap();
            assert_eq!(data.len(), header.uncompressed_size as usize);

            let mut files = Vec::new();
            for i in 0..header.file_count as usize {
                let fh = DataChunkFileHeader::decode(
                    &data[i * DataChunkFileHeader::SIZE..(i + 1) * DataChunkFileHeader::SIZE]
                        .try_into()
                        .unwrap(),
                );
                let name = String::from_utf8(
                    data[fh.name_offset as usize..(fh.name_offset + fh.name_length) as usize]
                        .to_vec(),
                )
                .unwrap();
                let contents = data
                    [fh.data_offset as usize..(fh.data_offset + fh.data_size) as usize]
                    .to_vec();
                files.push((name, fh.start_line, contents));
            }

            chunks.push(ParsedChunk { header, files });
        }

        chunks
    }

    fn build_with<F: FnOnce(&mut Builder<&mut Vec<u8>>)>(chunk_size: usize, f: F) -> Vec<u8> {
        let mut out = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut out, chunk_size).unwrap();
        f(&mut builder);
        builder.flush().unwrap();
        out
    }

    #[test]
    fn test_empty_store_is_just_magic() {
        let out = build_with(CHUNK_SIZE, |_| {});
        assert_eq!(out, DATA_FILE_MAGIC);
    }

    #[test]
    fn test_single_small_file_one_chunk() {
        let out = build_with(CHUNK_SIZE, |b| {
            b.append_file_part("a.txt", 0, b"x\ny\n", 7, 5).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header.file_count, 1);
        assert_eq!(chunks[0].files[0], ("a.txt".to_string(), 0, b"x\ny\n".to_vec()));
    }

    #[test]
    fn test_two_files_share_a_chunk() {
        let out = build_with(24, |b| {
            b.append_file_part("a.txt", 0, b"line1\nline2\n", 1, 12).unwrap();
            b.append_file_part("b.txt", 0, b"line3\n", 1, 6).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header.file_count, 2);
        assert_eq!(
            chunks[0].header.uncompressed_size as usize,
            DataChunkFileHeader::SIZE * 2 + 5 + 5 + 12 + 6
        );
    }

    #[test]
    fn test_growth_rule_splits_at_line_boundaries() {
        // 25 bytes of 5-byte lines against an 8-byte budget: the growth
        // rule fires twice (25 >= 16, then 20 >= 16) and the final flush
        // drains the rest.
        let out = build_with(8, |b| {
            b.append_file_part("f", 0, b"aaaa\nbbbb\ncccc\ndddd\neeee\n", 1, 25)
                .unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 5);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.files.len(), 1);
            let (name, start_line, data) = &chunk.files[0];
            assert_eq!(name, "f");
            assert_eq!(*start_line, i as u32);
            assert_eq!(data.len(), 5);
            assert_eq!(data[4], b'\n');
        }
    }

    #[test]
    fn test_split_starts_after_newline_and_counts_lines() {
        let content = b"one\ntwo\nthree\nfour\n";
        let out = build_with(10, |b| {
            b.append_file_part("f", 0, content, 1, content.len() as u64).unwrap();
        });

        let chunks = parse_store(&out);
        let mut reassembled = Vec::new();
        let mut expected_start_line = 0;

        for chunk in &chunks {
            for (_, start_line, data) in &chunk.files {
                assert_eq!(*start_line, expected_start_line);
                expected_start_line += count_lines(data);
                reassembled.extend_from_slice(data);
            }
        }

        assert_eq!(reassembled, content);
    }

    #[test]
    fn test_oversized_single_line_stays_in_one_chunk() {
        // 12 bytes without a newline against an 8-byte budget: below the
        // growth threshold the record is emitted whole as one oversized
        // chunk rather than split mid-line.
        let out = build_with(8, |b| {
            b.append_file_part("f", 0, b"aaaaaaaaaaaa", 1, 12).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].files[0].2.len(), 12);
        assert!(chunks[0].header.uncompressed_size as usize <= DataChunkFileHeader::SIZE + 1 + 16);
    }

    #[test]
    fn test_huge_single_line_is_cut_at_budget() {
        // A newline-free record at exactly twice the budget is cut at the
        // budget; the remainder continues with start_line advanced by one.
        let out = build_with(8, |b| {
            b.append_file_part("f", 0, b"aaaaaaaaaaaaaaaa", 1, 16).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].files[0].1, 0);
        assert_eq!(chunks[0].files[0].2.len(), 8);
        assert_eq!(chunks[1].files[0].1, 1);
        assert_eq!(chunks[1].files[0].2.len(), 8);
    }

    #[test]
    fn test_long_first_line_swallowed_with_its_newline() {
        // No newline within the budget, but one later in the record: the
        // chunk takes the whole first line, and the tail starts a fresh
        // chunk at line offset 1.
        let out = build_with(8, |b| {
            b.append_file_part("f", 0, b"aaaaaaaaaa\nbb", 1, 13).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].files[0].2, b"aaaaaaaaaa\n");
        assert_eq!(chunks[1].files[0].1, 1);
        assert_eq!(chunks[1].files[0].2, b"bb");
    }

    #[test]
    fn test_mid_line_split_defers_to_next_chunk() {
        // The second file's single long line does not fit after the first
        // file; it must not be cut, so it becomes the next chunk's head.
        let out = build_with(8, |b| {
            b.append_file_part("a", 0, b"aa\n", 1, 3).unwrap();
            b.append_file_part("b", 0, b"bbbbbbb", 1, 7).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].files.len(), 1);
        assert_eq!(chunks[0].files[0].0, "a");
        assert_eq!(chunks[1].files[0].0, "b");
        assert_eq!(chunks[1].files[0].2, b"bbbbbbb");
    }

    #[test]
    fn test_file_parts_extend_last_record() {
        let out = build_with(CHUNK_SIZE, |b| {
            b.append_file_part("f", 0, b"one\n", 9, 8).unwrap();
            b.append_file_part("f", 1, b"two\n", 9, 8).unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header.file_count, 1);
        assert_eq!(chunks[0].files[0].2, b"one\ntwo\n");
    }

    #[test]
    fn test_split_file_counted_once_in_stats() {
        let mut out = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut out, 8).unwrap();
        builder
            .append_file_part("f", 0, b"aaaa\nbbbb\ncccc\ndddd\neeee\n", 1, 25)
            .unwrap();
        builder.flush().unwrap();

        let stats = builder.stats();
        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.files, 1);
        assert!(stats.bytes_in > 0 && stats.bytes_out > 0);
    }

    #[test]
    fn test_append_chunk_refuses_small_pending() {
        let mut out = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut out, 64).unwrap();

        // 0.75 * 64 = 48; anything below refuses the pass-through.
        builder.append_file_part("f", 0, b"tiny\n", 1, 5).unwrap();

        let header = DataChunkHeader::default();
        assert!(!builder.append_chunk(&header, &[], &[], false).unwrap());

        // The pending file is still intact and flushes normally.
        builder.flush().unwrap();
        assert_eq!(parse_store(&out).len(), 1);
    }

    #[test]
    fn test_append_chunk_flushes_pending_then_writes() {
        let payload = lz4_flex::block::compress(b"opaque");
        let header = DataChunkHeader {
            file_count: 0,
            uncompressed_size: 6,
            compressed_size: payload.len() as u32,
            index_size: 0,
            index_hash_iterations: 0,
        };

        let mut out = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut out, 64).unwrap();

        let line = [b'x'; 49]; // within [48, 96]
        let mut content = line.to_vec();
        content.push(b'\n');
        builder
            .append_file_part("f", 0, &content, 1, content.len() as u64)
            .unwrap();

        assert!(builder.append_chunk(&header, &[], &payload, false).unwrap());
        builder.flush().unwrap();

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].files[0].0, "f");
        assert_eq!(chunks[1].header, header);
    }

    #[test]
    fn test_append_chunk_splits_large_pending() {
        let payload = lz4_flex::block::compress(b"opaque");
        let header = DataChunkHeader {
            file_count: 0,
            uncompressed_size: 6,
            compressed_size: payload.len() as u32,
            index_size: 0,
            index_hash_iterations: 0,
        };

        let mut out = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut out, 64).unwrap();

        // 120 pending bytes: above 1.5 * 64 = 96, below 2 * 64 = 128, so
        // the drain is split into two chunks around the half point.
        for i in 0..20 {
            builder
                .append_file_part(&format!("f{}", i), 0, b"12345\n", 1, 6)
                .unwrap();
        }

        assert!(builder.append_chunk(&header, &[], &payload, false).unwrap());

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 3);
        let drained: usize = chunks[..2]
            .iter()
            .flat_map(|c| c.files.iter())
            .map(|(_, _, data)| data.len())
            .sum();
        assert_eq!(drained, 120);
        assert_eq!(chunks[2].header, header);
    }

    #[test]
    fn test_large_chunk_carries_bloom_index() {
        let mut content = Vec::new();
        while content.len() < 100 * 1024 {
            content.extend_from_slice(b"some searchable text content here\n");
        }

        let out = build_with(CHUNK_SIZE, |b| {
            b.append_file_part("big.txt", 0, &content, 1, content.len() as u64)
                .unwrap();
        });

        let chunks = parse_store(&out);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].header.index_size >= 1024);
        assert!(chunks[0].header.index_hash_iterations >= 1);
        assert!(chunks[0].header.index_hash_iterations <= 16);
    }
}
