//! Store statistics from chunk headers alone.

use crate::store::data_file_path;
use crate::store::format::CHUNK_SIZE;
use crate::store::reader::StoreReader;
use anyhow::Result;
use std::path::Path;

/// Summary of a data file, computed without decompressing any payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub chunks: usize,
    pub file_records: usize,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub index_bytes: u64,
    pub largest_chunk: u32,
}

/// Scan chunk headers and accumulate totals.
pub fn gather_stats(data_path: &Path) -> Result<StoreStats> {
    let mut reader = StoreReader::open(data_path)?;
    let mut stats = StoreStats::default();

    while let Some(header) = reader.next_chunk_header()? {
        reader.skip_index(&header)?;
        reader.skip_payload(&header)?;

        stats.chunks += 1;
        stats.file_records += header.file_count as usize;
        stats.uncompressed_bytes += header.uncompressed_size as u64;
        stats.compressed_bytes += header.compressed_size as u64;
        stats.index_bytes += header.index_size as u64;
        stats.largest_chunk = stats.largest_chunk.max(header.uncompressed_size);
    }

    Ok(stats)
}

/// Display store statistics for a project.
pub fn show_stats(project: &Path) -> Result<()> {
    let data_path = data_file_path(project);
    let stats = gather_stats(&data_path)?;

    println!("Store statistics");
    println!("================");
    println!();
    println!("Data file:         {}", data_path.display());
    println!("Chunk budget:      {} KiB", CHUNK_SIZE / 1024);
    println!("Chunks:            {}", stats.chunks);
    println!("File records:      {}", stats.file_records);
    println!("Uncompressed:      {}", format_size(stats.uncompressed_bytes));
    println!("Compressed:        {}", format_size(stats.compressed_bytes));
    println!("Index bytes:       {}", format_size(stats.index_bytes));
    println!("Largest chunk:     {}", format_size(stats.largest_chunk as u64));

    if stats.uncompressed_bytes > 0 {
        println!(
            "Compression ratio: {:.2}x",
            stats.uncompressed_bytes as f64 / stats.compressed_bytes.max(1) as f64
        );
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::builder::Builder;
    use std::io::Write;

    #[test]
    fn test_gather_stats_counts_headers() {
        let mut bytes = Vec::new();
        let mut builder = Builder::with_chunk_size(&mut bytes, 8).unwrap();
        builder
            .append_file_part("f", 0, b"aaaa\nbbbb\ncccc\ndddd\neeee\n", 1, 25)
            .unwrap();
        builder.finish().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let stats = gather_stats(file.path()).unwrap();
        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.file_records, 5);
        assert_eq!(stats.uncompressed_bytes, 5 * (40 + 1 + 5));
        assert!(stats.compressed_bytes > 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MiB");
    }
}
