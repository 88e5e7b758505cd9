//! Query pipeline: sequential chunk ingestion, parallel decompression and
//! scan, ordered emission.
//!
//! One thread walks the data file and submits each chunk to the worker
//! pool; workers own their block exclusively for decompression and
//! scanning. Output order is strictly equal to on-disk chunk order
//! regardless of completion order, enforced by the ordered emitter. The
//! block pool bounds how far ingestion can outrun scanning.

use crate::output::SearchOptions;
use crate::query::ordered::OrderedOutput;
use crate::query::pool::BlockPool;
use crate::query::scanner::scan_block;
use crate::store::data_file_path;
use crate::store::format::{MAX_BUFFERED_OUTPUT, MAX_QUEUED_CHUNK_DATA, OUTPUT_FLUSH_THRESHOLD};
use crate::store::reader::StoreReader;
use anyhow::{anyhow, Context, Result};
use regex::bytes::{Regex, RegexBuilder};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Compile the query pattern, forwarding the IGNORE_CASE and LITERAL
/// options to the regex engine.
fn compile_pattern(pattern: &str, options: SearchOptions) -> Result<Regex> {
    let source = if options.has(SearchOptions::LITERAL) {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };

    RegexBuilder::new(&source)
        .case_insensitive(options.has(SearchOptions::IGNORE_CASE))
        .build()
        .with_context(|| format!("Invalid search pattern '{}'", pattern))
}

/// Search a project's data file, writing formatted matches to `sink`.
pub fn search_project<W: Write + Send>(
    project: &Path,
    pattern: &str,
    options: SearchOptions,
    sink: W,
) -> Result<()> {
    search_store(&data_file_path(project), pattern, options, sink)
}

/// Search one data file, writing formatted matches to `sink`.
///
/// Matches are emitted first by on-disk chunk order, then by file order
/// within a chunk, then by byte offset within a file. Output already
/// flushed before a format error is not retracted.
pub fn search_store<W: Write + Send>(
    data_path: &Path,
    pattern: &str,
    options: SearchOptions,
    sink: W,
) -> Result<()> {
    let re = compile_pattern(pattern, options)?;
    let mut reader = StoreReader::open(data_path)?;

    let output = OrderedOutput::new(
        sink,
        MAX_BUFFERED_OUTPUT,
        OUTPUT_FLUSH_THRESHOLD,
        options.has(SearchOptions::HIGHLIGHT),
    );
    let pool = BlockPool::new(MAX_QUEUED_CHUNK_DATA);
    let scan_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    // FIFO spawning makes chunk tasks start in submission order, which
    // both keeps early output flowing and upholds the ordered emitter's
    // no-deadlock requirement.
    let read_result: Result<()> = rayon::scope_fifo(|scope| {
        let mut chunk_index = 0u32;

        while let Some(header) = reader.next_chunk_header()? {
            reader.skip_index(&header)?;

            let total = header.compressed_size as usize + header.uncompressed_size as usize;
            let mut block = pool.allocate(total).ok_or_else(|| {
                anyhow!(
                    "Error reading data file {}: malformed chunk",
                    data_path.display()
                )
            })?;

            reader.read_payload_into(&mut block[..header.compressed_size as usize])?;

            let index = chunk_index;
            chunk_index += 1;

            let re = &re;
            let output = &output;
            let scan_error = &scan_error;

            scope.spawn_fifo(move |_| {
                let mut chunk = output.begin(index);

                if let Err(err) = scan_block(re, options, &mut chunk, block, &header) {
                    let mut slot = scan_error.lock().unwrap();
                    slot.get_or_insert(err);
                }

                // Always submit, even empty: the emitter's cursor must
                // pass this index for later chunks to release.
                if let Err(err) = output.end(chunk) {
                    let mut slot = scan_error.lock().unwrap();
                    slot.get_or_insert(err.into());
                }
            });
        }

        Ok(())
    });

    read_result?;

    if let Some(err) = scan_error.into_inner().unwrap() {
        return Err(err.context(format!("Error reading data file {}", data_path.display())));
    }

    output.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_option_escapes_metacharacters() {
        let options = SearchOptions::new().with(SearchOptions::LITERAL);
        let re = compile_pattern("a+b", options).unwrap();
        assert!(re.is_match(b"a+b"));
        assert!(!re.is_match(b"aaab"));
    }

    #[test]
    fn test_ignore_case_option() {
        let options = SearchOptions::new().with(SearchOptions::IGNORE_CASE);
        let re = compile_pattern("needle", options).unwrap();
        assert!(re.is_match(b"NeEdLe"));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let err = compile_pattern("(unclosed", SearchOptions::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid search pattern"));
    }
}
