//! Per-chunk scan: decompress, walk file records, run the regex, format
//! matches.

use crate::output::{write_match, SearchOptions};
use crate::query::ordered::OutputChunk;
use crate::query::pool::Block;
use crate::store::format::{DataChunkFileHeader, DataChunkHeader};
use anyhow::{bail, Result};
use regex::bytes::Regex;

/// Decompress one chunk in place (low half -> high half of its block) and
/// scan every file record in it.
pub fn scan_block(
    re: &Regex,
    options: SearchOptions,
    out: &mut OutputChunk,
    mut block: Block,
    header: &DataChunkHeader,
) -> Result<()> {
    let compressed = header.compressed_size as usize;
    let uncompressed = header.uncompressed_size as usize;

    let (src, dst) = block.split_at_mut(compressed);
    let written = match lz4_flex::block::decompress_into(src, dst) {
        Ok(written) => written,
        Err(err) => bail!("corrupt chunk payload: {}", err),
    };
    if written != uncompressed {
        bail!(
            "corrupt chunk payload: expected {} bytes, got {}",
            uncompressed,
            written
        );
    }

    scan_chunk(re, options, out, &block[compressed..], header.file_count)
}

/// Scan the decompressed records of one chunk.
pub fn scan_chunk(
    re: &Regex,
    options: SearchOptions,
    out: &mut OutputChunk,
    data: &[u8],
    file_count: u32,
) -> Result<()> {
    for i in 0..file_count as usize {
        let header_bytes = data
            .get(i * DataChunkFileHeader::SIZE..(i + 1) * DataChunkFileHeader::SIZE)
            .ok_or_else(|| anyhow::anyhow!("corrupt chunk: file header out of range"))?;
        let file = DataChunkFileHeader::decode(header_bytes.try_into().unwrap());

        let name = data
            .get(file.name_offset as usize..(file.name_offset + file.name_length) as usize)
            .ok_or_else(|| anyhow::anyhow!("corrupt chunk: file name out of range"))?;
        let contents = data
            .get(file.data_offset as usize..(file.data_offset + file.data_size) as usize)
            .ok_or_else(|| anyhow::anyhow!("corrupt chunk: file data out of range"))?;

        scan_file(re, options, out, name, contents, file.start_line)?;
    }

    Ok(())
}

/// Run the regex over one record, reporting a match for every start
/// position. Line numbers are counted incrementally from the record start
/// on top of the record's `start_line`; columns are 1-based within the
/// enclosing line.
fn scan_file(
    re: &Regex,
    options: SearchOptions,
    out: &mut OutputChunk,
    name: &[u8],
    data: &[u8],
    start_line: u32,
) -> Result<()> {
    let mut line = start_line + 1;
    let mut cursor = 0;
    let mut search_from = 0;

    while search_from <= data.len() {
        let Some(found) = re.find(&data[search_from..]) else {
            break;
        };

        let match_start = search_from + found.start();
        let match_end = search_from + found.end();

        line += count_lines(&data[cursor..match_start]);
        cursor = match_start;

        let line_start = find_line_start(data, match_start);
        let line_end = find_line_end(data, match_end);
        let column = (match_start - line_start + 1) as u32;

        write_match(
            out.buffer_mut(),
            options,
            name,
            line,
            column,
            &data[line_start..line_end],
            match_start - line_start,
            match_end.min(line_end) - line_start,
        )?;

        search_from = match_start + 1;
    }

    Ok(())
}

fn count_lines(data: &[u8]) -> u32 {
    data.iter().filter(|&&b| b == b'\n').count() as u32
}

fn find_line_start(data: &[u8], pos: usize) -> usize {
    data[..pos]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0)
}

fn find_line_end(data: &[u8], pos: usize) -> usize {
    data[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| pos + p)
        .unwrap_or(data.len())
}
