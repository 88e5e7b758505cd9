//! Search options and match line formatting.

use std::io::{self, Write};
use termcolor::{Color, ColorSpec, WriteColor};

/// Query option flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions(pub u32);

impl SearchOptions {
    /// Case-insensitive matching (forwarded to the regex engine).
    pub const IGNORE_CASE: u32 = 1 << 0;
    /// Treat the pattern as a literal string (forwarded to the regex engine).
    pub const LITERAL: u32 = 1 << 1;
    /// Visual Studio output flavor: backslash paths, `(line):` separators.
    pub const VISUAL_STUDIO: u32 = 1 << 2;
    /// Report the 1-based column of each match.
    pub const COLUMN_NUMBER: u32 = 1 << 3;
    /// Color the matched span in each emitted line.
    pub const HIGHLIGHT: u32 = 1 << 4;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }
}

/// Write one formatted match line.
///
/// Default flavor: `path:line[:col] text`. Visual Studio flavor:
/// `path(line[,col]): text` with `/` rewritten to `\` in the path.
/// `text` is the full enclosing line; `match_start..match_end` is the
/// matched span within it, used for highlighting.
pub fn write_match<W: Write + WriteColor>(
    out: &mut W,
    options: SearchOptions,
    path: &[u8],
    line: u32,
    column: u32,
    text: &[u8],
    match_start: usize,
    match_end: usize,
) -> io::Result<()> {
    if options.has(SearchOptions::VISUAL_STUDIO) {
        let backslashed: Vec<u8> = path
            .iter()
            .map(|&b| if b == b'/' { b'\\' } else { b })
            .collect();
        out.write_all(&backslashed)?;

        write!(out, "({}", line)?;
        if options.has(SearchOptions::COLUMN_NUMBER) {
            write!(out, ",{}", column)?;
        }
        write!(out, "): ")?;
    } else {
        out.write_all(path)?;

        write!(out, ":{}", line)?;
        if options.has(SearchOptions::COLUMN_NUMBER) {
            write!(out, ":{}", column)?;
        }
        write!(out, " ")?;
    }

    if options.has(SearchOptions::HIGHLIGHT) {
        let start = match_start.min(text.len());
        let end = match_end.clamp(start, text.len());

        out.write_all(&text[..start])?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        out.write_all(&text[start..end])?;
        out.reset()?;
        out.write_all(&text[end..])?;
    } else {
        out.write_all(text)?;
    }

    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn format(options: SearchOptions, path: &str, line: u32, column: u32, text: &str) -> String {
        let mut buf = Buffer::no_color();
        write_match(
            &mut buf,
            options,
            path.as_bytes(),
            line,
            column,
            text.as_bytes(),
            0,
            0,
        )
        .unwrap();
        String::from_utf8(buf.as_slice().to_vec()).unwrap()
    }

    #[test]
    fn test_default_format() {
        let out = format(SearchOptions::new(), "a.txt", 2, 1, "line2");
        assert_eq!(out, "a.txt:2 line2\n");
    }

    #[test]
    fn test_default_format_with_column() {
        let options = SearchOptions::new().with(SearchOptions::COLUMN_NUMBER);
        let out = format(options, "a.txt", 2, 1, "line2");
        assert_eq!(out, "a.txt:2:1 line2\n");
    }

    #[test]
    fn test_visual_studio_format() {
        let options = SearchOptions::new().with(SearchOptions::VISUAL_STUDIO);
        let out = format(options, "src/a.txt", 12, 5, "body");
        assert_eq!(out, "src\\a.txt(12): body\n");
    }

    #[test]
    fn test_visual_studio_format_with_column() {
        let options = SearchOptions::new()
            .with(SearchOptions::VISUAL_STUDIO)
            .with(SearchOptions::COLUMN_NUMBER);
        let out = format(options, "src/a.txt", 12, 5, "body");
        assert_eq!(out, "src\\a.txt(12,5): body\n");
    }

    #[test]
    fn test_highlight_colors_match_span() {
        let options = SearchOptions::new().with(SearchOptions::HIGHLIGHT);
        let mut buf = Buffer::ansi();
        write_match(&mut buf, options, b"a.txt", 1, 3, b"xxmatchxx", 2, 7).unwrap();

        let out = String::from_utf8(buf.as_slice().to_vec()).unwrap();
        assert!(out.contains("\x1b["));
        assert!(out.contains("match"));
        assert!(out.starts_with("a.txt:1 xx"));
    }
}
