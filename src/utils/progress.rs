//! Build progress line.
//!
//! The printer is a value threaded through the build driver, not global
//! state; it rewrites a single line with `\r` and only repaints when the
//! output size actually changed.

use std::io::Write;

/// Tracks and prints build progress: percent complete, file count and
/// byte totals.
pub struct BuildProgress {
    total_files: usize,
    last_bytes_out: u64,
}

impl BuildProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            last_bytes_out: u64::MAX,
        }
    }

    /// Repaint the progress line if the output size changed.
    pub fn update(&mut self, files: usize, bytes_in: u64, bytes_out: u64) {
        if bytes_out == self.last_bytes_out {
            return;
        }
        self.last_bytes_out = bytes_out;

        let percent = if self.total_files == 0 {
            100
        } else {
            files * 100 / self.total_files
        };

        print!(
            "\r[{:3}%] {} files, {} Mb in, {} Mb out",
            percent,
            files,
            bytes_in / 1024 / 1024,
            bytes_out / 1024 / 1024
        );
        let _ = std::io::stdout().flush();
    }

    /// Finish the line.
    pub fn finish(self) {
        println!();
    }
}
