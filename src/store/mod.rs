//! The chunked store: building and reading.
//!
//! This module provides the core storage infrastructure:
//!
//! - [`builder`] - Chunk packing, bloom indexing, compression, stream write
//! - [`build`] - Project walking and the build driver
//! - [`reader`] - Sequential chunk iteration over a data file
//! - [`format`] - On-disk types and size constants
//! - [`stats`] - Store statistics from chunk headers
//!
//! ## Store layout
//!
//! ```text
//! <project>.qgd
//! ├── magic ("QGD" + version)              4 bytes
//! └── chunk records, until EOF:
//!     ├── DataChunkHeader                  20 bytes
//!     ├── bloom index                      index_size bytes
//!     └── LZ4 payload                      compressed_size bytes
//! ```
//!
//! The uncompressed payload of a chunk is `file headers || names || data`
//! with all offsets absolute within the buffer.

pub mod build;
pub mod builder;
pub mod format;
pub mod reader;
pub mod stats;

pub use build::build_project;
pub use builder::{BuildStats, Builder};
pub use reader::StoreReader;

use std::path::{Path, PathBuf};

/// The data file that `build` produces and `search` reads for a project:
/// the project path with `.qgd` appended.
pub fn data_file_path(project: &Path) -> PathBuf {
    // Normalize away any trailing separator so "proj/" maps to "proj.qgd".
    let clean: PathBuf = project.components().collect();
    let mut os = clean.into_os_string();
    os.push(".qgd");
    PathBuf::from(os)
}
