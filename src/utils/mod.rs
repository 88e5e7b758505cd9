pub mod bloom;
pub mod config;
pub mod encoding;
pub mod progress;

pub use bloom::*;
pub use config::*;
pub use encoding::*;
pub use progress::*;
