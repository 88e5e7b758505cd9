pub mod engine;
pub mod ordered;
pub mod pool;
pub mod scanner;

pub use engine::{search_project, search_store};
