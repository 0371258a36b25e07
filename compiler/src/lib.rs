pub mod assemble;
pub mod cache;
pub mod capability;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod finalize;
pub mod link;
pub mod outline;
pub mod pipeline;
pub mod report;
pub mod serialize;
pub mod text;

pub use cache::{CacheStore, ChapterHash, ChapterState, CompileState};
pub use config::CompileOptions;
pub use error::{CacheError, CompileError, ConfigError};
pub use pipeline::{Compilation, Compiler};
pub use report::Report;
pub use serialize::serialize;
pub use ssm::SCHEMA_VERSION;

/// Version stamped on every block and into the cache.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");
