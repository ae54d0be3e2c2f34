pub mod config;
pub mod placeholder;
pub mod report;
pub mod types;

pub use config::Config;
pub use placeholder::Substitutions;
pub use report::{ResultRow, ResultsWriter};
pub use types::*;
