//! Program execution: configuration, loaded programs and the block executor.

mod config;
mod executor;
mod program;

pub use config::{ExecutorConfig, Instantiation, ProgramVariant};
pub use executor::Executor;
pub use program::Program;
