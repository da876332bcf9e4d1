//! Model and parameter file formats.

pub mod loader;
pub mod tensor_archive;

pub use loader::{load, load_model, Loader, LoaderOptions};
pub use tensor_archive::{ArchiveEntry, TensorArchive, TensorArchiveReader};
