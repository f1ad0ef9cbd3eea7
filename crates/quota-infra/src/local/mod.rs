//! Local store implementations for the client gauge.

mod file;
mod memory;

pub use file::FileLocalStore;
pub use memory::InMemoryLocalStore;
