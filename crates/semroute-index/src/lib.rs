//! Vector index adapters for semroute.
//!
//! [`TypesenseIndex`] is the persistent production backend.
//! [`MemoryIndex`] is a brute-force, in-process index used for development
//! and tests.

mod memory;
mod typesense;

pub use memory::MemoryIndex;
pub use typesense::{distance_to_similarity, TypesenseIndex};
