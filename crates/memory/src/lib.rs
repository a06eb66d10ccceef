//! Memory for codeloop: the long-term similarity store over executed code
//! and the short-term window of recent queries.

pub mod hashing;
pub mod index;
pub mod store;
pub mod vector;
pub mod window;

pub use hashing::HashEmbedder;
pub use index::FlatIndex;
pub use store::SimilarityStore;
pub use vector::{nearest_neighbours, squared_l2_distance};
pub use window::MemoryWindow;
