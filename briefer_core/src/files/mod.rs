pub mod bridge;
pub mod models;

pub use bridge::{CHUNK_SIZE, FLUSH_THRESHOLD};
pub use models::{FileBridgeError, FileInfo};
