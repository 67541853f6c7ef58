mod buffer;
mod download;

pub use buffer::{blocks, verify_piece, PieceBuffer};
pub use download::download_piece;

/// Standard block size (16 KB)
pub const BLOCK_SIZE: u32 = 16 * 1024;
