pub mod zobrist;

pub use zobrist::ZobristKeys;
