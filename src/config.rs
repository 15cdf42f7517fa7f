//! Engine-wide configuration options.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub use_nnue: bool,
    pub nnue_path: Option<String>,
    pub use_tb: bool,
    pub tb_paths: Vec<String>,
    pub book_path: Option<String>,
    pub tt_size_mb: usize,
    pub multi_pv: usize,
    pub resign_threshold: f64,
    /// Drives both the Zobrist key table (see
    /// `hash::zobrist::init_zobrist_keys`, which must run before the first
    /// `Board` is constructed for this to take effect) and the Monte-Carlo
    /// rollout PRNG. Two processes configured with the same seed hash
    /// identical positions identically and reach identical search results.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_nnue: false,
            nnue_path: None,
            use_tb: false,
            tb_paths: Vec::new(),
            book_path: None,
            tt_size_mb: 64,
            multi_pv: 1,
            resign_threshold: 0.05,
            seed: 0x9E37_79B9_AAAC_5C87,
        }
    }
}
