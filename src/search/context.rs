use crate::board::Board;
use crate::moves::types::Move;
use crate::search::nnue::{NnueState, NnueWeights};
use std::sync::Arc;

/// Maximum search ply.
pub const MAX_PLY: usize = 128;

/// History score magnitude cap.
const HISTORY_CAP: i32 = 1 << 28;

pub struct SearchContext {
    pub killer_moves: Vec<[Option<Move>; 2]>,
    pub history: [[i32; 64]; 64],
    /// PV table: `pv_table[ply]` holds the continuation found from that ply
    /// onward, with `pv_length[ply]` moves valid.
    pub pv_table: Vec<[Option<Move>; MAX_PLY]>,
    pub pv_length: [usize; MAX_PLY],
    /// Incremental NNUE accumulator, present only when `use_nnue` is
    /// configured and a model loaded successfully; `None` falls back to the
    /// classical evaluator.
    pub nnue: Option<NnueState>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchContext {
    pub fn new() -> Self {
        Self {
            killer_moves: vec![[None; 2]; MAX_PLY],
            history: [[0; 64]; 64],
            pv_table: vec![[None; MAX_PLY]; MAX_PLY],
            pv_length: [0; MAX_PLY],
            nnue: None,
        }
    }

    /// Construct a context with the incremental evaluator active, refreshed
    /// from `board`, called once on root entry.
    pub fn with_nnue(weights: Arc<NnueWeights>, board: &Board) -> Self {
        let mut ctx = Self::new();
        let mut state = NnueState::new(weights);
        state.refresh(board);
        ctx.nnue = Some(state);
        ctx
    }

    pub fn update_killer(&mut self, ply: usize, mv: Move) {
        if self.killer_moves[ply][0] != Some(mv) {
            self.killer_moves[ply][1] = self.killer_moves[ply][0];
            self.killer_moves[ply][0] = Some(mv);
        }
    }

    pub fn update_history(&mut self, mv: Move, bonus: i32) {
        let entry = &mut self.history[mv.from.index() as usize][mv.to.index() as usize];
        *entry = (*entry + bonus).clamp(-HISTORY_CAP, HISTORY_CAP);
    }

    /// Record `mv` as the start of ply `ply`'s principal variation, appending
    /// the continuation already stored for `ply + 1`.
    pub fn update_pv(&mut self, ply: usize, mv: Move) {
        self.pv_table[ply][0] = Some(mv);
        // At the last valid ply there's no `ply + 1` slot to read a
        // continuation from — treat it as empty rather than indexing past
        // `MAX_PLY`.
        let child_len = if ply + 1 < MAX_PLY {
            self.pv_length[ply + 1]
        } else {
            0
        };
        for i in 0..child_len {
            self.pv_table[ply][i + 1] = self.pv_table[ply + 1][i];
        }
        self.pv_length[ply] = child_len + 1;
    }

    /// Reset the PV length at `ply` (called when no improvement happened).
    pub fn clear_pv(&mut self, ply: usize) {
        self.pv_length[ply] = 0;
    }

    /// Collect the root PV (ply 0) as an owned vector of moves.
    pub fn root_pv(&self) -> Vec<Move> {
        self.pv_table[0][..self.pv_length[0]]
            .iter()
            .filter_map(|m| *m)
            .collect()
    }
}
