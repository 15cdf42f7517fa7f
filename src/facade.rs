//! External-collaborator surface: the single entry point
//! driver code should call instead of threading book/tablebase precedence
//! and search plumbing through itself. Book, then tablebase, then search —
//! in that order, and nowhere else.

use crate::board::Board;
use crate::config::EngineConfig;
use crate::moves::execute::generate_legal;
use crate::moves::magic::MagicTables;
use crate::moves::types::Move;
use crate::search::nnue::NnueWeights;
use crate::search::rollout::{average_rollout_score, should_tiebreak};
use crate::search::search::{search_reported, MATE_SCORE};
use crate::search::winprob::{win_probability, win_probability_stddev};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;

/// Result bit-flags reported alongside a [`SearchResult`].
pub mod info_flags {
    pub const BOOK: u32 = 1 << 0;
    pub const TB: u32 = 1 << 1;
    pub const CACHE: u32 = 1 << 2;
    pub const MC_TIEBREAK: u32 = 1 << 3;
    pub const RESIGN: u32 = 1 << 4;
    pub const ERROR: u32 = 1 << 5;
}

/// An opening book consulted before any search happens. Takes the full
/// board rather than a raw Zobrist key, since [`crate::book::PolyglotBook`]
/// needs board context to disambiguate the move its entries encode.
pub trait Book {
    fn lookup(&self, board: &Board) -> Option<Move>;
}

impl Book for crate::book::PolyglotBook {
    fn lookup(&self, board: &Board) -> Option<Move> {
        self.probe(board)
    }
}

/// Result of a tablebase probe: the move to play (if the tablebase can name
/// one), its score, and the distance-to-zero the tablebase reports.
#[derive(Debug, Clone, Copy)]
pub struct TbProbeResult {
    pub mv: Option<Move>,
    pub score_cp: i32,
    pub distance_to_zero: i32,
}

/// Endgame tablebase probe, consulted after the book and before search.
/// No concrete implementation ships with this engine; callers that wire one
/// up get book/tablebase/search precedence for free by going through
/// [`play`].
pub trait Tablebase {
    fn probe(&self, board: &Board) -> Option<TbProbeResult>;
}

/// Structured outcome of [`play`], ready to hand to a UCI/JSON driver.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_move_uci: String,
    pub pv: Vec<String>,
    pub score_cp: i32,
    pub win_prob: f64,
    pub win_prob_stddev: f64,
    pub depth: i32,
    pub nodes: u64,
    pub time_ms: u64,
    pub info_flags: u32,
    pub error: Option<String>,
}

impl SearchResult {
    fn book(mv: Move) -> Self {
        Self {
            best_move_uci: mv.to_uci(),
            pv: vec![mv.to_uci()],
            score_cp: 0,
            win_prob: 0.5,
            win_prob_stddev: 0.0,
            depth: 0,
            nodes: 0,
            time_ms: 0,
            info_flags: info_flags::BOOK,
            error: None,
        }
    }

    fn tablebase(mv: Move, probe: &TbProbeResult) -> Self {
        Self {
            best_move_uci: mv.to_uci(),
            pv: vec![mv.to_uci()],
            score_cp: probe.score_cp,
            win_prob: win_probability(probe.score_cp),
            win_prob_stddev: 0.0,
            depth: probe.distance_to_zero,
            nodes: 0,
            time_ms: 0,
            info_flags: info_flags::TB,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            best_move_uci: String::new(),
            pv: Vec::new(),
            score_cp: 0,
            win_prob: 0.5,
            win_prob_stddev: 0.0,
            depth: 0,
            nodes: 0,
            time_ms: 0,
            info_flags: info_flags::ERROR,
            error: Some(message.into()),
        }
    }
}

/// Depth, node, and win-probability thresholds a position must clear before
/// resignation is ever considered.
const RESIGN_MIN_DEPTH: i32 = 12;
const RESIGN_MIN_NODES: u64 = 200_000;

/// Shallow depth used to rank runner-up root moves for the Monte-Carlo
/// tie-break check. Cheap relative to the main search, just deep enough to
/// separate genuinely close alternatives from also-rans.
const TIEBREAK_PROBE_DEPTH: i32 = 6;

/// Number of rollouts averaged per side when a tie-break triggers.
const TIEBREAK_PLAYOUTS: usize = 64;

/// Book → tablebase → search, in that order, with no other code path
/// allowed to reorder or duplicate this precedence.
#[allow(clippy::too_many_arguments)]
pub fn play(
    board: &mut Board,
    tables: &MagicTables,
    config: &EngineConfig,
    book: Option<&dyn Book>,
    tb: Option<&dyn Tablebase>,
    nnue: Option<&Arc<NnueWeights>>,
    max_depth: i32,
    time_limit: Option<Duration>,
) -> SearchResult {
    // Best-effort: seeds the process-wide Zobrist table from this engine's
    // configured seed. Only takes effect the first time it runs in this
    // process — callers that need `config.seed` to govern `board`'s own key
    // must call `hash::zobrist::init_zobrist_keys` before constructing it.
    crate::hash::zobrist::init_zobrist_keys(config.seed);

    if let Some(book) = book {
        if let Some(mv) = book.lookup(board) {
            return SearchResult::book(mv);
        }
    }

    if let Some(tb) = tb {
        if let Some(probe) = tb.probe(board) {
            if let Some(mv) = probe.mv {
                return SearchResult::tablebase(mv, &probe);
            }
        }
    }

    let nnue_for_search = config.use_nnue.then(|| nnue.cloned()).flatten();
    let report = search_reported(board, tables, max_depth, time_limit, nnue_for_search.clone());

    let Some(mut best_move) = report.best_move else {
        return SearchResult::error("no legal move found");
    };

    let mut win_prob = win_probability(report.score);
    let win_prob_stddev = win_probability_stddev(&report.score_history);
    let mut info = 0u32;
    let mut score_cp = report.score;
    let mut pv: Vec<String> = report.pv.iter().map(|m| m.to_uci()).collect();

    if let Some((second_move, second_score)) =
        second_best_root_move(board, tables, best_move, max_depth, nnue_for_search.clone())
    {
        if should_tiebreak(report.score, second_score) {
            info |= info_flags::MC_TIEBREAK;
            let root_side = board.side_to_move;
            let mut rng = StdRng::seed_from_u64(config.seed);

            // Roll out from the position *after* each candidate, not from
            // the still-unmade root, so the comparison actually reflects
            // what each move leads to.
            let best_undo = crate::moves::execute::make_move_basic(board, best_move);
            let best_rollout =
                average_rollout_score(board, tables, root_side, TIEBREAK_PLAYOUTS, &mut rng);
            crate::moves::execute::undo_move_basic(board, best_undo);

            let second_undo = crate::moves::execute::make_move_basic(board, second_move);
            let second_rollout =
                average_rollout_score(board, tables, root_side, TIEBREAK_PLAYOUTS, &mut rng);
            crate::moves::execute::undo_move_basic(board, second_undo);

            if second_rollout > best_rollout {
                best_move = second_move;
                score_cp = second_score;
                pv = vec![second_move.to_uci()];
                win_prob = second_rollout;
            } else {
                win_prob = best_rollout;
            }
        }
    }

    let resign = score_cp.abs() < MATE_SCORE - 1
        && report.depth >= RESIGN_MIN_DEPTH
        && report.nodes >= RESIGN_MIN_NODES
        && win_prob <= config.resign_threshold;
    if resign {
        info |= info_flags::RESIGN;
    }

    SearchResult {
        best_move_uci: best_move.to_uci(),
        pv,
        score_cp,
        win_prob,
        win_prob_stddev,
        depth: report.depth,
        nodes: report.nodes,
        time_ms: report.elapsed.as_millis() as u64,
        info_flags: info,
        error: None,
    }
}

/// Shallow-search every legal root move other than `best_move` and return
/// the runner-up move plus its score, to compare against the main search's
/// score for the Monte-Carlo tie-break decision and to name which candidate
/// the rollout plays out against.
fn second_best_root_move(
    board: &mut Board,
    tables: &MagicTables,
    best_move: Move,
    max_depth: i32,
    nnue: Option<Arc<NnueWeights>>,
) -> Option<(Move, i32)> {
    let mut moves = Vec::with_capacity(64);
    let mut scratch = Vec::with_capacity(256);
    generate_legal(board, tables, &mut moves, &mut scratch);

    let probe_depth = TIEBREAK_PROBE_DEPTH.min(max_depth.max(1));
    let mut best_alt: Option<(Move, i32)> = None;

    for mv in moves {
        if mv == best_move {
            continue;
        }
        let undo = crate::moves::execute::make_move_basic(board, mv);
        let child_report = search_reported(board, tables, probe_depth, None, nnue.clone());
        crate::moves::execute::undo_move_basic(board, undo);

        let score = -child_report.score;
        if best_alt.map_or(true, |(_, s)| score > s) {
            best_alt = Some((mv, score));
        }
    }

    best_alt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;
    use crate::moves::execute::{make_move_basic, undo_move_basic};
    use crate::moves::magic::loader::load_magic_tables;
    use crate::moves::types::DOUBLE_PAWN_PUSH;
    use crate::square::Square;
    use rand::SeedableRng;

    fn e2e4() -> Move {
        Move {
            from: Square::from_index(12),
            to: Square::from_index(28),
            piece: Piece::Pawn,
            promotion: None,
            flags: DOUBLE_PAWN_PUSH,
        }
    }

    #[test]
    fn second_best_root_move_excludes_the_given_move() {
        let mut board = Board::new();
        let tables = load_magic_tables();
        let best = e2e4();

        let (alt, _score) = second_best_root_move(&mut board, &tables, best, 2, None)
            .expect("startpos has more than one legal move");

        assert_ne!(alt, best, "runner-up must differ from the excluded move");
        assert_eq!(board, Board::new(), "probing must leave the root position untouched");
    }

    #[test]
    fn rollouts_compare_the_positions_after_each_candidate() {
        let mut board = Board::new();
        let tables = load_magic_tables();
        let root_side = board.side_to_move;
        let best = e2e4();
        let (alt, _) = second_best_root_move(&mut board, &tables, best, 2, None).unwrap();

        let mut rng = StdRng::seed_from_u64(1);

        let undo_best = make_move_basic(&mut board, best);
        let best_rollout = average_rollout_score(&board, &tables, root_side, 4, &mut rng);
        undo_move_basic(&mut board, undo_best);

        let undo_alt = make_move_basic(&mut board, alt);
        let alt_rollout = average_rollout_score(&board, &tables, root_side, 4, &mut rng);
        undo_move_basic(&mut board, undo_alt);

        assert!((0.0..=1.0).contains(&best_rollout));
        assert!((0.0..=1.0).contains(&alt_rollout));
        assert_eq!(
            board,
            Board::new(),
            "rollouts must make/unmake the candidate move, not leak state into the root"
        );
    }
}
