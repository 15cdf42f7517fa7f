//! Monte-Carlo playout tie-break.
//!
//! When the top two root moves land within [`TIEBREAK_MARGIN_CP`] centipawns
//! of each other, a handful of softmax-policy playouts are run to break the
//! tie. Determinism comes from the same `StdRng::seed_from_u64` idiom
//! `hash/zobrist.rs` uses, rather than from wall-clock entropy.

use crate::board::{Board, Color};
use crate::moves::execute::{generate_legal, make_move_basic};
use crate::moves::magic::MagicTables;
use crate::moves::square_control::in_check;
use crate::search::eval::static_eval;
use crate::status::{is_draw_by_fifty_move, is_insufficient_material};
use rand::Rng;

/// Maximum plies per playout.
pub const ROLLOUT_HORIZON: usize = 40;

/// Root moves within this many centipawns of each other are tie-broken by
/// rollout rather than trusted on raw score alone.
pub const TIEBREAK_MARGIN_CP: i32 = 20;

/// Softmax temperature, one pawn of centipawns.
const SOFTMAX_TEMPERATURE_CP: f64 = 100.0;

/// True when the top two root scores are close enough to warrant rollouts.
pub fn should_tiebreak(best_score: i32, second_best_score: i32) -> bool {
    (best_score - second_best_score).abs() <= TIEBREAK_MARGIN_CP
}

/// Play one softmax-policy game out to at most [`ROLLOUT_HORIZON`] plies and
/// score it from `root_side`'s perspective: 1.0 win, 0.5 draw, 0.0 loss.
pub fn playout_score<R: Rng>(
    board: &Board,
    tables: &MagicTables,
    root_side: Color,
    rng: &mut R,
) -> f64 {
    let mut pos = board.clone();
    let mut legal = Vec::new();
    let mut scratch = Vec::new();

    for _ in 0..ROLLOUT_HORIZON {
        if is_draw_by_fifty_move(&pos) || is_insufficient_material(&pos) || pos.is_threefold() {
            return 0.5;
        }

        generate_legal(&mut pos, tables, &mut legal, &mut scratch);
        if legal.is_empty() {
            let mover_in_check = in_check(&pos, pos.side_to_move, tables);
            return if !mover_in_check {
                0.5 // stalemate
            } else if pos.side_to_move == root_side {
                0.0 // root side is checkmated
            } else {
                1.0
            };
        }

        // Softmax over each candidate move's resulting position quality for
        // the side to move, with a max-subtraction for numerical stability.
        let mut qualities = Vec::with_capacity(legal.len());
        for &mv in legal.iter() {
            let mut child = pos.clone();
            make_move_basic(&mut child, mv);
            let child_eval = static_eval(&child, tables, -32000, 32000);
            // static_eval is from the perspective of the side to move in
            // `child`, which is the opponent of the mover in `pos`.
            qualities.push(-child_eval as f64);
        }
        let max_q = qualities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = qualities
            .iter()
            .map(|&q| ((q - max_q) / SOFTMAX_TEMPERATURE_CP).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut pick = rng.random::<f64>() * total;
        let mut chosen = legal.len() - 1;
        for (i, &w) in weights.iter().enumerate() {
            if pick < w {
                chosen = i;
                break;
            }
            pick -= w;
        }

        make_move_basic(&mut pos, legal[chosen]);
    }

    0.5 // horizon exhausted with no decisive result
}

/// Average playout score over `num_playouts` independent games from this
/// position, from `root_side`'s perspective.
pub fn average_rollout_score<R: Rng>(
    board: &Board,
    tables: &MagicTables,
    root_side: Color,
    num_playouts: usize,
    rng: &mut R,
) -> f64 {
    if num_playouts == 0 {
        return 0.5;
    }
    let sum: f64 = (0..num_playouts)
        .map(|_| playout_score(board, tables, root_side, rng))
        .sum();
    sum / num_playouts as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::magic::loader::load_magic_tables;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::str::FromStr;

    #[test]
    fn tiebreak_margin_is_symmetric() {
        assert!(should_tiebreak(105, 100));
        assert!(should_tiebreak(100, 105));
        assert!(!should_tiebreak(130, 100));
    }

    #[test]
    fn same_seed_gives_identical_playout() {
        let tables = load_magic_tables();
        let board = Board::new();
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = playout_score(&board, &tables, Color::White, &mut rng_a);
        let b = playout_score(&board, &tables, Color::White, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn checkmated_side_scores_zero() {
        let tables = load_magic_tables();
        // Fool's mate final position, Black just delivered mate; White to move.
        let board =
            Board::from_str("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
                .expect("valid FEN");
        let mut rng = StdRng::seed_from_u64(7);
        let score = playout_score(&board, &tables, Color::White, &mut rng);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn average_over_multiple_playouts_is_bounded() {
        let tables = load_magic_tables();
        let board = Board::new();
        let mut rng = StdRng::seed_from_u64(99);
        let avg = average_rollout_score(&board, &tables, Color::White, 5, &mut rng);
        assert!((0.0..=1.0).contains(&avg));
    }
}
