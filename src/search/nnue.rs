//! Incremental quantized neural evaluator.
//!
//! Architecture: 768 (piece,square) one-hot features -> H hidden units (ReLU)
//! -> 1 scalar output. Weights are int16 with a single quantization divisor
//! read from the file. The accumulator holds the hidden pre-activation and
//! is updated incrementally at each make/unmake rather than recomputed from
//! scratch.

use crate::board::{Board, Color, Piece};
use crate::error::{EngineError, EngineResult};
use crate::moves::types::Move;
use arrayvec::ArrayVec;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub const NUM_FEATURES: usize = 768; // 12 piece codes * 64 squares
const MAGIC: &[u8; 8] = b"CWNNUEv1";

/// Parsed weights for one network file. Immutable after load; shared via `Arc`
/// across searches, the way attack tables are process-wide.
pub struct NnueWeights {
    pub hidden: usize,
    pub quant: i32,
    /// Row-major: feature_weights[feature * hidden + h]
    pub feature_weights: Vec<i16>,
    pub feature_bias: Vec<i16>,
    pub output_weights: Vec<i16>,
    pub output_bias: i16,
}

impl NnueWeights {
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Arc<NnueWeights>> {
        let mut f = std::fs::File::open(path.as_ref())
            .map_err(|e| EngineError::InvalidModel(format!("cannot open nnue file: {e}")))?;
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes)
            .map_err(|e| EngineError::InvalidModel(format!("cannot read nnue file: {e}")))?;
        Self::from_bytes(&bytes).map(Arc::new)
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<NnueWeights> {
        if bytes.len() < 8 + 4 * 4 {
            return Err(EngineError::InvalidModel("nnue file truncated".into()));
        }
        if &bytes[0..8] != MAGIC {
            return Err(EngineError::InvalidModel("bad nnue magic".into()));
        }

        let read_u32 = |s: &[u8]| u32::from_le_bytes(s.try_into().unwrap());
        let input = read_u32(&bytes[8..12]) as usize;
        let hidden = read_u32(&bytes[12..16]) as usize;
        let output = read_u32(&bytes[16..20]) as usize;
        let quant = read_u32(&bytes[20..24]) as i32;

        if input != NUM_FEATURES || output != 1 || hidden == 0 {
            return Err(EngineError::InvalidModel(format!(
                "unexpected nnue dimensions: input={input} hidden={hidden} output={output}"
            )));
        }

        let fw_count = input * hidden;
        let mut off = 24usize;
        let fw_bytes = fw_count * 2;
        let fb_bytes = hidden * 2;
        let ow_bytes = hidden * 2;
        let ob_bytes = 2;
        let needed = off + fw_bytes + fb_bytes + ow_bytes + ob_bytes + 4;
        if bytes.len() < needed {
            return Err(EngineError::InvalidModel(
                "nnue file shorter than declared layout".into(),
            ));
        }

        let read_i16_slice = |buf: &[u8], n: usize| -> Vec<i16> {
            buf.chunks_exact(2)
                .take(n)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect()
        };

        let feature_weights = read_i16_slice(&bytes[off..off + fw_bytes], fw_count);
        off += fw_bytes;
        let feature_bias = read_i16_slice(&bytes[off..off + fb_bytes], hidden);
        off += fb_bytes;
        let output_weights = read_i16_slice(&bytes[off..off + ow_bytes], hidden);
        off += ow_bytes;
        let output_bias = i16::from_le_bytes([bytes[off], bytes[off + 1]]);
        off += ob_bytes;

        let stored_checksum = read_u32(&bytes[off..off + 4]);
        let computed = checksum(&bytes[8..off]);
        if stored_checksum != computed {
            return Err(EngineError::InvalidModel("nnue checksum mismatch".into()));
        }

        Ok(NnueWeights {
            hidden,
            quant: quant.max(1),
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
        })
    }
}

/// Simple additive checksum over the payload bytes, matching the trailing
/// uint32 checksum field the file format carries.
fn checksum(payload: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for chunk in payload.chunks(4) {
        let mut b = [0u8; 4];
        b[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_le_bytes(b));
    }
    sum
}

#[inline(always)]
fn feature_index(color: Color, piece: Piece, square: u8) -> usize {
    let piece_code = (color as usize) * 6 + piece as usize;
    piece_code * 64 + square as usize
}

/// One entry in the toggle log: `true` if the feature was switched on.
type Toggle = (bool, usize);

/// Per-search accumulator state. Lifetime mirrors the search stack: refreshed
/// from scratch on root entry, then kept in sync across make/unmake pairs.
pub struct NnueState {
    weights: Arc<NnueWeights>,
    accumulator: Vec<i32>,
    toggle_log: Vec<Toggle>,
    group_sizes: Vec<usize>,
}

impl NnueState {
    pub fn new(weights: Arc<NnueWeights>) -> Self {
        let hidden = weights.hidden;
        Self {
            weights,
            accumulator: vec![0; hidden],
            toggle_log: Vec::new(),
            group_sizes: Vec::new(),
        }
    }

    #[inline]
    fn apply(&mut self, idx: usize, add: bool) {
        let h = self.weights.hidden;
        let row = &self.weights.feature_weights[idx * h..idx * h + h];
        if add {
            for (a, &w) in self.accumulator.iter_mut().zip(row) {
                *a += w as i32;
            }
        } else {
            for (a, &w) in self.accumulator.iter_mut().zip(row) {
                *a -= w as i32;
            }
        }
    }

    /// Refresh the accumulator from scratch for `board`.
    pub fn refresh(&mut self, board: &Board) {
        self.accumulator.clear();
        self.accumulator
            .extend(self.weights.feature_bias.iter().map(|&b| b as i32));
        self.toggle_log.clear();
        self.group_sizes.clear();

        for &color in &[Color::White, Color::Black] {
            for &piece in &[
                Piece::Pawn,
                Piece::Knight,
                Piece::Bishop,
                Piece::Rook,
                Piece::Queen,
                Piece::King,
            ] {
                let mut bb = board.pieces(piece, color);
                while bb != 0 {
                    let sq = bb.trailing_zeros() as u8;
                    bb &= bb - 1;
                    self.apply(feature_index(color, piece, sq), true);
                }
            }
        }
    }

    /// Compute and apply the toggle set for `mv` played from `board_before`.
    /// Must be called with the position exactly as it stood before `mv` is
    /// applied to the board.
    pub fn on_make(&mut self, board_before: &Board, mv: Move) {
        let color = board_before.side_to_move;
        let mut toggles: ArrayVec<(usize, bool), 4> = ArrayVec::new();

        // moving piece leaves `from`
        toggles.push((feature_index(color, mv.piece, mv.from.index()), false));

        // moving (or promoted) piece arrives at `to`
        let arriving = mv.promotion.unwrap_or(mv.piece);
        toggles.push((feature_index(color, arriving, mv.to.index()), true));

        // captured piece disappears (en passant captures on a different square)
        if mv.is_capture() {
            let capture_sq = if mv.is_en_passant() {
                if color == Color::White {
                    mv.to.index() - 8
                } else {
                    mv.to.index() + 8
                }
            } else {
                mv.to.index()
            };
            if let Some(captured) = board_before.piece_type_at(crate::square::Square::from_index(capture_sq)) {
                toggles.push((
                    feature_index(color.opposite(), captured, capture_sq),
                    false,
                ));
            }
        }

        // castling moves the rook too
        if mv.is_castling() {
            let (rook_from, rook_to): (u8, u8) = match mv.to.index() {
                6 => (7, 5),
                2 => (0, 3),
                62 => (63, 61),
                58 => (56, 59),
                _ => unreachable!("castling destination must be one of the four corners"),
            };
            toggles.push((feature_index(color, Piece::Rook, rook_from), false));
            toggles.push((feature_index(color, Piece::Rook, rook_to), true));
        }

        for &(idx, add) in &toggles {
            self.apply(idx, add);
            self.toggle_log.push((add, idx));
        }
        self.group_sizes.push(toggles.len());
    }

    /// Reverse the most recent `on_make` toggle group.
    pub fn on_unmake(&mut self) {
        let n = self
            .group_sizes
            .pop()
            .expect("on_unmake called without matching on_make");
        for _ in 0..n {
            let (was_add, idx) = self
                .toggle_log
                .pop()
                .expect("toggle log shorter than group size");
            // reverse: undo whatever was applied
            self.apply(idx, !was_add);
        }
    }

    /// Evaluate the current accumulator from `side`'s perspective.
    pub fn evaluate(&self, side: Color) -> i32 {
        let mut acc: i64 = self.weights.output_bias as i64;
        for (i, &a) in self.accumulator.iter().enumerate() {
            let relu = a.max(0) as i64;
            acc += relu * self.weights.output_weights[i] as i64;
        }
        let scaled = acc / self.weights.quant as i64;
        let signed = if side == Color::White { scaled } else { -scaled };
        signed.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::execute::{generate_legal, make_move_basic, undo_move_basic};
    use crate::moves::magic::loader::load_magic_tables;
    use std::str::FromStr;

    /// Build a small deterministic synthetic network so tests don't depend
    /// on a shipped model file.
    fn synthetic_weights(hidden: usize) -> Arc<NnueWeights> {
        let mut feature_weights = Vec::with_capacity(NUM_FEATURES * hidden);
        for f in 0..NUM_FEATURES {
            for h in 0..hidden {
                // Small deterministic pseudo-random-looking values, bounded
                // well within i16 range after summation.
                let v = ((f * 31 + h * 7) % 23) as i16 - 11;
                feature_weights.push(v);
            }
        }
        let feature_bias = (0..hidden).map(|h| (h as i16 % 5) - 2).collect();
        let output_weights = (0..hidden).map(|h| (h as i16 % 7) - 3).collect();

        Arc::new(NnueWeights {
            hidden,
            quant: 64,
            feature_weights,
            feature_bias,
            output_weights,
            output_bias: 10,
        })
    }

    #[test]
    fn refresh_then_evaluate_is_deterministic() {
        let weights = synthetic_weights(8);
        let board = Board::new();
        let mut state = NnueState::new(weights);
        state.refresh(&board);
        let a = state.evaluate(Color::White);
        state.refresh(&board);
        let b = state.evaluate(Color::White);
        assert_eq!(a, b);
    }

    #[test]
    fn make_unmake_parity_matches_full_refresh() {
        let weights = synthetic_weights(8);
        let tables = load_magic_tables();
        let mut board = Board::new();
        let mut state = NnueState::new(weights);
        state.refresh(&board);

        let mut legal = Vec::new();
        let mut scratch = Vec::new();
        generate_legal(&mut board, &tables, &mut legal, &mut scratch);
        let mv = legal[0];

        state.on_make(&board, mv);
        let undo = make_move_basic(&mut board, mv);

        let mut refreshed = NnueState::new(state_weights(&state));
        refreshed.refresh(&board);
        assert_eq!(state.accumulator, refreshed.accumulator);

        undo_move_basic(&mut board, undo);
        state.on_unmake();

        let mut refreshed_back = NnueState::new(state_weights(&state));
        refreshed_back.refresh(&board);
        assert_eq!(state.accumulator, refreshed_back.accumulator);
    }

    #[test]
    fn capture_and_promotion_parity() {
        let weights = synthetic_weights(6);
        let tables = load_magic_tables();
        let mut board =
            Board::from_str("4k3/P7/8/8/8/8/8/4K2R w K - 0 1").expect("valid FEN");
        let mut state = NnueState::new(weights);
        state.refresh(&board);

        let mut legal = Vec::new();
        let mut scratch = Vec::new();
        generate_legal(&mut board, &tables, &mut legal, &mut scratch);
        let promo = legal
            .iter()
            .find(|m| m.is_promotion())
            .copied()
            .expect("a7 pawn must have a promotion move");

        state.on_make(&board, promo);
        let undo = make_move_basic(&mut board, promo);
        let mut refreshed = NnueState::new(state_weights(&state));
        refreshed.refresh(&board);
        assert_eq!(state.accumulator, refreshed.accumulator);

        undo_move_basic(&mut board, undo);
        state.on_unmake();
        let mut back = NnueState::new(state_weights(&state));
        back.refresh(&board);
        assert_eq!(state.accumulator, back.accumulator);
    }

    #[test]
    fn castling_parity() {
        let weights = synthetic_weights(6);
        let tables = load_magic_tables();
        let mut board =
            Board::from_str("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").expect("valid FEN");
        let mut state = NnueState::new(weights);
        state.refresh(&board);

        let mut legal = Vec::new();
        let mut scratch = Vec::new();
        generate_legal(&mut board, &tables, &mut legal, &mut scratch);
        let castle = legal
            .iter()
            .find(|m| m.is_castling())
            .copied()
            .expect("position must have a legal castle");

        state.on_make(&board, castle);
        let undo = make_move_basic(&mut board, castle);
        let mut refreshed = NnueState::new(state_weights(&state));
        refreshed.refresh(&board);
        assert_eq!(state.accumulator, refreshed.accumulator);

        undo_move_basic(&mut board, undo);
        state.on_unmake();
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = vec![0u8; 64];
        bytes[..8].copy_from_slice(b"NOTNNUE!");
        assert!(NnueWeights::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&768u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&64u32.to_le_bytes());
        // Declares a full layout but the buffer stops here.
        assert!(NnueWeights::from_bytes(&bytes).is_err());
    }

    // Cloning the Arc lets a freshly-built state share the synthetic weights
    // used by an existing one, without re-deriving them in every test.
    fn state_weights(state: &NnueState) -> Arc<NnueWeights> {
        state.weights.clone()
    }
}
