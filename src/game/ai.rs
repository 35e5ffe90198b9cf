//! Bot opponent
//!
//! Full-depth minimax over the remaining empty cells. The tree has at most
//! nine plies, so no pruning or depth limit is needed.

use rand::Rng;
use rand::seq::IndexedRandom;

use super::board::{Board, CORNERS, Outcome, Symbol};

const WIN_SCORE: i32 = 10;
const LOSS_SCORE: i32 = -10;
const DRAW_SCORE: i32 = 0;

/// Pick the optimal move for `ai` on `board`.
///
/// Equal-scoring moves resolve to the lowest index. Returns `None` when the
/// board has no empty cell or is already decided.
pub fn best_move(board: &Board, ai: Symbol) -> Option<usize> {
    if board.evaluate().is_some() {
        return None;
    }

    let mut best: Option<(usize, i32)> = None;
    for index in board.empty_cells() {
        let Ok(next) = board.apply_move(index, ai) else {
            continue;
        };
        let score = minimax(&next, ai, ai.other());
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
}

/// Score `board` from `ai`'s point of view with `to_move` on turn
fn minimax(board: &Board, ai: Symbol, to_move: Symbol) -> i32 {
    match board.evaluate() {
        Some(Outcome::Win(s)) if s == ai => return WIN_SCORE,
        Some(Outcome::Win(_)) => return LOSS_SCORE,
        Some(Outcome::Draw) => return DRAW_SCORE,
        None => {}
    }

    let maximizing = to_move == ai;
    let scores = board.empty_cells().filter_map(|index| {
        board
            .apply_move(index, to_move)
            .ok()
            .map(|next| minimax(&next, ai, to_move.other()))
    });

    if maximizing {
        scores.max().unwrap_or(DRAW_SCORE)
    } else {
        scores.min().unwrap_or(DRAW_SCORE)
    }
}

/// Opening cell when the bot moves first on an empty board.
///
/// A normal game opens anywhere; a rematch opens on a corner.
pub fn opening_move<R: Rng + ?Sized>(rng: &mut R, rematch: bool) -> usize {
    if rematch {
        CORNERS.choose(rng).copied().unwrap_or(CORNERS[0])
    } else {
        rng.random_range(0..9)
    }
}
