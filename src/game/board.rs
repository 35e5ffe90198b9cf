//! Tic-Tac-Toe board engine
//!
//! A fixed 3x3 grid stored row-major (index 0-8). Moves produce a new
//! board; the engine never mutates a board it does not own.

use serde::{Deserialize, Serialize};

use crate::error::MoveError;

/// All eight winning lines: rows, columns, diagonals
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2], [3, 4, 5], [6, 7, 8], // rows
    [0, 3, 6], [1, 4, 7], [2, 5, 8], // cols
    [0, 4, 8], [2, 4, 6],             // diagonals
];

/// Corner cells, used for the bot's rematch opening
pub const CORNERS: [usize; 4] = [0, 2, 6, 8];

/// Marker a participant plays under for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    /// The opposing symbol
    pub fn other(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::X => "X",
            Symbol::O => "O",
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a finished board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win(Symbol),
    Draw,
}

/// The 3x3 grid. `None` is an empty cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Symbol>; 9],
}

impl Board {
    /// An empty board
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Symbol>; 9]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<Symbol>; 9] {
        &self.cells
    }

    /// Contents of a cell, `None` for empty or out-of-range
    pub fn get(&self, index: usize) -> Option<Symbol> {
        self.cells.get(index).copied().flatten()
    }

    /// Place `symbol` at `index`, returning the resulting board.
    ///
    /// Fails when the index is outside 0-8 or the cell is taken; `self`
    /// is left untouched either way.
    pub fn apply_move(&self, index: usize, symbol: Symbol) -> Result<Board, MoveError> {
        match self.cells.get(index) {
            None => Err(MoveError::OutOfRange { index }),
            Some(Some(_)) => Err(MoveError::Occupied { index }),
            Some(None) => {
                let mut next = *self;
                next.cells[index] = Some(symbol);
                Ok(next)
            }
        }
    }

    /// Check the board for a winner or draw.
    ///
    /// Returns `None` while the game can continue.
    pub fn evaluate(&self) -> Option<Outcome> {
        for line in &WIN_LINES {
            let a = self.cells[line[0]];
            if a.is_some() && a == self.cells[line[1]] && a == self.cells[line[2]] {
                return a.map(Outcome::Win);
            }
        }

        if self.is_full() {
            return Some(Outcome::Draw);
        }

        None
    }

    /// Indices of empty cells in ascending order
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_none())
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| c.is_some())
    }

    pub fn count(&self, symbol: Symbol) -> usize {
        self.cells.iter().filter(|c| **c == Some(symbol)).count()
    }

    /// Whether this board can arise from alternating play.
    ///
    /// Either symbol may have opened, so piece counts may differ by one in
    /// either direction, and at most one symbol may own a winning line.
    pub fn is_valid(&self) -> bool {
        let x = self.count(Symbol::X);
        let o = self.count(Symbol::O);
        if x.abs_diff(o) > 1 {
            return false;
        }

        let winners = |s: Symbol| {
            WIN_LINES
                .iter()
                .any(|line| line.iter().all(|&i| self.cells[i] == Some(s)))
        };
        !(winners(Symbol::X) && winners(Symbol::O))
    }

    /// Render the board as ASCII art lines, showing the 1-9 position on
    /// empty cells
    pub fn render(&self) -> Vec<String> {
        let cell = |i: usize| -> String {
            match self.cells[i] {
                None => format!("{}", i + 1),
                Some(s) => s.as_str().to_string(),
            }
        };

        vec![
            "┌───┬───┬───┐".to_string(),
            format!("│ {} │ {} │ {} │", cell(0), cell(1), cell(2)),
            "├───┼───┼───┤".to_string(),
            format!("│ {} │ {} │ {} │", cell(3), cell(4), cell(5)),
            "├───┼───┼───┤".to_string(),
            format!("│ {} │ {} │ {} │", cell(6), cell(7), cell(8)),
            "└───┴───┴───┘".to_string(),
        ]
    }
}
