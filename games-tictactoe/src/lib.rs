//! Tic-tac-toe adapter, used as the reference game in engine tests
//! and benchmarks.
//!
//! Small enough that both engines can solve it outright, which makes
//! expected results easy to state: perfect play draws, a missed fork
//! loses, and every line through the 3x3 grid is enumerable by hand.

use std::fmt;

use engine_core::GameAdapter;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Score for a completed line; dominates every quiet evaluation.
const WIN_SCORE: f64 = 1000.0;

pub const CROSS: u8 = 1;
pub const NOUGHT: u8 = 2;

/// A 3x3 board. Moves are square indices, row-major from the top
/// left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToe {
    board: [u8; 9],
    to_move: u8,
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl TicTacToe {
    pub fn new() -> Self {
        TicTacToe {
            board: [0; 9],
            to_move: CROSS,
        }
    }

    /// Build a position from nine characters, `X`/`O`/`.` row-major.
    /// The player with fewer marks is to move, crosses first.
    pub fn from_marks(marks: &str) -> Option<Self> {
        let mut board = [0u8; 9];
        let mut count = 0usize;
        let mut crosses = 0usize;
        let mut noughts = 0usize;
        for c in marks.chars().filter(|c| !c.is_whitespace()) {
            if count >= 9 {
                return None;
            }
            board[count] = match c {
                'X' | 'x' => {
                    crosses += 1;
                    CROSS
                }
                'O' | 'o' => {
                    noughts += 1;
                    NOUGHT
                }
                '.' => 0,
                _ => return None,
            };
            count += 1;
        }
        if count != 9 || crosses < noughts || crosses > noughts + 1 {
            return None;
        }
        let to_move = if crosses > noughts { NOUGHT } else { CROSS };
        Some(TicTacToe { board, to_move })
    }

    fn winner(&self) -> Option<u8> {
        for line in &LINES {
            let mark = self.board[line[0]];
            if mark != 0 && self.board[line[1]] == mark && self.board[line[2]] == mark {
                return Some(mark);
            }
        }
        None
    }

    fn full(&self) -> bool {
        self.board.iter().all(|&c| c != 0)
    }

    /// Line-counting heuristic for `player`: a line still open for one
    /// side scores by how many marks that side already has on it.
    fn line_score(&self, player: u8) -> f64 {
        let mut score = 0.0;
        for line in &LINES {
            let mut mine = 0;
            let mut theirs = 0;
            for &sq in line {
                match self.board[sq] {
                    0 => {}
                    m if m == player => mine += 1,
                    _ => theirs += 1,
                }
            }
            match (mine, theirs) {
                (_, 0) if mine > 0 => score += if mine >= 2 { 10.0 } else { 1.0 },
                (0, _) if theirs > 0 => score -= if theirs >= 2 { 10.0 } else { 1.0 },
                _ => {}
            }
        }
        score
    }
}

impl fmt::Display for TicTacToe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let c = match self.board[row * 3 + col] {
                    CROSS => 'X',
                    NOUGHT => 'O',
                    _ => '.',
                };
                write!(f, "{c}")?;
            }
            if row < 2 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl GameAdapter for TicTacToe {
    type Move = u8;

    fn current_player(&self) -> u8 {
        self.to_move
    }

    fn list_legal_moves(&mut self) -> Vec<u8> {
        if self.winner().is_some() {
            return Vec::new();
        }
        (0..9u8).filter(|&sq| self.board[sq as usize] == 0).collect()
    }

    fn apply_move(&mut self, mv: &u8) {
        self.board[*mv as usize] = self.to_move;
        self.to_move = CROSS + NOUGHT - self.to_move;
    }

    fn revert_move(&mut self, mv: &u8) {
        self.to_move = CROSS + NOUGHT - self.to_move;
        self.board[*mv as usize] = 0;
    }

    fn is_game_over(&mut self) -> bool {
        self.winner().is_some() || self.full()
    }

    fn is_draw(&mut self) -> bool {
        self.winner().is_none() && self.full()
    }

    fn normalized_score(&mut self, player: u8) -> f64 {
        match self.winner() {
            Some(w) if w == player => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        }
    }

    fn static_evaluate(&mut self, player: u8) -> f64 {
        match self.winner() {
            Some(w) if w == player => WIN_SCORE,
            Some(_) => -WIN_SCORE,
            None => self.line_score(player),
        }
    }

    fn content_hash(&mut self) -> u64 {
        // FNV-1a over the squares and the side to move
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &cell in self.board.iter().chain(std::iter::once(&self.to_move)) {
            hash ^= cell as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn playout_depth_limit(&self) -> usize {
        9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn fresh_board_has_nine_moves_for_crosses() {
        let mut game = TicTacToe::new();
        assert_eq!(game.current_player(), CROSS);
        assert_eq!(game.list_legal_moves().len(), 9);
        assert!(!game.is_game_over());
    }

    #[test]
    fn rows_columns_and_diagonals_win() {
        for line in &LINES {
            let mut game = TicTacToe::new();
            for &sq in line {
                game.board[sq] = NOUGHT;
            }
            assert_eq!(game.winner(), Some(NOUGHT), "line {line:?}");
            assert!(game.is_game_over());
            assert_eq!(game.normalized_score(NOUGHT), 1.0);
            assert_eq!(game.normalized_score(CROSS), -1.0);
            assert!(!game.is_draw());
        }
    }

    #[test]
    fn full_board_without_a_line_is_a_draw() {
        let mut game = TicTacToe::from_marks("XOX XXO OXO").unwrap();
        assert!(game.is_game_over());
        assert!(game.is_draw());
        assert_eq!(game.normalized_score(CROSS), 0.0);
        assert_eq!(game.normalized_score(NOUGHT), 0.0);
    }

    #[test]
    fn won_position_lists_no_moves() {
        let mut game = TicTacToe::from_marks("XXX OO. ...").unwrap();
        assert!(game.is_game_over());
        assert!(game.list_legal_moves().is_empty());
    }

    #[test]
    fn from_marks_rejects_impossible_positions() {
        assert!(TicTacToe::from_marks("OOO ... ...").is_none());
        assert!(TicTacToe::from_marks("XX. ... ...").is_none());
        assert!(TicTacToe::from_marks("XO").is_none());
        assert!(TicTacToe::from_marks("XO? ... ...").is_none());
    }

    #[test]
    fn from_marks_infers_side_to_move() {
        let game = TicTacToe::from_marks("X.. ... ...").unwrap();
        assert_eq!(game.current_player(), NOUGHT);
        let game = TicTacToe::from_marks("XO. ... ...").unwrap();
        assert_eq!(game.current_player(), CROSS);
    }

    #[test]
    fn apply_then_revert_restores_position_and_hash() {
        let mut game = TicTacToe::new();
        let before = game.clone();
        let hash = game.content_hash();
        game.apply_move(&4);
        assert_ne!(game.content_hash(), hash);
        game.revert_move(&4);
        assert_eq!(game, before);
        assert_eq!(game.content_hash(), hash);
    }

    #[test]
    fn random_games_unwind_exactly() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..200 {
            let mut game = TicTacToe::new();
            let initial = game.clone();
            let initial_hash = game.content_hash();
            let mut played = Vec::new();
            while !game.is_game_over() {
                let moves = game.list_legal_moves();
                let mv = moves[rng.gen_range(0..moves.len())];
                game.apply_move(&mv);
                played.push(mv);
            }
            for mv in played.iter().rev() {
                game.revert_move(mv);
            }
            assert_eq!(game, initial);
            assert_eq!(game.content_hash(), initial_hash);
        }
    }

    #[test]
    fn winning_evaluation_dominates_heuristics() {
        let mut won = TicTacToe::from_marks("XXX OO. ...").unwrap();
        let mut strong = TicTacToe::from_marks("XX. .O. ..O").unwrap();
        assert!(won.static_evaluate(CROSS) > strong.static_evaluate(CROSS).abs() * 10.0);
        assert_eq!(won.static_evaluate(NOUGHT), -WIN_SCORE);
    }

    #[test]
    fn two_in_a_row_outscores_one() {
        let mut two = TicTacToe::from_marks("XX. .O. ..O").unwrap();
        let mut one = TicTacToe::from_marks("X.. .O. ...").unwrap();
        assert!(two.static_evaluate(CROSS) > one.static_evaluate(CROSS));
    }

    #[test]
    fn display_round_trips_through_from_marks() {
        let game = TicTacToe::from_marks("XO. .X. ..O").unwrap();
        let text = game.to_string().replace('\n', "");
        assert_eq!(TicTacToe::from_marks(&text).unwrap(), game);
    }
}
