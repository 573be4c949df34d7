//! 対局履歴（BoardHistory）
//!
//! 初期局面・ルール・着手列・現局面をまとめて保持する。パスの連続と終局、
//! 手番の交代はここで管理し、交点への着手の合法性は盤面に委ねる。

use super::board::GameBoard;
use super::rules::Rules;
use super::zobrist::{zobrist_passes, zobrist_player};
use crate::types::{Hash128, Loc, Player, Symmetry};

/// 連続パスで終局する回数
pub const PASSES_TO_END_GAME: usize = 2;

/// 履歴上の1手
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryMove {
    pub loc: Loc,
    pub pla: Player,
}

/// 対局履歴
#[derive(Debug, Clone)]
pub struct BoardHistory<B: GameBoard> {
    initial_board: B,
    initial_pla: Player,
    rules: Rules,
    moves: Vec<HistoryMove>,
    board: B,
    next_pla: Player,
    consecutive_passes: usize,
}

impl<B: GameBoard> BoardHistory<B> {
    pub fn new(initial_board: B, initial_pla: Player, rules: Rules) -> Self {
        Self {
            board: initial_board.clone(),
            initial_board,
            initial_pla,
            rules,
            moves: Vec::new(),
            next_pla: initial_pla,
            consecutive_passes: 0,
        }
    }

    #[inline]
    pub fn initial_board(&self) -> &B {
        &self.initial_board
    }

    #[inline]
    pub fn initial_pla(&self) -> Player {
        self.initial_pla
    }

    #[inline]
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// これまでの着手列
    #[inline]
    pub fn moves(&self) -> &[HistoryMove] {
        &self.moves
    }

    /// 現局面
    #[inline]
    pub fn board(&self) -> &B {
        &self.board
    }

    /// 次の手番
    #[inline]
    pub fn next_pla(&self) -> Player {
        self.next_pla
    }

    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.consecutive_passes >= PASSES_TO_END_GAME
    }

    /// 次の手番が `loc` に着手できるか
    pub fn is_legal(&self, loc: Loc) -> bool {
        if self.is_game_over() {
            return false;
        }
        loc.is_pass() || self.board.is_legal_point(loc, self.next_pla, &self.rules)
    }

    /// 合法なら着手して true を返す
    pub fn make_move(&mut self, loc: Loc) -> bool {
        if !self.is_legal(loc) {
            return false;
        }
        self.play_unchecked(loc);
        true
    }

    /// 合法性を確認せずに着手する（既存の履歴を再生する用途）
    pub fn play_unchecked(&mut self, loc: Loc) {
        let pla = self.next_pla;
        if loc.is_pass() {
            self.consecutive_passes += 1;
        } else {
            self.board.play_point_unchecked(loc, pla);
            self.consecutive_passes = 0;
        }
        self.moves.push(HistoryMove { loc, pla });
        self.next_pla = pla.opponent();
    }

    /// 現局面の状態ハッシュ
    ///
    /// version 2 以降は盤面・手番に加えて連続パス数とルールを含める。
    /// version 1 は盤面と手番のみ。
    pub fn state_hash(&self, book_version: u32) -> Hash128 {
        let base = self.board.position_hash() ^ zobrist_player(self.next_pla);
        if book_version >= 2 {
            base ^ zobrist_passes(self.consecutive_passes) ^ self.rules.hash()
        } else {
            base
        }
    }

    /// 対称変換を適用した履歴（初期局面と全着手を変換して再生する）
    pub fn with_symmetry(&self, symmetry: Symmetry) -> Self {
        let width = self.initial_board.width();
        let height = self.initial_board.height();
        let mut hist = Self::new(self.initial_board.with_symmetry(symmetry), self.initial_pla, self.rules);
        for m in &self.moves {
            hist.play_unchecked(symmetry.apply(m.loc, width, height));
        }
        hist
    }
}
