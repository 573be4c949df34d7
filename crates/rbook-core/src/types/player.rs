//! 手番（Player）

use serde::{Deserialize, Serialize};

/// 手番（黒/白）
///
/// book 内の評価値はすべて白視点で保持する。白は値を最大化し、黒は最小化する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Player {
    #[serde(rename = "B")]
    Black = 0,
    #[serde(rename = "W")]
    White = 1,
}

impl Player {
    /// 手番の数
    pub const NUM: usize = 2;

    /// 相手番を返す
    #[inline]
    pub const fn opponent(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 白視点の値をこの手番視点に変換する係数
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Player::Black => -1.0,
            Player::White => 1.0,
        }
    }

    /// 1文字表記（"B" / "W"）
    pub const fn as_str(self) -> &'static str {
        match self {
            Player::Black => "B",
            Player::White => "W",
        }
    }
}

impl std::ops::Not for Player {
    type Output = Player;

    #[inline]
    fn not(self) -> Player {
        self.opponent()
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
