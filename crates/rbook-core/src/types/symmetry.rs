//! 盤の対称変換（Symmetry）
//!
//! 正方形盤の二面体群（8要素）を 3bit で表す。
//!
//! - bit0: 上下反転（flip y）
//! - bit1: 左右反転（flip x）
//! - bit2: 転置（transpose）
//!
//! 変換は「flip x → flip y → transpose」の順で適用する。
//! 非正方形盤では転置を含む 4 要素を使わない（盤の縦横が入れ替わるため）。

use super::Loc;
use serde::{Deserialize, Serialize};

/// 対称変換
///
/// 保存形式は 0..8 の整数。範囲外の値は読み込み時に拒否する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Symmetry(u8);

impl Symmetry {
    /// 恒等変換
    pub const IDENTITY: Symmetry = Symmetry(0);
    /// 対称変換の総数
    pub const NUM: usize = 8;
    /// 転置を含まない対称変換の数
    pub const NUM_WITHOUT_TRANSPOSE: usize = 4;

    const FLIP_Y: u8 = 0x1;
    const FLIP_X: u8 = 0x2;
    const TRANSPOSE: u8 = 0x4;

    /// 0..8 の値から生成
    #[inline]
    pub const fn new(raw: u8) -> Option<Symmetry> {
        if (raw as usize) < Self::NUM {
            Some(Symmetry(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_transpose(self) -> bool {
        self.0 & Self::TRANSPOSE != 0
    }

    /// 盤サイズに対して有効な対称変換の数
    #[inline]
    pub const fn count_for(width: usize, height: usize) -> usize {
        if width == height {
            Self::NUM
        } else {
            Self::NUM_WITHOUT_TRANSPOSE
        }
    }

    /// 盤サイズに対して有効な対称変換を列挙
    pub fn all_for(width: usize, height: usize) -> impl Iterator<Item = Symmetry> {
        (0..Self::count_for(width, height) as u8).map(Symmetry)
    }

    /// 盤サイズに対して有効な対称変換か
    #[inline]
    pub const fn is_valid_for(self, width: usize, height: usize) -> bool {
        (self.0 as usize) < Self::count_for(width, height)
    }

    /// 逆変換
    #[inline]
    pub const fn invert(self) -> Symmetry {
        // 転置と片側反転の組み合わせだけが自己逆元でない（5 <-> 6）
        match self.0 {
            5 => Symmetry(6),
            6 => Symmetry(5),
            s => Symmetry(s),
        }
    }

    /// `self` を適用した後に `next` を適用する変換
    #[inline]
    pub const fn then(self, next: Symmetry) -> Symmetry {
        let mut next = next.0;
        if self.is_transpose() {
            // 転置の後では x と y の反転が入れ替わる
            next = (next & Self::TRANSPOSE)
                | ((next & Self::FLIP_X) >> 1)
                | ((next & Self::FLIP_Y) << 1);
        }
        Symmetry(self.0 ^ next)
    }

    /// 着手位置に変換を適用
    ///
    /// `width` / `height` は変換前の盤サイズ。
    #[inline]
    pub fn apply(self, loc: Loc, width: usize, height: usize) -> Loc {
        match loc {
            Loc::Pass => Loc::Pass,
            Loc::Point { x, y } => {
                let (x, y) = self.apply_xy(x as usize, y as usize, width, height);
                Loc::point(x as u8, y as u8)
            }
        }
    }

    /// 座標に変換を適用
    #[inline]
    pub fn apply_xy(self, x: usize, y: usize, width: usize, height: usize) -> (usize, usize) {
        let mut x = x;
        let mut y = y;
        if self.0 & Self::FLIP_X != 0 {
            x = width - x - 1;
        }
        if self.0 & Self::FLIP_Y != 0 {
            y = height - y - 1;
        }
        if self.is_transpose() {
            std::mem::swap(&mut x, &mut y);
        }
        (x, y)
    }
}

/// 範囲外の対称変換番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid symmetry {0}")]
pub struct InvalidSymmetry(pub u8);

impl TryFrom<u8> for Symmetry {
    type Error = InvalidSymmetry;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Symmetry::new(raw).ok_or(InvalidSymmetry(raw))
    }
}

impl From<Symmetry> for u8 {
    fn from(symmetry: Symmetry) -> u8 {
        symmetry.0
    }
}

impl std::fmt::Display for Symmetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
