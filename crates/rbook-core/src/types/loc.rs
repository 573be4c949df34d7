//! 着手位置（Loc）
//!
//! 盤上の交点またはパス。文字列表記は列を `A`〜`Z`、行を 1 始まりの数値で表す
//! （例: `C4` は x=2, y=3）。book ファイルにはこの表記で保存される。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 盤の最大辺長（列を英字1文字で表すため）
pub const MAX_BOARD_LEN: usize = 26;

/// 着手位置
///
/// 順序はパスが最小、以降は (x, y) の辞書順。book の辺は `BTreeMap<Loc, _>`
/// で保持するため、この順序がタイブレークの決定性を担う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Loc {
    Pass,
    Point { x: u8, y: u8 },
}

impl Loc {
    /// 交点を生成
    #[inline]
    pub const fn point(x: u8, y: u8) -> Loc {
        Loc::Point { x, y }
    }

    #[inline]
    pub const fn is_pass(self) -> bool {
        matches!(self, Loc::Pass)
    }

    /// 交点なら (x, y) を返す
    #[inline]
    pub const fn coords(self) -> Option<(u8, u8)> {
        match self {
            Loc::Pass => None,
            Loc::Point { x, y } => Some((x, y)),
        }
    }

    /// 盤内に収まっているか（パスは常に true）
    #[inline]
    pub fn is_on_board(self, width: usize, height: usize) -> bool {
        match self {
            Loc::Pass => true,
            Loc::Point { x, y } => (x as usize) < width && (y as usize) < height,
        }
    }
}

/// 着手文字列の解析エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid move string: {0:?}")]
pub struct ParseLocError(pub String);

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Loc::Pass => f.write_str("pass"),
            Loc::Point { x, y } => write!(f, "{}{}", (b'A' + x) as char, y as u32 + 1),
        }
    }
}

impl FromStr for Loc {
    type Err = ParseLocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseLocError(s.to_string());
        if s.eq_ignore_ascii_case("pass") {
            return Ok(Loc::Pass);
        }
        let mut chars = s.chars();
        let col = chars.next().ok_or_else(err)?.to_ascii_uppercase();
        if !col.is_ascii_uppercase() {
            return Err(err());
        }
        let row: u32 = chars.as_str().parse().map_err(|_| err())?;
        if row == 0 || row as usize > MAX_BOARD_LEN {
            return Err(err());
        }
        Ok(Loc::point(col as u8 - b'A', (row - 1) as u8))
    }
}

impl Serialize for Loc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Loc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
