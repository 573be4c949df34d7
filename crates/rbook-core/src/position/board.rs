//! 盤面の境界（GameBoard）と参照実装（PlacementBoard）

use super::rules::Rules;
use super::zobrist::{zobrist_size, zobrist_stone};
use crate::types::{Hash128, Loc, Player, Symmetry, MAX_BOARD_LEN};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// book が盤面に要求する操作
///
/// 着手の合法性判定・局面ハッシュ・対称変換は盤面側の責務で、book はこれらを
/// 呼び出すだけで中身には立ち入らない。パスと終局は `BoardHistory` が扱うため、
/// ここで問われるのは交点への着手だけ。
pub trait GameBoard: Clone + Debug + Serialize + DeserializeOwned {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// 石の配置（と盤サイズ）のみから決まるハッシュ
    fn position_hash(&self) -> Hash128;

    /// 交点上の石
    fn stone_at(&self, x: usize, y: usize) -> Option<Player>;

    /// `pla` が交点 `loc` に着手できるか
    fn is_legal_point(&self, loc: Loc, pla: Player, rules: &Rules) -> bool;

    /// 合法性を確認せずに交点へ着手する
    fn play_point_unchecked(&mut self, loc: Loc, pla: Player);

    /// 対称変換を適用した盤面
    fn with_symmetry(&self, symmetry: Symmetry) -> Self;

    /// 直前に `loc` へ打った結果、`rep_bound` 手より前の履歴が反復判定に
    /// 関係しなくなったか
    ///
    /// true を返すと book の手順ハッシュはそこでリセットされる。
    fn bounds_repetition(&self, loc: Loc, rep_bound: usize) -> bool;
}

/// 石を空点に置くだけの盤面
///
/// 取り・コウは無く、一度置いた石は動かない。そのため交点への着手は常に
/// 反復を不可能にし（`bounds_repetition` が true）、手順の違いはパスを
/// 挟んだときにだけ局面の同一性に影響する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlacementBoardRepr", into = "PlacementBoardRepr")]
pub struct PlacementBoard {
    width: usize,
    height: usize,
    stones: Vec<Option<Player>>,
}

impl PlacementBoard {
    /// 空の盤面を作成
    ///
    /// 辺長は 1..=26 に制限される。
    pub fn new(width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 || width > MAX_BOARD_LEN || height > MAX_BOARD_LEN {
            return None;
        }
        Some(Self {
            width,
            height,
            stones: vec![None; width * height],
        })
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// 石を置いた数
    pub fn stone_count(&self) -> usize {
        self.stones.iter().filter(|s| s.is_some()).count()
    }
}

impl GameBoard for PlacementBoard {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn position_hash(&self) -> Hash128 {
        let mut hash = zobrist_size(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(pla) = self.stones[self.index(x, y)] {
                    hash ^= zobrist_stone(pla, x, y);
                }
            }
        }
        hash
    }

    fn stone_at(&self, x: usize, y: usize) -> Option<Player> {
        if x < self.width && y < self.height {
            self.stones[self.index(x, y)]
        } else {
            None
        }
    }

    fn is_legal_point(&self, loc: Loc, _pla: Player, _rules: &Rules) -> bool {
        match loc.coords() {
            Some((x, y)) => {
                loc.is_on_board(self.width, self.height)
                    && self.stones[self.index(x as usize, y as usize)].is_none()
            }
            None => false,
        }
    }

    fn play_point_unchecked(&mut self, loc: Loc, pla: Player) {
        if let Some((x, y)) = loc.coords() {
            let idx = self.index(x as usize, y as usize);
            self.stones[idx] = Some(pla);
        }
    }

    fn with_symmetry(&self, symmetry: Symmetry) -> Self {
        let (width, height) = if symmetry.is_transpose() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        let mut stones = vec![None; width * height];
        for y in 0..self.height {
            for x in 0..self.width {
                let (sx, sy) = symmetry.apply_xy(x, y, self.width, self.height);
                stones[sy * width + sx] = self.stones[self.index(x, y)];
            }
        }
        Self {
            width,
            height,
            stones,
        }
    }

    fn bounds_repetition(&self, loc: Loc, _rep_bound: usize) -> bool {
        !loc.is_pass()
    }
}

/// 保存形式: 行ごとの文字列（'.' 空点, 'X' 黒, 'O' 白）、y=0 が先頭
#[derive(Serialize, Deserialize)]
struct PlacementBoardRepr {
    width: usize,
    height: usize,
    rows: Vec<String>,
}

impl From<PlacementBoard> for PlacementBoardRepr {
    fn from(board: PlacementBoard) -> Self {
        let rows = (0..board.height)
            .map(|y| {
                (0..board.width)
                    .map(|x| match board.stones[board.index(x, y)] {
                        None => '.',
                        Some(Player::Black) => 'X',
                        Some(Player::White) => 'O',
                    })
                    .collect()
            })
            .collect();
        Self {
            width: board.width,
            height: board.height,
            rows,
        }
    }
}

impl TryFrom<PlacementBoardRepr> for PlacementBoard {
    type Error = String;

    fn try_from(repr: PlacementBoardRepr) -> Result<Self, Self::Error> {
        let mut board = PlacementBoard::new(repr.width, repr.height)
            .ok_or_else(|| format!("invalid board size {}x{}", repr.width, repr.height))?;
        if repr.rows.len() != repr.height {
            return Err(format!("expected {} rows, got {}", repr.height, repr.rows.len()));
        }
        for (y, row) in repr.rows.iter().enumerate() {
            if row.chars().count() != repr.width {
                return Err(format!("row {y} has wrong length"));
            }
            for (x, c) in row.chars().enumerate() {
                let stone = match c {
                    '.' => None,
                    'X' => Some(Player::Black),
                    'O' => Some(Player::White),
                    _ => return Err(format!("unexpected character {c:?} in row {y}")),
                };
                let idx = board.index(x, y);
                board.stones[idx] = stone;
            }
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_sizes() {
        assert!(PlacementBoard::new(0, 5).is_none());
        assert!(PlacementBoard::new(27, 5).is_none());
        assert!(PlacementBoard::new(19, 19).is_some());
    }

    #[test]
    fn test_play_and_legality() {
        let rules = Rules::default();
        let mut board = PlacementBoard::new(3, 3).unwrap();
        let loc = Loc::point(1, 2);
        assert!(board.is_legal_point(loc, Player::Black, &rules));
        board.play_point_unchecked(loc, Player::Black);
        assert_eq!(board.stone_at(1, 2), Some(Player::Black));
        assert!(!board.is_legal_point(loc, Player::White, &rules));
        assert!(!board.is_legal_point(Loc::point(3, 0), Player::White, &rules));
        assert!(!board.is_legal_point(Loc::Pass, Player::White, &rules));
    }

    #[test]
    fn test_symmetry_moves_stones_consistently() {
        let mut board = PlacementBoard::new(4, 4).unwrap();
        board.play_point_unchecked(Loc::point(0, 1), Player::White);
        for s in Symmetry::all_for(4, 4) {
            let transformed = board.with_symmetry(s);
            let (x, y) = s.apply_xy(0, 1, 4, 4);
            assert_eq!(transformed.stone_at(x, y), Some(Player::White));
            assert_eq!(transformed.stone_count(), 1);
            assert_eq!(transformed.with_symmetry(s.invert()), board);
        }
    }

    #[test]
    fn test_position_hash_depends_on_stones_only() {
        let mut a = PlacementBoard::new(5, 5).unwrap();
        let mut b = PlacementBoard::new(5, 5).unwrap();
        a.play_point_unchecked(Loc::point(0, 0), Player::Black);
        a.play_point_unchecked(Loc::point(4, 4), Player::White);
        b.play_point_unchecked(Loc::point(4, 4), Player::White);
        b.play_point_unchecked(Loc::point(0, 0), Player::Black);
        assert_eq!(a.position_hash(), b.position_hash());
        assert_ne!(a.position_hash(), PlacementBoard::new(5, 5).unwrap().position_hash());
        assert_ne!(
            PlacementBoard::new(5, 5).unwrap().position_hash(),
            PlacementBoard::new(5, 4).unwrap().position_hash()
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut board = PlacementBoard::new(3, 2).unwrap();
        board.play_point_unchecked(Loc::point(2, 1), Player::Black);
        board.play_point_unchecked(Loc::point(0, 0), Player::White);
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"{"width":3,"height":2,"rows":["O..","..X"]}"#);
        let back: PlacementBoard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_serde_rejects_malformed_rows() {
        let bad = r#"{"width":3,"height":2,"rows":["O..","..Q"]}"#;
        assert!(serde_json::from_str::<PlacementBoard>(bad).is_err());
        let short = r#"{"width":3,"height":2,"rows":["O.."]}"#;
        assert!(serde_json::from_str::<PlacementBoard>(short).is_err());
    }
}
