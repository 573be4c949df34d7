//! 局面の同一性ハッシュ（BookHash）
//!
//! 対称な局面を1つのノードにまとめるため、盤の全対称変換についてハッシュを
//! 計算し、最小のものを正規形として採用する。

use super::error::BookError;
use crate::position::{BoardHistory, GameBoard, zobrist_player};
use crate::types::{Hash128, Symmetry};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign};
use std::str::FromStr;

/// 局面を不変にする対称変換の集合
pub type SymmetryList = SmallVec<[Symmetry; Symmetry::NUM]>;

/// book ノードの識別子
///
/// - `history_hash`: 反復判定に関わる範囲の手順を含むハッシュ
/// - `state_hash`: 盤面と手番（v2 以降は連続パス数とルールも）のみのハッシュ
///
/// 順序は `history_hash` → `state_hash` の辞書式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BookHash {
    pub history_hash: Hash128,
    pub state_hash: Hash128,
}

/// ハッシュ計算の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashAndSymmetry {
    pub hash: BookHash,
    /// 履歴の座標系をノードの正規座標系に移す変換 (hist -> node)
    pub symmetry_to_align: Symmetry,
    /// ノードの正規形を不変にする変換の一覧（恒等変換を含む）
    pub symmetries: SymmetryList,
}

impl BookHash {
    pub const fn new(history_hash: Hash128, state_hash: Hash128) -> Self {
        Self {
            history_hash,
            state_hash,
        }
    }

    /// 履歴の現局面について、向きを変えずにハッシュを計算する
    ///
    /// 手順ハッシュに含めるのは直近 `rep_bound` 手まで。`rep_bound` が 0 なら
    /// 手順は区別しない。
    fn of_oriented_history<B: GameBoard>(hist: &BoardHistory<B>, rep_bound: usize, book_version: u32) -> BookHash {
        let mut replay = BoardHistory::new(hist.initial_board().clone(), hist.initial_pla(), *hist.rules());
        let mut accum = Hash128::ZERO;
        let first_counted = hist.moves().len().saturating_sub(rep_bound);
        for (i, m) in hist.moves().iter().enumerate() {
            if i >= first_counted {
                accum = accum.accumulate(replay.board().position_hash() ^ zobrist_player(m.pla));
            }
            replay.play_unchecked(m.loc);
            // 反復が起こり得なくなった時点より前の手順は区別しない
            if replay.board().bounds_repetition(m.loc, rep_bound) {
                accum = Hash128::ZERO;
            }
        }
        let state_hash = replay.state_hash(book_version);
        BookHash::new(accum ^ state_hash, state_hash)
    }

    /// 正規化したハッシュ・整列用の変換・不変変換の一覧を計算する
    ///
    /// 盤が正方形でなければ転置を含む変換は候補にしない。
    pub fn hash_and_symmetry<B: GameBoard>(hist: &BoardHistory<B>, rep_bound: usize, book_version: u32) -> HashAndSymmetry {
        let board = hist.initial_board();
        let mut hashes: SmallVec<[(Symmetry, BookHash); Symmetry::NUM]> = SmallVec::new();
        for symmetry in Symmetry::all_for(board.width(), board.height()) {
            let oriented = hist.with_symmetry(symmetry);
            hashes.push((symmetry, Self::of_oriented_history(&oriented, rep_bound, book_version)));
        }

        let mut best = hashes[0];
        for &entry in &hashes[1..] {
            if entry.1 < best.1 {
                best = entry;
            }
        }
        let (best_symmetry, best_hash) = best;

        let node_to_hist = best_symmetry.invert();
        let symmetries = hashes
            .iter()
            .filter(|(_, h)| *h == best_hash)
            .map(|&(s, _)| node_to_hist.then(s))
            .collect();

        HashAndSymmetry {
            hash: best_hash,
            symmetry_to_align: best_symmetry,
            symmetries,
        }
    }
}

impl fmt::Display for BookHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.history_hash, self.state_hash)
    }
}

impl FromStr for BookHash {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 || !s.is_ascii() {
            return Err(BookError::MalformedHash(s.to_string()));
        }
        let parse = |part: &str| part.parse::<Hash128>().map_err(|_| BookError::MalformedHash(s.to_string()));
        Ok(BookHash::new(parse(&s[..32])?, parse(&s[32..])?))
    }
}

impl Serialize for BookHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BookHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! impl_book_hash_bitop {
    ($tr:ident, $f:ident, $tra:ident, $fa:ident, $op:tt) => {
        impl $tr for BookHash {
            type Output = BookHash;
            #[inline]
            fn $f(self, rhs: BookHash) -> BookHash {
                BookHash::new(self.history_hash $op rhs.history_hash, self.state_hash $op rhs.state_hash)
            }
        }
        impl $tra for BookHash {
            #[inline]
            fn $fa(&mut self, rhs: BookHash) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_book_hash_bitop!(BitXor, bitxor, BitXorAssign, bitxor_assign, ^);
impl_book_hash_bitop!(BitOr, bitor, BitOrAssign, bitor_assign, |);
impl_book_hash_bitop!(BitAnd, bitand, BitAndAssign, bitand_assign, &);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{PlacementBoard, Rules};
    use crate::types::{Loc, Player};

    fn hist_with(w: usize, h: usize, moves: &[Loc]) -> BoardHistory<PlacementBoard> {
        let mut hist = BoardHistory::new(PlacementBoard::new(w, h).unwrap(), Player::Black, Rules::default());
        for &m in moves {
            assert!(hist.make_move(m));
        }
        hist
    }

    #[test]
    fn test_string_roundtrip() {
        let hash = BookHash::new(Hash128::new(1, 2), Hash128::new(u64::MAX, 0xABCD));
        let s = hash.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(s.parse::<BookHash>().unwrap(), hash);
        assert!("xyz".parse::<BookHash>().is_err());
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{s}\""));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let moves = [Loc::point(0, 0), Loc::point(2, 1), Loc::Pass];
        let a = BookHash::hash_and_symmetry(&hist_with(5, 5, &moves), 1000, 2);
        let b = BookHash::hash_and_symmetry(&hist_with(5, 5, &moves), 1000, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_square_board_is_fully_symmetric() {
        let result = BookHash::hash_and_symmetry(&hist_with(5, 5, &[]), 1000, 2);
        assert_eq!(result.symmetries.len(), Symmetry::NUM);
        assert!(result.symmetries.contains(&Symmetry::IDENTITY));
    }

    #[test]
    fn test_rectangular_board_never_transposes() {
        let result = BookHash::hash_and_symmetry(&hist_with(5, 3, &[]), 1000, 2);
        assert_eq!(result.symmetries.len(), Symmetry::NUM_WITHOUT_TRANSPOSE);
        assert!(result.symmetries.iter().all(|s| !s.is_transpose()));
        let corner = BookHash::hash_and_symmetry(&hist_with(5, 3, &[Loc::point(0, 0)]), 1000, 2);
        assert!(!corner.symmetry_to_align.is_transpose());
    }

    #[test]
    fn test_symmetric_positions_share_a_hash() {
        let base = hist_with(5, 5, &[Loc::point(0, 1)]);
        let base_result = BookHash::hash_and_symmetry(&base, 1000, 2);
        for s in Symmetry::all_for(5, 5) {
            let rotated = base.with_symmetry(s);
            let result = BookHash::hash_and_symmetry(&rotated, 1000, 2);
            assert_eq!(result.hash, base_result.hash);
            // 整列後の盤面は向きに依らず同じになる
            assert_eq!(
                rotated.board().with_symmetry(result.symmetry_to_align),
                base.board().with_symmetry(base_result.symmetry_to_align)
            );
        }
    }

    #[test]
    fn test_invariant_symmetries_fix_the_aligned_board() {
        let hist = hist_with(5, 5, &[Loc::point(1, 1)]);
        let result = BookHash::hash_and_symmetry(&hist, 1000, 2);
        // 対角線上の石なので、正規形は対角線を保つ変換2つで不変
        assert_eq!(result.symmetries.len(), 2);
        let aligned = hist.board().with_symmetry(result.symmetry_to_align);
        for &s in &result.symmetries {
            assert_eq!(aligned.with_symmetry(s), aligned);
        }
    }

    #[test]
    fn test_transposition_shares_a_hash() {
        let a = hist_with(5, 5, &[Loc::point(0, 0), Loc::point(4, 4), Loc::point(2, 2)]);
        let b = hist_with(5, 5, &[Loc::point(2, 2), Loc::point(4, 4), Loc::point(0, 0)]);
        let ha = BookHash::hash_and_symmetry(&a, 1000, 2);
        let hb = BookHash::hash_and_symmetry(&b, 1000, 2);
        assert_eq!(ha.hash, hb.hash);
        assert_eq!(ha.symmetry_to_align, hb.symmetry_to_align);
    }

    /// 反復が常に起こり得る盤（手順ハッシュがリセットされない）
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    struct RepeatingBoard(PlacementBoard);

    impl GameBoard for RepeatingBoard {
        fn width(&self) -> usize {
            self.0.width()
        }

        fn height(&self) -> usize {
            self.0.height()
        }

        fn position_hash(&self) -> Hash128 {
            self.0.position_hash()
        }

        fn stone_at(&self, x: usize, y: usize) -> Option<Player> {
            self.0.stone_at(x, y)
        }

        fn is_legal_point(&self, loc: Loc, pla: Player, rules: &Rules) -> bool {
            self.0.is_legal_point(loc, pla, rules)
        }

        fn play_point_unchecked(&mut self, loc: Loc, pla: Player) {
            self.0.play_point_unchecked(loc, pla);
        }

        fn with_symmetry(&self, symmetry: Symmetry) -> Self {
            RepeatingBoard(self.0.with_symmetry(symmetry))
        }

        fn bounds_repetition(&self, _loc: Loc, _rep_bound: usize) -> bool {
            false
        }
    }

    fn repeating_hist(moves: &[Loc]) -> BoardHistory<RepeatingBoard> {
        let board = RepeatingBoard(PlacementBoard::new(5, 5).unwrap());
        let mut hist = BoardHistory::new(board, Player::Black, Rules::default());
        for &m in moves {
            assert!(hist.make_move(m));
        }
        hist
    }

    #[test]
    fn test_history_hash_looks_back_rep_bound_moves() {
        // 同じ局面に至る2つの手順。最後の1手だけが共通。
        let a = repeating_hist(&[Loc::point(0, 0), Loc::point(4, 4), Loc::point(2, 2), Loc::point(3, 3)]);
        let b = repeating_hist(&[Loc::point(2, 2), Loc::point(4, 4), Loc::point(0, 0), Loc::point(3, 3)]);
        assert_eq!(a.board(), b.board());

        let hash = |hist: &BoardHistory<RepeatingBoard>, rep_bound: usize| {
            BookHash::hash_and_symmetry(hist, rep_bound, 2).hash
        };
        assert_eq!(hash(&a, 0), hash(&b, 0));
        assert_eq!(hash(&a, 0).history_hash, hash(&a, 0).state_hash);
        assert_eq!(hash(&a, 1), hash(&b, 1));
        assert_ne!(hash(&a, 2), hash(&b, 2));
        assert_ne!(hash(&a, 1000), hash(&b, 1000));

        // 手順の長さを超える範囲は全手順と同じ
        assert_eq!(hash(&a, 4), hash(&a, 1000));
        assert_ne!(hash(&a, 1), hash(&a, 1000));
    }

    #[test]
    fn test_pass_count_in_state_hash_depends_on_version() {
        // 石の配置と手番は同じで、直前のパス有無だけが異なる
        let passed = hist_with(5, 5, &[Loc::point(0, 0), Loc::point(1, 1), Loc::Pass]);
        let not_passed = hist_with(5, 5, &[Loc::Pass, Loc::point(1, 1), Loc::point(0, 0)]);
        assert_eq!(passed.board(), not_passed.board());
        assert_eq!(passed.next_pla(), not_passed.next_pla());

        let v2_a = BookHash::hash_and_symmetry(&passed, 1000, 2).hash;
        let v2_b = BookHash::hash_and_symmetry(&not_passed, 1000, 2).hash;
        assert_ne!(v2_a.state_hash, v2_b.state_hash);

        let v1_a = BookHash::hash_and_symmetry(&passed, 1000, 1).hash;
        let v1_b = BookHash::hash_and_symmetry(&not_passed, 1000, 1).hash;
        assert_eq!(v1_a.state_hash, v1_b.state_hash);
        // 手順ハッシュはパス以降の履歴を区別する
        assert_ne!(v1_a.history_hash, v1_b.history_hash);
    }
}
