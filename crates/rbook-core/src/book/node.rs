//! book のノード（BookNode）と辺（BookMove）

use super::hash::{BookHash, SymmetryList};
use super::values::{BookValues, RecursiveBookValues};
use crate::types::{Loc, Player, Symmetry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ノード配列の添字
pub type NodeIdx = usize;

/// 辺: このノードで `mv` を打つと `hash` の子ノードに移る
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMove {
    #[serde(rename = "move")]
    pub mv: Loc,
    /// このノードに揃えた盤を子ノードに揃えるための変換 (node -> child)
    pub symmetry_to_align: Symmetry,
    pub hash: BookHash,
    /// ニューラルネットの方策確率
    pub raw_policy: f64,

    // 以下はコスト再計算で埋める
    #[serde(skip)]
    pub cost_from_root: f64,
    /// 親から見た勝敗の最善手か
    #[serde(skip)]
    pub is_wlpv: bool,
    /// 根からの経路上で最大の勝敗コスト
    #[serde(skip)]
    pub biggest_wl_cost_from_root: f64,
}

impl BookMove {
    pub fn new(mv: Loc, symmetry_to_align: Symmetry, hash: BookHash, raw_policy: f64) -> Self {
        Self {
            mv,
            symmetry_to_align,
            hash,
            raw_policy,
            cost_from_root: 0.0,
            is_wlpv: false,
            biggest_wl_cost_from_root: 0.0,
        }
    }

    /// 盤に `symmetry` を適用した座標系での辺
    pub fn with_symmetry(&self, symmetry: Symmetry, width: usize, height: usize) -> Self {
        Self {
            mv: symmetry.apply(self.mv, width, height),
            symmetry_to_align: symmetry.invert().then(self.symmetry_to_align),
            ..*self
        }
    }
}

/// book の1局面
///
/// 識別情報（hash / pla / symmetries）は作成後に変わらない。
/// 探索側が設定する値と、book が再計算で維持する値に分かれる。
#[derive(Debug, Clone)]
pub struct BookNode {
    pub(crate) hash: BookHash,
    pub(crate) pla: Player,
    /// この局面を不変にする変換（ノードの正規座標系）
    pub(crate) symmetries: SymmetryList,

    // 探索側が設定する値
    pub(crate) this_values_not_in_book: BookValues,
    /// false なら以後このノードに手を追加しない（保存される）
    pub(crate) can_expand: bool,
    /// false なら今回の実行中は再展開しない（保存されない）
    pub(crate) can_re_expand: bool,

    // book が維持する値
    pub(crate) moves: BTreeMap<Loc, BookMove>,
    /// (親のハッシュ, 親の座標系での着手)
    pub(crate) parents: Vec<(BookHash, Loc)>,
    /// コスト最小の親（`parents` の添字）
    pub(crate) best_parent_idx: Option<usize>,

    pub(crate) recursive_values: RecursiveBookValues,
    pub(crate) min_depth_from_root: u32,
    pub(crate) min_cost_from_root: f64,
    pub(crate) this_node_expansion_cost: f64,
    /// このノードを勝敗の最善応手順に含む最も安いノードの minCostFromRoot
    pub(crate) min_cost_from_root_wlpv: f64,
    /// 勝敗の最善が既存の子ではなくこのノードの展開であるか
    pub(crate) expansion_is_wlpv: bool,
    pub(crate) biggest_wl_cost_from_root: f64,
}

impl BookNode {
    pub(crate) fn new(hash: BookHash, pla: Player, symmetries: SymmetryList) -> Self {
        Self {
            hash,
            pla,
            symmetries,
            this_values_not_in_book: BookValues::default(),
            can_expand: true,
            can_re_expand: true,
            moves: BTreeMap::new(),
            parents: Vec::new(),
            best_parent_idx: None,
            recursive_values: RecursiveBookValues::default(),
            min_depth_from_root: 0,
            min_cost_from_root: 0.0,
            this_node_expansion_cost: 0.0,
            min_cost_from_root_wlpv: 0.0,
            expansion_is_wlpv: false,
            biggest_wl_cost_from_root: 0.0,
        }
    }

    #[inline]
    pub fn hash(&self) -> BookHash {
        self.hash
    }

    #[inline]
    pub fn pla(&self) -> Player {
        self.pla
    }

    /// ノードの座標系での着手 `mv` に対応する既存の辺と、
    /// `mv` をその辺の着手に移す不変変換（`mv` 自体が辺なら恒等変換）
    pub(crate) fn find_symmetric_move(&self, mv: Loc, width: usize, height: usize) -> Option<(Symmetry, &BookMove)> {
        if let Some(edge) = self.moves.get(&mv) {
            return Some((Symmetry::IDENTITY, edge));
        }
        self.symmetries.iter().find_map(|&s| {
            self.moves
                .get(&s.apply(mv, width, height))
                .map(|edge| (s, edge))
        })
    }

    /// 展開済みの手の方策確率の和
    pub(crate) fn expanded_policy_sum(&self) -> f64 {
        self.moves.values().map(|m| m.raw_policy).sum()
    }

    #[inline]
    pub(crate) fn total_expansion_cost(&self) -> f64 {
        self.min_cost_from_root + self.this_node_expansion_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash128;

    #[test]
    fn test_book_move_symmetry_roundtrip() {
        let hash = BookHash::new(Hash128::new(1, 1), Hash128::new(2, 2));
        let align = Symmetry::new(3).unwrap();
        let edge = BookMove::new(Loc::point(1, 0), align, hash, 0.25);
        let s = Symmetry::new(6).unwrap();
        let moved = edge.with_symmetry(s, 5, 5);
        assert_eq!(moved.mv, s.apply(Loc::point(1, 0), 5, 5));
        // view -> node -> child の変換になる
        assert_eq!(s.then(moved.symmetry_to_align), align);
        let back = moved.with_symmetry(s.invert(), 5, 5);
        assert_eq!(back.mv, edge.mv);
        assert_eq!(back.symmetry_to_align, edge.symmetry_to_align);
    }

    #[test]
    fn test_find_symmetric_move() {
        let hash = BookHash::default();
        let flip_x = Symmetry::new(2).unwrap();
        let mut node = BookNode::new(hash, Player::Black, [Symmetry::IDENTITY, flip_x].into_iter().collect());
        node.moves
            .insert(Loc::point(0, 2), BookMove::new(Loc::point(0, 2), Symmetry::IDENTITY, hash, 0.5));
        let (s, edge) = node.find_symmetric_move(Loc::point(4, 2), 5, 5).unwrap();
        assert_eq!(s, flip_x);
        assert_eq!(edge.mv, Loc::point(0, 2));
        assert!(node.find_symmetric_move(Loc::point(1, 2), 5, 5).is_none());
        assert_eq!(node.expanded_policy_sum(), 0.5);
    }
}
