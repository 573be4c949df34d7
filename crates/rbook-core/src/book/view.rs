//! ノードの向き付きビュー（SymBookNode / NodeView）
//!
//! ノードは正規の向きで保存されるが、呼び出し側は実際の対局の向きで辿りたい。
//! ビューは (ノード, 対称変換) の組で、着手座標をその変換で読み替える。
//!
//! - `SymBookNode`: コピー可能なハンドル。構造を変える操作の後も有効
//! - `NodeView`: book を借用した読み取り専用のビュー
//!
//! 値の書き換えと手の追加は `Book` のメソッドを通す。

use super::graph::{Book, DfsAction};
use super::hash::{BookHash, SymmetryList};
use super::node::{BookMove, BookNode, NodeIdx};
use super::values::{BookValues, RecursiveBookValues};
use crate::position::{BoardHistory, GameBoard};
use crate::types::{Loc, Player, Symmetry};
use log::warn;

/// 向き付きノードのハンドル
///
/// `symmetry` はノードの座標系をビューの座標系に移す変換 (node -> view)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymBookNode {
    pub(crate) idx: NodeIdx,
    pub(crate) symmetry: Symmetry,
}

impl SymBookNode {
    #[inline]
    pub(crate) const fn new(idx: NodeIdx, symmetry: Symmetry) -> Self {
        Self { idx, symmetry }
    }

    /// ビューにさらに `symmetry` を適用したもの
    #[inline]
    pub fn apply_symmetry(self, symmetry: Symmetry) -> Self {
        Self::new(self.idx, self.symmetry.then(symmetry))
    }

    #[inline]
    pub fn symmetry(self) -> Symmetry {
        self.symmetry
    }
}

/// 経路の再生中に非合法手に当たった
///
/// 破損した book かハッシュ衝突を示す。`moves` は初期局面の向きでの着手列で、
/// 非合法だった手を末尾に含む。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalReplay {
    pub moves: Vec<Loc>,
}

/// book を借用した読み取り専用ビュー
pub struct NodeView<'a, B: GameBoard> {
    book: &'a Book<B>,
    handle: SymBookNode,
}

impl<B: GameBoard> Clone for NodeView<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: GameBoard> Copy for NodeView<'_, B> {}

impl<B: GameBoard> Book<B> {
    /// ハンドルのビュー
    #[inline]
    pub fn view(&self, handle: SymBookNode) -> NodeView<'_, B> {
        NodeView { book: self, handle }
    }

    /// 全ノード（ノードの正規座標系）
    pub fn all_nodes(&self) -> Vec<SymBookNode> {
        (0..self.nodes.len())
            .map(|idx| SymBookNode::new(idx, Symmetry::IDENTITY))
            .collect()
    }

    pub fn set_this_values_not_in_book(&mut self, handle: SymBookNode, values: BookValues) {
        self.node_mut(handle.idx).this_values_not_in_book = values;
    }

    pub fn set_can_expand(&mut self, handle: SymBookNode, can_expand: bool) {
        self.node_mut(handle.idx).can_expand = can_expand;
    }

    /// 今回の実行中だけ再展開を禁止・許可する
    pub fn set_can_re_expand(&mut self, handle: SymBookNode, can_re_expand: bool) {
        self.node_mut(handle.idx).can_re_expand = can_re_expand;
    }

    /// book にある手を `hist` に指す
    ///
    /// 非合法手、または book に無い手なら None で `hist` は変更しない。
    /// `hist` はビューと同じ向きであること。
    pub fn play_move(&self, handle: SymBookNode, hist: &mut BoardHistory<B>, mv: Loc) -> Option<SymBookNode> {
        if !hist.is_legal(mv) {
            return None;
        }
        let child = self.view(handle).follow(mv)?;
        hist.play_unchecked(mv);
        Some(child)
    }

    /// book に無い手を `hist` に指し、子ノードを作成（または既存ノードに合流）して辺を追加する
    ///
    /// 戻り値は (子のビュー, 既存ノードへの合流か)。非合法手なら None。
    /// 既に book にある手（対称な手を含む）を渡すのは呼び出し側の誤りで、None を返す。
    /// 追加後の値は `recompute` を呼ぶまで更新されない。
    pub fn play_and_add_move(
        &mut self,
        handle: SymBookNode,
        hist: &mut BoardHistory<B>,
        mv: Loc,
        raw_policy: f64,
    ) -> Option<(SymBookNode, bool)> {
        if !hist.is_legal(mv) {
            return None;
        }
        if self.view(handle).is_move_in_book(mv) {
            warn!("Move {mv} is already in the book at node {}", self.node(handle.idx).hash);
            return None;
        }
        hist.play_unchecked(mv);

        let result = BookHash::hash_and_symmetry(hist, self.rep_bound, self.book_version);
        let (child_idx, transposing) = match self.idx_of(&result.hash) {
            Some(idx) => (idx, true),
            None => {
                let child = BookNode::new(result.hash, hist.next_pla(), result.symmetries);
                match self.add(child) {
                    Ok(idx) => (idx, false),
                    Err(e) => {
                        warn!("Failed to add node: {e}");
                        return None;
                    }
                }
            }
        };

        let (width, height) = self.dims();
        let parent_hash = self.node(handle.idx).hash;
        let move_in_node = handle.symmetry.invert().apply(mv, width, height);
        let symmetry_to_align = handle.symmetry.then(result.symmetry_to_align);
        self.node_mut(handle.idx)
            .moves
            .insert(move_in_node, BookMove::new(move_in_node, symmetry_to_align, result.hash, raw_policy));
        self.node_mut(child_idx).parents.push((parent_hash, move_in_node));

        Some((SymBookNode::new(child_idx, result.symmetry_to_align.invert()), transposing))
    }
}

impl<'a, B: GameBoard> NodeView<'a, B> {
    #[inline]
    fn node(&self) -> &'a BookNode {
        self.book.node(self.handle.idx)
    }

    #[inline]
    pub fn handle(&self) -> SymBookNode {
        self.handle
    }

    #[inline]
    pub fn pla(&self) -> Player {
        self.node().pla
    }

    #[inline]
    pub fn hash(&self) -> BookHash {
        self.node().hash
    }

    /// この局面を不変にする変換（ビューの座標系）
    pub fn symmetries(&self) -> SymmetryList {
        let s = self.handle.symmetry;
        self.node()
            .symmetries
            .iter()
            .map(|&inv| s.invert().then(inv).then(s))
            .collect()
    }

    /// ビューの座標系での着手をノードの座標系に移す。盤外なら None。
    #[inline]
    fn to_node_space(&self, mv: Loc) -> Option<Loc> {
        let (width, height) = self.book.dims();
        mv.is_on_board(width, height)
            .then(|| self.handle.symmetry.invert().apply(mv, width, height))
    }

    /// `mv`（またはそれと対称な手）が book にあるか
    pub fn is_move_in_book(&self, mv: Loc) -> bool {
        let (width, height) = self.book.dims();
        self.to_node_space(mv)
            .and_then(|mv| self.node().find_symmetric_move(mv, width, height))
            .is_some()
    }

    pub fn num_unique_moves_in_book(&self) -> usize {
        self.node().moves.len()
    }

    /// book にある手（対称なものは1つだけ、ビューの座標系）
    pub fn unique_moves_in_book(&self) -> Vec<BookMove> {
        let (width, height) = self.book.dims();
        self.node()
            .moves
            .values()
            .map(|edge| edge.with_symmetry(self.handle.symmetry, width, height))
            .collect()
    }

    #[inline]
    pub fn this_values_not_in_book(&self) -> &'a BookValues {
        &self.node().this_values_not_in_book
    }

    #[inline]
    pub fn can_expand(&self) -> bool {
        self.node().can_expand
    }

    #[inline]
    pub fn can_re_expand(&self) -> bool {
        self.node().can_re_expand
    }

    #[inline]
    pub fn recursive_values(&self) -> &'a RecursiveBookValues {
        &self.node().recursive_values
    }

    #[inline]
    pub fn min_depth_from_root(&self) -> u32 {
        self.node().min_depth_from_root
    }

    #[inline]
    pub fn min_cost_from_root(&self) -> f64 {
        self.node().min_cost_from_root
    }

    #[inline]
    pub fn this_node_expansion_cost(&self) -> f64 {
        self.node().this_node_expansion_cost
    }

    #[inline]
    pub fn total_expansion_cost(&self) -> f64 {
        self.node().total_expansion_cost()
    }

    #[inline]
    pub fn expansion_is_wlpv(&self) -> bool {
        self.node().expansion_is_wlpv
    }

    /// 探索数が少なく、再展開が望ましいか
    pub fn wants_re_expansion(&self) -> bool {
        let node = self.node();
        let visits = node.this_values_not_in_book.visits;
        visits <= self.book.params.max_visits_for_re_expansion
            || visits < self.book.overrides.visits_required(&node.hash)
    }

    /// コスト最小の親（このビューと同じ向き）。根、または親が見つからなければ None。
    pub fn canonical_parent(&self) -> Option<SymBookNode> {
        let node = self.node();
        let (parent_hash, parent_loc) = *node.parents.get(node.best_parent_idx?)?;
        let parent_idx = self.book.idx_of(&parent_hash)?;
        let edge = self.book.node(parent_idx).moves.get(&parent_loc)?;
        Some(SymBookNode::new(parent_idx, edge.symmetry_to_align.then(self.handle.symmetry)))
    }

    /// 既存の辺を辿った子（このビューと同じ向き）
    pub fn follow(&self, mv: Loc) -> Option<SymBookNode> {
        let (width, height) = self.book.dims();
        let (s, edge) = self.node().find_symmetric_move(self.to_node_space(mv)?, width, height)?;
        let child_idx = self.book.idx_of(&edge.hash)?;
        // child -> node(辺の向き) -> node(実際の手の向き) -> view
        let symmetry = edge
            .symmetry_to_align
            .invert()
            .then(s.invert())
            .then(self.handle.symmetry);
        Some(SymBookNode::new(child_idx, symmetry))
    }

    /// 根からここまでの履歴を再構成する（このビューの向き）
    ///
    /// コストの低い親を優先して根まで遡り、初期局面から着手を再生する。
    /// 再生中に非合法手があれば `IllegalReplay` を返す。根に届かない場合は
    /// 着手の無い `IllegalReplay` を返す。
    pub fn board_history_reaching_here(&self) -> Result<BoardHistory<B>, IllegalReplay> {
        let book = self.book;
        let mut path: Option<(Vec<NodeIdx>, Vec<Loc>)> = None;
        book.reverse_depth_first_search_with_moves(self.handle.idx, true, |nodes, moves| {
            if nodes.last() == Some(&book.root) {
                path = Some((nodes.to_vec(), moves.to_vec()));
                DfsAction::Abort
            } else {
                DfsAction::Recurse
            }
        });
        let Some((nodes, moves)) = path else {
            warn!("Node {} is not reachable from the root", self.node().hash);
            return Err(IllegalReplay { moves: Vec::new() });
        };

        let (width, height) = book.dims();
        let mut hist = book.initial_hist();
        // hist -> 現在のノード
        let mut symmetry = book.initial_symmetry;
        let mut played = Vec::with_capacity(moves.len());
        // nodes は [ここ, 親, ..., 根]、moves[i] は nodes[i+1] で指した手
        for i in (0..moves.len()).rev() {
            let parent = book.node(nodes[i + 1]);
            let move_in_node = moves[i];
            let mv = symmetry.invert().apply(move_in_node, width, height);
            played.push(mv);
            if !hist.is_legal(mv) {
                return Err(IllegalReplay { moves: played });
            }
            hist.play_unchecked(mv);
            let Some(edge) = parent.moves.get(&move_in_node) else {
                return Err(IllegalReplay { moves: played });
            };
            symmetry = symmetry.then(edge.symmetry_to_align);
        }
        Ok(hist.with_symmetry(symmetry.then(self.handle.symmetry)))
    }
}
