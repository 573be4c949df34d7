//! Book 本体: ノード配列・ハッシュ索引・探索用の走査
//!
//! ノードは `Vec<BookNode>` に置き、辺は子のハッシュだけを持つ。
//! 親への逆辺は子側の `parents` に記録し、保存はしない（読み込み時に辺から再構築する）。

use super::error::{BookError, BookResult};
use super::hash::{BookHash, HashAndSymmetry};
use super::node::{BookNode, NodeIdx};
use super::params::{BookParams, HashOverrides};
use super::view::SymBookNode;
use crate::position::{BoardHistory, GameBoard, Rules};
use crate::types::{Loc, Player, Symmetry};
use log::warn;
use std::collections::{HashMap, HashSet};

/// 最新のスキーマバージョン
pub const LATEST_BOOK_VERSION: u32 = 2;

/// 走査の分岐指示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfsAction {
    /// このノードの先も探索する
    Recurse,
    /// このノードの先は探索せず、探索自体は続ける
    Skip,
    /// 探索全体を打ち切る
    Abort,
}

/// 定跡グラフ
///
/// 初期局面が正方形でない場合、転置を含む対称変換はどのノードでも使わない。
pub struct Book<B: GameBoard> {
    pub(crate) book_version: u32,
    pub(crate) initial_board: B,
    pub(crate) initial_rules: Rules,
    pub(crate) initial_pla: Player,
    pub(crate) rep_bound: usize,

    pub(crate) params: BookParams,
    pub(crate) overrides: HashOverrides,

    /// 初期局面を根ノードに揃える変換 (initial -> root node)
    pub(crate) initial_symmetry: Symmetry,
    pub(crate) root: NodeIdx,
    pub(crate) nodes: Vec<BookNode>,
    pub(crate) node_idx_by_hash: HashMap<BookHash, NodeIdx>,
}

impl<B: GameBoard> Book<B> {
    /// 根ノードだけの book を作成
    pub fn new(
        book_version: u32,
        initial_board: B,
        initial_rules: Rules,
        initial_pla: Player,
        rep_bound: usize,
        params: BookParams,
    ) -> BookResult<Self> {
        if book_version == 0 || book_version > LATEST_BOOK_VERSION {
            return Err(BookError::UnsupportedVersion(book_version));
        }
        let hist = BoardHistory::new(initial_board.clone(), initial_pla, initial_rules);
        let HashAndSymmetry {
            hash,
            symmetry_to_align,
            symmetries,
        } = BookHash::hash_and_symmetry(&hist, rep_bound, book_version);

        let mut book = Self {
            book_version,
            initial_board,
            initial_rules,
            initial_pla,
            rep_bound,
            params,
            overrides: HashOverrides::default(),
            initial_symmetry: symmetry_to_align,
            root: 0,
            nodes: Vec::new(),
            node_idx_by_hash: HashMap::new(),
        };
        book.root = book.add(BookNode::new(hash, initial_pla, symmetries))?;
        Ok(book)
    }

    #[inline]
    pub fn book_version(&self) -> u32 {
        self.book_version
    }

    #[inline]
    pub fn initial_board(&self) -> &B {
        &self.initial_board
    }

    #[inline]
    pub fn initial_rules(&self) -> &Rules {
        &self.initial_rules
    }

    #[inline]
    pub fn initial_pla(&self) -> Player {
        self.initial_pla
    }

    #[inline]
    pub fn rep_bound(&self) -> usize {
        self.rep_bound
    }

    /// ノード数
    #[inline]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn params(&self) -> &BookParams {
        &self.params
    }

    /// 係数を差し替える。コストは次の再計算で反映される。
    pub fn set_params(&mut self, params: BookParams) {
        self.params = params;
    }

    #[inline]
    pub fn overrides(&self) -> &HashOverrides {
        &self.overrides
    }

    pub fn set_overrides(&mut self, overrides: HashOverrides) {
        self.overrides = overrides;
    }

    /// 初期局面の履歴
    pub fn initial_hist(&self) -> BoardHistory<B> {
        BoardHistory::new(self.initial_board.clone(), self.initial_pla, self.initial_rules)
    }

    /// 初期局面に `symmetry` を適用した履歴
    pub fn initial_hist_with_symmetry(&self, symmetry: Symmetry) -> BoardHistory<B> {
        self.initial_hist().with_symmetry(symmetry)
    }

    /// 根ノード（初期局面の向き）
    pub fn root(&self) -> SymBookNode {
        SymBookNode::new(self.root, self.initial_symmetry.invert())
    }

    /// 根から `hist` の着手を辿ったノード。book を外れたら None。
    pub fn get(&self, hist: &BoardHistory<B>) -> Option<SymBookNode> {
        if hist.initial_pla() != self.initial_pla
            || hist.initial_board().position_hash() != self.initial_board.position_hash()
        {
            return None;
        }
        let mut node = self.root();
        for m in hist.moves() {
            node = self.view(node).follow(m.loc)?;
        }
        Some(node)
    }

    /// ハッシュからノードを引く（ノードの正規座標系）
    pub fn get_by_hash(&self, hash: BookHash) -> Option<SymBookNode> {
        self.idx_of(&hash).map(|idx| SymBookNode::new(idx, Symmetry::IDENTITY))
    }

    #[inline]
    pub(crate) fn idx_of(&self, hash: &BookHash) -> Option<NodeIdx> {
        self.node_idx_by_hash.get(hash).copied()
    }

    #[inline]
    pub(crate) fn node(&self, idx: NodeIdx) -> &BookNode {
        &self.nodes[idx]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut BookNode {
        &mut self.nodes[idx]
    }

    /// 盤の横幅・縦幅（初期局面の向き）
    #[inline]
    pub(crate) fn dims(&self) -> (usize, usize) {
        (self.initial_board.width(), self.initial_board.height())
    }

    /// ノードを追加する。同じハッシュが既にあればエラー。
    pub(crate) fn add(&mut self, node: BookNode) -> BookResult<NodeIdx> {
        if self.node_idx_by_hash.contains_key(&node.hash) {
            return Err(BookError::DuplicateNode(node.hash));
        }
        let idx = self.nodes.len();
        self.node_idx_by_hash.insert(node.hash, idx);
        self.nodes.push(node);
        Ok(idx)
    }

    /// 子ノードの添字一覧（辺の順）
    pub(crate) fn child_indices(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        self.nodes[idx]
            .moves
            .values()
            .filter_map(|edge| self.idx_of(&edge.hash))
            .collect()
    }

    /// 親を辿る深さ優先探索
    ///
    /// `f` には訪問中のノード列（先頭が開始ノード）と、各ノードへ親から来た着手列
    /// （親の座標系）を渡す。`prefer_low_cost_parents` なら最小コストの親を先に辿る。
    /// 最後まで走査したら true、`Abort` で打ち切ったら false を返す。
    pub(crate) fn reverse_depth_first_search_with_moves<F>(
        &self,
        initial: NodeIdx,
        prefer_low_cost_parents: bool,
        mut f: F,
    ) -> bool
    where
        F: FnMut(&[NodeIdx], &[Loc]) -> DfsAction,
    {
        let mut stack: Vec<NodeIdx> = vec![initial];
        let mut moves: Vec<Loc> = Vec::new();
        // 各深さで次に辿る親の位置
        let mut next_parent: Vec<usize> = vec![0];
        let mut visited: HashSet<NodeIdx> = HashSet::new();
        visited.insert(initial);

        match f(&stack, &moves) {
            DfsAction::Abort => return false,
            DfsAction::Skip => return true,
            DfsAction::Recurse => {}
        }

        while let Some(&top) = stack.last() {
            let depth = stack.len() - 1;
            let node = &self.nodes[top];
            let order = parent_order(node, prefer_low_cost_parents);
            let pos = next_parent[depth];
            if pos >= order.len() {
                stack.pop();
                next_parent.pop();
                moves.pop();
                continue;
            }
            next_parent[depth] += 1;

            let (parent_hash, parent_loc) = node.parents[order[pos]];
            let Some(parent_idx) = self.idx_of(&parent_hash) else {
                warn!("Node {} has a parent {} missing from the book", node.hash, parent_hash);
                continue;
            };
            if !visited.insert(parent_idx) {
                continue;
            }
            stack.push(parent_idx);
            moves.push(parent_loc);
            match f(&stack, &moves) {
                DfsAction::Abort => return false,
                DfsAction::Skip => {
                    stack.pop();
                    moves.pop();
                }
                DfsAction::Recurse => next_parent.push(0),
            }
        }
        true
    }

    /// 親を辿る深さ優先探索（帰りがけに `post_f` を呼ぶ）
    ///
    /// `f` が `Recurse` を返したノードだけ親へ進み、その全ての親を処理した後で
    /// `post_f` を呼ぶ。戻り値は `reverse_depth_first_search_with_moves` と同じ。
    pub(crate) fn reverse_depth_first_search_with_post_f<F, P>(
        &self,
        initial: NodeIdx,
        mut f: F,
        mut post_f: P,
    ) -> bool
    where
        F: FnMut(NodeIdx) -> DfsAction,
        P: FnMut(NodeIdx),
    {
        let mut visited: HashSet<NodeIdx> = HashSet::new();
        visited.insert(initial);
        match f(initial) {
            DfsAction::Abort => return false,
            DfsAction::Skip => return true,
            DfsAction::Recurse => {}
        }
        let mut stack: Vec<(NodeIdx, usize)> = vec![(initial, 0)];
        while let Some(&(top, pos)) = stack.last() {
            let node = &self.nodes[top];
            if pos >= node.parents.len() {
                stack.pop();
                post_f(top);
                continue;
            }
            let depth = stack.len() - 1;
            stack[depth].1 += 1;
            let (parent_hash, _) = node.parents[pos];
            let Some(parent_idx) = self.idx_of(&parent_hash) else {
                continue;
            };
            if !visited.insert(parent_idx) {
                continue;
            }
            match f(parent_idx) {
                DfsAction::Abort => return false,
                DfsAction::Skip => {}
                DfsAction::Recurse => stack.push((parent_idx, 0)),
            }
        }
        true
    }

    /// 根から辺を辿る前順走査（全ての親が子より先に来る位相順）
    ///
    /// 根から到達できないノードは含まない。
    pub(crate) fn topological_order_from_root(&self) -> Vec<NodeIdx> {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        reachable[self.root] = true;
        while let Some(idx) = stack.pop() {
            for child in self.child_indices(idx) {
                if !reachable[child] {
                    reachable[child] = true;
                    stack.push(child);
                }
            }
        }

        let mut in_degree = vec![0usize; self.nodes.len()];
        for idx in (0..self.nodes.len()).filter(|&i| reachable[i]) {
            for child in self.child_indices(idx) {
                in_degree[child] += 1;
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut ready = vec![self.root];
        while let Some(idx) = ready.pop() {
            order.push(idx);
            for child in self.child_indices(idx) {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.push(child);
                }
            }
        }

        let num_reachable = reachable.iter().filter(|&&r| r).count();
        if order.len() < num_reachable {
            warn!(
                "Book graph has a cycle: {} of {} reachable nodes could not be ordered",
                num_reachable - order.len(),
                num_reachable
            );
        }
        if num_reachable < self.nodes.len() {
            warn!("{} nodes are not reachable from the root", self.nodes.len() - num_reachable);
        }
        order
    }
}

/// 親を辿る順序
fn parent_order(node: &BookNode, prefer_low_cost_parents: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..node.parents.len()).collect();
    if prefer_low_cost_parents {
        if let Some(best) = node.best_parent_idx.filter(|&b| b < order.len()) {
            order.swap(0, best);
            order[1..].sort_unstable();
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PlacementBoard;

    /// 2つの手順が合流するグラフ
    ///
    /// ```text
    ///        root
    ///       /    \
    ///     a1      b1     (黒 A1 / 黒 C3)
    ///     |       |
    ///     a2      b2     (白 E5)
    ///       \    /
    ///      merged        (黒 C3 / 黒 A1)
    /// ```
    struct Diamond {
        book: Book<PlacementBoard>,
        root: NodeIdx,
        a1: NodeIdx,
        a2: NodeIdx,
        b1: NodeIdx,
        b2: NodeIdx,
        merged: NodeIdx,
    }

    fn diamond() -> Diamond {
        let board = PlacementBoard::new(5, 5).unwrap();
        let mut book =
            Book::new(LATEST_BOOK_VERSION, board, Rules::default(), Player::Black, 0, BookParams::default()).unwrap();
        let root = book.root();

        let mut line = |first: Loc, last: Loc| {
            let mut hist = book.initial_hist();
            let (n1, _) = book.play_and_add_move(root, &mut hist, first, 0.3).unwrap();
            let (n2, _) = book.play_and_add_move(n1, &mut hist, Loc::point(4, 4), 0.3).unwrap();
            let (n3, transposing) = book.play_and_add_move(n2, &mut hist, last, 0.3).unwrap();
            (n1.idx, n2.idx, n3.idx, transposing)
        };
        let (a1, a2, merged, a_transposing) = line(Loc::point(0, 0), Loc::point(2, 2));
        let (b1, b2, merged_again, b_transposing) = line(Loc::point(2, 2), Loc::point(0, 0));
        assert!(!a_transposing && b_transposing);
        assert_eq!(merged, merged_again);

        Diamond {
            root: book.root().idx,
            book,
            a1,
            a2,
            b1,
            b2,
            merged,
        }
    }

    #[test]
    fn test_diamond_shape() {
        let d = diamond();
        assert_eq!(d.book.size(), 6);
        assert_eq!(d.book.node(d.merged).parents.len(), 2);
        assert_eq!(d.book.child_indices(d.root), vec![d.a1, d.b1]);
    }

    #[test]
    fn test_reverse_dfs_visits_every_ancestor_once() {
        let d = diamond();
        let mut visited = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_moves(d.merged, false, |stack, moves| {
            assert_eq!(stack[0], d.merged);
            assert_eq!(moves.len() + 1, stack.len());
            visited.push(*stack.last().unwrap());
            DfsAction::Recurse
        });
        assert!(finished);
        assert_eq!(visited, vec![d.merged, d.a2, d.a1, d.root, d.b2, d.b1]);
    }

    #[test]
    fn test_reverse_dfs_skip_prunes_only_that_branch() {
        let d = diamond();
        let mut visited = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_moves(d.merged, false, |stack, _| {
            let top = *stack.last().unwrap();
            visited.push(top);
            if top == d.a2 {
                DfsAction::Skip
            } else {
                DfsAction::Recurse
            }
        });
        assert!(finished);
        // a2 の先（a1）は辿らないが、もう一方の親から根には届く
        assert_eq!(visited, vec![d.merged, d.a2, d.b2, d.b1, d.root]);

        let mut calls = 0;
        assert!(d.book.reverse_depth_first_search_with_moves(d.merged, false, |_, _| {
            calls += 1;
            DfsAction::Skip
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_reverse_dfs_abort_stops_immediately() {
        let d = diamond();
        let mut visited = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_moves(d.merged, false, |stack, _| {
            let top = *stack.last().unwrap();
            visited.push(top);
            if top == d.a2 {
                DfsAction::Abort
            } else {
                DfsAction::Recurse
            }
        });
        assert!(!finished);
        assert_eq!(visited, vec![d.merged, d.a2]);
    }

    #[test]
    fn test_reverse_dfs_post_f_runs_after_all_parents() {
        let d = diamond();
        let mut pre = Vec::new();
        let mut post = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_post_f(
            d.merged,
            |idx| {
                pre.push(idx);
                DfsAction::Recurse
            },
            |idx| post.push(idx),
        );
        assert!(finished);
        assert_eq!(pre, vec![d.merged, d.a2, d.a1, d.root, d.b2, d.b1]);
        assert_eq!(post, vec![d.root, d.a1, d.a2, d.b1, d.b2, d.merged]);
        for (i, &idx) in post.iter().enumerate() {
            for (parent_hash, _) in &d.book.node(idx).parents {
                let parent = d.book.idx_of(parent_hash).unwrap();
                assert!(post[..i].contains(&parent));
            }
        }
    }

    #[test]
    fn test_reverse_dfs_post_f_skip_and_abort() {
        let d = diamond();
        let mut post = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_post_f(
            d.merged,
            |idx| if idx == d.a2 { DfsAction::Skip } else { DfsAction::Recurse },
            |idx| post.push(idx),
        );
        assert!(finished);
        // Skip したノードには post_f を呼ばない
        assert_eq!(post, vec![d.root, d.b1, d.b2, d.merged]);

        let mut post = Vec::new();
        let finished = d.book.reverse_depth_first_search_with_post_f(
            d.merged,
            |idx| if idx == d.root { DfsAction::Abort } else { DfsAction::Recurse },
            |idx| post.push(idx),
        );
        assert!(!finished);
        assert!(post.is_empty());
    }
}
