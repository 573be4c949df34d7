//! 値の再計算（ミニマックス）
//!
//! 変更のあったノードとその全祖先を dirty とし、子が先に確定する帰りがけ順で
//! `RecursiveBookValues` を計算し直す。その後、根から位相順に全ノードのコストを
//! 計算し直す（コストは根側から流れてくるため、祖先の値が変われば子孫全体に響く）。

use super::graph::{Book, DfsAction};
use super::node::{BookNode, NodeIdx};
use super::values::RecursiveBookValues;
use super::view::SymBookNode;
use crate::position::GameBoard;
use crate::types::{Loc, Player};
use log::debug;
use std::collections::HashSet;
use std::time::Instant;

/// ミニマックスで採用した選択肢
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueSource {
    /// このノード自身の探索結果（未展開の手を指す選択肢）
    ThisNode,
    /// 既存の子
    Child(Loc),
}

/// 手番側にとって最善の選択肢を選ぶ
///
/// `key` は白から見た値。白は最大、黒は最小を選ぶ。
/// 同値なら自分自身より子を優先し、子同士では先に来たもの（着手の順で小さい方）を優先する。
pub(crate) fn select_best<'a, I, K>(pla: Player, this_values: &RecursiveBookValues, children: I, key: K) -> ValueSource
where
    I: IntoIterator<Item = (Loc, &'a RecursiveBookValues)>,
    K: Fn(&RecursiveBookValues) -> f64,
{
    let sign = pla.sign();
    let mut best = ValueSource::ThisNode;
    let mut best_value = sign * key(this_values);
    for (loc, values) in children {
        let v = sign * key(values);
        let better = match best {
            ValueSource::ThisNode => v >= best_value,
            ValueSource::Child(_) => v > best_value,
        };
        if better {
            best = ValueSource::Child(loc);
            best_value = v;
        }
    }
    best
}

impl<B: GameBoard> Book<B> {
    /// このノード自身の探索結果を集約値の形にしたもの
    pub(crate) fn this_node_values(&self, node: &BookNode) -> RecursiveBookValues {
        RecursiveBookValues::from_leaf(
            &node.this_values_not_in_book,
            &self.initial_rules,
            self.params.error_factor,
            self.params.sharp_score_outlier_cap,
        )
    }

    /// 子の (着手, 集約値) 一覧（着手の順）
    pub(crate) fn child_values<'a>(&'a self, node: &'a BookNode) -> impl Iterator<Item = (Loc, &'a RecursiveBookValues)> + 'a {
        node.moves.iter().filter_map(move |(&loc, edge)| {
            self.idx_of(&edge.hash)
                .map(|idx| (loc, &self.nodes[idx].recursive_values))
        })
    }

    /// 勝敗値で最善の選択肢
    pub(crate) fn win_loss_source(&self, node: &BookNode, this_values: &RecursiveBookValues) -> ValueSource {
        select_best(node.pla, this_values, self.child_values(node), |v| v.win_loss_value)
    }

    /// 変更のあったノードから再計算する
    ///
    /// 渡したノードとその全祖先の値、および全ノードのコストを更新する。
    pub fn recompute(&mut self, new_and_changed_nodes: &[SymBookNode]) {
        let start = Instant::now();
        let mut dirty: HashSet<NodeIdx> = HashSet::new();
        for handle in new_and_changed_nodes {
            if dirty.contains(&handle.idx) {
                continue;
            }
            self.reverse_depth_first_search_with_post_f(
                handle.idx,
                |idx| {
                    if dirty.insert(idx) {
                        DfsAction::Recurse
                    } else {
                        DfsAction::Skip
                    }
                },
                |_| {},
            );
        }
        let num_dirty = dirty.len();
        self.iterate_dirty_nodes_post_order(&dirty, false);
        self.recompute_costs();
        debug!(
            "Recomputed {} dirty nodes of {} in {:.3}s",
            num_dirty,
            self.nodes.len(),
            start.elapsed().as_secs_f64()
        );
    }

    /// 全ノードを再計算する
    pub fn recompute_everything(&mut self) {
        let start = Instant::now();
        self.iterate_dirty_nodes_post_order(&HashSet::new(), true);
        self.recompute_costs();
        debug!(
            "Recomputed all {} nodes in {:.3}s",
            self.nodes.len(),
            start.elapsed().as_secs_f64()
        );
    }

    /// dirty なノードを帰りがけ順に再計算する
    ///
    /// 子が dirty ならその子を先に済ませる。一度済ませたノードは再訪しない。
    fn iterate_dirty_nodes_post_order(&mut self, dirty: &HashSet<NodeIdx>, all_dirty: bool) {
        let is_dirty = |idx: NodeIdx| all_dirty || dirty.contains(&idx);
        let mut done = vec![false; self.nodes.len()];
        let mut on_stack = vec![false; self.nodes.len()];

        let starts: Vec<NodeIdx> = if all_dirty {
            std::iter::once(self.root).chain(0..self.nodes.len()).collect()
        } else {
            let mut v: Vec<NodeIdx> = dirty.iter().copied().collect();
            v.sort_unstable();
            v
        };

        for start in starts {
            if done[start] || !is_dirty(start) {
                continue;
            }
            let mut stack: Vec<(NodeIdx, Vec<NodeIdx>, usize)> = vec![(start, self.child_indices(start), 0)];
            on_stack[start] = true;
            while let Some((top, children, pos)) = stack.last_mut() {
                if *pos < children.len() {
                    let child = children[*pos];
                    *pos += 1;
                    // 閉路があれば先祖側の辺を無視する
                    if !done[child] && !on_stack[child] && is_dirty(child) {
                        on_stack[child] = true;
                        let grandchildren = self.child_indices(child);
                        stack.push((child, grandchildren, 0));
                    }
                    continue;
                }
                let idx = *top;
                stack.pop();
                on_stack[idx] = false;
                done[idx] = true;
                self.recompute_node_values(idx);
            }
        }
    }

    /// 1ノードの集約値を子の集約値と自身の探索結果から計算する
    ///
    /// 勝敗値・スコア・sharp スコアはそれぞれ手番側に最善の選択肢から取り、
    /// LCB/UCB もその選択肢のものをそのまま使う。
    fn recompute_node_values(&mut self, idx: NodeIdx) {
        let node = &self.nodes[idx];
        let this_values = self.this_node_values(node);

        let wl_source = self.win_loss_source(node, &this_values);
        let score_source = select_best(node.pla, &this_values, self.child_values(node), |v| v.score_mean);
        let sharp_source = select_best(node.pla, &this_values, self.child_values(node), |v| v.sharp_score_mean);

        let pick = |source: ValueSource| -> RecursiveBookValues {
            match source {
                ValueSource::ThisNode => this_values,
                ValueSource::Child(loc) => self
                    .child_values(node)
                    .find(|&(l, _)| l == loc)
                    .map(|(_, v)| *v)
                    .unwrap_or(this_values),
            }
        };
        let wl = pick(wl_source);
        let score = pick(score_source);
        let sharp = pick(sharp_source);

        let mut weight = this_values.weight;
        let mut visits = this_values.visits;
        for (_, child) in self.child_values(node) {
            weight += child.weight;
            visits += child.visits;
        }

        let values = RecursiveBookValues {
            win_loss_value: wl.win_loss_value,
            win_loss_lcb: wl.win_loss_lcb,
            win_loss_ucb: wl.win_loss_ucb,
            score_mean: score.score_mean,
            score_lcb: score.score_lcb,
            score_ucb: score.score_ucb,
            score_final_lcb: score.score_final_lcb,
            score_final_ucb: score.score_final_ucb,
            sharp_score_mean: sharp.sharp_score_mean,
            sharp_score_lcb: sharp.sharp_score_lcb,
            sharp_score_ucb: sharp.sharp_score_ucb,
            weight,
            visits,
        };
        self.nodes[idx].recursive_values = values;
    }
}
