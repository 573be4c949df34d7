//! 展開優先度（コスト）の計算と展開候補の選択
//!
//! 各辺のコストを根から積み上げた `min_cost_from_root` と、そのノード自身を
//! 展開するコスト `this_node_expansion_cost` の和が小さいノードほど先に展開する。

use super::graph::Book;
use super::node::{BookNode, NodeIdx};
use super::recompute::ValueSource;
use super::values::RecursiveBookValues;
use super::view::SymBookNode;
use crate::position::GameBoard;
use crate::types::{Loc, Player, Symmetry};

/// log(0) を避けるための下駄
const POLICY_EPSILON: f64 = 1e-100;

/// 勝敗の最善応手順上にあるときの割引率（0..=1）
///
/// 勝敗値が 0 付近なら `bonus_for_wlpv1`、±0.5 付近なら `bonus_for_wlpv2` が効く。
fn wlpv_bonus_factor(win_loss_value: f64, bonus1: f64, bonus2: f64) -> f64 {
    let wl = win_loss_value.abs();
    let near_zero = (1.0 - wl / 0.5).max(0.0);
    let near_half = (1.0 - (wl - 0.5).abs() / 0.5).max(0.0);
    (bonus1 * near_zero + bonus2 * near_half).clamp(0.0, 1.0)
}

/// 手番側から見た、最善の選択肢に対する損失
struct Regret {
    /// 手番側に最も楽観的な勝敗値（白: 最大の UCB、黒: 最小の LCB を符号反転）
    best_wl: f64,
    best_score: f64,
    sign: f64,
}

impl Regret {
    fn new<'a>(pla: Player, options: impl Iterator<Item = &'a RecursiveBookValues>) -> Self {
        let sign = pla.sign();
        let mut best_wl = f64::NEG_INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        for v in options {
            let (wl, score) = optimistic(pla, v);
            best_wl = best_wl.max(wl);
            best_score = best_score.max(score);
        }
        Self {
            best_wl,
            best_score,
            sign,
        }
    }

    fn win_loss_loss(&self, pla: Player, values: &RecursiveBookValues) -> f64 {
        (self.best_wl - optimistic(pla, values).0).max(0.0)
    }

    fn score_loss(&self, pla: Player, values: &RecursiveBookValues, cap: f64) -> f64 {
        (self.best_score - optimistic(pla, values).1).max(0.0).min(cap)
    }
}

/// 手番側に楽観的な境界（手番側から見た値）
#[inline]
fn optimistic(pla: Player, values: &RecursiveBookValues) -> (f64, f64) {
    match pla {
        Player::White => (values.win_loss_ucb, values.score_ucb),
        Player::Black => (-values.win_loss_lcb, -values.score_lcb),
    }
}

impl<B: GameBoard> Book<B> {
    /// 勝敗損失のコスト（1乗・3乗・7乗）
    fn win_loss_cost(&self, wl_loss: f64) -> f64 {
        let p = &self.params;
        p.cost_per_ucb_win_loss_loss * wl_loss
            + p.cost_per_ucb_win_loss_loss_pow3 * wl_loss.powi(3)
            + p.cost_per_ucb_win_loss_loss_pow7 * wl_loss.powi(7)
    }

    /// 根から位相順に全ノードのコストを計算し直す
    pub(crate) fn recompute_costs(&mut self) {
        for idx in self.topological_order_from_root() {
            self.recompute_node_cost(idx);
        }
    }

    /// 1ノードのコストを計算する（全ての親が計算済みであること）
    fn recompute_node_cost(&mut self, idx: NodeIdx) {
        let node = &self.nodes[idx];
        let hash = node.hash;

        // 根からのコスト: 親の辺のうち最小のもの
        let mut min_cost = 0.0;
        let mut best_parent_idx = None;
        let mut min_depth = 0u32;
        let mut biggest_wl_cost = 0.0;
        let mut min_cost_wlpv = f64::INFINITY;
        if idx != self.root {
            min_cost = f64::INFINITY;
            min_depth = u32::MAX;
            for (i, (parent_hash, parent_loc)) in node.parents.iter().enumerate() {
                let Some(parent) = self.idx_of(parent_hash).map(|p| &self.nodes[p]) else {
                    continue;
                };
                let Some(edge) = parent.moves.get(parent_loc) else {
                    continue;
                };
                if edge.cost_from_root < min_cost {
                    min_cost = edge.cost_from_root;
                    best_parent_idx = Some(i);
                    biggest_wl_cost = edge.biggest_wl_cost_from_root;
                }
                min_depth = min_depth.min(parent.min_depth_from_root.saturating_add(1));
                if edge.is_wlpv {
                    min_cost_wlpv = min_cost_wlpv.min(parent.min_cost_from_root_wlpv);
                }
            }
            if best_parent_idx.is_none() {
                // 親が見つからない（読み込み直後の破損など）
                min_cost = 0.0;
                min_depth = 0;
            }
        }
        min_cost -= self.overrides.bonus(&hash);
        min_cost_wlpv = min_cost_wlpv.min(min_cost);

        let this_values = self.this_node_values(node);
        let wl_source = self.win_loss_source(node, &this_values);
        let expansion_is_wlpv = wl_source == ValueSource::ThisNode;
        let pla = node.pla;
        let regret = Regret::new(
            pla,
            std::iter::once(&this_values).chain(self.child_values(node).map(|(_, v)| v)),
        );
        let reduction = self.params.early_book_reduction(min_depth);

        // 各辺のコスト
        let mut edge_costs: Vec<(Loc, f64, bool, f64)> = Vec::with_capacity(node.moves.len());
        for (&loc, edge) in &node.moves {
            let Some(child) = self.idx_of(&edge.hash).map(|c| &self.nodes[c].recursive_values) else {
                continue;
            };
            let p = &self.params;
            let wl_cost = self.win_loss_cost(regret.win_loss_loss(pla, child));
            let score_loss = regret.score_loss(pla, child, p.score_loss_cap);
            let mut cost = p.cost_per_move + wl_cost + score_loss * p.cost_per_ucb_score_loss
                - (edge.raw_policy + POLICY_EPSILON).ln() * p.cost_per_log_policy;

            let is_wlpv = wl_source == ValueSource::Child(loc);
            if is_wlpv {
                let f = wlpv_bonus_factor(child.win_loss_value, p.bonus_for_wlpv1, p.bonus_for_wlpv2);
                cost -= cost.max(0.0) * f;
            }
            let new_biggest = biggest_wl_cost.max(wl_cost);
            cost -= p.bonus_for_biggest_wl_cost * (new_biggest - biggest_wl_cost);
            cost *= reduction;
            edge_costs.push((loc, min_cost + cost, is_wlpv, new_biggest));
        }

        let expansion_cost = self.expansion_cost(node, &this_values, &regret, wl_source, min_cost, min_cost_wlpv, reduction);

        let node = &mut self.nodes[idx];
        node.best_parent_idx = best_parent_idx;
        node.min_depth_from_root = min_depth;
        node.min_cost_from_root = min_cost;
        node.min_cost_from_root_wlpv = min_cost_wlpv;
        node.biggest_wl_cost_from_root = biggest_wl_cost;
        node.expansion_is_wlpv = expansion_is_wlpv;
        node.this_node_expansion_cost = expansion_cost;
        for edge in node.moves.values_mut() {
            edge.is_wlpv = false;
        }
        for (loc, cost, is_wlpv, biggest) in edge_costs {
            if let Some(edge) = node.moves.get_mut(&loc) {
                edge.cost_from_root = cost;
                edge.is_wlpv = is_wlpv;
                edge.biggest_wl_cost_from_root = biggest;
            }
        }
    }

    /// このノードを新たに展開するコスト
    #[allow(clippy::too_many_arguments)]
    fn expansion_cost(
        &self,
        node: &BookNode,
        this_values: &RecursiveBookValues,
        regret: &Regret,
        wl_source: ValueSource,
        min_cost: f64,
        min_cost_wlpv: f64,
        reduction: f64,
    ) -> f64 {
        let p = &self.params;
        let pla = node.pla;
        let raw = &node.this_values_not_in_book;

        let wl_cost = self.win_loss_cost(regret.win_loss_loss(pla, this_values));
        let score_loss = regret.score_loss(pla, this_values, p.score_loss_cap);
        let mut cost = p.cost_per_move + wl_cost + score_loss * p.cost_per_ucb_score_loss
            - (raw.max_policy + POLICY_EPSILON).ln() * p.cost_per_log_policy;

        let num_moves = node.moves.len();
        if num_moves >= self.overrides.branch_required(&node.hash) {
            let n = num_moves as f64;
            cost += n * p.cost_per_moves_expanded + n * n * p.cost_per_squared_moves_expanded;
        }
        if wl_source == ValueSource::Child(Loc::Pass) {
            cost += p.cost_when_pass_favored;
        }

        let damping = p.visits_damping(raw.visits);
        let wl_error = 2.0 * p.error_factor * raw.adjusted_win_loss_error(&self.initial_rules);
        let score_error = 2.0 * p.error_factor * raw.adjusted_score_error(&self.initial_rules);
        cost -= damping * p.bonus_per_win_loss_error * wl_error;
        cost -= damping * p.bonus_per_score_error * score_error;
        cost -= p.bonus_per_sharp_score_discrepancy * (this_values.sharp_score_mean - this_values.score_mean).abs();
        cost -= p.bonus_per_excess_unexpanded_policy * (1.0 - node.expanded_policy_sum()).max(0.0);

        if num_moves > 0 {
            let sign = regret.sign;
            let best_child_wl = self
                .child_values(node)
                .map(|(_, v)| sign * v.win_loss_value)
                .fold(f64::NEG_INFINITY, f64::max);
            if best_child_wl.is_finite() {
                cost -= p.bonus_per_unexpanded_best_win_loss * (sign * this_values.win_loss_value - best_child_wl).max(0.0);
            }
        }

        if wl_source == ValueSource::ThisNode {
            let f = wlpv_bonus_factor(this_values.win_loss_value, p.bonus_for_wlpv1, p.bonus_for_wlpv2);
            cost -= f * (min_cost - min_cost_wlpv).max(0.0);
        }

        cost *= reduction;
        cost - self.overrides.expand_bonus(&node.hash)
    }

    /// 次に展開すべきノードを `n` 個（コストの小さい順、同値はハッシュ順）
    ///
    /// 候補は `can_expand` かつ `can_re_expand` で、子が無いか、未展開の手が残っているか
    /// （`max_policy > 0`）、必要な探索数に満たないノード。
    pub fn next_n_to_expand(&self, n: usize) -> Vec<SymBookNode> {
        let mut candidates: Vec<&BookNode> = self
            .nodes
            .iter()
            .filter(|node| {
                node.can_expand
                    && node.can_re_expand
                    && (node.moves.is_empty()
                        || node.this_values_not_in_book.max_policy > 0.0
                        || node.this_values_not_in_book.visits < self.overrides.visits_required(&node.hash))
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.total_expansion_cost()
                .total_cmp(&b.total_expansion_cost())
                .then_with(|| a.hash.cmp(&b.hash))
        });
        candidates
            .into_iter()
            .take(n)
            .filter_map(|node| self.idx_of(&node.hash))
            .map(|idx| SymBookNode::new(idx, Symmetry::IDENTITY))
            .collect()
    }

    /// 自身の探索数が `min_visits` 未満のノード（ノードの正規座標系）
    pub fn all_leaves(&self, min_visits: f64) -> Vec<SymBookNode> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.this_values_not_in_book.visits < min_visits)
            .map(|(idx, _)| SymBookNode::new(idx, Symmetry::IDENTITY))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wlpv_bonus_shape() {
        assert_eq!(wlpv_bonus_factor(0.0, 0.5, 0.3), 0.5);
        assert_eq!(wlpv_bonus_factor(0.5, 0.5, 0.3), 0.3);
        assert_eq!(wlpv_bonus_factor(-0.5, 0.5, 0.3), 0.3);
        assert_eq!(wlpv_bonus_factor(1.0, 0.5, 0.3), 0.0);
        assert!((wlpv_bonus_factor(0.25, 0.5, 0.3) - 0.4).abs() < 1e-12);
        assert_eq!(wlpv_bonus_factor(0.0, 2.0, 0.0), 1.0);
    }

    #[test]
    fn test_regret_uses_mover_bounds() {
        let a = RecursiveBookValues {
            win_loss_lcb: -0.2,
            win_loss_ucb: 0.4,
            score_lcb: -2.0,
            score_ucb: 6.0,
            ..Default::default()
        };
        let b = RecursiveBookValues {
            win_loss_lcb: 0.1,
            win_loss_ucb: 0.2,
            score_lcb: 1.0,
            score_ucb: 3.0,
            ..Default::default()
        };
        let white = Regret::new(Player::White, [&a, &b].into_iter());
        assert!((white.win_loss_loss(Player::White, &b) - 0.2).abs() < 1e-12);
        assert_eq!(white.win_loss_loss(Player::White, &a), 0.0);
        assert_eq!(white.score_loss(Player::White, &b, 2.0), 2.0);

        let black = Regret::new(Player::Black, [&a, &b].into_iter());
        assert!((black.win_loss_loss(Player::Black, &b) - 0.3).abs() < 1e-12);
        assert_eq!(black.win_loss_loss(Player::Black, &a), 0.0);
        assert_eq!(black.score_loss(Player::Black, &b, 10.0), 3.0);
    }
}
