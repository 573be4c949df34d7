//! コスト計算の係数（BookParams）と局面ごとの上書き（HashOverrides）

use super::hash::BookHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 展開優先度を決める係数一式
///
/// 保存時は `sharp_score_outlier_cap` 以外をすべて書き出す。
/// `sharp_score_outlier_cap` は表示と集計の補正なので読み込み時に指定する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookParams {
    /// 短期誤差にこれを掛けたものを UCB/LCB の幅とする
    pub error_factor: f64,
    /// 1手ごとの固定コスト
    pub cost_per_move: f64,
    /// 最善手の UCB に対する勝敗値の損失1あたりのコスト（1乗・3乗・7乗）
    #[serde(rename = "costPerUCBWinLossLoss")]
    pub cost_per_ucb_win_loss_loss: f64,
    #[serde(rename = "costPerUCBWinLossLossPow3")]
    pub cost_per_ucb_win_loss_loss_pow3: f64,
    #[serde(rename = "costPerUCBWinLossLossPow7")]
    pub cost_per_ucb_win_loss_loss_pow7: f64,
    /// 最善手の UCB に対するスコアの損失1目あたりのコスト
    #[serde(rename = "costPerUCBScoreLoss")]
    pub cost_per_ucb_score_loss: f64,
    /// 方策確率の対数1nat あたりのコスト
    pub cost_per_log_policy: f64,
    /// 既に展開済みの手の数（1乗・2乗）に応じた展開コスト
    pub cost_per_moves_expanded: f64,
    pub cost_per_squared_moves_expanded: f64,
    /// パスが最善のときの展開コスト
    pub cost_when_pass_favored: f64,
    /// 誤差（UCB と LCB の差）に応じたボーナス
    pub bonus_per_win_loss_error: f64,
    pub bonus_per_score_error: f64,
    /// sharp スコアと通常スコアの差1目あたりのボーナス
    pub bonus_per_sharp_score_discrepancy: f64,
    /// 未展開の方策確率に応じたボーナス
    pub bonus_per_excess_unexpanded_policy: f64,
    /// 未展開の選択肢が展開済みのどの子より勝敗値で良い分のボーナス
    pub bonus_per_unexpanded_best_win_loss: f64,
    /// 勝敗の最善応手順上にある場合の割引率（勝敗値が 0 付近 / ±0.5 付近）
    #[serde(rename = "bonusForWLPV1")]
    pub bonus_for_wlpv1: f64,
    #[serde(rename = "bonusForWLPV2")]
    pub bonus_for_wlpv2: f64,
    /// 経路上で最大の勝敗コスト1あたりのボーナス
    #[serde(rename = "bonusForBiggestWLCost")]
    pub bonus_for_biggest_wl_cost: f64,
    /// スコア損失の上限
    pub score_loss_cap: f64,
    /// 根付近のコスト割引。1手目は factor だけ割り引き、深さごとに lambda 倍になる
    pub early_book_cost_reduction_factor: f64,
    pub early_book_cost_reduction_lambda: f64,
    /// HTML 出力での手の並び順
    pub utility_per_score: f64,
    pub policy_boost_soft_utility_scale: f64,
    pub utility_per_policy_for_sorting: f64,
    /// 探索数がこれ以下なら再展開を許す
    pub max_visits_for_re_expansion: f64,
    /// 探索数が少ないとみなす規模
    pub visits_scale: f64,
    /// sharp スコアが通常スコアからこれ以上離れたら切り詰める
    #[serde(skip_serializing)]
    pub sharp_score_outlier_cap: f64,
}

impl Default for BookParams {
    fn default() -> Self {
        Self {
            error_factor: 1.0,
            cost_per_move: 1.0,
            cost_per_ucb_win_loss_loss: 4.0,
            cost_per_ucb_win_loss_loss_pow3: 10.0,
            cost_per_ucb_win_loss_loss_pow7: 20.0,
            cost_per_ucb_score_loss: 0.1,
            cost_per_log_policy: 0.6,
            cost_per_moves_expanded: 0.5,
            cost_per_squared_moves_expanded: 0.02,
            cost_when_pass_favored: 5.0,
            bonus_per_win_loss_error: 2.0,
            bonus_per_score_error: 0.05,
            bonus_per_sharp_score_discrepancy: 0.1,
            bonus_per_excess_unexpanded_policy: 2.0,
            bonus_per_unexpanded_best_win_loss: 0.5,
            bonus_for_wlpv1: 0.5,
            bonus_for_wlpv2: 0.3,
            bonus_for_biggest_wl_cost: 0.2,
            score_loss_cap: 3.0,
            early_book_cost_reduction_factor: 0.4,
            early_book_cost_reduction_lambda: 0.4,
            utility_per_score: 0.05,
            policy_boost_soft_utility_scale: 0.03,
            utility_per_policy_for_sorting: 0.02,
            max_visits_for_re_expansion: 0.0,
            visits_scale: 500.0,
            sharp_score_outlier_cap: 2.0,
        }
    }
}

impl BookParams {
    /// version 1 の book に存在しない係数を無効値にしたもの
    ///
    /// 無効値ではその項がコストに一切寄与しない（割引率 0、減衰なし）。
    pub fn neutral_v1(self) -> Self {
        Self {
            bonus_per_unexpanded_best_win_loss: 0.0,
            early_book_cost_reduction_factor: 0.0,
            early_book_cost_reduction_lambda: 0.0,
            max_visits_for_re_expansion: 0.0,
            visits_scale: 0.0,
            ..self
        }
    }

    /// 根からの深さに応じたコストの倍率（0..=1）
    pub fn early_book_reduction(&self, depth: u32) -> f64 {
        let decay = self.early_book_cost_reduction_lambda.powi(depth as i32);
        (1.0 - self.early_book_cost_reduction_factor * decay).clamp(0.0, 1.0)
    }

    /// 探索数が少ないノードのボーナスを抑える係数（0..=1）
    pub fn visits_damping(&self, visits: f64) -> f64 {
        if self.visits_scale <= 0.0 {
            1.0
        } else {
            visits.max(0.0) / (visits.max(0.0) + self.visits_scale)
        }
    }
}

/// 局面ごとの係数上書き
///
/// 外部ツールから特定の局面の優先度を調整するための疎なテーブル。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HashOverrides {
    /// 根からのコストから差し引く量
    pub bonus_by_hash: BTreeMap<BookHash, f64>,
    /// 展開コストから差し引く量
    pub expand_bonus_by_hash: BTreeMap<BookHash, f64>,
    /// この探索数に達するまで再展開を望む
    pub visits_required_by_hash: BTreeMap<BookHash, f64>,
    /// この数の手が展開されるまで手数ペナルティを課さない
    pub branch_required_by_hash: BTreeMap<BookHash, usize>,
}

impl HashOverrides {
    pub fn bonus(&self, hash: &BookHash) -> f64 {
        self.bonus_by_hash.get(hash).copied().unwrap_or(0.0)
    }

    pub fn expand_bonus(&self, hash: &BookHash) -> f64 {
        self.expand_bonus_by_hash.get(hash).copied().unwrap_or(0.0)
    }

    pub fn visits_required(&self, hash: &BookHash) -> f64 {
        self.visits_required_by_hash.get(hash).copied().unwrap_or(0.0)
    }

    pub fn branch_required(&self, hash: &BookHash) -> usize {
        self.branch_required_by_hash.get(hash).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.bonus_by_hash.is_empty()
            && self.expand_bonus_by_hash.is_empty()
            && self.visits_required_by_hash.is_empty()
            && self.branch_required_by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash128;

    #[test]
    fn test_early_book_reduction_decays_with_depth() {
        let params = BookParams::default();
        assert!((params.early_book_reduction(0) - 0.6).abs() < 1e-12);
        assert!((params.early_book_reduction(1) - 0.84).abs() < 1e-12);
        assert!(params.early_book_reduction(10) > 0.99);
        assert_eq!(params.clone().neutral_v1().early_book_reduction(0), 1.0);
    }

    #[test]
    fn test_visits_damping() {
        let params = BookParams {
            visits_scale: 100.0,
            ..BookParams::default()
        };
        assert_eq!(params.visits_damping(100.0), 0.5);
        assert_eq!(params.visits_damping(0.0), 0.0);
        assert_eq!(params.neutral_v1().visits_damping(0.0), 1.0);
    }

    #[test]
    fn test_params_serde_names_and_outlier_cap() {
        let json = serde_json::to_value(BookParams::default()).unwrap();
        assert!(json.get("costPerUCBWinLossLoss").is_some());
        assert!(json.get("bonusForBiggestWLCost").is_some());
        assert!(json.get("bonusForWLPV1").is_some());
        assert!(json.get("sharpScoreOutlierCap").is_none());
        let back: BookParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, BookParams::default());
    }

    #[test]
    fn test_overrides_lookup_defaults() {
        let hash = BookHash::new(Hash128::new(1, 2), Hash128::new(3, 4));
        let mut overrides = HashOverrides::default();
        assert!(overrides.is_empty());
        assert_eq!(overrides.bonus(&hash), 0.0);
        overrides.branch_required_by_hash.insert(hash, 3);
        overrides.bonus_by_hash.insert(hash, 1.5);
        assert_eq!(overrides.branch_required(&hash), 3);
        assert_eq!(overrides.bonus(&hash), 1.5);
        assert_eq!(overrides.expand_bonus(&hash), 0.0);

        let json = serde_json::to_string(&overrides).unwrap();
        let back: HashOverrides = serde_json::from_str(&json).unwrap();
        assert_eq!(back, overrides);
    }
}
