//! 評価値（BookValues / RecursiveBookValues）
//!
//! 手番が関わる値はすべて白から見た値で持つ（白が最大化、黒が最小化）。

use crate::position::{Rules, ScoringRule};
use serde::{Deserialize, Serialize};

/// 地のみを数えるルールでの誤差の倍率（地と石を数えるルールでは 1）
pub const TERRITORY_ERROR_SCALE: f64 = 1.5;

/// 1局面の探索結果（book の知識を含まない）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookValues {
    pub win_loss_value: f64,
    pub score_mean: f64,
    pub sharp_score_mean: f64,

    /// 探索中のノードの短期誤差の平均
    pub win_loss_error: f64,
    pub score_error: f64,
    /// 終局までのスコアの標準偏差
    pub score_stdev: f64,

    pub max_policy: f64,
    pub weight: f64,
    pub visits: f64,
}

impl BookValues {
    /// ルールを考慮した勝敗誤差
    pub fn adjusted_win_loss_error(&self, rules: &Rules) -> f64 {
        self.win_loss_error * error_scale(rules)
    }

    /// ルールを考慮したスコア誤差
    pub fn adjusted_score_error(&self, rules: &Rules) -> f64 {
        self.score_error * error_scale(rules)
    }
}

#[inline]
fn error_scale(rules: &Rules) -> f64 {
    match rules.scoring_rule {
        ScoringRule::Area => 1.0,
        ScoringRule::Territory => TERRITORY_ERROR_SCALE,
    }
}

/// book 内のミニマックスで集約した値
///
/// 各 LCB/UCB の組は、値を採用した選択肢（自分自身または子）と同じ出どころから取る。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveBookValues {
    pub win_loss_value: f64,
    pub score_mean: f64,
    pub sharp_score_mean: f64,
    /// winLossValue - winLossError * errorFactor
    pub win_loss_lcb: f64,
    pub win_loss_ucb: f64,
    /// scoreMean ∓ scoreError * errorFactor
    pub score_lcb: f64,
    pub score_ucb: f64,
    /// scoreMean ∓ scoreStdev * errorFactor
    pub score_final_lcb: f64,
    pub score_final_ucb: f64,
    /// sharpScoreMean ∓ scoreError * errorFactor（sharp は外れ値を上限で切った値）
    pub sharp_score_lcb: f64,
    pub sharp_score_ucb: f64,

    /// 集約した部分木全体の和
    pub weight: f64,
    pub visits: f64,
}

impl RecursiveBookValues {
    /// 自分自身の探索結果だけから作る（子を展開していない選択肢）
    pub fn from_leaf(values: &BookValues, rules: &Rules, error_factor: f64, sharp_score_outlier_cap: f64) -> Self {
        let wl_err = values.adjusted_win_loss_error(rules) * error_factor;
        let score_err = values.adjusted_score_error(rules) * error_factor;
        let final_err = values.score_stdev * error_factor;

        let mut score_lcb = values.score_mean - score_err;
        let mut score_ucb = values.score_mean + score_err;

        // sharp が通常スコアの範囲外なら範囲をそこまで広げ、sharp 自体は上限で切る
        if values.sharp_score_mean > score_ucb {
            score_ucb = values.sharp_score_mean;
        }
        if values.sharp_score_mean < score_lcb {
            score_lcb = values.sharp_score_mean;
        }
        let cap = sharp_score_outlier_cap.max(0.0);
        let sharp = values.sharp_score_mean.clamp(values.score_mean - cap, values.score_mean + cap);

        Self {
            win_loss_value: values.win_loss_value,
            score_mean: values.score_mean,
            sharp_score_mean: sharp,
            win_loss_lcb: values.win_loss_value - wl_err,
            win_loss_ucb: values.win_loss_value + wl_err,
            score_lcb,
            score_ucb,
            score_final_lcb: values.score_mean - final_err,
            score_final_ucb: values.score_mean + final_err,
            sharp_score_lcb: sharp - score_err,
            sharp_score_ucb: sharp + score_err,
            weight: values.weight,
            visits: values.visits,
        }
    }

    /// 勝敗値とスコアを合わせた効用（白視点）
    #[inline]
    pub fn utility(&self, utility_per_score: f64) -> f64 {
        self.win_loss_value + self.score_mean * utility_per_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BookValues {
        BookValues {
            win_loss_value: 0.2,
            score_mean: 1.0,
            sharp_score_mean: 1.5,
            win_loss_error: 0.1,
            score_error: 2.0,
            score_stdev: 10.0,
            max_policy: 0.4,
            weight: 100.0,
            visits: 120.0,
        }
    }

    #[test]
    fn test_adjusted_errors_depend_on_scoring_rule() {
        let v = sample();
        let area = Rules::default();
        let territory = Rules {
            scoring_rule: ScoringRule::Territory,
            ..area
        };
        assert_eq!(v.adjusted_win_loss_error(&area), 0.1);
        assert_eq!(v.adjusted_score_error(&area), 2.0);
        assert!((v.adjusted_win_loss_error(&territory) - 0.15).abs() < 1e-12);
        assert!((v.adjusted_score_error(&territory) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_leaf_bounds() {
        let r = RecursiveBookValues::from_leaf(&sample(), &Rules::default(), 1.0, 100.0);
        assert!((r.win_loss_lcb - 0.1).abs() < 1e-12);
        assert!((r.win_loss_ucb - 0.3).abs() < 1e-12);
        assert_eq!(r.score_lcb, -1.0);
        assert_eq!(r.score_ucb, 3.0);
        assert_eq!(r.score_final_lcb, -9.0);
        assert_eq!(r.score_final_ucb, 11.0);
        assert_eq!(r.sharp_score_mean, 1.5);
        assert_eq!(r.sharp_score_lcb, -0.5);
        assert_eq!(r.sharp_score_ucb, 3.5);
        assert_eq!(r.visits, 120.0);
    }

    #[test]
    fn test_sharp_outlier_is_capped() {
        let mut v = sample();
        v.sharp_score_mean = 20.0;
        let r = RecursiveBookValues::from_leaf(&v, &Rules::default(), 1.0, 5.0);
        assert_eq!(r.sharp_score_mean, 6.0);
        assert_eq!(r.sharp_score_lcb, 4.0);
        assert_eq!(r.sharp_score_ucb, 8.0);
        // 通常スコアの上側は sharp の元の値まで広がる
        assert_eq!(r.score_ucb, 20.0);
        assert_eq!(r.score_lcb, -1.0);
    }
}
