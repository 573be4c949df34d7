//! 対局ルール（Rules）

use super::zobrist::ZOBRIST;
use crate::types::{split_mix64, Hash128};
use serde::{Deserialize, Serialize};

/// 計数ルール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringRule {
    /// 地と石を数える
    #[default]
    Area,
    /// 地のみを数える
    Territory,
}

/// 対局ルール
///
/// book にとってのルールは、ハッシュ（ルールが異なる局面を混同しない）と
/// 誤差推定の補正（`BookValues::adjusted_*_error`）にのみ影響する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    pub scoring_rule: ScoringRule,
    pub komi: f32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            scoring_rule: ScoringRule::Area,
            komi: 7.0,
        }
    }
}

impl Rules {
    /// ルールのハッシュ
    pub fn hash(&self) -> Hash128 {
        let scoring = match self.scoring_rule {
            ScoringRule::Area => ZOBRIST.scoring[0],
            ScoringRule::Territory => ZOBRIST.scoring[1],
        };
        // コミは 0.5 刻みを想定し、2倍した整数でハッシュする
        let komi_key = (self.komi * 2.0).round() as i64 as u64;
        scoring ^ Hash128::new(split_mix64(komi_key), split_mix64(!komi_key))
    }
}
