//! book の保存と読み込み
//!
//! JSON Lines 形式。1行目がヘッダ（バージョン・初期局面・ルール・係数・上書きテーブル）、
//! 2行目以降が1行1ノード（先頭が根）。コストと集約値は保存せず、読み込み後に再計算する。
//! `canReExpand` も保存せず、読み込むと全ノードで true に戻る。

use super::error::{BookError, BookResult};
use super::graph::{Book, LATEST_BOOK_VERSION};
use super::hash::BookHash;
use super::io::{open_reader, open_writer};
use super::node::{BookMove, BookNode};
use super::params::{BookParams, HashOverrides};
use super::values::BookValues;
use crate::position::{GameBoard, Rules};
use crate::types::{Player, Symmetry};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;

/// 保存される係数の名前
const PARAM_FIELDS: &[&str] = &[
    "errorFactor",
    "costPerMove",
    "costPerUCBWinLossLoss",
    "costPerUCBWinLossLossPow3",
    "costPerUCBWinLossLossPow7",
    "costPerUCBScoreLoss",
    "costPerLogPolicy",
    "costPerMovesExpanded",
    "costPerSquaredMovesExpanded",
    "costWhenPassFavored",
    "bonusPerWinLossError",
    "bonusPerScoreError",
    "bonusPerSharpScoreDiscrepancy",
    "bonusPerExcessUnexpandedPolicy",
    "bonusPerUnexpandedBestWinLoss",
    "bonusForWLPV1",
    "bonusForWLPV2",
    "bonusForBiggestWLCost",
    "scoreLossCap",
    "earlyBookCostReductionFactor",
    "earlyBookCostReductionLambda",
    "utilityPerScore",
    "policyBoostSoftUtilityScale",
    "utilityPerPolicyForSorting",
    "maxVisitsForReExpansion",
    "visitsScale",
];

/// version 2 で追加された係数
const V2_ONLY_PARAM_FIELDS: &[&str] = &[
    "bonusPerUnexpandedBestWinLoss",
    "earlyBookCostReductionFactor",
    "earlyBookCostReductionLambda",
    "maxVisitsForReExpansion",
    "visitsScale",
];

/// version 2 で必須の上書きテーブル
const OVERRIDE_FIELDS: &[&str] = &[
    "bonusByHash",
    "expandBonusByHash",
    "visitsRequiredByHash",
    "branchRequiredByHash",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeaderOut<'a, B> {
    version: u32,
    initial_board: &'a B,
    initial_rules: &'a Rules,
    initial_pla: Player,
    rep_bound: usize,
    params: &'a BookParams,
    overrides: &'a HashOverrides,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    hash: BookHash,
    pla: Player,
    symmetries: Vec<Symmetry>,
    values: BookValues,
    can_expand: bool,
    moves: Vec<BookMove>,
}

impl NodeRecord {
    fn of(node: &BookNode) -> Self {
        Self {
            hash: node.hash,
            pla: node.pla,
            symmetries: node.symmetries.to_vec(),
            values: node.this_values_not_in_book,
            can_expand: node.can_expand,
            moves: node.moves.values().copied().collect(),
        }
    }
}

impl NodeRecord {
    /// 盤サイズに合わない対称変換・盤外の手・重複した手を拒否する
    fn validate(&self, width: usize, height: usize) -> BookResult<()> {
        let malformed = |reason: String| BookError::MalformedNode {
            hash: self.hash,
            reason,
        };
        if let Some(s) = self.symmetries.iter().find(|s| !s.is_valid_for(width, height)) {
            return Err(malformed(format!("symmetry {s} on a {width}x{height} board")));
        }
        let mut moves = HashSet::new();
        for edge in &self.moves {
            if !edge.mv.is_on_board(width, height) {
                return Err(malformed(format!("move {} is off the board", edge.mv)));
            }
            if !edge.symmetry_to_align.is_valid_for(width, height) {
                return Err(malformed(format!(
                    "move {} has symmetry {} on a {width}x{height} board",
                    edge.mv, edge.symmetry_to_align
                )));
            }
            if !moves.insert(edge.mv) {
                return Err(malformed(format!("move {} appears twice", edge.mv)));
            }
        }
        Ok(())
    }
}

/// ヘッダから必須のフィールドを取り出す
fn take_field(header: &mut Map<String, Value>, version: u32, field: &'static str) -> BookResult<Value> {
    header
        .remove(field)
        .ok_or(BookError::MissingField { version, field })
}

/// 係数を読む。version 1 では v2 で追加された係数を無効値で補う。
fn read_params(value: Value, version: u32, sharp_score_outlier_cap: f64) -> BookResult<BookParams> {
    let Value::Object(given) = value else {
        return Err(BookError::InvalidConfig("params must be an object".to_string()));
    };
    for &field in PARAM_FIELDS {
        let required = version >= 2 || !V2_ONLY_PARAM_FIELDS.contains(&field);
        if required && !given.contains_key(field) {
            return Err(BookError::MissingField { version, field });
        }
    }
    let base = if version >= 2 {
        BookParams::default()
    } else {
        BookParams::default().neutral_v1()
    };
    let Value::Object(mut merged) = serde_json::to_value(base)? else {
        return Err(BookError::InvalidConfig("params must serialize to an object".to_string()));
    };
    merged.extend(given);
    let mut params: BookParams = serde_json::from_value(Value::Object(merged))?;
    params.sharp_score_outlier_cap = sharp_score_outlier_cap;
    Ok(params)
}

/// 上書きテーブルを読む。version 1 ではどのテーブルも省略できる。
fn read_overrides(value: Option<Value>, version: u32) -> BookResult<HashOverrides> {
    let given = match value {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(BookError::InvalidConfig("overrides must be an object".to_string())),
        None if version >= 2 => {
            return Err(BookError::MissingField {
                version,
                field: "overrides",
            });
        }
        None => Map::new(),
    };
    if version >= 2 {
        for &field in OVERRIDE_FIELDS {
            if !given.contains_key(field) {
                return Err(BookError::MissingField { version, field });
            }
        }
    }
    Ok(serde_json::from_value(Value::Object(given))?)
}

impl<B: GameBoard> Book<B> {
    /// ファイルに保存する（拡張子 .gz なら gzip）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> BookResult<()> {
        let path = path.as_ref();
        let mut out = open_writer(path)?;
        let header = HeaderOut {
            version: self.book_version,
            initial_board: &self.initial_board,
            initial_rules: &self.initial_rules,
            initial_pla: self.initial_pla,
            rep_bound: self.rep_bound,
            params: &self.params,
            overrides: &self.overrides,
        };
        serde_json::to_writer(&mut out, &header)?;
        out.write_all(b"\n")?;

        let order = std::iter::once(self.root).chain((0..self.nodes.len()).filter(|&i| i != self.root));
        for idx in order {
            serde_json::to_writer(&mut out, &NodeRecord::of(&self.nodes[idx]))?;
            out.write_all(b"\n")?;
        }
        out.close()?;
        info!("Saved book with {} nodes to {}", self.nodes.len(), path.display());
        Ok(())
    }

    /// ファイルから読み込む
    ///
    /// 全ノードを読み、逆辺を再構築してから全体を再計算する。途中で不整合があれば
    /// 何も返さずにエラーとする。
    pub fn load_from_file<P: AsRef<Path>>(path: P, sharp_score_outlier_cap: f64) -> BookResult<Self> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .transpose()?
            .ok_or_else(|| BookError::InvalidConfig("empty book file".to_string()))?;
        let Value::Object(mut header) = serde_json::from_str(&header_line)? else {
            return Err(BookError::InvalidConfig("header must be an object".to_string()));
        };

        let version_value = take_field(&mut header, 0, "version")?;
        let version = version_value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| BookError::InvalidConfig(format!("bad version {version_value}")))?;
        if version == 0 || version > LATEST_BOOK_VERSION {
            return Err(BookError::UnsupportedVersion(version));
        }

        let initial_board: B = serde_json::from_value(take_field(&mut header, version, "initialBoard")?)?;
        let initial_rules: Rules = serde_json::from_value(take_field(&mut header, version, "initialRules")?)?;
        let initial_pla: Player = serde_json::from_value(take_field(&mut header, version, "initialPla")?)?;
        let rep_bound: usize = serde_json::from_value(take_field(&mut header, version, "repBound")?)?;
        let params = read_params(take_field(&mut header, version, "params")?, version, sharp_score_outlier_cap)?;
        let overrides = read_overrides(header.remove("overrides"), version)?;

        let mut book = Book::new(version, initial_board, initial_rules, initial_pla, rep_bound, params)?;
        book.overrides = overrides;
        let root_hash = book.nodes[book.root].hash;
        let (width, height) = book.dims();

        let mut seen_root = false;
        let mut seen: HashSet<BookHash> = HashSet::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: NodeRecord = serde_json::from_str(&line)?;
            record.validate(width, height)?;
            if !seen.insert(record.hash) {
                return Err(BookError::DuplicateNode(record.hash));
            }
            if !seen_root {
                if record.hash != root_hash {
                    return Err(BookError::RootMismatch {
                        expected: root_hash,
                        found: record.hash,
                    });
                }
                seen_root = true;
            }

            let mut node = BookNode::new(record.hash, record.pla, record.symmetries.into_iter().collect());
            node.this_values_not_in_book = record.values;
            node.can_expand = record.can_expand;
            for edge in record.moves {
                node.moves.insert(edge.mv, BookMove::new(edge.mv, edge.symmetry_to_align, edge.hash, edge.raw_policy));
            }
            if record.hash == root_hash {
                book.nodes[book.root] = node;
            } else {
                book.add(node)?;
            }
        }
        if !seen_root {
            return Err(BookError::MissingRoot);
        }

        // 逆辺は辺から再構築する
        let mut back_edges = Vec::new();
        for node in &book.nodes {
            for (&loc, edge) in &node.moves {
                let child = book.idx_of(&edge.hash).ok_or_else(|| BookError::DanglingEdge {
                    parent: node.hash,
                    mv: loc.to_string(),
                    child: edge.hash,
                })?;
                back_edges.push((child, node.hash, loc));
            }
        }
        for (child, parent_hash, loc) in back_edges {
            book.nodes[child].parents.push((parent_hash, loc));
        }

        book.recompute_everything();
        info!("Loaded book with {} nodes from {}", book.nodes.len(), path.display());
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Loc;

    #[test]
    fn test_param_field_list_matches_serialized_params() {
        let value = serde_json::to_value(BookParams::default()).unwrap();
        let keys: HashSet<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let listed: HashSet<&str> = PARAM_FIELDS.iter().copied().collect();
        assert_eq!(keys, listed);
        assert!(V2_ONLY_PARAM_FIELDS.iter().all(|f| listed.contains(f)));
    }

    #[test]
    fn test_v1_params_default_to_neutral() {
        let mut given = serde_json::to_value(BookParams::default()).unwrap();
        let obj = given.as_object_mut().unwrap();
        for f in V2_ONLY_PARAM_FIELDS {
            obj.remove(*f);
        }
        let params = read_params(given.clone(), 1, 3.0).unwrap();
        assert_eq!(params.visits_scale, 0.0);
        assert_eq!(params.early_book_cost_reduction_factor, 0.0);
        assert_eq!(params.cost_per_move, BookParams::default().cost_per_move);
        assert_eq!(params.sharp_score_outlier_cap, 3.0);

        match read_params(given, 2, 3.0) {
            Err(BookError::MissingField { version: 2, .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_overrides_by_version() {
        assert!(read_overrides(None, 1).unwrap().is_empty());
        assert!(matches!(
            read_overrides(None, 2),
            Err(BookError::MissingField { field: "overrides", .. })
        ));
        let partial = serde_json::json!({ "bonusByHash": {} });
        assert!(matches!(
            read_overrides(Some(partial), 2),
            Err(BookError::MissingField { field: "expandBonusByHash", .. })
        ));
    }

    #[test]
    fn test_v1_overrides_keep_every_table() {
        let hash = BookHash::default();
        let given = serde_json::json!({
            "bonusByHash": { hash.to_string(): 0.5 },
            "expandBonusByHash": { hash.to_string(): 1.5 },
            "visitsRequiredByHash": { hash.to_string(): 100.0 },
        });
        let overrides = read_overrides(Some(given), 1).unwrap();
        assert_eq!(overrides.bonus_by_hash.get(&hash), Some(&0.5));
        assert_eq!(overrides.expand_bonus_by_hash.get(&hash), Some(&1.5));
        assert_eq!(overrides.visits_required_by_hash.get(&hash), Some(&100.0));
        assert!(overrides.branch_required_by_hash.is_empty());
    }

    fn record(moves: Vec<BookMove>, symmetries: Vec<Symmetry>) -> NodeRecord {
        NodeRecord {
            hash: BookHash::default(),
            pla: Player::Black,
            symmetries,
            values: BookValues::default(),
            can_expand: true,
            moves,
        }
    }

    #[test]
    fn test_record_validation() {
        let id = Symmetry::IDENTITY;
        let transpose = Symmetry::new(4).unwrap();
        let edge = |loc: Loc, s: Symmetry| BookMove::new(loc, s, BookHash::default(), 0.1);

        let ok = record(vec![edge(Loc::point(4, 2), id), edge(Loc::Pass, id)], vec![id]);
        assert!(ok.validate(5, 3).is_ok());

        let off_board = record(vec![edge(Loc::point(5, 0), id)], vec![id]);
        assert!(matches!(off_board.validate(5, 3), Err(BookError::MalformedNode { .. })));
        let off_board = record(vec![edge(Loc::point(0, 3), id)], vec![id]);
        assert!(matches!(off_board.validate(5, 3), Err(BookError::MalformedNode { .. })));

        // 長方形の盤では転置を含む変換は使えない
        let bad_align = record(vec![edge(Loc::point(0, 0), transpose)], vec![id]);
        assert!(bad_align.validate(5, 5).is_ok());
        assert!(matches!(bad_align.validate(5, 3), Err(BookError::MalformedNode { .. })));
        let bad_sym = record(vec![], vec![id, transpose]);
        assert!(matches!(bad_sym.validate(5, 3), Err(BookError::MalformedNode { .. })));

        let twice = record(vec![edge(Loc::point(1, 1), id), edge(Loc::point(1, 1), id)], vec![id]);
        assert!(matches!(twice.validate(5, 3), Err(BookError::MalformedNode { .. })));
    }
}
