//! 局面表現モジュール
//!
//! book から見た盤面・ルール側の協調者との境界。
//!
//! - `GameBoard`: 盤面に要求する操作（合法性判定・ハッシュ・対称変換）
//! - `PlacementBoard`: `GameBoard` の参照実装（石を置くだけの盤）
//! - `Rules`: 計数ルールとコミ
//! - `BoardHistory`: 初期局面と着手列、パス・終局・手番の管理
//! - `Zobrist`: Zobristハッシュ乱数テーブル

mod board;
mod history;
mod rules;
mod zobrist;

pub use board::{GameBoard, PlacementBoard};
pub use history::{BoardHistory, HistoryMove, PASSES_TO_END_GAME};
pub use rules::{Rules, ScoringRule};
pub use zobrist::{zobrist_passes, zobrist_player, zobrist_size, zobrist_stone, ZOBRIST};
