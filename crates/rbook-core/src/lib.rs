//! rbook-core: 二人対戦盤面ゲーム向けの定跡エンジン
//!
//! - `types`: 手番・着手位置・対称変換・ハッシュの基本型
//! - `position`: 盤面・ルール・履歴（book が局面に要求する操作）
//! - `book`: 定跡グラフ本体

pub mod book;
pub mod position;
pub mod types;
