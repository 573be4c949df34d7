//! 定跡（opening book）モジュール
//!
//! 局面を対称変換と手順の合流でまとめた DAG として持ち、ミニマックスで
//! 集約した評価値と、次に展開すべき局面を選ぶためのコストを維持する。
//!
//! - `BookHash`: 対称変換で正規化した局面ハッシュ
//! - `BookNode` / `BookMove`: ノードと辺（ノードの正規座標系）
//! - `SymBookNode` / `NodeView`: 実際の対局の向きでノードを扱うビュー
//! - `Book`: グラフ本体（追加・走査・再計算・展開候補の選択）
//! - 保存形式は JSON Lines（`.gz` なら gzip）
//! - `export_to_html_dir`: 閲覧用の HTML 出力

mod cost;
mod error;
mod export;
mod graph;
mod hash;
mod io;
mod node;
mod params;
mod persist;
mod recompute;
mod values;
mod view;


pub use error::{BookError, BookResult};
pub use export::HtmlExportOptions;
pub use graph::{Book, DfsAction, LATEST_BOOK_VERSION};
pub use hash::{BookHash, HashAndSymmetry, SymmetryList};
pub use node::{BookMove, BookNode, NodeIdx};
pub use params::{BookParams, HashOverrides};
pub use values::{BookValues, RecursiveBookValues, TERRITORY_ERROR_SCALE};
pub use view::{IllegalReplay, NodeView, SymBookNode};
