//! book のエラー型

use super::hash::BookHash;
use thiserror::Error;

/// book の読み込み・構築で発生するエラー
#[derive(Debug, Error)]
pub enum BookError {
    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON の構文・型エラー
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// 対応していないスキーマバージョン
    #[error("Unsupported book version {0}")]
    UnsupportedVersion(u32),

    /// 宣言されたバージョンでは必須のフィールドが無い
    #[error("Book version {version} requires field `{field}`")]
    MissingField { version: u32, field: &'static str },

    /// ハッシュ文字列の形式不正
    #[error("Malformed book hash: {0}")]
    MalformedHash(String),

    /// 着手文字列の形式不正
    #[error("Malformed move: {0}")]
    MalformedMove(String),

    /// 同じハッシュのノードが複数ある
    #[error("Duplicate node {0}")]
    DuplicateNode(BookHash),

    /// 辺の行き先ノードが存在しない
    #[error("Node {parent} has an edge {mv} to missing node {child}")]
    DanglingEdge {
        parent: BookHash,
        mv: String,
        child: BookHash,
    },

    /// ノード記録の内容が盤サイズと矛盾する
    #[error("Malformed node {hash}: {reason}")]
    MalformedNode { hash: BookHash, reason: String },

    /// 根ノードが無い
    #[error("Book has no root node")]
    MissingRoot,

    /// 初期局面から計算した根のハッシュが保存内容と一致しない
    #[error("Root hash mismatch: expected {expected}, found {found}")]
    RootMismatch { expected: BookHash, found: BookHash },

    /// 初期設定が不正（盤面と手番・バージョンの組み合わせなど）
    #[error("Invalid book configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for book operations
pub type BookResult<T> = Result<T, BookError>;
