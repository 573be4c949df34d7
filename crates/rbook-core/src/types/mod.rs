//! 基本型
//!
//! - `Player`: 手番
//! - `Loc`: 着手位置（交点またはパス）
//! - `Symmetry`: 盤の対称変換
//! - `Hash128`: 128bit ハッシュ

mod hash;
mod loc;
mod player;
mod symmetry;

pub use hash::{nasam, split_mix64, Hash128, ParseHashError};
pub use loc::{Loc, ParseLocError, MAX_BOARD_LEN};
pub use player::Player;
pub use symmetry::{InvalidSymmetry, Symmetry};
