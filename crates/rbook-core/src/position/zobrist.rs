//! Zobristハッシュ
//!
//! 乱数は固定シードの Xoshiro256++ で生成する。book ファイルはハッシュを
//! そのまま保存するため、シードと生成順序を変えると既存の book が読めなくなる。

use crate::types::{Hash128, Player, MAX_BOARD_LEN};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::LazyLock;

/// 連続パス数として区別する上限（2 で終局）
pub const MAX_TRACKED_PASSES: usize = 3;

const ZOBRIST_SEED: u64 = 0x5242_4F4F_4B5A_4F42;

/// Zobristハッシュ用乱数テーブル
pub struct Zobrist {
    /// 石×交点 [Player.index()][y * MAX_BOARD_LEN + x]
    pub stone: [[Hash128; MAX_BOARD_LEN * MAX_BOARD_LEN]; Player::NUM],
    /// 手番用
    pub player: [Hash128; Player::NUM],
    /// 直前の連続パス数
    pub passes: [Hash128; MAX_TRACKED_PASSES],
    /// 盤の横幅・縦幅
    pub width: [Hash128; MAX_BOARD_LEN + 1],
    pub height: [Hash128; MAX_BOARD_LEN + 1],
    /// 計数ルール [Area, Territory]
    pub scoring: [Hash128; 2],
}

impl Zobrist {
    fn init() -> Box<Self> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);
        let mut next = || Hash128::new(rng.next_u64(), rng.next_u64());

        let mut zobrist = Box::new(Zobrist {
            stone: [[Hash128::ZERO; MAX_BOARD_LEN * MAX_BOARD_LEN]; Player::NUM],
            player: [Hash128::ZERO; Player::NUM],
            passes: [Hash128::ZERO; MAX_TRACKED_PASSES],
            width: [Hash128::ZERO; MAX_BOARD_LEN + 1],
            height: [Hash128::ZERO; MAX_BOARD_LEN + 1],
            scoring: [Hash128::ZERO; 2],
        });

        for pla in 0..Player::NUM {
            for h in zobrist.stone[pla].iter_mut() {
                *h = next();
            }
        }
        for h in zobrist.player.iter_mut() {
            *h = next();
        }
        // passes[0] は「直前がパスでない」状態なので 0 のまま
        for h in zobrist.passes.iter_mut().skip(1) {
            *h = next();
        }
        for h in zobrist.width.iter_mut() {
            *h = next();
        }
        for h in zobrist.height.iter_mut() {
            *h = next();
        }
        for h in zobrist.scoring.iter_mut() {
            *h = next();
        }
        zobrist
    }
}

/// グローバルZobristテーブル
pub static ZOBRIST: LazyLock<Box<Zobrist>> = LazyLock::new(Zobrist::init);

/// 石と交点のハッシュを取得
#[inline]
pub fn zobrist_stone(pla: Player, x: usize, y: usize) -> Hash128 {
    ZOBRIST.stone[pla.index()][y * MAX_BOARD_LEN + x]
}

/// 手番のハッシュを取得
#[inline]
pub fn zobrist_player(pla: Player) -> Hash128 {
    ZOBRIST.player[pla.index()]
}

/// 連続パス数のハッシュを取得
#[inline]
pub fn zobrist_passes(passes: usize) -> Hash128 {
    ZOBRIST.passes[passes.min(MAX_TRACKED_PASSES - 1)]
}

/// 盤サイズのハッシュを取得
#[inline]
pub fn zobrist_size(width: usize, height: usize) -> Hash128 {
    ZOBRIST.width[width.min(MAX_BOARD_LEN)] ^ ZOBRIST.height[height.min(MAX_BOARD_LEN)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zobrist_entries_are_distinct() {
        let a = zobrist_stone(Player::Black, 0, 0);
        let b = zobrist_stone(Player::White, 0, 0);
        let c = zobrist_stone(Player::Black, 1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(zobrist_player(Player::Black), zobrist_player(Player::White));
        assert_eq!(zobrist_passes(0), Hash128::ZERO);
        assert_ne!(zobrist_passes(1), zobrist_passes(2));
    }

    #[test]
    fn test_zobrist_is_deterministic() {
        // 固定シードなので別インスタンスでも同じ値になる
        let fresh = Zobrist::init();
        assert_eq!(fresh.stone[0][7], ZOBRIST.stone[0][7]);
        assert_eq!(fresh.scoring, ZOBRIST.scoring);
    }
}
