//! 128bit ハッシュ（Hash128）と混合関数

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign};
use std::str::FromStr;

/// 128bit ハッシュ値
///
/// 順序は `hash1`（上位）→ `hash0`（下位）の順に比較する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash128 {
    pub hash0: u64,
    pub hash1: u64,
}

impl Hash128 {
    pub const ZERO: Hash128 = Hash128 { hash0: 0, hash1: 0 };

    #[inline]
    pub const fn new(hash0: u64, hash1: u64) -> Self {
        Self { hash0, hash1 }
    }

    /// 手順ハッシュの累積: 加算してから両半分を別々の関数で攪拌する
    #[inline]
    pub fn accumulate(self, next: Hash128) -> Hash128 {
        Hash128 {
            hash0: split_mix64(self.hash0.wrapping_add(next.hash0)),
            hash1: nasam(self.hash1.wrapping_add(next.hash1)),
        }
    }
}

impl PartialOrd for Hash128 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash128 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash1.cmp(&other.hash1).then(self.hash0.cmp(&other.hash0))
    }
}

macro_rules! impl_hash128_bitop {
    ($tr:ident, $f:ident, $tra:ident, $fa:ident, $op:tt) => {
        impl $tr for Hash128 {
            type Output = Hash128;
            #[inline]
            fn $f(self, rhs: Hash128) -> Hash128 {
                Hash128 { hash0: self.hash0 $op rhs.hash0, hash1: self.hash1 $op rhs.hash1 }
            }
        }
        impl $tra for Hash128 {
            #[inline]
            fn $fa(&mut self, rhs: Hash128) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_hash128_bitop!(BitXor, bitxor, BitXorAssign, bitxor_assign, ^);
impl_hash128_bitop!(BitOr, bitor, BitOrAssign, bitor_assign, |);
impl_hash128_bitop!(BitAnd, bitand, BitAndAssign, bitand_assign, &);

/// 32桁の16進数（上位 `hash1` が先）
impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}{:016X}", self.hash1, self.hash0)
    }
}

/// ハッシュ文字列の解析エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hash string: {0:?}")]
pub struct ParseHashError(pub String);

impl FromStr for Hash128 {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(ParseHashError(s.to_string()));
        }
        let hash1 = u64::from_str_radix(&s[..16], 16).map_err(|_| ParseHashError(s.to_string()))?;
        let hash0 = u64::from_str_radix(&s[16..], 16).map_err(|_| ParseHashError(s.to_string()))?;
        Ok(Hash128 { hash0, hash1 })
    }
}

/// SplitMix64 の出力関数
#[inline]
pub const fn split_mix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// NASAM（Pelle Evensen）の混合関数
#[inline]
pub const fn nasam(x: u64) -> u64 {
    let mut x = x;
    x ^= x.rotate_right(25) ^ x.rotate_right(47);
    x = x.wrapping_mul(0x9E6C_63D0_676A_9A99);
    x ^= (x >> 23) ^ (x >> 51);
    x = x.wrapping_mul(0x9E6D_62D0_6F6A_9A9B);
    x ^= (x >> 23) ^ (x >> 51);
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash128_string_roundtrip() {
        let h = Hash128::new(0x0123_4567_89AB_CDEF, 0xFEDC_BA98_7654_3210);
        let s = h.to_string();
        assert_eq!(s, "FEDCBA98765432100123456789ABCDEF");
        assert_eq!(s.parse::<Hash128>().unwrap(), h);
    }

    #[test]
    fn test_hash128_parse_rejects_bad_length() {
        assert!("ABC".parse::<Hash128>().is_err());
        assert!("ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ".parse::<Hash128>().is_err());
    }

    #[test]
    fn test_hash128_order_high_word_first() {
        let a = Hash128::new(u64::MAX, 0);
        let b = Hash128::new(0, 1);
        assert!(a < b);
    }

    #[test]
    fn test_accumulate_is_order_sensitive() {
        let a = Hash128::new(1, 2);
        let b = Hash128::new(3, 4);
        let ab = Hash128::ZERO.accumulate(a).accumulate(b);
        let ba = Hash128::ZERO.accumulate(b).accumulate(a);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_bitops() {
        let a = Hash128::new(0b1100, 0b1010);
        let b = Hash128::new(0b1010, 0b0110);
        assert_eq!(a ^ b, Hash128::new(0b0110, 0b1100));
        assert_eq!(a | b, Hash128::new(0b1110, 0b1110));
        assert_eq!(a & b, Hash128::new(0b1000, 0b0010));
    }
}
