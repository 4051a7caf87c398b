//! Two-party secret shares over the ring `Z_2^64` and over bits.
//!
//! - [ArithShare]: additive share, the secret is the wrapping sum of both shares.
//! - [BitShare]: XOR share of a single bit.
//! - [XorShare]: XOR share of a 64-bit word, used for packed boolean circuits and XOR-shared indices.
//!
//! Secret values are signed integers embedded into the ring. Admissible values satisfy
//! `|v| <= MAX_ABS_VALUE` so that the difference of two values never wraps around the sign bit.
use std::ops::{Add, AddAssign, BitAnd, BitXor, BitXorAssign, Mul, Neg, Shl, Shr, Sub, SubAssign};

use crate::network::NetSerializable;
use crate::party::error::{MpcError, MpcResult};
use crate::party::Role;

/// Largest admissible absolute value of a stored value or target.
pub const MAX_ABS_VALUE: i64 = (1 << 62) - 1;

/// Value read at padded positions; strictly greater than every admissible target.
pub const PAD_VALUE: i64 = 1 << 62;

/// Provides the neutral element of addition
pub trait HasZero {
    /// Zero the neutral element of addition
    const ZERO: Self;
}

/// A party's additive share of a ring element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArithShare(pub u64);

/// A party's XOR share of a single bit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitShare(pub bool);

/// A party's XOR share of a 64-bit word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XorShare(pub u64);

/// Returns the local share of the public constant `value`.
///
/// [Role::P0] holds the literal value and [Role::P1] holds zero, so that the shares sum to `value`.
pub fn as_local_share(value: u64, role: Role) -> ArithShare {
    match role {
        Role::P0 => ArithShare(value),
        Role::P1 => ArithShare::ZERO,
    }
}

/// Embeds a signed value into the ring.
pub fn encode(value: i64) -> u64 {
    value as u64
}

/// Interprets a ring element as signed value.
pub fn decode(value: u64) -> i64 {
    value as i64
}

/// Embeds `value` into the ring if it lies in the admissible range.
pub fn encode_checked(value: i64) -> MpcResult<u64> {
    if value.unsigned_abs() > MAX_ABS_VALUE as u64 {
        return Err(MpcError::InvalidParameters(format!(
            "value {} exceeds the admissible range of +-{}",
            value, MAX_ABS_VALUE
        )));
    }
    Ok(encode(value))
}

impl HasZero for ArithShare {
    const ZERO: Self = ArithShare(0);
}

impl HasZero for XorShare {
    const ZERO: Self = XorShare(0);
}

impl HasZero for BitShare {
    const ZERO: Self = BitShare(false);
}

impl Add for ArithShare {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for ArithShare {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for ArithShare {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(self.0.wrapping_neg())
    }
}

/// Multiplies the share with a public scalar.
impl Mul<u64> for ArithShare {
    type Output = Self;
    fn mul(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_mul(rhs))
    }
}

impl AddAssign for ArithShare {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl SubAssign for ArithShare {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl BitShare {
    /// Returns the local share of the public bit `bit`.
    pub fn constant(bit: bool, role: Role) -> Self {
        match role {
            Role::P0 => Self(bit),
            Role::P1 => Self::ZERO,
        }
    }

    /// Local share of the negated bit.
    pub fn not(self, role: Role) -> Self {
        self ^ Self::constant(true, role)
    }
}

impl BitXor for BitShare {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl XorShare {
    /// Returns the local share of the public word `value`.
    pub fn constant(value: u64, role: Role) -> Self {
        match role {
            Role::P0 => Self(value),
            Role::P1 => Self::ZERO,
        }
    }

    /// Local share of the bitwise complement.
    pub fn not(self, role: Role) -> Self {
        self ^ Self::constant(u64::MAX, role)
    }

    /// Share of bit `i` of the word.
    pub fn bit(self, i: u32) -> BitShare {
        BitShare((self.0 >> i) & 1 == 1)
    }

    /// Share of the word whose lowest bit is `bit` and all other bits are zero.
    pub fn from_bit(bit: BitShare) -> Self {
        Self(bit.0 as u64)
    }
}

impl BitXor for XorShare {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for XorShare {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

/// Bitwise AND with a public mask.
impl BitAnd<u64> for XorShare {
    type Output = Self;
    fn bitand(self, rhs: u64) -> Self::Output {
        Self(self.0 & rhs)
    }
}

impl Shl<u32> for XorShare {
    type Output = Self;
    fn shl(self, rhs: u32) -> Self::Output {
        Self(self.0 << rhs)
    }
}

impl Shr<u32> for XorShare {
    type Output = Self;
    fn shr(self, rhs: u32) -> Self::Output {
        Self(self.0 >> rhs)
    }
}

impl NetSerializable for ArithShare {
    fn serialized_size(n_elements: usize) -> usize {
        u64::serialized_size(n_elements)
    }

    fn as_byte_vec(elements: &[Self]) -> Vec<u8> {
        elements.iter().flat_map(|x| x.0.to_le_bytes()).collect()
    }

    fn from_byte_vec(v: &[u8], len: usize) -> Vec<Self> {
        u64::from_byte_vec(v, len).into_iter().map(ArithShare).collect()
    }
}

impl NetSerializable for XorShare {
    fn serialized_size(n_elements: usize) -> usize {
        u64::serialized_size(n_elements)
    }

    fn as_byte_vec(elements: &[Self]) -> Vec<u8> {
        elements.iter().flat_map(|x| x.0.to_le_bytes()).collect()
    }

    fn from_byte_vec(v: &[u8], len: usize) -> Vec<Self> {
        u64::from_byte_vec(v, len).into_iter().map(XorShare).collect()
    }
}

#[cfg(test)]
pub mod test {
    use super::{ArithShare, BitShare, HasZero, XorShare};

    pub fn reconstruct_arith(s0: ArithShare, s1: ArithShare) -> u64 {
        (s0 + s1).0
    }

    pub fn reconstruct_signed(s0: ArithShare, s1: ArithShare) -> i64 {
        super::decode(reconstruct_arith(s0, s1))
    }

    pub fn reconstruct_bit(s0: BitShare, s1: BitShare) -> bool {
        (s0 ^ s1).0
    }

    pub fn reconstruct_xor(s0: XorShare, s1: XorShare) -> u64 {
        (s0 ^ s1).0
    }

    pub fn consistent_arith(s0: &[ArithShare], s1: &[ArithShare], expected: &[u64]) {
        assert_eq!(s0.len(), expected.len());
        assert_eq!(s1.len(), expected.len());
        for (i, e) in expected.iter().enumerate() {
            assert_eq!(reconstruct_arith(s0[i], s1[i]), *e, "mismatch at position {}", i);
        }
    }

    use crate::network::NetSerializable;
    use crate::party::Role;

    #[test]
    fn local_constants() {
        let s0 = super::as_local_share(42, Role::P0);
        let s1 = super::as_local_share(42, Role::P1);
        assert_eq!(s1, ArithShare(0));
        assert_eq!(reconstruct_arith(s0, s1), 42);

        let b0 = BitShare::constant(true, Role::P0);
        let b1 = BitShare::constant(true, Role::P1);
        assert!(reconstruct_bit(b0, b1));
        assert!(!reconstruct_bit(b0.not(Role::P0), b1.not(Role::P1)));

        let w0 = XorShare(0xdead_beef).not(Role::P0);
        let w1 = XorShare(0xdead_beef).not(Role::P1);
        assert_eq!(reconstruct_xor(w0, w1), u64::MAX);
    }

    #[test]
    fn zeros_are_neutral() {
        let a = ArithShare(0xfeed);
        assert_eq!(a + ArithShare::ZERO, a);
        assert_eq!(ArithShare::ZERO - a, -a);
        assert_eq!(XorShare(0xfeed) ^ XorShare::ZERO, XorShare(0xfeed));
        assert_eq!(BitShare(true) ^ BitShare::ZERO, BitShare(true));
        assert_eq!(XorShare::constant(7, Role::P1), XorShare::ZERO);
        assert_eq!(BitShare::constant(true, Role::P1), BitShare::ZERO);
    }

    #[test]
    fn arithmetic_is_wrapping() {
        let a = ArithShare(u64::MAX);
        let b = ArithShare(2);
        assert_eq!(a + b, ArithShare(1));
        assert_eq!(b - a, ArithShare(3));
        assert_eq!(-ArithShare(1), ArithShare(u64::MAX));
        assert_eq!(ArithShare(1 << 63) * 2, ArithShare(0));
        assert_eq!(reconstruct_signed(ArithShare(5), ArithShare(super::encode(-7))), -2);
    }

    #[test]
    fn bits_of_words() {
        let w = XorShare(0b1011);
        assert_eq!(w.bit(0), BitShare(true));
        assert_eq!(w.bit(2), BitShare(false));
        assert_eq!(w.bit(3), BitShare(true));
        assert_eq!(XorShare::from_bit(BitShare(true)), XorShare(1));
        assert_eq!((w << 62).bit(63), BitShare(true));
        assert_eq!((w >> 1) & 1, XorShare(1));
    }

    #[test]
    fn encode_checked_range() {
        assert!(super::encode_checked(super::MAX_ABS_VALUE).is_ok());
        assert!(super::encode_checked(-super::MAX_ABS_VALUE).is_ok());
        assert!(super::encode_checked(super::PAD_VALUE).is_err());
        assert!(super::encode_checked(i64::MIN).is_err());
    }

    #[test]
    fn share_serialization() {
        let shares = vec![ArithShare(7), ArithShare(u64::MAX)];
        let bytes = ArithShare::as_byte_vec(&shares);
        assert_eq!(ArithShare::from_byte_vec(&bytes, 2), shares);
        let words = vec![XorShare(1), XorShare(1 << 40)];
        let bytes = XorShare::as_byte_vec(&words);
        assert_eq!(XorShare::from_byte_vec(&bytes, 2), words);
    }
}
