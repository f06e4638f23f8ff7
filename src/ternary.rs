// SPDX-License-Identifier: Apache-2.0

//! Per-bit three-valued knowledge: each bit is known zero, known one, or
//! unknown.
//!
//! Vectors are stored least significant bit first. Knowledge only ever moves
//! from `Unknown` to a known value; `union` combines two sound facts about the
//! same value and `meet` keeps only what two alternatives agree on.

use crate::ir_value::IrBits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryValue {
    KnownZero,
    KnownOne,
    Unknown,
}

impl TernaryValue {
    pub fn from_bool(b: bool) -> Self {
        if b {
            TernaryValue::KnownOne
        } else {
            TernaryValue::KnownZero
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TernaryValue::Unknown)
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            TernaryValue::KnownZero => Some(false),
            TernaryValue::KnownOne => Some(true),
            TernaryValue::Unknown => None,
        }
    }

    pub fn not(self) -> Self {
        match self {
            TernaryValue::KnownZero => TernaryValue::KnownOne,
            TernaryValue::KnownOne => TernaryValue::KnownZero,
            TernaryValue::Unknown => TernaryValue::Unknown,
        }
    }

    pub fn and(self, rhs: Self) -> Self {
        use TernaryValue::*;
        match (self, rhs) {
            (KnownZero, _) | (_, KnownZero) => KnownZero,
            (KnownOne, KnownOne) => KnownOne,
            _ => Unknown,
        }
    }

    pub fn or(self, rhs: Self) -> Self {
        use TernaryValue::*;
        match (self, rhs) {
            (KnownOne, _) | (_, KnownOne) => KnownOne,
            (KnownZero, KnownZero) => KnownZero,
            _ => Unknown,
        }
    }

    pub fn xor(self, rhs: Self) -> Self {
        match (self.to_bool(), rhs.to_bool()) {
            (Some(a), Some(b)) => TernaryValue::from_bool(a != b),
            _ => TernaryValue::Unknown,
        }
    }

    /// Keeps a value only if both alternatives agree on it.
    pub fn meet(self, rhs: Self) -> Self {
        if self == rhs {
            self
        } else {
            TernaryValue::Unknown
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TernaryVector {
    bits: Vec<TernaryValue>,
}

/// Two facts about the same bit disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TernaryConflict {
    pub bit_index: usize,
}

impl TernaryVector {
    pub fn new(bits: Vec<TernaryValue>) -> Self {
        TernaryVector { bits }
    }

    pub fn unknown(width: usize) -> Self {
        TernaryVector {
            bits: vec![TernaryValue::Unknown; width],
        }
    }

    pub fn from_bits(bits: &IrBits) -> Self {
        TernaryVector {
            bits: bits.iter_lsb_to_msb().map(TernaryValue::from_bool).collect(),
        }
    }

    /// Parses an MSB-first string of `0`, `1` and `X`, with an optional
    /// `0b` prefix and `_` separators.
    pub fn from_msb_str(text: &str) -> Option<Self> {
        let digits = text.strip_prefix("0b").unwrap_or(text);
        let mut bits = Vec::new();
        for c in digits.chars().rev() {
            match c {
                '0' => bits.push(TernaryValue::KnownZero),
                '1' => bits.push(TernaryValue::KnownOne),
                'X' | 'x' => bits.push(TernaryValue::Unknown),
                '_' => {}
                _ => return None,
            }
        }
        Some(TernaryVector { bits })
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn get(&self, index: usize) -> TernaryValue {
        self.bits[index]
    }

    pub fn set(&mut self, index: usize, value: TernaryValue) {
        self.bits[index] = value;
    }

    pub fn bits(&self) -> &[TernaryValue] {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = TernaryValue> + '_ {
        self.bits.iter().copied()
    }

    pub fn is_fully_known(&self) -> bool {
        self.bits.iter().all(|b| b.is_known())
    }

    pub fn is_all_unknown(&self) -> bool {
        self.bits.iter().all(|b| !b.is_known())
    }

    pub fn known_count(&self) -> usize {
        self.bits.iter().filter(|b| b.is_known()).count()
    }

    pub fn unknown_count(&self) -> usize {
        self.width() - self.known_count()
    }

    /// True if every bit is known zero.
    pub fn is_known_zero(&self) -> bool {
        self.bits.iter().all(|b| *b == TernaryValue::KnownZero)
    }

    pub fn has_known_one(&self) -> bool {
        self.bits.iter().any(|b| *b == TernaryValue::KnownOne)
    }

    /// Returns the concrete value if every bit is known.
    pub fn to_known_bits(&self) -> Option<IrBits> {
        let bools: Option<Vec<bool>> = self.bits.iter().map(|b| b.to_bool()).collect();
        bools.map(|b| IrBits::from_lsb_is_0(&b))
    }

    /// Lowest value consistent with the known bits.
    pub fn min_value(&self) -> IrBits {
        IrBits::from_lsb_is_0(
            &self
                .bits
                .iter()
                .map(|b| *b == TernaryValue::KnownOne)
                .collect::<Vec<bool>>(),
        )
    }

    /// Highest value consistent with the known bits.
    pub fn max_value(&self) -> IrBits {
        IrBits::from_lsb_is_0(
            &self
                .bits
                .iter()
                .map(|b| *b != TernaryValue::KnownZero)
                .collect::<Vec<bool>>(),
        )
    }

    /// Number of known bits at the least significant end.
    pub fn count_trailing_known(&self) -> usize {
        self.bits.iter().take_while(|b| b.is_known()).count()
    }

    /// Number of known bits at the most significant end.
    pub fn count_leading_known(&self) -> usize {
        self.bits.iter().rev().take_while(|b| b.is_known()).count()
    }

    pub fn slice(&self, start: usize, width: usize) -> TernaryVector {
        TernaryVector {
            bits: self.bits[start..start + width].to_vec(),
        }
    }

    /// Concatenates `parts` where `parts[0]` lands in the most significant
    /// bits.
    pub fn concat(parts: &[TernaryVector]) -> TernaryVector {
        let mut bits = Vec::with_capacity(parts.iter().map(|p| p.width()).sum());
        for part in parts.iter().rev() {
            bits.extend_from_slice(&part.bits);
        }
        TernaryVector { bits }
    }

    pub fn zero_ext(&self, new_width: usize) -> TernaryVector {
        let mut bits = self.bits.clone();
        bits.resize(new_width, TernaryValue::KnownZero);
        TernaryVector { bits }
    }

    pub fn sign_ext(&self, new_width: usize) -> TernaryVector {
        let msb = self.bits.last().copied().unwrap_or(TernaryValue::KnownZero);
        let mut bits = self.bits.clone();
        bits.resize(new_width, msb);
        TernaryVector { bits }
    }

    pub fn not(&self) -> TernaryVector {
        self.map(TernaryValue::not)
    }

    fn map(&self, f: impl Fn(TernaryValue) -> TernaryValue) -> TernaryVector {
        TernaryVector {
            bits: self.bits.iter().map(|b| f(*b)).collect(),
        }
    }

    fn zip(&self, rhs: &TernaryVector, f: impl Fn(TernaryValue, TernaryValue) -> TernaryValue) -> TernaryVector {
        assert_eq!(self.width(), rhs.width(), "ternary operands must have equal widths");
        TernaryVector {
            bits: self
                .bits
                .iter()
                .zip(rhs.bits.iter())
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }

    pub fn and(&self, rhs: &TernaryVector) -> TernaryVector {
        self.zip(rhs, TernaryValue::and)
    }

    pub fn or(&self, rhs: &TernaryVector) -> TernaryVector {
        self.zip(rhs, TernaryValue::or)
    }

    pub fn xor(&self, rhs: &TernaryVector) -> TernaryVector {
        self.zip(rhs, TernaryValue::xor)
    }

    pub fn meet(&self, rhs: &TernaryVector) -> TernaryVector {
        self.zip(rhs, TernaryValue::meet)
    }

    /// Combines two sound descriptions of the same value. Where both know a
    /// bit they must agree.
    pub fn union(&self, rhs: &TernaryVector) -> Result<TernaryVector, TernaryConflict> {
        assert_eq!(self.width(), rhs.width(), "ternary operands must have equal widths");
        let mut bits = Vec::with_capacity(self.width());
        for (i, (a, b)) in self.bits.iter().zip(rhs.bits.iter()).enumerate() {
            match (a, b) {
                (TernaryValue::Unknown, other) | (other, TernaryValue::Unknown) => bits.push(*other),
                (x, y) if x == y => bits.push(*x),
                _ => return Err(TernaryConflict { bit_index: i }),
            }
        }
        Ok(TernaryVector { bits })
    }

    /// OR-reduction of all bits.
    pub fn or_reduce(&self) -> TernaryValue {
        self.bits
            .iter()
            .fold(TernaryValue::KnownZero, |acc, b| acc.or(*b))
    }

    pub fn and_reduce(&self) -> TernaryValue {
        self.bits
            .iter()
            .fold(TernaryValue::KnownOne, |acc, b| acc.and(*b))
    }

    pub fn xor_reduce(&self) -> TernaryValue {
        self.bits
            .iter()
            .fold(TernaryValue::KnownZero, |acc, b| acc.xor(*b))
    }

    /// Whether the two vectors can be proven equal (`KnownOne`), proven
    /// different (`KnownZero`), or neither.
    pub fn equals(&self, rhs: &TernaryVector) -> TernaryValue {
        let mut all_known_equal = true;
        for (a, b) in self.bits.iter().zip(rhs.bits.iter()) {
            match (a.to_bool(), b.to_bool()) {
                (Some(x), Some(y)) if x != y => return TernaryValue::KnownZero,
                (Some(_), Some(_)) => {}
                _ => all_known_equal = false,
            }
        }
        if all_known_equal {
            TernaryValue::KnownOne
        } else {
            TernaryValue::Unknown
        }
    }
}

impl std::fmt::Display for TernaryVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0b")?;
        for b in self.bits.iter().rev() {
            let c = match b {
                TernaryValue::KnownZero => '0',
                TernaryValue::KnownOne => '1',
                TernaryValue::Unknown => 'X',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TernaryVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
