// SPDX-License-Identifier: Apache-2.0

//! Pure-Rust bit vectors and values for the IR.
//!
//! `IrBits` is indexed with the least significant bit at index 0. All
//! arithmetic and comparisons are unsigned.

use std::cmp::Ordering;

use bitvec::prelude::*;

use crate::opt_error::OptError;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IrBits {
    bits: BitVec<u64, Lsb0>,
}

impl IrBits {
    pub fn zero(bit_count: usize) -> Self {
        IrBits {
            bits: BitVec::repeat(false, bit_count),
        }
    }

    pub fn all_ones(bit_count: usize) -> Self {
        IrBits {
            bits: BitVec::repeat(true, bit_count),
        }
    }

    pub fn from_lsb_is_0(bits: &[bool]) -> Self {
        IrBits {
            bits: bits.iter().copied().collect(),
        }
    }

    pub fn make_ubits(bit_count: usize, value: u64) -> Result<Self, OptError> {
        if bit_count < 64 && (value >> bit_count) != 0 {
            return Err(OptError::Value(format!(
                "value {} does not fit in {} bits",
                value, bit_count
            )));
        }
        let mut bits: BitVec<u64, Lsb0> = BitVec::repeat(false, bit_count);
        for i in 0..bit_count.min(64) {
            bits.set(i, (value >> i) & 1 == 1);
        }
        Ok(IrBits { bits })
    }

    /// Returns the value `1 << index` in `bit_count` bits.
    pub fn power_of_two(index: usize, bit_count: usize) -> Result<Self, OptError> {
        if index >= bit_count {
            return Err(OptError::Value(format!(
                "power of two 2^{} does not fit in {} bits",
                index, bit_count
            )));
        }
        let mut result = IrBits::zero(bit_count);
        result.bits.set(index, true);
        Ok(result)
    }

    /// Builds a value from a little-endian sequence of 64-bit limbs,
    /// truncated to `bit_count` bits.
    fn from_limbs(limbs: &[u64], bit_count: usize) -> Self {
        let mut bits: BitVec<u64, Lsb0> = BitVec::repeat(false, bit_count);
        for i in 0..bit_count {
            let limb = limbs.get(i / 64).copied().unwrap_or(0);
            bits.set(i, (limb >> (i % 64)) & 1 == 1);
        }
        IrBits { bits }
    }

    pub fn get_bit_count(&self) -> usize {
        self.bits.len()
    }

    pub fn get_bit(&self, index: usize) -> Result<bool, OptError> {
        match self.bits.get(index) {
            Some(b) => Ok(*b),
            None => Err(OptError::Value(format!(
                "bit index {} out of range for bits[{}]",
                index,
                self.bits.len()
            ))),
        }
    }

    /// Returns the bit at `index`.
    ///
    /// Panics if `index` is out of range, like slice indexing.
    pub fn bit(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn iter_lsb_to_msb(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().by_vals()
    }

    pub fn to_bools(&self) -> Vec<bool> {
        self.iter_lsb_to_msb().collect()
    }

    pub fn msb(&self) -> bool {
        self.bits.last().map(|b| *b).unwrap_or(false)
    }

    pub fn is_zero(&self) -> bool {
        self.bits.not_any()
    }

    pub fn is_all_ones(&self) -> bool {
        self.bits.all()
    }

    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn count_leading_ones(&self) -> usize {
        self.bits.iter().rev().take_while(|b| **b).count()
    }

    pub fn count_trailing_ones(&self) -> usize {
        self.bits.iter().take_while(|b| **b).count()
    }

    pub fn to_u64(&self) -> Result<u64, OptError> {
        if self.bits.iter().skip(64).any(|b| *b) {
            return Err(OptError::Value(format!(
                "bits[{}] value does not fit in u64",
                self.get_bit_count()
            )));
        }
        let mut value = 0u64;
        for (i, b) in self.bits.iter().take(64).enumerate() {
            if *b {
                value |= 1u64 << i;
            }
        }
        Ok(value)
    }

    pub fn to_usize(&self) -> Result<usize, OptError> {
        let value = self.to_u64()?;
        usize::try_from(value)
            .map_err(|_| OptError::Value(format!("value {} does not fit in usize", value)))
    }

    /// Returns `width` bits starting at bit `start`.
    ///
    /// Panics if the slice extends past the end of the value.
    pub fn width_slice(&self, start: usize, width: usize) -> IrBits {
        IrBits {
            bits: self.bits[start..start + width].to_bitvec(),
        }
    }

    /// Concatenates `parts` where `parts[0]` lands in the most significant
    /// bits.
    pub fn concat(parts: &[IrBits]) -> IrBits {
        let mut bits: BitVec<u64, Lsb0> = BitVec::new();
        for part in parts.iter().rev() {
            bits.extend_from_bitslice(&part.bits);
        }
        IrBits { bits }
    }

    pub fn zero_ext(&self, new_bit_count: usize) -> IrBits {
        let mut bits = self.bits.clone();
        bits.resize(new_bit_count, false);
        IrBits { bits }
    }

    pub fn sign_ext(&self, new_bit_count: usize) -> IrBits {
        let msb = self.msb();
        let mut bits = self.bits.clone();
        bits.resize(new_bit_count, msb);
        IrBits { bits }
    }

    pub fn not(&self) -> IrBits {
        IrBits {
            bits: !self.bits.clone(),
        }
    }

    fn zip_with(&self, rhs: &IrBits, f: impl Fn(bool, bool) -> bool) -> IrBits {
        assert_eq!(
            self.get_bit_count(),
            rhs.get_bit_count(),
            "bitwise operands must have equal widths"
        );
        IrBits {
            bits: self
                .bits
                .iter()
                .by_vals()
                .zip(rhs.bits.iter().by_vals())
                .map(|(a, b)| f(a, b))
                .collect(),
        }
    }

    pub fn and(&self, rhs: &IrBits) -> IrBits {
        self.zip_with(rhs, |a, b| a && b)
    }

    pub fn or(&self, rhs: &IrBits) -> IrBits {
        self.zip_with(rhs, |a, b| a || b)
    }

    pub fn xor(&self, rhs: &IrBits) -> IrBits {
        self.zip_with(rhs, |a, b| a != b)
    }

    pub fn add(&self, rhs: &IrBits) -> IrBits {
        let mut carry = false;
        let mut out = Vec::with_capacity(self.get_bit_count());
        for (a, b) in self.iter_lsb_to_msb().zip(rhs.iter_lsb_to_msb()) {
            out.push(a ^ b ^ carry);
            carry = (a && b) || (carry && (a ^ b));
        }
        IrBits::from_lsb_is_0(&out)
    }

    /// Unsigned comparison; operands of different widths compare as if
    /// zero-extended to the wider width.
    pub fn ucmp(&self, rhs: &IrBits) -> Ordering {
        let width = self.get_bit_count().max(rhs.get_bit_count());
        for i in (0..width).rev() {
            let a = self.bits.get(i).map(|b| *b).unwrap_or(false);
            let b = rhs.bits.get(i).map(|b| *b).unwrap_or(false);
            if a != b {
                return if a { Ordering::Greater } else { Ordering::Less };
            }
        }
        Ordering::Equal
    }

    pub fn ult(&self, rhs: &IrBits) -> bool {
        self.ucmp(rhs) == Ordering::Less
    }

    pub fn ugt(&self, rhs: &IrBits) -> bool {
        self.ucmp(rhs) == Ordering::Greater
    }

    pub fn uge(&self, rhs: &IrBits) -> bool {
        self.ucmp(rhs) != Ordering::Less
    }

    pub fn ule(&self, rhs: &IrBits) -> bool {
        self.ucmp(rhs) != Ordering::Greater
    }

    /// Parses a number with an optional `0x` / `0b` prefix (underscores
    /// allowed) into a value of `bit_count` bits.
    pub fn parse_with_width(text: &str, bit_count: usize) -> Result<IrBits, OptError> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        let (digits, radix) = if let Some(rest) = cleaned
            .strip_prefix("0x")
            .or_else(|| cleaned.strip_prefix("0X"))
        {
            (rest.to_string(), 16u32)
        } else if let Some(rest) = cleaned
            .strip_prefix("0b")
            .or_else(|| cleaned.strip_prefix("0B"))
        {
            (rest.to_string(), 2u32)
        } else {
            (cleaned.clone(), 10u32)
        };
        if digits.is_empty() {
            return Err(OptError::Value(format!("empty number literal {:?}", text)));
        }
        // Little-endian limbs; multiply-accumulate one digit at a time.
        let mut limbs: Vec<u64> = vec![0];
        for c in digits.chars() {
            let digit = c.to_digit(radix).ok_or_else(|| {
                OptError::Value(format!("invalid digit {:?} in literal {:?}", c, text))
            })?;
            let mut carry = digit as u128;
            for limb in limbs.iter_mut() {
                let wide = (*limb as u128) * (radix as u128) + carry;
                *limb = wide as u64;
                carry = wide >> 64;
            }
            if carry != 0 {
                limbs.push(carry as u64);
            }
        }
        let result = IrBits::from_limbs(&limbs, bit_count);
        let fits = (0..limbs.len() * 64)
            .filter(|i| (limbs[i / 64] >> (i % 64)) & 1 == 1)
            .all(|i| i < bit_count);
        if !fits {
            return Err(OptError::Value(format!(
                "literal {} does not fit in {} bits",
                text, bit_count
            )));
        }
        Ok(result)
    }

    /// Formats the value without a type prefix: decimal when it fits in 64
    /// bits, hex otherwise.
    pub fn to_string_fmt_no_prefix(&self) -> String {
        if let Ok(v) = self.to_u64() {
            return format!("{}", v);
        }
        let mut digits = String::new();
        let nibbles = (self.get_bit_count() + 3) / 4;
        for n in (0..nibbles).rev() {
            let mut nibble = 0u32;
            for j in 0..4 {
                if self.bits.get(n * 4 + j).map(|b| *b).unwrap_or(false) {
                    nibble |= 1 << j;
                }
            }
            if digits.is_empty() && nibble == 0 {
                continue;
            }
            digits.push(std::char::from_digit(nibble, 16).unwrap_or('0'));
        }
        format!("0x{}", digits)
    }

    /// Binary rendering, most significant bit first.
    pub fn to_binary_string(&self) -> String {
        self.bits
            .iter()
            .rev()
            .map(|b| if *b { '1' } else { '0' })
            .collect()
    }
}

impl std::fmt::Display for IrBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bits[{}]:{}",
            self.get_bit_count(),
            self.to_string_fmt_no_prefix()
        )
    }
}

impl std::fmt::Debug for IrBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum IrValue {
    Bits(IrBits),
    Tuple(Vec<IrValue>),
}

impl IrValue {
    pub fn from_bits(bits: &IrBits) -> Self {
        IrValue::Bits(bits.clone())
    }

    pub fn make_ubits(bit_count: usize, value: u64) -> Result<Self, OptError> {
        Ok(IrValue::Bits(IrBits::make_ubits(bit_count, value)?))
    }

    pub fn bool(value: bool) -> Self {
        IrValue::Bits(IrBits::from_lsb_is_0(&[value]))
    }

    pub fn make_tuple(elements: &[IrValue]) -> Self {
        IrValue::Tuple(elements.to_vec())
    }

    pub fn to_bits(&self) -> Result<IrBits, OptError> {
        match self {
            IrValue::Bits(bits) => Ok(bits.clone()),
            IrValue::Tuple(_) => Err(OptError::Value(format!(
                "expected bits value, got tuple {}",
                self
            ))),
        }
    }

    pub fn to_u64(&self) -> Result<u64, OptError> {
        self.to_bits()?.to_u64()
    }

    pub fn get_elements(&self) -> Result<&[IrValue], OptError> {
        match self {
            IrValue::Tuple(elements) => Ok(elements),
            IrValue::Bits(_) => Err(OptError::Value(format!(
                "expected tuple value, got {}",
                self
            ))),
        }
    }

    pub fn get_element(&self, index: usize) -> Result<IrValue, OptError> {
        let elements = self.get_elements()?;
        elements.get(index).cloned().ok_or_else(|| {
            OptError::Value(format!(
                "tuple index {} out of range for {}-element tuple",
                index,
                elements.len()
            ))
        })
    }

    /// Formats the value as it appears in a `literal(value=...)` attribute.
    pub fn to_string_fmt_no_prefix(&self) -> String {
        match self {
            IrValue::Bits(bits) => bits.to_string_fmt_no_prefix(),
            IrValue::Tuple(elements) => format!(
                "({})",
                elements
                    .iter()
                    .map(|e| e.to_string_fmt_no_prefix())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
        }
    }
}

impl std::fmt::Display for IrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrValue::Bits(bits) => write!(f, "{}", bits),
            IrValue::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl std::fmt::Debug for IrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_make_ubits_rejects_overflow() {
        assert!(IrBits::make_ubits(3, 8).is_err());
        assert_eq!(IrBits::make_ubits(3, 7).unwrap().to_u64().unwrap(), 7);
    }

    #[test]
    fn test_from_lsb_is_0_bit_order() {
        let bits = IrBits::from_lsb_is_0(&[true, false, true, false]);
        assert_eq!(bits, IrBits::make_ubits(4, 0b0101).unwrap());
        assert!(bits.bit(0));
        assert!(!bits.bit(3));
        assert!(bits.get_bit(4).is_err());
    }

    #[test]
    fn test_concat_puts_first_operand_in_msbs() {
        let hi = IrBits::make_ubits(2, 0b10).unwrap();
        let lo = IrBits::make_ubits(3, 0b001).unwrap();
        let cat = IrBits::concat(&[hi, lo]);
        assert_eq!(cat, IrBits::make_ubits(5, 0b10001).unwrap());
    }

    #[test]
    fn test_width_slice_and_extension() {
        let bits = IrBits::make_ubits(8, 0b1011_0110).unwrap();
        assert_eq!(bits.width_slice(2, 4), IrBits::make_ubits(4, 0b1101).unwrap());
        let neg = IrBits::make_ubits(4, 0b1001).unwrap();
        assert_eq!(neg.sign_ext(6), IrBits::make_ubits(6, 0b111001).unwrap());
        assert_eq!(neg.zero_ext(6), IrBits::make_ubits(6, 0b001001).unwrap());
    }

    #[test]
    fn test_add_wraps() {
        let a = IrBits::make_ubits(4, 0xe).unwrap();
        let b = IrBits::make_ubits(4, 0x3).unwrap();
        assert_eq!(a.add(&b).to_u64().unwrap(), 0x1);
    }

    #[test]
    fn test_unsigned_compare() {
        let a = IrBits::make_ubits(8, 200).unwrap();
        let b = IrBits::make_ubits(8, 3).unwrap();
        assert!(a.ugt(&b));
        assert!(b.ult(&a));
        assert!(a.uge(&a));
    }

    #[test]
    fn test_parse_and_format_wide_values() {
        let wide = IrBits::parse_with_width("0x1_0000_0000_0000_0001", 72).unwrap();
        assert_eq!(wide.get_bit_count(), 72);
        assert!(wide.bit(64));
        assert!(wide.bit(0));
        assert_eq!(wide.to_string_fmt_no_prefix(), "0x10000000000000001");
        assert_eq!(
            IrBits::parse_with_width("18446744073709551617", 72).unwrap(),
            wide
        );
        assert!(IrBits::parse_with_width("0b100", 2).is_err());
        assert_eq!(
            IrBits::parse_with_width("0b0101", 4).unwrap().to_u64().unwrap(),
            5
        );
    }

    #[test]
    fn test_value_display() {
        let v = IrValue::make_tuple(&[
            IrValue::make_ubits(8, 42).unwrap(),
            IrValue::bool(true),
        ]);
        assert_eq!(v.to_string(), "(bits[8]:42, bits[1]:1)");
        assert_eq!(v.to_string_fmt_no_prefix(), "(42, 1)");
        assert_eq!(v.get_element(1).unwrap(), IrValue::bool(true));
        assert!(v.to_bits().is_err());
    }
}
