// SPDX-License-Identifier: Apache-2.0

//! Sets of closed unsigned ranges bounding a bits value.
//!
//! A normalized set keeps its intervals sorted by lower bound with no two
//! intervals overlapping or abutting.

use std::cmp::Ordering;

use crate::ir_value::IrBits;
use crate::ternary::{TernaryValue, TernaryVector};

/// Closed range `[lo, hi]` with `lo <= hi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: IrBits,
    pub hi: IrBits,
}

impl Interval {
    pub fn new(lo: IrBits, hi: IrBits) -> Self {
        assert_eq!(lo.get_bit_count(), hi.get_bit_count());
        assert!(lo.ule(&hi), "interval lower bound {} exceeds upper bound {}", lo, hi);
        Interval { lo, hi }
    }

    pub fn precise(value: IrBits) -> Self {
        Interval {
            lo: value.clone(),
            hi: value,
        }
    }

    pub fn maximal(width: usize) -> Self {
        Interval {
            lo: IrBits::zero(width),
            hi: IrBits::all_ones(width),
        }
    }

    pub fn contains(&self, value: &IrBits) -> bool {
        self.lo.ule(value) && value.ule(&self.hi)
    }

    pub fn is_precise(&self) -> bool {
        self.lo == self.hi
    }

    fn intersect(&self, rhs: &Interval) -> Option<Interval> {
        let lo = if self.lo.uge(&rhs.lo) { &self.lo } else { &rhs.lo };
        let hi = if self.hi.ule(&rhs.hi) { &self.hi } else { &rhs.hi };
        if lo.ule(hi) {
            Some(Interval {
                lo: lo.clone(),
                hi: hi.clone(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    bit_count: usize,
    intervals: Vec<Interval>,
}

/// Ternary vectors with at most this many unknown bits are enumerated
/// exactly; wider ones fall back to the `[min, max]` hull.
const MAX_ENUMERATED_UNKNOWNS: usize = 4;

impl IntervalSet {
    pub fn empty(bit_count: usize) -> Self {
        IntervalSet {
            bit_count,
            intervals: Vec::new(),
        }
    }

    pub fn maximal(bit_count: usize) -> Self {
        IntervalSet {
            bit_count,
            intervals: vec![Interval::maximal(bit_count)],
        }
    }

    pub fn precise(value: &IrBits) -> Self {
        IntervalSet {
            bit_count: value.get_bit_count(),
            intervals: vec![Interval::precise(value.clone())],
        }
    }

    pub fn from_intervals(bit_count: usize, intervals: Vec<Interval>) -> Self {
        let mut set = IntervalSet {
            bit_count,
            intervals,
        };
        set.normalize();
        set
    }

    /// The values consistent with `ternary`.
    pub fn from_ternary(ternary: &TernaryVector) -> Self {
        let width = ternary.width();
        let unknown_positions: Vec<usize> = ternary
            .iter()
            .enumerate()
            .filter(|(_, b)| *b == TernaryValue::Unknown)
            .map(|(i, _)| i)
            .collect();
        if unknown_positions.len() > MAX_ENUMERATED_UNKNOWNS {
            return IntervalSet::from_intervals(
                width,
                vec![Interval::new(ternary.min_value(), ternary.max_value())],
            );
        }
        let base: Vec<bool> = ternary
            .iter()
            .map(|b| b == TernaryValue::KnownOne)
            .collect();
        let mut intervals = Vec::with_capacity(1 << unknown_positions.len());
        for assignment in 0u32..(1u32 << unknown_positions.len()) {
            let mut bits = base.clone();
            for (k, pos) in unknown_positions.iter().enumerate() {
                bits[*pos] = (assignment >> k) & 1 == 1;
            }
            intervals.push(Interval::precise(IrBits::from_lsb_is_0(&bits)));
        }
        IntervalSet::from_intervals(width, intervals)
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn is_maximal(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].lo.is_zero()
            && self.intervals[0].hi.is_all_ones()
    }

    /// The single value this set admits, if any.
    pub fn get_precise_value(&self) -> Option<&IrBits> {
        match self.intervals.as_slice() {
            [only] if only.is_precise() => Some(&only.lo),
            _ => None,
        }
    }

    pub fn contains(&self, value: &IrBits) -> bool {
        self.intervals.iter().any(|i| i.contains(value))
    }

    pub fn covers_zero(&self) -> bool {
        self.contains(&IrBits::zero(self.bit_count))
    }

    pub fn lower_bound(&self) -> Option<&IrBits> {
        self.intervals.first().map(|i| &i.lo)
    }

    pub fn upper_bound(&self) -> Option<&IrBits> {
        self.intervals.last().map(|i| &i.hi)
    }

    /// Values admitted by both sets.
    pub fn intersect(&self, rhs: &IntervalSet) -> IntervalSet {
        assert_eq!(self.bit_count, rhs.bit_count, "interval set widths differ");
        let mut out = Vec::new();
        for a in self.intervals.iter() {
            for b in rhs.intervals.iter() {
                if let Some(i) = a.intersect(b) {
                    out.push(i);
                }
            }
        }
        IntervalSet::from_intervals(self.bit_count, out)
    }

    /// Values admitted by either set.
    pub fn combine(&self, rhs: &IntervalSet) -> IntervalSet {
        assert_eq!(self.bit_count, rhs.bit_count, "interval set widths differ");
        let mut all = self.intervals.clone();
        all.extend(rhs.intervals.iter().cloned());
        IntervalSet::from_intervals(self.bit_count, all)
    }

    fn normalize(&mut self) {
        self.intervals.sort_by(|a, b| match a.lo.ucmp(&b.lo) {
            Ordering::Equal => a.hi.ucmp(&b.hi),
            other => other,
        });
        let one = IrBits::power_of_two(0, self.bit_count).unwrap_or_else(|_| IrBits::zero(self.bit_count));
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for interval in self.intervals.drain(..) {
            if let Some(last) = merged.last_mut() {
                let abuts = !last.hi.is_all_ones() && last.hi.add(&one) == interval.lo;
                if interval.lo.ule(&last.hi) || abuts {
                    if interval.hi.ugt(&last.hi) {
                        last.hi = interval.hi;
                    }
                    continue;
                }
            }
            merged.push(interval);
        }
        self.intervals = merged;
    }
}

impl std::fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "[{}, {}]",
                interval.lo.to_string_fmt_no_prefix(),
                interval.hi.to_string_fmt_no_prefix()
            )?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn b(width: usize, value: u64) -> IrBits {
        IrBits::make_ubits(width, value).unwrap()
    }

    fn iv(width: usize, lo: u64, hi: u64) -> Interval {
        Interval::new(b(width, lo), b(width, hi))
    }

    #[test]
    fn test_normalize_merges_overlapping_and_abutting() {
        let set = IntervalSet::from_intervals(8, vec![iv(8, 10, 20), iv(8, 0, 3), iv(8, 4, 5), iv(8, 15, 30)]);
        assert_eq!(set.to_string(), "[[0, 5], [10, 30]]");
        assert!(set.covers_zero());
        assert!(!set.contains(&b(8, 7)));
    }

    #[test]
    fn test_intersect() {
        let a = IntervalSet::from_intervals(8, vec![iv(8, 0, 5), iv(8, 10, 30)]);
        let c = IntervalSet::from_intervals(8, vec![iv(8, 4, 12)]);
        assert_eq!(a.intersect(&c).to_string(), "[[4, 5], [10, 12]]");
        assert!(a.intersect(&IntervalSet::precise(&b(8, 7))).is_empty());
        assert_eq!(a.intersect(&IntervalSet::maximal(8)), a);
    }

    #[test]
    fn test_from_ternary_enumerates_small_sets() {
        let t = TernaryVector::from_msb_str("1X0X").unwrap();
        let set = IntervalSet::from_ternary(&t);
        // {8, 9, 12, 13}
        assert_eq!(set.to_string(), "[[8, 9], [12, 13]]");
        assert!(!set.covers_zero());
    }

    #[test]
    fn test_from_ternary_falls_back_to_hull() {
        let t = TernaryVector::from_msb_str("1XXXXX0").unwrap();
        let set = IntervalSet::from_ternary(&t);
        assert_eq!(set.to_string(), "[[64, 126]]");
    }

    #[test]
    fn test_precise_and_maximal() {
        assert_eq!(IntervalSet::precise(&b(4, 3)).get_precise_value(), Some(&b(4, 3)));
        assert!(IntervalSet::maximal(4).is_maximal());
        assert_eq!(
            IntervalSet::from_intervals(4, vec![iv(4, 0, 7), iv(4, 8, 15)]),
            IntervalSet::maximal(4)
        );
    }
}
