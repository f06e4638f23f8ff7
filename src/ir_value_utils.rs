// SPDX-License-Identifier: Apache-2.0

//! Helpers relating `IrValue`s to IR types.
//!
//! Values are viewed as a sequence of bits-typed leaves in element order,
//! matching `Type::leaf_types`.

use bitvec::vec::BitVec;

use crate::ir::Type;
use crate::ir_value::{IrBits, IrValue};
use crate::opt_error::OptError;

pub fn ir_bits_from_bitvec_lsb_is_0(bv: &BitVec) -> IrBits {
    IrBits::from_lsb_is_0(&bv.iter().by_vals().collect::<Vec<bool>>())
}

pub fn type_of_value(value: &IrValue) -> Type {
    match value {
        IrValue::Bits(bits) => Type::Bits(bits.get_bit_count()),
        IrValue::Tuple(elements) => {
            Type::Tuple(elements.iter().map(|e| Box::new(type_of_value(e))).collect())
        }
    }
}

pub fn zero_ir_value_for_type(ty: &Type) -> IrValue {
    match ty {
        Type::Bits(width) => IrValue::Bits(IrBits::zero(*width)),
        Type::Tuple(types) => {
            IrValue::Tuple(types.iter().map(|t| zero_ir_value_for_type(t)).collect())
        }
    }
}

/// Returns the bits leaves of `value` in element order.
pub fn flatten_leaves(value: &IrValue) -> Vec<IrBits> {
    match value {
        IrValue::Bits(bits) => vec![bits.clone()],
        IrValue::Tuple(elements) => elements.iter().flat_map(flatten_leaves).collect(),
    }
}

/// Rebuilds a value of type `ty` from its leaves; inverse of
/// `flatten_leaves`.
pub fn ir_value_from_leaves(leaves: &[IrBits], ty: &Type) -> Result<IrValue, OptError> {
    let mut iter = leaves.iter();
    let value = build_from_leaves(&mut iter, ty)?;
    if iter.next().is_some() {
        return Err(OptError::Value(format!(
            "too many leaves ({}) for type {}",
            leaves.len(),
            ty
        )));
    }
    Ok(value)
}

fn build_from_leaves<'a>(
    iter: &mut impl Iterator<Item = &'a IrBits>,
    ty: &Type,
) -> Result<IrValue, OptError> {
    match ty {
        Type::Bits(width) => {
            let bits = iter
                .next()
                .ok_or_else(|| OptError::Value(format!("missing leaf for {}", ty)))?;
            if bits.get_bit_count() != *width {
                return Err(OptError::Value(format!(
                    "leaf {} does not match type {}",
                    bits, ty
                )));
            }
            Ok(IrValue::Bits(bits.clone()))
        }
        Type::Tuple(types) => {
            let mut elements = Vec::with_capacity(types.len());
            for t in types.iter() {
                elements.push(build_from_leaves(iter, t)?);
            }
            Ok(IrValue::Tuple(elements))
        }
    }
}

/// Element-wise OR of two values of the same type.
pub fn deep_or_ir_values(lhs: &IrValue, rhs: &IrValue) -> Result<IrValue, OptError> {
    match (lhs, rhs) {
        (IrValue::Bits(a), IrValue::Bits(b)) if a.get_bit_count() == b.get_bit_count() => {
            Ok(IrValue::Bits(a.or(b)))
        }
        (IrValue::Tuple(a), IrValue::Tuple(b)) if a.len() == b.len() => Ok(IrValue::Tuple(
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| deep_or_ir_values(x, y))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        _ => Err(OptError::Value(format!(
            "cannot OR values of different types: {} vs {}",
            lhs, rhs
        ))),
    }
}
