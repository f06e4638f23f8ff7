// SPDX-License-Identifier: Apache-2.0

//! Reference interpreter for the IR.

use crate::ir::{self, Binop, NaryOp, NodePayload, NodeRef, Unop};
use crate::ir_utils::get_topological;
use crate::ir_value::{IrBits, IrValue};
use crate::ir_value_utils::zero_ir_value_for_type;
use crate::opt_error::OptError;

fn bits_of<F>(get: &F, nr: NodeRef) -> Result<IrBits, OptError>
where
    F: Fn(NodeRef) -> Result<IrValue, OptError>,
{
    get(nr)?.to_bits()
}

fn reduce_bitwise(op: NaryOp, values: &[IrBits]) -> Result<IrBits, OptError> {
    let Some((first, rest)) = values.split_first() else {
        return Err(OptError::Eval(format!("{:?} with no operands", op)));
    };
    let mut acc = first.clone();
    for v in rest {
        acc = match op {
            NaryOp::And | NaryOp::Nand => acc.and(v),
            NaryOp::Or | NaryOp::Nor => acc.or(v),
            NaryOp::Xor => acc.xor(v),
            NaryOp::Concat => unreachable!("concat is not a bitwise reduction"),
        };
    }
    Ok(match op {
        NaryOp::Nand | NaryOp::Nor => acc.not(),
        _ => acc,
    })
}

/// Computes the one-hot encoding of `arg`: `arg.width + 1` bits where the
/// highest bit is set iff `arg` is zero.
pub fn one_hot_bits(arg: &IrBits, lsb_prio: bool) -> IrBits {
    let w = arg.get_bit_count();
    let mut outs = vec![false; w + 1];
    let order: Box<dyn Iterator<Item = usize>> = if lsb_prio {
        Box::new(0..w)
    } else {
        Box::new((0..w).rev())
    };
    let mut prior_clear = true;
    for idx in order {
        let bit = arg.bit(idx);
        outs[idx] = bit && prior_clear;
        prior_clear = prior_clear && !bit;
    }
    outs[w] = prior_clear;
    IrBits::from_lsb_is_0(&outs)
}

/// Evaluates a single payload of result type `ty` given a way to look up
/// operand values.
pub fn eval_payload<F>(payload: &NodePayload, ty: &ir::Type, get: F) -> Result<IrValue, OptError>
where
    F: Fn(NodeRef) -> Result<IrValue, OptError>,
{
    let value = match payload {
        NodePayload::Nil => {
            return Err(OptError::Eval("cannot evaluate a nil node".to_string()));
        }
        NodePayload::GetParam(pid) => {
            return Err(OptError::Eval(format!(
                "param id {} must be bound by the caller",
                pid.get_wrapped_id()
            )));
        }
        NodePayload::Literal(v) => v.clone(),
        NodePayload::Tuple(elems) => IrValue::Tuple(
            elems
                .iter()
                .map(|e| get(*e))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        NodePayload::TupleIndex { tuple, index } => get(*tuple)?.get_element(*index)?,
        NodePayload::Binop(op, lhs, rhs) => {
            let a = get(*lhs)?;
            let b = get(*rhs)?;
            match op {
                Binop::Eq => IrValue::bool(a == b),
                Binop::Ne => IrValue::bool(a != b),
                _ => {
                    let (a, b) = (a.to_bits()?, b.to_bits()?);
                    match op {
                        Binop::Uge => IrValue::bool(a.uge(&b)),
                        Binop::Ugt => IrValue::bool(a.ugt(&b)),
                        Binop::Ult => IrValue::bool(a.ult(&b)),
                        Binop::Ule => IrValue::bool(a.ule(&b)),
                        Binop::Eq | Binop::Ne => unreachable!(),
                    }
                }
            }
        }
        NodePayload::Unop(op, arg) => match op {
            Unop::Identity => get(*arg)?,
            Unop::Not => IrValue::Bits(bits_of(&get, *arg)?.not()),
            Unop::OrReduce => IrValue::bool(!bits_of(&get, *arg)?.is_zero()),
            Unop::AndReduce => IrValue::bool(bits_of(&get, *arg)?.is_all_ones()),
            Unop::XorReduce => IrValue::bool(bits_of(&get, *arg)?.count_ones() % 2 == 1),
        },
        NodePayload::SignExt { arg, new_bit_count } => {
            IrValue::Bits(bits_of(&get, *arg)?.sign_ext(*new_bit_count))
        }
        NodePayload::ZeroExt { arg, new_bit_count } => {
            IrValue::Bits(bits_of(&get, *arg)?.zero_ext(*new_bit_count))
        }
        NodePayload::BitSlice { arg, start, width } => {
            let bits = bits_of(&get, *arg)?;
            if start + width > bits.get_bit_count() {
                return Err(OptError::Eval(format!(
                    "bit_slice start={} width={} out of range for {}",
                    start, width, bits
                )));
            }
            IrValue::Bits(bits.width_slice(*start, *width))
        }
        NodePayload::Nary(NaryOp::Concat, elems) => {
            let parts = elems
                .iter()
                .map(|e| bits_of(&get, *e))
                .collect::<Result<Vec<_>, _>>()?;
            IrValue::Bits(IrBits::concat(&parts))
        }
        NodePayload::Nary(op, elems) => {
            let parts = elems
                .iter()
                .map(|e| bits_of(&get, *e))
                .collect::<Result<Vec<_>, _>>()?;
            IrValue::Bits(reduce_bitwise(*op, &parts)?)
        }
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => {
            let sel = bits_of(&get, *selector)?;
            let in_range = sel
                .to_usize()
                .ok()
                .filter(|index| *index < cases.len());
            match (in_range, default) {
                (Some(index), _) => get(cases[index])?,
                (None, Some(d)) => get(*d)?,
                (None, None) => {
                    return Err(OptError::Eval(format!(
                        "sel selector {} out of range with no default",
                        sel
                    )));
                }
            }
        }
        NodePayload::OneHotSel { selector, cases } => {
            let sel = bits_of(&get, *selector)?;
            let mut acc = zero_ir_value_for_type(ty);
            for (i, case) in cases.iter().enumerate() {
                if sel.get_bit(i)? {
                    acc = crate::ir_value_utils::deep_or_ir_values(&acc, &get(*case)?)?;
                }
            }
            acc
        }
        NodePayload::PrioritySel { selector, cases } => {
            let sel = bits_of(&get, *selector)?;
            let mut result = zero_ir_value_for_type(ty);
            for (i, case) in cases.iter().enumerate() {
                if sel.get_bit(i)? {
                    result = get(*case)?;
                    break;
                }
            }
            result
        }
        NodePayload::OneHot { arg, lsb_prio } => {
            IrValue::Bits(one_hot_bits(&bits_of(&get, *arg)?, *lsb_prio))
        }
    };
    Ok(value)
}

/// Interprets `f` on `args` (one value per parameter, in signature order).
pub fn eval_fn(f: &ir::Fn, args: &[IrValue]) -> Result<IrValue, OptError> {
    if args.len() != f.params.len() {
        return Err(OptError::Eval(format!(
            "function {} takes {} arguments, got {}",
            f.name,
            f.params.len(),
            args.len()
        )));
    }
    let mut env: Vec<Option<IrValue>> = vec![None; f.nodes.len()];
    for nr in get_topological(f) {
        let node = f.get_node(nr);
        let value = match &node.payload {
            NodePayload::Nil => continue,
            NodePayload::GetParam(pid) => {
                let ordinal = f
                    .params
                    .iter()
                    .position(|p| p.id == *pid)
                    .ok_or_else(|| {
                        OptError::Eval(format!("unknown param id {}", pid.get_wrapped_id()))
                    })?;
                args[ordinal].clone()
            }
            payload => eval_payload(payload, &node.ty, |operand: NodeRef| {
                env[operand.index].clone().ok_or_else(|| {
                    OptError::Eval(format!(
                        "operand {} of node {} has no value",
                        operand.index, nr.index
                    ))
                })
            })?,
        };
        env[nr.index] = Some(value);
    }
    let ret = f
        .ret_node_ref
        .ok_or_else(|| OptError::Eval(format!("function {} has no return node", f.name)))?;
    env[ret.index]
        .clone()
        .ok_or_else(|| OptError::Eval(format!("return node of {} was not evaluated", f.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn ubits(width: usize, value: u64) -> IrValue {
        IrValue::make_ubits(width, value).unwrap()
    }

    fn sel_family_fn() -> ir::Fn {
        Parser::new(
            r#"fn f(s: bits[3] id=1, a: bits[8] id=2, b: bits[8] id=3, c: bits[8] id=4) -> (bits[8], bits[8], bits[8]) {
  sel.5: bits[8] = sel(s, cases=[a, b, c], default=a, id=5)
  one_hot_sel.6: bits[8] = one_hot_sel(s, cases=[a, b, c], id=6)
  priority_sel.7: bits[8] = priority_sel(s, cases=[a, b, c], id=7)
  ret tuple.8: (bits[8], bits[8], bits[8]) = tuple(sel.5, one_hot_sel.6, priority_sel.7, id=8)
}"#,
        )
        .parse_fn()
        .unwrap()
    }

    #[test_case(0b000, 0x11, 0x00, 0x00; "nothing selected")]
    #[test_case(0b001, 0x22, 0x11, 0x11; "bit zero")]
    #[test_case(0b010, 0x44, 0x22, 0x22; "bit one")]
    #[test_case(0b101, 0x11, 0x55, 0x11; "two bits")]
    #[test_case(0b110, 0x11, 0x66, 0x22; "upper bits")]
    fn test_select_family(sel: u64, want_sel: u64, want_ohs: u64, want_ps: u64) {
        let f = sel_family_fn();
        let got = eval_fn(&f, &[ubits(3, sel), ubits(8, 0x11), ubits(8, 0x22), ubits(8, 0x44)]).unwrap();
        assert_eq!(
            got,
            IrValue::make_tuple(&[ubits(8, want_sel), ubits(8, want_ohs), ubits(8, want_ps)])
        );
    }

    #[test]
    fn test_one_hot_priorities() {
        let x = IrBits::make_ubits(4, 0b0110).unwrap();
        assert_eq!(one_hot_bits(&x, true), IrBits::make_ubits(5, 0b00010).unwrap());
        assert_eq!(one_hot_bits(&x, false), IrBits::make_ubits(5, 0b00100).unwrap());
        assert_eq!(
            one_hot_bits(&IrBits::zero(4), true),
            IrBits::make_ubits(5, 0b10000).unwrap()
        );
    }

    #[test]
    fn test_routing_and_reductions() {
        let f = Parser::new(
            r#"fn f(x: bits[4] id=1) -> bits[8] {
  bit_slice.2: bits[2] = bit_slice(x, start=1, width=2, id=2)
  sign_ext.3: bits[4] = sign_ext(bit_slice.2, new_bit_count=4, id=3)
  or_reduce.4: bits[1] = or_reduce(x, id=4)
  xor_reduce.5: bits[1] = xor_reduce(x, id=5)
  nor.6: bits[1] = nor(or_reduce.4, xor_reduce.5, id=6)
  zero_ext.7: bits[3] = zero_ext(nor.6, new_bit_count=3, id=7)
  ret concat.8: bits[8] = concat(sign_ext.3, zero_ext.7, or_reduce.4, id=8)
}"#,
        )
        .parse_fn()
        .unwrap();
        // x = 0b0100: slice = 0b10 -> sign_ext 0b1110; or_reduce 1; xor_reduce 1; nor 0
        assert_eq!(eval_fn(&f, &[ubits(4, 0b0100)]).unwrap(), ubits(8, 0b1110_0001));
    }

    #[test]
    fn test_wrong_arity_is_error() {
        assert!(eval_fn(&sel_family_fn(), &[ubits(3, 0)]).is_err());
    }
}
