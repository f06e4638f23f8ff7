// SPDX-License-Identifier: Apache-2.0

//! Test helpers.
//!
//! These are deterministic: samples come from a seeded RNG so failures
//! reproduce.

use rand::{Rng, RngCore};
use rand_pcg::Pcg64Mcg;

use crate::ir::{self, Type};
use crate::ir_eval::eval_fn;
use crate::ir_parser;
use crate::ir_value::{IrBits, IrValue};
use crate::ir_value_utils::ir_value_from_leaves;

fn mask(width: usize, value: u64) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Builds one argument per parameter, filling every bits leaf with
/// `leaf_value(width)`.
fn make_args<F>(f: &ir::Fn, mut leaf_value: F) -> Result<Vec<IrValue>, String>
where
    F: FnMut(usize) -> u64,
{
    let mut args = Vec::with_capacity(f.params.len());
    for param in f.params.iter() {
        let mut leaves = Vec::new();
        for leaf in param.ty.leaf_types() {
            let Type::Bits(width) = leaf else {
                return Err(format!("unsupported leaf type {} in {}", leaf, param.name));
            };
            if width > 64 {
                return Err(format!(
                    "quickcheck only supports leaves up to 64 bits; {} has {}",
                    param.name, width
                ));
            }
            let bits = IrBits::make_ubits(width, mask(width, leaf_value(width)))
                .map_err(|e| e.to_string())?;
            leaves.push(bits);
        }
        args.push(ir_value_from_leaves(&leaves, &param.ty).map_err(|e| e.to_string())?);
    }
    Ok(args)
}

/// Evaluates `f0` and `f1` on edge-case and pseudo-random arguments and
/// reports the first input where they disagree. Returns the number of
/// samples run.
///
/// Parameters may be bits or tuples of bits, with every leaf at most 64 bits
/// wide.
pub fn quickcheck_fn_equivalence_ubits_le64(
    f0: &ir::Fn,
    f1: &ir::Fn,
    random_samples: usize,
    seed: u64,
) -> Result<usize, String> {
    if f0.signature() != f1.signature() {
        return Err(format!(
            "signature mismatch: {:?} vs {:?}",
            f0.signature(),
            f1.signature()
        ));
    }
    let mut samples_run = 0usize;
    let mut run_case = |args: Vec<IrValue>| -> Result<(), String> {
        let got0 = eval_fn(f0, &args).map_err(|e| format!("lhs eval failed: {}", e))?;
        let got1 = eval_fn(f1, &args).map_err(|e| format!("rhs eval failed: {}", e))?;
        if got0 != got1 {
            return Err(format!(
                "mismatch on args={:?}: lhs={} rhs={}\nlhs:\n{}\nrhs:\n{}",
                args, got0, got1, f0, f1
            ));
        }
        samples_run += 1;
        Ok(())
    };

    run_case(make_args(f0, |_| 0)?)?;
    run_case(make_args(f0, |_| u64::MAX)?)?;
    run_case(make_args(f0, |_| 0xAAAA_AAAA_AAAA_AAAA)?)?;
    run_case(make_args(f0, |_| 0x5555_5555_5555_5555)?)?;

    let mut rng = Pcg64Mcg::new(seed as u128);
    for _ in 0..random_samples {
        run_case(make_args(f0, |_| rng.next_u64())?)?;
    }
    Ok(samples_run)
}

/// Like [`quickcheck_fn_equivalence_ubits_le64`], parsing both functions
/// from IR text.
pub fn quickcheck_ir_text_fn_equivalence_ubits_le64(
    ir_text_0: &str,
    ir_text_1: &str,
    random_samples: usize,
) -> Result<usize, String> {
    let f0 = ir_parser::Parser::new(ir_text_0)
        .parse_fn()
        .map_err(|e| format!("lhs: {}", e))?;
    let f1 = ir_parser::Parser::new(ir_text_1)
        .parse_fn()
        .map_err(|e| format!("rhs: {}", e))?;
    quickcheck_fn_equivalence_ubits_le64(&f0, &f1, random_samples, 0)
}

const MAX_OPS_PER_SAMPLE: usize = 12;
// Node widths stay at or below this so every width has a parameter to draw
// from.
const MAX_SAMPLE_WIDTH: usize = 4;
const SAMPLE_PARAM_WIDTHS: [usize; 7] = [1, 2, 3, 4, 4, 2, 1];

/// Accumulates the body of a generated function, indexed by result width.
struct SampleBuilder<'r, R: Rng> {
    rng: &'r mut R,
    by_width: Vec<Vec<String>>,
    body: String,
    next_id: usize,
}

impl<'r, R: Rng> SampleBuilder<'r, R> {
    fn emit(&mut self, op: &str, width: usize, args: String, is_ret: bool) -> String {
        let name = format!("{}.{}", op, self.next_id);
        self.body.push_str(&format!(
            "  {}{}: bits[{}] = {}({}, id={})\n",
            if is_ret { "ret " } else { "" },
            name,
            width,
            op,
            args,
            self.next_id
        ));
        self.next_id += 1;
        self.by_width[width].push(name.clone());
        name
    }

    fn literal(&mut self, width: usize) -> String {
        let value = self.rng.gen_range(0..(1u64 << width));
        self.emit("literal", width, format!("value={}", value), false)
    }

    /// An existing node of `width`, or now and then a fresh literal.
    fn pick(&mut self, width: usize) -> String {
        let candidates = self.by_width[width].len();
        if candidates == 0 || self.rng.gen_range(0..6) == 0 {
            return self.literal(width);
        }
        let index = self.rng.gen_range(0..candidates);
        self.by_width[width][index].clone()
    }

    fn pick_n(&mut self, width: usize, count: usize) -> Vec<String> {
        (0..count).map(|_| self.pick(width)).collect()
    }

    /// Emits one select-family node; returns its width.
    fn select_op(&mut self, is_ret: bool) -> usize {
        let width = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH);
        match self.rng.gen_range(0..3) {
            0 => {
                let selector_width = self.rng.gen_range(1..=2);
                let covered = 1usize << selector_width;
                let count = self.rng.gen_range(1..=covered);
                let selector = self.pick(selector_width);
                let cases = self.pick_n(width, count);
                let mut args = format!("{}, cases=[{}]", selector, cases.join(", "));
                if count < covered {
                    let default = self.pick(width);
                    args.push_str(&format!(", default={}", default));
                }
                self.emit("sel", width, args, is_ret);
            }
            kind => {
                let count = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH);
                let selector = self.pick(count);
                let cases = self.pick_n(width, count);
                let op = if kind == 1 { "one_hot_sel" } else { "priority_sel" };
                let args = format!("{}, cases=[{}]", selector, cases.join(", "));
                self.emit(op, width, args, is_ret);
            }
        }
        width
    }

    fn plain_op(&mut self) {
        match self.rng.gen_range(0..7) {
            0 => {
                let lhs_width = self.rng.gen_range(1..MAX_SAMPLE_WIDTH);
                let rhs_width = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH - lhs_width);
                let lhs = self.pick(lhs_width);
                let rhs = self.pick(rhs_width);
                self.emit("concat", lhs_width + rhs_width, format!("{}, {}", lhs, rhs), false);
            }
            1 => {
                let arg_width = self.rng.gen_range(2..=MAX_SAMPLE_WIDTH);
                let width = self.rng.gen_range(1..arg_width);
                let start = self.rng.gen_range(0..=arg_width - width);
                let arg = self.pick(arg_width);
                let args = format!("{}, start={}, width={}", arg, start, width);
                self.emit("bit_slice", width, args, false);
            }
            2 => {
                let width = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH);
                let lhs = self.pick(width);
                let rhs = self.pick(width);
                self.emit("eq", 1, format!("{}, {}", lhs, rhs), false);
            }
            3 | 4 => {
                let width = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH);
                let lhs = self.pick(width);
                let rhs = self.pick(width);
                let op = if self.rng.gen_bool(0.5) { "and" } else { "or" };
                self.emit(op, width, format!("{}, {}", lhs, rhs), false);
            }
            5 => {
                let width = self.rng.gen_range(1..=MAX_SAMPLE_WIDTH);
                let arg = self.pick(width);
                self.emit("not", width, arg, false);
            }
            _ => {
                let arg_width = self.rng.gen_range(1..MAX_SAMPLE_WIDTH);
                let arg = self.pick(arg_width);
                let lsb_prio = self.rng.gen_bool(0.5);
                let args = format!("{}, lsb_prio={}", arg, lsb_prio);
                self.emit("one_hot", arg_width + 1, args, false);
            }
        }
    }
}

/// Generates the text of a random function built mostly from `sel`,
/// `one_hot_sel`, `priority_sel`, and the bit plumbing feeding their
/// selectors. The function returns a select-family node. Every node is at
/// most four bits wide.
pub fn generate_select_fn_text<R: Rng>(rng: &mut R) -> String {
    let mut params = Vec::with_capacity(SAMPLE_PARAM_WIDTHS.len());
    let mut by_width = vec![Vec::new(); MAX_SAMPLE_WIDTH + 1];
    for (i, width) in SAMPLE_PARAM_WIDTHS.iter().enumerate() {
        let name = format!("p{}", i);
        params.push(format!("{}: bits[{}] id={}", name, width, i + 1));
        by_width[*width].push(name);
    }
    let mut builder = SampleBuilder {
        rng,
        by_width,
        body: String::new(),
        next_id: SAMPLE_PARAM_WIDTHS.len() + 1,
    };
    let op_count = builder.rng.gen_range(1..=MAX_OPS_PER_SAMPLE);
    for _ in 0..op_count {
        if builder.rng.gen_bool(0.6) {
            builder.select_op(false);
        } else {
            builder.plain_op();
        }
    }
    let ret_width = builder.select_op(true);
    format!(
        "fn sample({}) -> bits[{}] {{\n{}}}",
        params.join(", "),
        ret_width,
        builder.body
    )
}
