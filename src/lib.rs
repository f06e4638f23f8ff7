// SPDX-License-Identifier: Apache-2.0

//! Select simplification over a pure-Rust representation of the XLS IR.
//!
//! The IR side covers parsing, validation, interpretation, and in-place
//! rewriting; the analysis side provides bit-level query engines and a bit
//! source tracer. [`select_simp::SelectSimplificationPass`] combines them to
//! fold, narrow, and split `sel`, `one_hot_sel`, and `priority_sel` nodes.

pub mod opt_error;

pub mod ir;
pub mod ir_eval;
pub mod ir_node_env;
pub mod ir_parser;
pub mod ir_rewrite;
pub mod ir_utils;
pub mod ir_validate;
pub mod ir_value;
pub mod ir_value_utils;

pub mod dce;

pub mod interval_set;
pub mod leaf_type_tree;
pub mod ternary;

pub mod bit_source;
pub mod query_engine;

pub mod select_simp;

pub mod test_utils;
