// SPDX-License-Identifier: Apache-2.0

//! Error type shared by the IR utilities, the query engines, and the select
//! simplification pass.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptError {
    /// An internal IR invariant was violated while rewriting `node`.
    ///
    /// These indicate a malformed graph (or a bug in a rewrite) and are never
    /// recoverable inside the pass.
    Invariant { node: String, message: String },
    /// A bits/value level operation was given out-of-range arguments.
    Value(String),
    /// The pass configuration could not be loaded or is out of range.
    Config(String),
    /// Interpretation of a function failed.
    Eval(String),
}

impl OptError {
    pub fn invariant(node: impl Into<String>, message: impl Into<String>) -> Self {
        OptError::Invariant {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, OptError::Invariant { .. })
    }
}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptError::Invariant { node, message } => {
                write!(f, "invariant violated at {}: {}", node, message)
            }
            OptError::Value(msg) => write!(f, "value error: {}", msg),
            OptError::Config(msg) => write!(f, "config error: {}", msg),
            OptError::Eval(msg) => write!(f, "eval error: {}", msg),
        }
    }
}

impl std::error::Error for OptError {}

/// Returns an `OptError::Invariant` from the enclosing function when `$cond`
/// does not hold.
///
/// The first argument is anything that formats as the offending node's
/// identity.
#[macro_export]
macro_rules! ret_check {
    ($cond:expr, $node:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::opt_error::OptError::invariant(
                format!("{}", $node),
                format!($($arg)+),
            ));
        }
    };
}
