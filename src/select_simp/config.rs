// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use crate::opt_error::OptError;

/// Highest meaningful optimization level; every rule tier is on.
pub const MAX_OPT_LEVEL: u32 = 3;

/// Widest `one_hot_sel` the splitting phase will look at.
pub const DEFAULT_MAX_SPLIT_WIDTH: usize = 64;

/// Pass settings as read from a TOML file, e.g.
///
/// ```toml
/// opt_level = 2
/// max_split_width = 32
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct PassConfig {
    /// Optimization level in `0..=MAX_OPT_LEVEL`. Level 2 enables the
    /// narrowing rules, level 3 additionally enables splitting.
    pub opt_level: Option<u32>,

    /// Upper bound on the bit width of one-hot-selects considered for
    /// splitting.
    pub max_split_width: Option<usize>,
}

impl PassConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, OptError> {
        toml::from_str(text).map_err(|e| OptError::Config(format!("invalid pass config: {}", e)))
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, OptError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OptError::Config(format!("could not read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectSimplificationOptions {
    pub opt_level: u32,
    pub max_split_width: usize,
}

impl Default for SelectSimplificationOptions {
    fn default() -> Self {
        SelectSimplificationOptions {
            opt_level: MAX_OPT_LEVEL,
            max_split_width: DEFAULT_MAX_SPLIT_WIDTH,
        }
    }
}

impl SelectSimplificationOptions {
    pub fn with_opt_level(opt_level: u32) -> Self {
        SelectSimplificationOptions {
            opt_level,
            ..Default::default()
        }
    }

    /// Fills unset fields from the defaults.
    pub fn from_config(config: &PassConfig) -> Result<Self, OptError> {
        let defaults = Self::default();
        let opt_level = config.opt_level.unwrap_or(defaults.opt_level);
        if opt_level > MAX_OPT_LEVEL {
            return Err(OptError::Config(format!(
                "opt_level {} exceeds maximum {}",
                opt_level, MAX_OPT_LEVEL
            )));
        }
        let max_split_width = config.max_split_width.unwrap_or(defaults.max_split_width);
        if max_split_width > DEFAULT_MAX_SPLIT_WIDTH {
            return Err(OptError::Config(format!(
                "max_split_width {} exceeds maximum {}",
                max_split_width, DEFAULT_MAX_SPLIT_WIDTH
            )));
        }
        Ok(SelectSimplificationOptions {
            opt_level,
            max_split_width,
        })
    }

    /// Bit-knowledge driven elisions and decompositions.
    pub fn narrowing_enabled(&self) -> bool {
        self.opt_level >= 2
    }

    /// Structural splitting of one-hot-selects, and multi-run dead-case
    /// elision.
    pub fn splits_enabled(&self) -> bool {
        self.opt_level >= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, false, false)]
    #[test_case(1, false, false)]
    #[test_case(2, true, false)]
    #[test_case(3, true, true)]
    fn test_tiers_by_level(level: u32, narrowing: bool, splits: bool) {
        let options = SelectSimplificationOptions::with_opt_level(level);
        assert_eq!(options.narrowing_enabled(), narrowing);
        assert_eq!(options.splits_enabled(), splits);
    }

    #[test]
    fn test_from_toml() {
        let config = PassConfig::from_toml_str("opt_level = 2\nmax_split_width = 16\n").unwrap();
        assert_eq!(
            SelectSimplificationOptions::from_config(&config).unwrap(),
            SelectSimplificationOptions {
                opt_level: 2,
                max_split_width: 16
            }
        );
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PassConfig::from_toml_str("").unwrap();
        assert_eq!(
            SelectSimplificationOptions::from_config(&config).unwrap(),
            SelectSimplificationOptions::default()
        );
    }

    #[test]
    fn test_out_of_range_values_are_config_errors() {
        let config = PassConfig::from_toml_str("opt_level = 4").unwrap();
        assert!(matches!(
            SelectSimplificationOptions::from_config(&config),
            Err(OptError::Config(_))
        ));
        let config = PassConfig::from_toml_str("max_split_width = 65").unwrap();
        assert!(SelectSimplificationOptions::from_config(&config).is_err());
        assert!(matches!(
            PassConfig::from_toml_str("opt_level = \"high\""),
            Err(OptError::Config(_))
        ));
    }
}
