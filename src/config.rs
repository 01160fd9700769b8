//! Tree shape configuration.
//!
//! A [`TreeConfig`] fixes, at construction, the maximum number of records a node
//! may hold and whether records comparing equal may coexist. Neither can change
//! for the lifetime of a tree.

use snafu::Snafu;

/// Maximum records per node when none is configured.
pub const DEFAULT_MAX_RECORDS: usize = 16;

/// Smallest supported `max_records`. Below three, a split cannot leave both
/// halves at the minimum fill.
pub const MIN_MAX_RECORDS: usize = 3;

/// Largest supported `max_records`.
pub const MAX_MAX_RECORDS: usize = 65_536;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ConfigError {
    /// `max_records` is below [`MIN_MAX_RECORDS`].
    #[snafu(display("max_records must be >= {minimum}, got {max_records}"))]
    MaxRecordsTooSmall {
        /// The rejected value.
        max_records: usize,
        /// The smallest accepted value.
        minimum: usize,
    },
    /// `max_records` is above [`MAX_MAX_RECORDS`].
    #[snafu(display("max_records must be <= {maximum}, got {max_records}"))]
    MaxRecordsTooLarge {
        /// The rejected value.
        max_records: usize,
        /// The largest accepted value.
        maximum: usize,
    },
}

/// Shape of a [`BPlusTree`](crate::BPlusTree).
///
/// # Validation Rules
///
/// - `max_records` must be in `3..=65_536`
///
/// The minimum fill of non-root nodes is derived from `max_records`:
/// leaves keep at least `⌈max/2⌉` records, internal nodes at least
/// `⌈(max+1)/2⌉ - 1` separators. The two agree whenever `max_records` is even.
///
/// # Example
///
/// ```
/// use bplus_tree::TreeConfig;
///
/// let config = TreeConfig::builder()
///     .max_records(4)
///     .allow_duplicates(true)
///     .build()
///     .expect("valid tree config");
/// assert_eq!(config.min_leaf_records(), 2);
/// assert_eq!(config.min_internal_records(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum records (separators, for internal nodes) per node.
    pub max_records: usize,
    /// Whether records comparing equal may be stored side by side.
    pub allow_duplicates: bool,
}

#[bon::bon]
impl TreeConfig {
    /// Creates a new tree configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_records` is outside `3..=65_536`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RECORDS)] max_records: usize,
        #[builder(default)] allow_duplicates: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_records,
            allow_duplicates,
        };
        config.validate()?;
        Ok(config)
    }
}

impl TreeConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_records` is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        snafu::ensure!(
            self.max_records >= MIN_MAX_RECORDS,
            MaxRecordsTooSmallSnafu {
                max_records: self.max_records,
                minimum: MIN_MAX_RECORDS,
            }
        );
        snafu::ensure!(
            self.max_records <= MAX_MAX_RECORDS,
            MaxRecordsTooLargeSnafu {
                max_records: self.max_records,
                maximum: MAX_MAX_RECORDS,
            }
        );
        Ok(())
    }

    /// Fewest records a non-root leaf may hold.
    #[must_use]
    pub const fn min_leaf_records(&self) -> usize {
        self.max_records.div_ceil(2)
    }

    /// Fewest separators a non-root internal node may hold.
    #[must_use]
    pub const fn min_internal_records(&self) -> usize {
        (self.max_records + 1).div_ceil(2) - 1
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            allow_duplicates: false,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn builder_defaults() {
        let config = TreeConfig::builder().build().unwrap();
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.max_records, DEFAULT_MAX_RECORDS);
        assert!(!config.allow_duplicates);
    }

    #[test]
    fn rejects_tiny_nodes() {
        let err = TreeConfig::builder().max_records(2).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MaxRecordsTooSmall {
                max_records: 2,
                minimum: MIN_MAX_RECORDS
            }
        );
        assert_eq!(err.to_string(), "max_records must be >= 3, got 2");
    }

    #[test]
    fn rejects_huge_nodes() {
        let config = TreeConfig {
            max_records: MAX_MAX_RECORDS + 1,
            allow_duplicates: false,
        };
        assert!(matches!(config.validate(), Err(ConfigError::MaxRecordsTooLarge { .. })));
    }

    #[test]
    fn minimum_fill_by_order() {
        let floors = |max_records| {
            let config = TreeConfig {
                max_records,
                allow_duplicates: false,
            };
            (config.min_leaf_records(), config.min_internal_records())
        };
        assert_eq!(floors(3), (2, 1));
        assert_eq!(floors(4), (2, 2));
        assert_eq!(floors(5), (3, 2));
        assert_eq!(floors(16), (8, 8));
    }
}
