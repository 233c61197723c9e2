//! Descriptive metadata attached to leaf columns

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Information about one feature carried by a column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Kind of feature, free-form
    pub feature_type: Option<String>,

    /// Names of the features stored in the column
    pub feature_names: Option<Vec<String>>,

    /// Ids of the features stored in the column
    pub feature_ids: Option<Vec<i64>>,

    /// Whether the feature is only available at request time
    pub feature_is_request_only: Option<bool>,
}

/// Additional information associated with a leaf column.
///
/// All fields are independently optional. Expected values compare by total
/// order, so a NaN expected value equals itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// For non-negative integral columns, the maximum possible value plus
    /// one. Often the size of an embedding table.
    pub categorical_limit: Option<u64>,

    /// Anticipated mean of the column's elements, typically set on list
    /// lengths.
    pub expected_value: Option<f64>,

    /// Features contained in this column
    pub feature_specs: Option<Vec<FeatureSpec>>,
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        let expected_eq = match (self.expected_value, other.expected_value) {
            (Some(a), Some(b)) => a.total_cmp(&b).is_eq(),
            (a, b) => a.is_none() && b.is_none(),
        };
        expected_eq
            && self.categorical_limit == other.categorical_limit
            && self.feature_specs == other.feature_specs
    }
}

impl Metadata {
    /// Metadata carrying only a categorical limit
    pub fn categorical(limit: u64) -> Self {
        Self {
            categorical_limit: Some(limit),
            ..Default::default()
        }
    }

    /// Metadata carrying only an expected value
    pub fn expected(value: f64) -> Self {
        Self {
            expected_value: Some(value),
            ..Default::default()
        }
    }

    /// Check that this metadata can describe a column of the given dtype.
    ///
    /// Untyped columns are accepted; the check runs again when they get a type.
    pub fn validate_for(&self, dtype: &DType) -> Result<()> {
        if self.categorical_limit.is_some() && !dtype.is_untyped() && !dtype.is_integral() {
            return Err(Error::InvalidSchema(format!(
                "categorical_limit can only be set on integral fields, got {dtype}"
            )));
        }
        Ok(())
    }
}
