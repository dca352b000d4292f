// ============================================================
// Layer 3 - Hyperparameter Search Space
// ============================================================
// A search space is four finite axes. Every combination of
// one value per axis is trained exactly once, enumerated in
// lexicographic order over the axis order:
//
//   hidden_units → dropout_rate → batch_size → epoch_count
//
// so the last axis varies fastest. The order only matters
// for promotion tie-breaks (first seen wins).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One point of the search space. Immutable, one per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterCombination {
    pub hidden_units: usize,
    pub dropout_rate: f64,
    pub batch_size:   usize,
    pub epoch_count:  usize,
}

impl fmt::Display for HyperparameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "units={} dropout={} batch_size={} epochs={}",
            self.hidden_units, self.dropout_rate, self.batch_size, self.epoch_count
        )
    }
}

/// Reasons a search space is rejected before any training starts.
#[derive(Debug, Error, PartialEq)]
pub enum SpaceError {
    #[error("axis '{0}' has no values")]
    EmptyAxis(&'static str),

    #[error("axis '{axis}' must contain positive integers, got {value}")]
    NonPositive { axis: &'static str, value: usize },

    #[error("dropout rate must lie in [0, 1), got {0}")]
    DropoutOutOfRange(f64),

    #[error("axis '{axis}' lists {value} more than once")]
    Duplicate { axis: &'static str, value: String },
}

/// The four discrete axes of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpace {
    pub hidden_units:  Vec<usize>,
    pub dropout_rates: Vec<f64>,
    pub batch_sizes:   Vec<usize>,
    pub epoch_counts:  Vec<usize>,
}

impl Default for HyperparameterSpace {
    fn default() -> Self {
        Self {
            hidden_units:  vec![50, 100],
            dropout_rates: vec![0.2, 0.3],
            batch_sizes:   vec![32, 64],
            epoch_counts:  vec![20, 30],
        }
    }
}

impl HyperparameterSpace {
    /// Check every axis: non-empty, valid values, no repeats.
    pub fn validate(&self) -> Result<(), SpaceError> {
        check_integer_axis("hidden_units", &self.hidden_units)?;
        check_integer_axis("batch_size", &self.batch_sizes)?;
        check_integer_axis("epoch_count", &self.epoch_counts)?;

        if self.dropout_rates.is_empty() {
            return Err(SpaceError::EmptyAxis("dropout_rate"));
        }
        for (i, &rate) in self.dropout_rates.iter().enumerate() {
            if !(0.0..1.0).contains(&rate) {
                return Err(SpaceError::DropoutOutOfRange(rate));
            }
            if self.dropout_rates[..i].contains(&rate) {
                return Err(SpaceError::Duplicate {
                    axis:  "dropout_rate",
                    value: rate.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of runs a sweep over this space performs.
    pub fn cardinality(&self) -> usize {
        self.hidden_units.len()
            * self.dropout_rates.len()
            * self.batch_sizes.len()
            * self.epoch_counts.len()
    }

    /// Every combination, in lexicographic axis order.
    pub fn combinations(&self) -> Vec<HyperparameterCombination> {
        let mut out = Vec::with_capacity(self.cardinality());
        for &hidden_units in &self.hidden_units {
            for &dropout_rate in &self.dropout_rates {
                for &batch_size in &self.batch_sizes {
                    for &epoch_count in &self.epoch_counts {
                        out.push(HyperparameterCombination {
                            hidden_units,
                            dropout_rate,
                            batch_size,
                            epoch_count,
                        });
                    }
                }
            }
        }
        out
    }
}

fn check_integer_axis(axis: &'static str, values: &[usize]) -> Result<(), SpaceError> {
    if values.is_empty() {
        return Err(SpaceError::EmptyAxis(axis));
    }
    for (i, &value) in values.iter().enumerate() {
        if value == 0 {
            return Err(SpaceError::NonPositive { axis, value });
        }
        if values[..i].contains(&value) {
            return Err(SpaceError::Duplicate { axis, value: value.to_string() });
        }
    }
    Ok(())
}
