// ============================================================
// Layer 3 - Input Shape Contract
// ============================================================
// Training and serving agree on one thing above all: a model
// input is a window of `window_length` time steps, each with
// `feature_count` readings. A request carries exactly one
// such window, so its `features` array must have the shape
//
//   (1, window_length, feature_count)
//
// Requests arrive as untyped JSON. FeatureWindow::from_json
// is the only way to turn that JSON into something the model
// accepts: it measures the nested array, compares it with
// the expected shape, and copies the numbers into a flat
// row-major buffer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Window dimensions a model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub window_length: usize,
    pub feature_count: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self { window_length: 5, feature_count: 5 }
    }
}

impl InputShape {
    pub fn new(window_length: usize, feature_count: usize) -> Self {
        Self { window_length, feature_count }
    }

    /// Number of scalars in one window.
    pub fn len(&self) -> usize {
        self.window_length * self.feature_count
    }

    /// Dimensions of a single-window request.
    pub fn request_dims(&self) -> [usize; 3] {
        [1, self.window_length, self.feature_count]
    }
}

/// Why a request's `features` value was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShapeError {
    #[error("Invalid input shape: {}. Expected {}", Dims(.observed), Dims(.expected))]
    Mismatch { observed: Vec<usize>, expected: [usize; 3] },

    #[error("Invalid input: features is a ragged array. Expected {}", Dims(.expected))]
    Ragged { expected: [usize; 3] },

    #[error("Invalid input: features must contain only numbers, found {found}")]
    NonNumeric { found: String },
}

/// Formats dimensions the way array libraries print shapes: `(1, 5, 5)`, `(5,)`, `()`.
struct Dims<'a>(&'a [usize]);

impl fmt::Display for Dims<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => write!(f, "()"),
            [only] => write!(f, "({only},)"),
            dims => {
                let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// A validated single-window model input.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    shape:  InputShape,
    values: Vec<f32>,
}

impl FeatureWindow {
    /// Parse and validate a `features` JSON value against `expected`.
    pub fn from_json(value: &Value, expected: InputShape) -> Result<Self, ShapeError> {
        let expected_dims = expected.request_dims();

        let observed = measure(value).ok_or(ShapeError::Ragged { expected: expected_dims })?;
        if observed.as_slice() != expected_dims.as_slice() {
            return Err(ShapeError::Mismatch { observed, expected: expected_dims });
        }

        let mut values = Vec::with_capacity(expected.len());
        flatten_numbers(value, &mut values)?;
        Self::from_flat(expected, values)
    }

    /// Build from an already flat row-major buffer.
    pub fn from_flat(shape: InputShape, values: Vec<f32>) -> Result<Self, ShapeError> {
        if values.len() != shape.len() {
            return Err(ShapeError::Mismatch {
                observed: vec![values.len()],
                expected: shape.request_dims(),
            });
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Dimensions of a nested JSON array, or None when siblings disagree.
/// Scalars (and anything that is not an array) have shape `()`.
fn measure(value: &Value) -> Option<Vec<usize>> {
    let Value::Array(items) = value else {
        return Some(Vec::new());
    };

    let mut dims = vec![items.len()];
    if let Some((first, rest)) = items.split_first() {
        let inner = measure(first)?;
        for item in rest {
            if measure(item)? != inner {
                return None;
            }
        }
        dims.extend(inner);
    }
    Some(dims)
}

fn flatten_numbers(value: &Value, out: &mut Vec<f32>) -> Result<(), ShapeError> {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_numbers(item, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            // serde_json numbers are always finite
            let x = n.as_f64().ok_or_else(|| ShapeError::NonNumeric { found: n.to_string() })?;
            out.push(x as f32);
            Ok(())
        }
        other => Err(ShapeError::NonNumeric { found: other.to_string() }),
    }
}
