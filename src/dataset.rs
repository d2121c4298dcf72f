//! Dataset construction and validation
//!
//! Feature vectors arrive as rows of `f64`. Everything downstream works on a
//! rectangular `Array2<f64>`, so ragged, empty or non-finite input is rejected
//! here before it can reach a model lookup.

use ndarray::Array2;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Result, VerifiableError};

/// Largest contamination fraction accepted by the engine
pub const MAX_CONTAMINATION: f64 = 0.5;

/// Build a dataset from rows of equal length
pub fn dataset_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let first = rows
        .first()
        .ok_or_else(|| VerifiableError::InvalidInput("dataset cannot be empty".to_string()))?;

    let n_features = first.len();
    if n_features == 0 {
        return Err(VerifiableError::InvalidInput(
            "samples must have at least one feature".to_string(),
        ));
    }

    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_features) {
        return Err(VerifiableError::InvalidInput(format!(
            "dataset must be rectangular: row {} has {} features, expected {}",
            idx,
            row.len(),
            n_features
        )));
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let x = Array2::from_shape_vec((rows.len(), n_features), flat)?;
    validate_dataset(&x)?;
    Ok(x)
}

/// Reject empty matrices and non-finite values
pub fn validate_dataset(x: &Array2<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(VerifiableError::InvalidInput("dataset cannot be empty".to_string()));
    }
    if x.ncols() == 0 {
        return Err(VerifiableError::InvalidInput(
            "samples must have at least one feature".to_string(),
        ));
    }
    if let Some(((row, col), v)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(VerifiableError::InvalidInput(format!(
            "non-finite value {} at row {}, feature {}",
            v, row, col
        )));
    }
    Ok(())
}

/// Contamination must lie in [0, 0.5]
pub fn validate_contamination(contamination: f64) -> Result<()> {
    if !(0.0..=MAX_CONTAMINATION).contains(&contamination) {
        return Err(VerifiableError::InvalidInput(format!(
            "contamination must be within [0, {}], got {}",
            MAX_CONTAMINATION, contamination
        )));
    }
    Ok(())
}

/// Load rows from a JSON file holding an array of arrays of numbers
pub fn load_json_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path)?;
    let rows: Vec<Vec<f64>> = serde_json::from_reader(BufReader::new(file))?;
    Ok(rows)
}
