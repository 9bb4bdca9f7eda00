//! Symmetric distance matrices and the lower-triangular file format.

use crate::error::{PermivarError, Result};
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// A symmetric, zero-diagonal matrix of pairwise dissimilarities with one
/// label per row/column.
///
/// Immutable after construction: every constructor validates symmetry,
/// a zero diagonal, non-negative entries, and label uniqueness.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    matrix: DMatrix<f64>,
    labels: Vec<String>,
}

impl DistanceMatrix {
    /// Create a distance matrix from a full symmetric matrix and labels.
    pub fn new(matrix: DMatrix<f64>, labels: Vec<String>) -> Result<Self> {
        let n = labels.len();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(PermivarError::DimensionMismatch {
                expected: n,
                actual: matrix.nrows(),
            });
        }
        let mut seen = HashMap::new();
        for (i, label) in labels.iter().enumerate() {
            if let Some(prev) = seen.insert(label.as_str(), i) {
                return Err(PermivarError::Format(format!(
                    "duplicate sample label '{}' (rows {} and {})",
                    label, prev, i
                )));
            }
        }
        for i in 0..n {
            if matrix[(i, i)] != 0.0 {
                return Err(PermivarError::Format(format!(
                    "non-zero diagonal at sample '{}'",
                    labels[i]
                )));
            }
            for j in 0..i {
                let d = matrix[(i, j)];
                if d < 0.0 {
                    return Err(PermivarError::Format(format!(
                        "negative distance {} between '{}' and '{}'",
                        d, labels[i], labels[j]
                    )));
                }
                if (d - matrix[(j, i)]).abs() > 1e-12 {
                    return Err(PermivarError::Format(format!(
                        "asymmetric distances between '{}' and '{}'",
                        labels[i], labels[j]
                    )));
                }
            }
        }
        Ok(Self { matrix, labels })
    }

    /// Parse the lower-triangular distance format.
    ///
    /// Line 1 is the sample count `n`. Each of the next `n` lines is a
    /// sample label followed by a tab and the distances to all previously
    /// listed samples, so data line `i` (0-based) carries exactly `i`
    /// numeric fields. The full matrix is recovered as `M + Mᵀ`, which is
    /// exact because only one triangle is populated and the diagonal is
    /// zero.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let count_line = lines
            .next()
            .ok_or_else(|| PermivarError::Format("empty distance file".to_string()))?;
        let n: usize = count_line.trim().parse().map_err(|_| {
            PermivarError::Format(format!(
                "first line must be the sample count, got '{}'",
                count_line.trim()
            ))
        })?;

        let mut labels = Vec::with_capacity(n);
        let mut lower = DMatrix::zeros(n, n);

        for row in 0..n {
            let line = lines.next().ok_or_else(|| {
                PermivarError::Format(format!(
                    "declared {} samples but data ends after {} rows",
                    n, row
                ))
            })?;
            let (label, payload) = match line.split_once('\t') {
                Some((l, rest)) => (l, rest),
                None => (line.trim_end(), ""),
            };
            if label.is_empty() {
                return Err(PermivarError::Format(format!(
                    "missing sample label on data row {}",
                    row
                )));
            }
            let fields: Vec<&str> = if payload.trim().is_empty() {
                Vec::new()
            } else {
                payload.split('\t').map(str::trim).collect()
            };
            if fields.len() != row {
                return Err(PermivarError::Format(format!(
                    "row for '{}' has {} fields, expected {}",
                    label,
                    fields.len(),
                    row
                )));
            }
            for (col, field) in fields.iter().enumerate() {
                let d: f64 = field.parse().map_err(|_| {
                    PermivarError::Format(format!(
                        "non-numeric distance '{}' in row for '{}'",
                        field, label
                    ))
                })?;
                lower[(row, col)] = d;
            }
            labels.push(label.to_string());
        }

        if let Some(extra) = lines.find(|l| !l.trim().is_empty()) {
            return Err(PermivarError::Format(format!(
                "declared {} samples but found extra data line '{}'",
                n,
                extra.trim()
            )));
        }

        let full = &lower + lower.transpose();
        Self::new(full, labels)
    }

    /// Parse a lower-triangular distance file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Serialize back to the lower-triangular format.
    pub fn to_lower_triangular(&self) -> String {
        let n = self.n_samples();
        let mut out = String::new();
        let _ = writeln!(out, "{}", n);
        for i in 0..n {
            out.push_str(&self.labels[i]);
            for j in 0..i {
                let _ = write!(out, "\t{}", self.matrix[(i, j)]);
            }
            out.push('\n');
        }
        out
    }

    /// The symmetric matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Sample labels in row/column order.
    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Distance between samples `i` and `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// Extract the submatrix for a subset of labels, in the given order.
    ///
    /// Unknown labels are an error; subsetting never silently drops.
    pub fn subset(&self, labels: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let mut rows = Vec::with_capacity(labels.len());
        for label in labels {
            match index.get(label.as_str()) {
                Some(&i) => rows.push(i),
                None => {
                    return Err(PermivarError::Join(format!(
                        "sample '{}' not present in distance matrix",
                        label
                    )))
                }
            }
        }
        let k = rows.len();
        let mut sub = DMatrix::zeros(k, k);
        for (a, &i) in rows.iter().enumerate() {
            for (b, &j) in rows.iter().enumerate() {
                sub[(a, b)] = self.matrix[(i, j)];
            }
        }
        Self::new(sub, labels.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FOUR_SAMPLES: &str = "4\n\
        A\n\
        B\t0.1\n\
        C\t0.9\t0.9\n\
        D\t0.9\t0.9\t0.1\n";

    #[test]
    fn test_parse_symmetric_zero_diagonal() {
        let dm = DistanceMatrix::parse(FOUR_SAMPLES).unwrap();
        assert_eq!(dm.n_samples(), 4);
        assert_eq!(dm.labels(), &["A", "B", "C", "D"]);
        for i in 0..4 {
            assert_eq!(dm.get(i, i), 0.0);
            for j in 0..4 {
                assert_eq!(dm.get(i, j), dm.get(j, i));
            }
        }
        assert_relative_eq!(dm.get(0, 1), 0.1);
        assert_relative_eq!(dm.get(3, 0), 0.9);
    }

    #[test]
    fn test_parse_single_sample() {
        let dm = DistanceMatrix::parse("1\nonly\n").unwrap();
        assert_eq!(dm.n_samples(), 1);
        assert_eq!(dm.get(0, 0), 0.0);
    }

    #[test]
    fn test_parse_count_mismatch() {
        let err = DistanceMatrix::parse("3\nA\nB\t0.5\n").unwrap_err();
        assert!(matches!(err, PermivarError::Format(_)));
    }

    #[test]
    fn test_parse_truncated_row() {
        let text = "3\nA\nB\t0.5\nC\t0.4\n";
        let err = DistanceMatrix::parse(text).unwrap_err();
        match err {
            PermivarError::Format(msg) => assert!(msg.contains("'C'"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_duplicate_label() {
        let text = "2\nA\nA\t0.5\n";
        assert!(DistanceMatrix::parse(text).is_err());
    }

    #[test]
    fn test_round_trip() {
        let dm = DistanceMatrix::parse(FOUR_SAMPLES).unwrap();
        let text = dm.to_lower_triangular();
        let back = DistanceMatrix::parse(&text).unwrap();
        assert_eq!(back.labels(), dm.labels());
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(back.get(i, j), dm.get(i, j), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", FOUR_SAMPLES).unwrap();
        file.flush().unwrap();
        let dm = DistanceMatrix::from_path(file.path()).unwrap();
        assert_eq!(dm.n_samples(), 4);
    }

    #[test]
    fn test_subset_preserves_order() {
        let dm = DistanceMatrix::parse(FOUR_SAMPLES).unwrap();
        let sub = dm
            .subset(&["D".to_string(), "A".to_string()])
            .unwrap();
        assert_eq!(sub.labels(), &["D", "A"]);
        assert_relative_eq!(sub.get(0, 1), 0.9);
    }

    #[test]
    fn test_subset_unknown_label() {
        let dm = DistanceMatrix::parse(FOUR_SAMPLES).unwrap();
        let err = dm.subset(&["Z".to_string()]).unwrap_err();
        assert!(matches!(err, PermivarError::Join(_)));
    }

    #[test]
    fn test_new_rejects_asymmetry() {
        let mut m = DMatrix::zeros(2, 2);
        m[(0, 1)] = 0.3;
        m[(1, 0)] = 0.4;
        let labels = vec!["a".to_string(), "b".to_string()];
        assert!(DistanceMatrix::new(m, labels).is_err());
    }
}
