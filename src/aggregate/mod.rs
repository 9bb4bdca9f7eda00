//! Flattening per-subset PERMANOVA results into reporting tables.

use crate::data::PermanovaResult;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One flat row: a term's share of variance within one analysis subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRow {
    /// Subset identifier (a day, a source, or empty for a single run).
    pub subset: String,
    /// Term name.
    pub effects: String,
    /// Fraction of total variance.
    pub r_sq: f64,
    /// Permutation p-value.
    pub p: f64,
}

/// A row-per-(subset, term) table of effects.
///
/// Pure reshaping: rows appear in the caller's subset order, and within a
/// subset in the result's term order, because downstream reporting keys
/// on row position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTable {
    pub rows: Vec<EffectRow>,
    /// Header for the subset column (`day`, `source`); `None` when the
    /// table holds a single unlabeled analysis.
    pub subset_column: Option<String>,
}

/// Collect term rows from several analyses into one flat table, tagging
/// each with its subset label. Residual and total rows are bookkeeping,
/// not effects, and are left out.
pub fn aggregate(results: &[(String, PermanovaResult)], subset_column: &str) -> ResultTable {
    let mut rows = Vec::new();
    for (subset, result) in results {
        for row in result.term_rows() {
            rows.push(EffectRow {
                subset: subset.clone(),
                effects: row.term.clone(),
                r_sq: row.r_squared,
                p: row.p_value.unwrap_or(f64::NAN),
            });
        }
    }
    ResultTable {
        rows,
        subset_column: Some(subset_column.to_string()),
    }
}

/// Flatten a single analysis (no subset discriminator column).
pub fn flatten(result: &PermanovaResult) -> ResultTable {
    let rows = result
        .term_rows()
        .map(|row| EffectRow {
            subset: String::new(),
            effects: row.term.clone(),
            r_sq: row.r_squared,
            p: row.p_value.unwrap_or(f64::NAN),
        })
        .collect();
    ResultTable {
        rows,
        subset_column: None,
    }
}

impl ResultTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Write the table as TSV: `effects`, `r_sq`, `p`, plus the subset
    /// discriminator column when present.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        match &self.subset_column {
            Some(name) => {
                writeln!(w, "effects\tr_sq\tp\t{}", name)?;
                for row in &self.rows {
                    writeln!(w, "{}\t{}\t{}\t{}", row.effects, row.r_sq, row.p, row.subset)?;
                }
            }
            None => {
                writeln!(w, "effects\tr_sq\tp")?;
                for row in &self.rows {
                    writeln!(w, "{}\t{}\t{}", row.effects, row.r_sq, row.p)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PermanovaRow;

    fn result_with_terms(terms: &[(&str, f64, f64)]) -> PermanovaResult {
        let mut rows: Vec<PermanovaRow> = terms
            .iter()
            .map(|(name, r_sq, p)| PermanovaRow {
                term: name.to_string(),
                df: 1,
                sum_sq: *r_sq,
                mean_sq: Some(*r_sq),
                f_statistic: Some(1.0),
                r_squared: *r_sq,
                p_value: Some(*p),
            })
            .collect();
        let used: f64 = terms.iter().map(|(_, r, _)| r).sum();
        rows.push(PermanovaRow {
            term: "Residuals".to_string(),
            df: 3,
            sum_sq: 1.0 - used,
            mean_sq: Some((1.0 - used) / 3.0),
            f_statistic: None,
            r_squared: 1.0 - used,
            p_value: None,
        });
        rows.push(PermanovaRow {
            term: "Total".to_string(),
            df: 4,
            sum_sq: 1.0,
            mean_sq: None,
            f_statistic: None,
            r_squared: 1.0,
            p_value: None,
        });
        PermanovaResult {
            rows,
            permutations: 99,
            exhaustive: false,
            seed: 42,
        }
    }

    #[test]
    fn test_aggregate_preserves_caller_order() {
        let results = vec![
            ("1".to_string(), result_with_terms(&[("source", 0.4, 0.01)])),
            ("0".to_string(), result_with_terms(&[("source", 0.2, 0.20)])),
        ];
        let table = aggregate(&results, "day");
        assert_eq!(table.n_rows(), 2);
        // Caller gave day 1 first; the table must not re-sort.
        assert_eq!(table.rows[0].subset, "1");
        assert_eq!(table.rows[1].subset, "0");
    }

    #[test]
    fn test_aggregate_excludes_residual_and_total() {
        let results = vec![(
            "jackson".to_string(),
            result_with_terms(&[("cage", 0.3, 0.05), ("day", 0.3, 0.02)]),
        )];
        let table = aggregate(&results, "source");
        let effects: Vec<&str> = table.rows.iter().map(|r| r.effects.as_str()).collect();
        assert_eq!(effects, vec!["cage", "day"]);
    }

    #[test]
    fn test_to_tsv_with_subset_column() {
        let results = vec![("0".to_string(), result_with_terms(&[("source", 0.4, 0.01)]))];
        let table = aggregate(&results, "day");
        let file = tempfile::NamedTempFile::new().unwrap();
        table.to_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("effects\tr_sq\tp\tday"));
        assert!(text.contains("source\t0.4\t0.01\t0"));
    }

    #[test]
    fn test_flatten_single_result() {
        let table = flatten(&result_with_terms(&[("source", 0.4, 0.01)]));
        assert!(table.subset_column.is_none());
        let file = tempfile::NamedTempFile::new().unwrap();
        table.to_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("effects\tr_sq\tp\n"));
    }
}
