//! Variance-partitioning result types.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One row of a PERMANOVA table: a model term, the residual, or the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanovaRow {
    /// Term name (`source`, `source:unique_cage`, `Residuals`, `Total`).
    pub term: String,
    /// Degrees of freedom.
    pub df: usize,
    /// Sequential sum of squares.
    pub sum_sq: f64,
    /// Mean square (`sum_sq / df`); absent for the total row.
    pub mean_sq: Option<f64>,
    /// Pseudo-F statistic; absent for residual and total rows.
    pub f_statistic: Option<f64>,
    /// Fraction of total variance.
    pub r_squared: f64,
    /// Permutation p-value; absent for residual and total rows.
    pub p_value: Option<f64>,
}

/// Full output of one variance-partitioning run.
///
/// Rows are ordered: every model term in decomposition order, then
/// `Residuals`, then `Total`. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanovaResult {
    pub rows: Vec<PermanovaRow>,
    /// Number of permutations evaluated (distinct arrangements when
    /// `exhaustive`).
    pub permutations: usize,
    /// Whether all distinct arrangements were enumerated instead of
    /// sampled.
    pub exhaustive: bool,
    /// Seed used for the sampled path.
    pub seed: u64,
}

impl PermanovaResult {
    /// Rows for model terms only (residual and total excluded).
    pub fn term_rows(&self) -> impl Iterator<Item = &PermanovaRow> {
        self.rows
            .iter()
            .filter(|r| r.term != "Residuals" && r.term != "Total")
    }

    /// Look up a row by term name.
    pub fn row(&self, term: &str) -> Option<&PermanovaRow> {
        self.rows.iter().find(|r| r.term == term)
    }

    /// The residual row.
    pub fn residual(&self) -> Option<&PermanovaRow> {
        self.rows.iter().find(|r| r.term == "Residuals")
    }

    /// The total row.
    pub fn total(&self) -> Option<&PermanovaRow> {
        self.rows.iter().find(|r| r.term == "Total")
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the full table (term, df, SS, MS, F, R², p) as TSV.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "term\tdf\tsum_sq\tmean_sq\tf\tr_sq\tp")?;
        for row in &self.rows {
            let fmt_opt = |v: Option<f64>| v.map_or("NA".to_string(), |x| x.to_string());
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.term,
                row.df,
                row.sum_sq,
                fmt_opt(row.mean_sq),
                fmt_opt(row.f_statistic),
                row.r_squared,
                fmt_opt(row.p_value),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> PermanovaResult {
        PermanovaResult {
            rows: vec![
                PermanovaRow {
                    term: "source".to_string(),
                    df: 1,
                    sum_sq: 0.8,
                    mean_sq: Some(0.8),
                    f_statistic: Some(16.0),
                    r_squared: 0.8,
                    p_value: Some(0.01),
                },
                PermanovaRow {
                    term: "Residuals".to_string(),
                    df: 4,
                    sum_sq: 0.2,
                    mean_sq: Some(0.05),
                    f_statistic: None,
                    r_squared: 0.2,
                    p_value: None,
                },
                PermanovaRow {
                    term: "Total".to_string(),
                    df: 5,
                    sum_sq: 1.0,
                    mean_sq: None,
                    f_statistic: None,
                    r_squared: 1.0,
                    p_value: None,
                },
            ],
            permutations: 99,
            exhaustive: false,
            seed: 42,
        }
    }

    #[test]
    fn test_term_rows_excludes_bookkeeping() {
        let res = sample_result();
        let terms: Vec<&str> = res.term_rows().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec!["source"]);
        assert_eq!(res.residual().unwrap().df, 4);
        assert_eq!(res.total().unwrap().r_squared, 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let res = sample_result();
        let json = res.to_json().unwrap();
        let back: PermanovaResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rows, res.rows);
        assert_eq!(back.permutations, 99);
    }

    #[test]
    fn test_write_tsv() {
        let res = sample_result();
        let file = tempfile::NamedTempFile::new().unwrap();
        res.write_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("term\tdf\tsum_sq"));
        assert!(text.contains("source\t1\t0.8"));
        assert!(text.contains("Total"));
    }
}
