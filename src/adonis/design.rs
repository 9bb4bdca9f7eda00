//! Sequential model designs: per-term indicator columns, cumulative
//! projectors, and degrees of freedom by rank gain.

use crate::data::{DesignFormula, SampleAttributes, Term};
use crate::error::{PermivarError, Result};
use nalgebra::{DMatrix, SVD};

/// One model term with its cumulative hat projector.
///
/// `hat` projects onto the span of the intercept plus every term up to
/// and including this one, so the term's sequential sum of squares is
/// `tr(hat G) - tr(prev.hat G)`.
#[derive(Debug)]
pub struct TermDesign {
    pub name: String,
    pub df: usize,
    pub hat: DMatrix<f64>,
}

/// The full sequential design for a formula over one attribute table.
#[derive(Debug)]
pub struct ModelDesign {
    pub terms: Vec<TermDesign>,
    /// Rank of the full design including the intercept.
    pub rank_full: usize,
}

impl ModelDesign {
    /// Build the cumulative designs for every expanded formula term, in
    /// decomposition order.
    ///
    /// Each term contributes the full indicator basis of its factor-level
    /// combinations (over the fixed level sets); redundancy is absorbed
    /// by rank, and a term whose columns add no rank is an
    /// overparameterization error, not a silent zero row.
    pub fn build(formula: &DesignFormula, attrs: &SampleAttributes) -> Result<Self> {
        let n = attrs.n_samples();
        for var in formula.variables() {
            if !attrs.has_column(var) {
                return Err(PermivarError::Design(format!(
                    "formula references undeclared column '{}'",
                    var
                )));
            }
        }

        let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
        let mut prev_rank = 1usize;
        let mut terms = Vec::with_capacity(formula.terms.len());

        for term in &formula.terms {
            columns.extend(term_columns(term, attrs)?);
            let x = columns_to_matrix(&columns, n);
            let (rank, hat) = hat_projector(&x)?;
            let df = rank.saturating_sub(prev_rank);
            if df == 0 {
                return Err(PermivarError::Design(format!(
                    "term '{}' has zero degrees of freedom (single level or aliased by preceding terms)",
                    term.name
                )));
            }
            terms.push(TermDesign {
                name: term.name.clone(),
                df,
                hat,
            });
            prev_rank = rank;
        }

        Ok(Self {
            terms,
            rank_full: prev_rank,
        })
    }

    /// Residual degrees of freedom for `n` samples.
    pub fn residual_df(&self, n: usize) -> usize {
        n.saturating_sub(self.rank_full)
    }
}

/// Indicator columns for one term: the cartesian product of the fixed
/// level sets of its factors. All-zero columns (level combinations absent
/// from this subset) are dropped; they carry no rank.
fn term_columns(term: &Term, attrs: &SampleAttributes) -> Result<Vec<Vec<f64>>> {
    let n = attrs.n_samples();
    let factors: Vec<_> = term
        .factors
        .iter()
        .map(|f| attrs.column(f))
        .collect::<Result<_>>()?;
    let sizes: Vec<usize> = factors.iter().map(|f| f.levels.len()).collect();

    let mut columns = Vec::new();
    let mut combo = vec![0usize; factors.len()];
    loop {
        let mut col = vec![0.0; n];
        let mut any = false;
        for i in 0..n {
            if factors
                .iter()
                .zip(combo.iter())
                .all(|(f, &lvl)| f.codes[i] == lvl)
            {
                col[i] = 1.0;
                any = true;
            }
        }
        if any {
            columns.push(col);
        }

        // odometer over level combinations
        let mut pos = combo.len();
        loop {
            if pos == 0 {
                return Ok(columns);
            }
            pos -= 1;
            combo[pos] += 1;
            if combo[pos] < sizes[pos] {
                break;
            }
            combo[pos] = 0;
        }
    }
}

fn columns_to_matrix(columns: &[Vec<f64>], n: usize) -> DMatrix<f64> {
    let p = columns.len();
    let mut x = DMatrix::zeros(n, p);
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            x[(i, j)] = v;
        }
    }
    x
}

/// Numerical rank and hat projector of a design via SVD.
///
/// `H = U_r U_rᵀ` over the singular vectors whose values clear the
/// rank tolerance, which handles rank-deficient indicator bases without
/// any explicit contrast bookkeeping.
fn hat_projector(x: &DMatrix<f64>) -> Result<(usize, DMatrix<f64>)> {
    let n = x.nrows();
    let svd = SVD::new(x.clone(), true, false);
    let u = svd.u.as_ref().ok_or_else(|| {
        PermivarError::Design("singular value decomposition of the design failed".to_string())
    })?;
    let max_sv = svd.singular_values.iter().cloned().fold(0.0f64, f64::max);
    let tol = max_sv * (x.nrows().max(x.ncols()) as f64) * f64::EPSILON;

    let keep: Vec<usize> = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|(_, &sv)| sv > tol)
        .map(|(i, _)| i)
        .collect();

    let mut hat = DMatrix::zeros(n, n);
    for &k in &keep {
        let uk = u.column(k);
        for i in 0..n {
            for j in 0..n {
                hat[(i, j)] += uk[i] * uk[j];
            }
        }
    }
    Ok((keep.len(), hat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DesignFormula, FactorLevelSpecs, FactorLevels, MetadataTable};
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn attrs_two_factor() -> SampleAttributes {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tsource\tcage").unwrap();
        writeln!(file, "s1\tjackson\tc1").unwrap();
        writeln!(file, "s2\tjackson\tc2").unwrap();
        writeln!(file, "s3\ttaconic\tc3").unwrap();
        writeln!(file, "s4\ttaconic\tc4").unwrap();
        file.flush().unwrap();
        let meta = MetadataTable::from_tsv(file.path(), "id").unwrap();
        let specs = FactorLevelSpecs::new(vec![
            FactorLevels {
                column: "source".to_string(),
                levels: vec!["jackson".to_string(), "taconic".to_string()],
            },
            FactorLevels {
                column: "cage".to_string(),
                levels: vec![
                    "c1".to_string(),
                    "c2".to_string(),
                    "c3".to_string(),
                    "c4".to_string(),
                ],
            },
        ]);
        let labels: Vec<String> = ["s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect();
        SampleAttributes::join(&labels, &meta, &specs).unwrap()
    }

    #[test]
    fn test_main_effect_df() {
        let attrs = attrs_two_factor();
        let formula = DesignFormula::parse("source").unwrap();
        let design = ModelDesign::build(&formula, &attrs).unwrap();
        assert_eq!(design.terms.len(), 1);
        assert_eq!(design.terms[0].df, 1);
        assert_eq!(design.residual_df(4), 2);
    }

    #[test]
    fn test_nested_df() {
        // cage within source: 4 cages - 2 sources = 2 df.
        let attrs = attrs_two_factor();
        let formula = DesignFormula::parse("source/cage").unwrap();
        let design = ModelDesign::build(&formula, &attrs).unwrap();
        assert_eq!(design.terms[0].df, 1);
        assert_eq!(design.terms[1].name, "source:cage");
        assert_eq!(design.terms[1].df, 2);
        assert_eq!(design.residual_df(4), 0);
    }

    #[test]
    fn test_hat_is_projector() {
        let attrs = attrs_two_factor();
        let formula = DesignFormula::parse("source").unwrap();
        let design = ModelDesign::build(&formula, &attrs).unwrap();
        let h = &design.terms[0].hat;
        let h2 = h * h;
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(h2[(i, j)], h[(i, j)], epsilon = 1e-10);
                assert_relative_eq!(h[(i, j)], h[(j, i)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_aliased_term_is_design_error() {
        // One cage per source: cage adds no rank beyond source.
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tsource\tcage").unwrap();
        writeln!(file, "s1\tjackson\tc1").unwrap();
        writeln!(file, "s2\tjackson\tc1").unwrap();
        writeln!(file, "s3\ttaconic\tc2").unwrap();
        writeln!(file, "s4\ttaconic\tc2").unwrap();
        file.flush().unwrap();
        let meta = MetadataTable::from_tsv(file.path(), "id").unwrap();
        let specs = FactorLevelSpecs::new(vec![
            FactorLevels {
                column: "source".to_string(),
                levels: vec!["jackson".to_string(), "taconic".to_string()],
            },
            FactorLevels {
                column: "cage".to_string(),
                levels: vec!["c1".to_string(), "c2".to_string()],
            },
        ]);
        let labels: Vec<String> = ["s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect();
        let attrs = SampleAttributes::join(&labels, &meta, &specs).unwrap();

        let formula = DesignFormula::parse("source/cage").unwrap();
        let err = ModelDesign::build(&formula, &attrs).unwrap_err();
        match err {
            PermivarError::Design(msg) => assert!(msg.contains("source:cage"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_column_is_design_error() {
        let attrs = attrs_two_factor();
        let formula = DesignFormula::parse("treatment").unwrap();
        let err = ModelDesign::build(&formula, &attrs).unwrap_err();
        assert!(matches!(err, PermivarError::Design(_)));
    }

    #[test]
    fn test_fixed_levels_absent_from_subset_add_nothing() {
        // Declared day levels -1..9 but only one day present: the day
        // term would be aliased with the intercept.
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tday").unwrap();
        writeln!(file, "s1\t0").unwrap();
        writeln!(file, "s2\t0").unwrap();
        writeln!(file, "s3\t0").unwrap();
        file.flush().unwrap();
        let meta = MetadataTable::from_tsv(file.path(), "id").unwrap();
        let specs = FactorLevelSpecs::new(vec![FactorLevels {
            column: "day".to_string(),
            levels: (-1..=9).map(|d| d.to_string()).collect(),
        }]);
        let labels: Vec<String> = ["s1", "s2", "s3"].iter().map(|s| s.to_string()).collect();
        let attrs = SampleAttributes::join(&labels, &meta, &specs).unwrap();
        let formula = DesignFormula::parse("day").unwrap();
        assert!(ModelDesign::build(&formula, &attrs).is_err());
    }
}
