//! Permutational multivariate analysis of variance on a distance matrix
//! (PERMANOVA / adonis).
//!
//! Variance is partitioned sequentially (Type I) over the expanded
//! formula terms, in declaration order, so `a*b` and `b*a` differ under
//! unbalanced designs; the caller's term order is the scientific claim.
//!
//! # Algorithm
//!
//! 1. Gower-center the squared distances once; the trace is the total SS.
//! 2. Build cumulative hat projectors per term; sequential SS is the gain
//!    in `tr(H G)`, degrees of freedom the gain in rank.
//! 3. Pseudo-F per term against the residual mean square.
//! 4. Permute sample arrangements (within strata when given) and count
//!    draws whose F reaches the observed one. When the design admits
//!    fewer distinct arrangements than the requested draw count, all of
//!    them are enumerated and the p-value is exact.

mod design;
mod gower;
mod permute;

pub use design::{ModelDesign, TermDesign};
pub use gower::{gower_center, total_ss};

use crate::data::{
    DesignFormula, DistanceMatrix, PermanovaResult, PermanovaRow, SampleAttributes, Strata,
};
use crate::error::{PermivarError, Result};
use nalgebra::DMatrix;
use permute::SimpleRng;
use rayon::prelude::*;

/// Tie tolerance when comparing a permuted F to the observed one.
const F_EPS: f64 = 1e-8;

/// Variance floor below which the partition is considered degenerate.
const SS_TOL: f64 = 1e-12;

/// Run a PERMANOVA over `dist` with the design given by `formula`.
///
/// `attrs` must carry one row per matrix label, in matrix order. With
/// `strata`, permutations shuffle samples only within their block.
/// `permutations` draws are sampled unless the design admits at most that
/// many distinct arrangements, in which case they are enumerated
/// exhaustively. Identical inputs and `seed` reproduce the result
/// bit-for-bit.
pub fn adonis(
    dist: &DistanceMatrix,
    attrs: &SampleAttributes,
    formula: &DesignFormula,
    strata: Option<&Strata>,
    permutations: usize,
    seed: u64,
) -> Result<PermanovaResult> {
    let n = dist.n_samples();
    if attrs.n_samples() != n {
        return Err(PermivarError::DimensionMismatch {
            expected: n,
            actual: attrs.n_samples(),
        });
    }
    for (i, (a, b)) in dist.labels().iter().zip(attrs.labels().iter()).enumerate() {
        if a != b {
            return Err(PermivarError::Join(format!(
                "attribute row {} is '{}' but distance matrix row {} is '{}'",
                i, b, i, a
            )));
        }
    }
    if let Some(s) = strata {
        if s.n_samples() != n {
            return Err(PermivarError::DimensionMismatch {
                expected: n,
                actual: s.n_samples(),
            });
        }
    }
    if permutations == 0 {
        return Err(PermivarError::InvalidParameter(
            "permutations must be at least 1".to_string(),
        ));
    }

    let g = gower_center(dist);
    let ss_total = total_ss(&g);
    if ss_total <= SS_TOL {
        return Err(PermivarError::Design(
            "distance matrix has no variance to partition".to_string(),
        ));
    }

    let model = ModelDesign::build(formula, attrs)?;
    let df_res = model.residual_df(n);
    if df_res == 0 {
        return Err(PermivarError::Design(
            "zero residual degrees of freedom (design is saturated)".to_string(),
        ));
    }

    let observed = partition(&model, &g, ss_total, df_res, None);
    if observed.ss_res <= SS_TOL {
        return Err(PermivarError::Design(
            "residual variation is zero; pseudo-F is undefined".to_string(),
        ));
    }

    let blocks = match strata {
        Some(s) => s.members(),
        None => vec![(0..n).collect()],
    };
    let keys = design_keys(formula, attrs)?;

    let n_terms = model.terms.len();
    let (counts, n_draws, exhaustive) =
        match permute::count_distinct(&blocks, &keys, permutations as u64) {
            Some(n_distinct) => {
                log::debug!(
                    "design admits {} distinct arrangements; enumerating exhaustively",
                    n_distinct
                );
                let arrangements = permute::enumerate_arrangements(&blocks, &keys, n);
                let counts = count_extreme(
                    &model,
                    &g,
                    ss_total,
                    df_res,
                    &observed.f,
                    arrangements.par_iter().cloned(),
                );
                (counts, arrangements.len(), true)
            }
            None => {
                log::debug!("sampling {} permutations (seed {})", permutations, seed);
                let counts = count_extreme(
                    &model,
                    &g,
                    ss_total,
                    df_res,
                    &observed.f,
                    (0..permutations).into_par_iter().map(|draw| {
                        let mut rng = SimpleRng::new(seed.wrapping_add(draw as u64));
                        permute::draw_arrangement(&blocks, n, &mut rng)
                    }),
                );
                (counts, permutations, false)
            }
        };

    let mut rows = Vec::with_capacity(n_terms + 2);
    for (t, term) in model.terms.iter().enumerate() {
        let ss = observed.ss[t];
        let ms = ss / term.df as f64;
        let p = if exhaustive {
            counts[t] as f64 / n_draws as f64
        } else {
            (counts[t] as f64 + 1.0) / (n_draws as f64 + 1.0)
        };
        rows.push(PermanovaRow {
            term: term.name.clone(),
            df: term.df,
            sum_sq: ss,
            mean_sq: Some(ms),
            f_statistic: Some(observed.f[t]),
            r_squared: ss / ss_total,
            p_value: Some(p),
        });
    }
    rows.push(PermanovaRow {
        term: "Residuals".to_string(),
        df: df_res,
        sum_sq: observed.ss_res,
        mean_sq: Some(observed.ss_res / df_res as f64),
        f_statistic: None,
        r_squared: observed.ss_res / ss_total,
        p_value: None,
    });
    rows.push(PermanovaRow {
        term: "Total".to_string(),
        df: n - 1,
        sum_sq: ss_total,
        mean_sq: None,
        f_statistic: None,
        r_squared: 1.0,
        p_value: None,
    });

    Ok(PermanovaResult {
        rows,
        permutations: n_draws,
        exhaustive,
        seed,
    })
}

/// Per-sample design key: the level codes of every formula factor. Two
/// samples with equal keys are exchangeable under any arrangement.
fn design_keys(formula: &DesignFormula, attrs: &SampleAttributes) -> Result<Vec<Vec<usize>>> {
    let cols: Vec<&[usize]> = formula
        .variables()
        .iter()
        .map(|v| attrs.codes(v))
        .collect::<Result<_>>()?;
    Ok((0..attrs.n_samples())
        .map(|i| cols.iter().map(|codes| codes[i]).collect())
        .collect())
}

struct Partition {
    ss: Vec<f64>,
    ss_res: f64,
    f: Vec<f64>,
}

/// Sequential sums of squares and pseudo-F for one arrangement.
///
/// `arrangement` reindexes the Gower matrix (`G_p[i][j] = G[p_i][p_j]`);
/// hat projectors stay fixed, so each draw costs O(terms · n²).
fn partition(
    model: &ModelDesign,
    g: &DMatrix<f64>,
    ss_total: f64,
    df_res: usize,
    arrangement: Option<&[usize]>,
) -> Partition {
    let n = g.nrows();
    let mut ss = Vec::with_capacity(model.terms.len());
    let mut prev_trace = 0.0;
    for term in &model.terms {
        let mut tr = 0.0;
        match arrangement {
            None => {
                for i in 0..n {
                    for j in 0..n {
                        tr += term.hat[(i, j)] * g[(i, j)];
                    }
                }
            }
            Some(p) => {
                for i in 0..n {
                    for j in 0..n {
                        tr += term.hat[(i, j)] * g[(p[i], p[j])];
                    }
                }
            }
        }
        ss.push(tr - prev_trace);
        prev_trace = tr;
    }
    let ss_res = ss_total - prev_trace;
    let ms_res = ss_res / df_res as f64;
    let f = model
        .terms
        .iter()
        .zip(ss.iter())
        .map(|(term, &s)| {
            let ms = s / term.df as f64;
            if ms_res > 0.0 {
                ms / ms_res
            } else {
                f64::INFINITY
            }
        })
        .collect();
    Partition { ss, ss_res, f }
}

/// Count, per term, the arrangements whose F reaches the observed F.
fn count_extreme<I>(
    model: &ModelDesign,
    g: &DMatrix<f64>,
    ss_total: f64,
    df_res: usize,
    f_obs: &[f64],
    arrangements: I,
) -> Vec<usize>
where
    I: ParallelIterator<Item = Vec<usize>>,
{
    arrangements
        .map(|p| {
            let perm = partition(model, g, ss_total, df_res, Some(&p));
            perm.f
                .iter()
                .zip(f_obs.iter())
                .map(|(&fp, &fo)| usize::from(fp >= fo - F_EPS))
                .collect::<Vec<usize>>()
        })
        .reduce(
            || vec![0usize; model.terms.len()],
            |mut acc, item| {
                for (a, b) in acc.iter_mut().zip(item.iter()) {
                    *a += b;
                }
                acc
            },
        )
}
