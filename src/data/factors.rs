//! Fixed-level factor specs and the label/metadata join.

use crate::data::MetadataTable;
use crate::error::{PermivarError, Result};
use serde::{Deserialize, Serialize};

/// One categorical column with its explicit, ordered level list.
///
/// Levels are declared up front rather than collected from the data so
/// that the design encoding is identical across subsets that do not
/// contain every level (a day-7 subset still codes `day` against the
/// full -1..9 sequence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorLevels {
    /// Metadata column name.
    pub column: String,
    /// Ordered level list; codes index into this.
    pub levels: Vec<String>,
}

/// The reusable set of factor declarations shared by every analysis of a
/// study.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorLevelSpecs {
    pub factors: Vec<FactorLevels>,
}

impl FactorLevelSpecs {
    pub fn new(factors: Vec<FactorLevels>) -> Self {
        Self { factors }
    }

    /// Look up the declared levels for a column.
    pub fn levels_for(&self, column: &str) -> Option<&[String]> {
        self.factors
            .iter()
            .find(|f| f.column == column)
            .map(|f| f.levels.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.factors.iter().map(|f| f.column.as_str())
    }
}

/// A coded categorical column of a [`SampleAttributes`] table.
#[derive(Debug, Clone)]
pub struct FactorColumn {
    pub name: String,
    /// The full declared level list, not just the levels present.
    pub levels: Vec<String>,
    /// Per-sample index into `levels`.
    pub codes: Vec<usize>,
}

impl FactorColumn {
    /// Level string for sample `i`.
    pub fn level_of(&self, i: usize) -> &str {
        &self.levels[self.codes[i]]
    }
}

/// Categorical attributes for an ordered set of samples, aligned with the
/// rows of a distance matrix.
#[derive(Debug, Clone)]
pub struct SampleAttributes {
    labels: Vec<String>,
    columns: Vec<FactorColumn>,
}

impl SampleAttributes {
    /// Join distance-matrix labels against a metadata table, coding every
    /// declared factor column with its fixed level set.
    ///
    /// Strict: a label with no metadata row is an error, as is a metadata
    /// value outside the declared levels. Dropping unmatched labels must
    /// be opted into via [`SampleAttributes::join_inner`].
    pub fn join(
        labels: &[String],
        metadata: &MetadataTable,
        specs: &FactorLevelSpecs,
    ) -> Result<Self> {
        for label in labels {
            if !metadata.has_sample(label) {
                return Err(PermivarError::Join(format!(
                    "sample '{}' has no metadata row",
                    label
                )));
            }
        }
        Self::build(labels, metadata, specs)
    }

    /// Inner-join variant for pre-filtered subsets: labels without a
    /// metadata row are dropped, and the kept labels are returned so the
    /// caller can subset the distance matrix to match.
    pub fn join_inner(
        labels: &[String],
        metadata: &MetadataTable,
        specs: &FactorLevelSpecs,
    ) -> Result<(Self, Vec<String>)> {
        let kept: Vec<String> = labels
            .iter()
            .filter(|l| metadata.has_sample(l))
            .cloned()
            .collect();
        let attrs = Self::build(&kept, metadata, specs)?;
        Ok((attrs, kept))
    }

    fn build(
        labels: &[String],
        metadata: &MetadataTable,
        specs: &FactorLevelSpecs,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(specs.factors.len());
        for spec in &specs.factors {
            if !metadata.has_column(&spec.column) {
                return Err(PermivarError::MissingColumn(spec.column.clone()));
            }
            let mut codes = Vec::with_capacity(labels.len());
            for label in labels {
                let value = metadata.get(label, &spec.column).unwrap_or("");
                let code = spec
                    .levels
                    .iter()
                    .position(|lv| lv == value)
                    .ok_or_else(|| {
                        PermivarError::Join(format!(
                            "sample '{}': value '{}' in column '{}' is not a declared level",
                            label, value, spec.column
                        ))
                    })?;
                codes.push(code);
            }
            columns.push(FactorColumn {
                name: spec.column.clone(),
                levels: spec.levels.clone(),
                codes,
            });
        }
        Ok(Self {
            labels: labels.to_vec(),
            columns,
        })
    }

    /// Sample labels, in distance-matrix order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Fetch a factor column by name.
    pub fn column(&self, name: &str) -> Result<&FactorColumn> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PermivarError::MissingColumn(name.to_string()))
    }

    /// Per-sample level codes for a column.
    pub fn codes(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.column(name)?.codes)
    }

    /// Restrict to the samples whose `column` value equals `level`,
    /// returning the retained labels alongside the sliced attributes.
    pub fn subset_where(&self, column: &str, level: &str) -> Result<(Self, Vec<String>)> {
        let col = self.column(column)?;
        let level_idx = col.levels.iter().position(|l| l == level).ok_or_else(|| {
            PermivarError::InvalidParameter(format!(
                "'{}' is not a declared level of '{}'",
                level, column
            ))
        })?;
        let keep: Vec<usize> = col
            .codes
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == level_idx)
            .map(|(i, _)| i)
            .collect();
        let labels: Vec<String> = keep.iter().map(|&i| self.labels[i].clone()).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| FactorColumn {
                name: c.name.clone(),
                levels: c.levels.clone(),
                codes: keep.iter().map(|&i| c.codes[i]).collect(),
            })
            .collect();
        Ok((
            Self {
                labels: labels.clone(),
                columns,
            },
            labels,
        ))
    }

    /// Derive a permutation-blocking vector from a factor column.
    pub fn strata(&self, column: &str) -> Result<Strata> {
        let col = self.column(column)?;
        Ok(Strata::from_codes(&col.codes))
    }
}

/// Assignment of each sample to a permutation block.
///
/// Restricted permutation shuffles samples only within their block,
/// preserving block membership across every draw.
#[derive(Debug, Clone)]
pub struct Strata {
    blocks: Vec<usize>,
}

impl Strata {
    /// Build from per-sample block codes (renumbered densely).
    pub fn from_codes(codes: &[usize]) -> Self {
        let mut remap = std::collections::HashMap::new();
        let blocks = codes
            .iter()
            .map(|&c| {
                let next = remap.len();
                *remap.entry(c).or_insert(next)
            })
            .collect();
        Self { blocks }
    }

    /// Block id per sample.
    pub fn blocks(&self) -> &[usize] {
        &self.blocks
    }

    pub fn n_samples(&self) -> usize {
        self.blocks.len()
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.iter().copied().max().map_or(0, |m| m + 1)
    }

    /// Sample indices grouped by block.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.n_blocks()];
        for (i, &b) in self.blocks.iter().enumerate() {
            groups[b].push(i);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn metadata() -> MetadataTable {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tsource\tday").unwrap();
        writeln!(file, "s1\tjackson\t0").unwrap();
        writeln!(file, "s2\ttaconic\t0").unwrap();
        writeln!(file, "s3\tjackson\t1").unwrap();
        file.flush().unwrap();
        MetadataTable::from_tsv(file.path(), "id").unwrap()
    }

    fn specs() -> FactorLevelSpecs {
        FactorLevelSpecs::new(vec![
            FactorLevels {
                column: "source".to_string(),
                levels: vec!["jackson".to_string(), "taconic".to_string()],
            },
            FactorLevels {
                column: "day".to_string(),
                // Fixed sequence independent of which days this subset has.
                levels: (-1..=9).map(|d| d.to_string()).collect(),
            },
        ])
    }

    fn labels(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_join_codes_against_fixed_levels() {
        let attrs = SampleAttributes::join(&labels(&["s1", "s2", "s3"]), &metadata(), &specs())
            .unwrap();
        assert_eq!(attrs.n_samples(), 3);
        assert_eq!(attrs.codes("source").unwrap(), &[0, 1, 0]);
        // day "0" codes to index 1 of the fixed -1..9 sequence even though
        // day -1 is absent from this subset.
        assert_eq!(attrs.codes("day").unwrap(), &[1, 1, 2]);
        assert_eq!(attrs.column("day").unwrap().levels.len(), 11);
    }

    #[test]
    fn test_join_missing_label_names_it() {
        let err =
            SampleAttributes::join(&labels(&["s1", "ghost"]), &metadata(), &specs()).unwrap_err();
        match err {
            PermivarError::Join(msg) => assert!(msg.contains("'ghost'"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_join_undeclared_level() {
        let specs = FactorLevelSpecs::new(vec![FactorLevels {
            column: "source".to_string(),
            levels: vec!["jackson".to_string()],
        }]);
        let err = SampleAttributes::join(&labels(&["s2"]), &metadata(), &specs).unwrap_err();
        assert!(matches!(err, PermivarError::Join(_)));
    }

    #[test]
    fn test_join_inner_drops_and_reports() {
        let (attrs, kept) =
            SampleAttributes::join_inner(&labels(&["s1", "ghost", "s3"]), &metadata(), &specs())
                .unwrap();
        assert_eq!(kept, labels(&["s1", "s3"]));
        assert_eq!(attrs.n_samples(), 2);
    }

    #[test]
    fn test_subset_where() {
        let attrs = SampleAttributes::join(&labels(&["s1", "s2", "s3"]), &metadata(), &specs())
            .unwrap();
        let (sub, kept) = attrs.subset_where("source", "jackson").unwrap();
        assert_eq!(kept, labels(&["s1", "s3"]));
        assert_eq!(sub.codes("day").unwrap(), &[1, 2]);
    }

    #[test]
    fn test_strata_from_column() {
        let attrs = SampleAttributes::join(&labels(&["s1", "s2", "s3"]), &metadata(), &specs())
            .unwrap();
        let strata = attrs.strata("source").unwrap();
        assert_eq!(strata.n_blocks(), 2);
        assert_eq!(strata.blocks(), &[0, 1, 0]);
        assert_eq!(strata.members(), vec![vec![0, 2], vec![1]]);
    }
}
