//! PCoA coordinate and loadings tables (visualization boundary).
//!
//! These are consumed, joined with factors, and re-exported for external
//! plotting; nothing here feeds the statistical engine.

use crate::data::SampleAttributes;
use crate::error::{PermivarError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Low-dimensional sample coordinates from a PCoA embedding.
#[derive(Debug, Clone)]
pub struct OrdinationAxes {
    labels: Vec<String>,
    /// Row-major: `coords[sample][axis]`.
    coords: Vec<Vec<f64>>,
    n_axes: usize,
}

impl OrdinationAxes {
    /// Load a tab-separated axes table: a `group` label column plus
    /// `axis1`, `axis2`, ... numeric columns (recognized by name, kept in
    /// numeric order regardless of file order).
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let group_idx = headers
            .iter()
            .position(|h| h == "group")
            .ok_or_else(|| PermivarError::MissingColumn("group".to_string()))?;

        let axis_re = Regex::new(r"^axis(\d+)$")?;
        let mut axis_cols: Vec<(usize, usize)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| {
                axis_re
                    .captures(h)
                    .and_then(|c| c[1].parse::<usize>().ok())
                    .map(|axis| (axis, i))
            })
            .collect();
        axis_cols.sort();
        if axis_cols.is_empty() {
            return Err(PermivarError::MissingColumn("axis1".to_string()));
        }

        let mut labels = Vec::new();
        let mut coords = Vec::new();
        for record in reader.records() {
            let record = record?;
            let label = record.get(group_idx).unwrap_or("").trim().to_string();
            if label.is_empty() {
                continue;
            }
            let mut row = Vec::with_capacity(axis_cols.len());
            for &(axis, col) in &axis_cols {
                let raw = record.get(col).unwrap_or("").trim();
                let value: f64 = raw.parse().map_err(|_| {
                    PermivarError::Format(format!(
                        "non-numeric axis{} value '{}' for sample '{}'",
                        axis, raw, label
                    ))
                })?;
                row.push(value);
            }
            labels.push(label);
            coords.push(row);
        }

        Ok(Self {
            labels,
            coords,
            n_axes: axis_cols.len(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_axes(&self) -> usize {
        self.n_axes
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Coordinates for sample `i`.
    pub fn coords(&self, i: usize) -> &[f64] {
        &self.coords[i]
    }

    /// Join coordinates with factor attributes into a plot-ready table.
    ///
    /// Strict on labels both ways the statistical core cares about: every
    /// attribute label must have coordinates.
    pub fn join(&self, attrs: &SampleAttributes) -> Result<PlotTable> {
        let index: HashMap<&str, usize> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut rows = Vec::with_capacity(attrs.n_samples());
        for (i, label) in attrs.labels().iter().enumerate() {
            let &coord_idx = index.get(label.as_str()).ok_or_else(|| {
                PermivarError::Join(format!("sample '{}' has no ordination coordinates", label))
            })?;
            rows.push((i, coord_idx));
        }

        Ok(PlotTable {
            axes: self.clone(),
            attrs: attrs.clone(),
            rows,
        })
    }
}

/// Joined coordinates + factors, ready for TSV export to a plotter.
#[derive(Debug, Clone)]
pub struct PlotTable {
    axes: OrdinationAxes,
    attrs: SampleAttributes,
    /// (attribute row, coordinate row) pairs.
    rows: Vec<(usize, usize)>,
}

impl PlotTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Write `group`, axis columns, then one column per factor.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P, factor_columns: &[String]) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        write!(w, "group")?;
        for axis in 1..=self.axes.n_axes() {
            write!(w, "\taxis{}", axis)?;
        }
        for col in factor_columns {
            write!(w, "\t{}", col)?;
        }
        writeln!(w)?;

        for &(attr_row, coord_row) in &self.rows {
            write!(w, "{}", self.attrs.labels()[attr_row])?;
            for v in self.axes.coords(coord_row) {
                write!(w, "\t{}", v)?;
            }
            for col in factor_columns {
                let column = self.attrs.column(col)?;
                write!(w, "\t{}", column.level_of(attr_row))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

/// Per-axis variance-explained percentages from a PCoA loadings file.
#[derive(Debug, Clone)]
pub struct AxisLoadings {
    /// `(axis number, percent of variance)` sorted by axis.
    loadings: Vec<(usize, f64)>,
}

impl AxisLoadings {
    /// Load a tab-separated loadings table with `axis` and `loading`
    /// columns.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let axis_idx = headers
            .iter()
            .position(|h| h == "axis")
            .ok_or_else(|| PermivarError::MissingColumn("axis".to_string()))?;
        let loading_idx = headers
            .iter()
            .position(|h| h == "loading")
            .ok_or_else(|| PermivarError::MissingColumn("loading".to_string()))?;

        let mut loadings = Vec::new();
        for record in reader.records() {
            let record = record?;
            let axis: usize = record
                .get(axis_idx)
                .unwrap_or("")
                .trim()
                .parse()
                .map_err(|_| PermivarError::Format("non-integer axis index".to_string()))?;
            let loading: f64 = record
                .get(loading_idx)
                .unwrap_or("")
                .trim()
                .parse()
                .map_err(|_| PermivarError::Format("non-numeric loading".to_string()))?;
            loadings.push((axis, loading));
        }
        loadings.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { loadings })
    }

    /// Percent of variance for one axis.
    pub fn percent(&self, axis: usize) -> Option<f64> {
        self.loadings
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, l)| *l)
    }

    pub fn n_axes(&self) -> usize {
        self.loadings.len()
    }
}
