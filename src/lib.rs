//! Permutational variance partitioning for microbiome distance matrices.
//!
//! This library is the statistical core of a 16S community analysis:
//! it reads pairwise-distance files, attaches categorical experimental
//! factors with fixed level sets, partitions community-distance variance
//! across nested/crossed designs by PERMANOVA, and flattens per-subset
//! results into reporting tables.
//!
//! # Overview
//!
//! - **data**: distance matrices, metadata, factor joins, formulas,
//!   ordination tables, result types
//! - **adonis**: the permutational variance-partitioning engine
//! - **aggregate**: flattening results across subsets
//! - **config**: YAML analysis configuration
//!
//! # Example
//!
//! ```no_run
//! use permivar::prelude::*;
//!
//! let dist = DistanceMatrix::from_path("day0.dist").unwrap();
//! let metadata = MetadataTable::from_tsv("metadata.tsv", "id").unwrap();
//! let specs = FactorLevelSpecs::new(vec![FactorLevels {
//!     column: "source".to_string(),
//!     levels: vec!["jackson".to_string(), "taconic".to_string()],
//! }]);
//!
//! let attrs = SampleAttributes::join(dist.labels(), &metadata, &specs).unwrap();
//! let formula = DesignFormula::parse("source").unwrap();
//! let result = adonis(&dist, &attrs, &formula, None, 9999, 42).unwrap();
//! for row in result.term_rows() {
//!     println!("{}\t{}\t{:?}", row.term, row.r_squared, row.p_value);
//! }
//! ```

pub mod adonis;
pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::adonis::adonis;
    pub use crate::aggregate::{aggregate, flatten, EffectRow, ResultTable};
    pub use crate::config::AnalysisConfig;
    pub use crate::data::{
        AxisLoadings, DesignFormula, DistanceMatrix, FactorLevelSpecs, FactorLevels,
        MetadataTable, OrdinationAxes, PermanovaResult, PermanovaRow, PlotTable,
        SampleAttributes, Strata, Term,
    };
    pub use crate::error::{PermivarError, Result};
}
