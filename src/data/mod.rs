//! Data structures for distance-based variance partitioning.

mod dist;
mod factors;
mod formula;
mod metadata;
mod ordination;
mod result;

pub use dist::DistanceMatrix;
pub use factors::{FactorColumn, FactorLevelSpecs, FactorLevels, SampleAttributes, Strata};
pub use formula::{DesignFormula, Term};
pub use metadata::MetadataTable;
pub use ordination::{AxisLoadings, OrdinationAxes, PlotTable};
pub use result::{PermanovaResult, PermanovaRow};
