//! Transformation module.
//!
//! Table-to-table stages of the analysis:
//! - Normalize: cleaning and wide/long reshaping
//! - Align: restrict to shared regions and years
//! - Join: inner join on key columns
//! - Aggregate: group by a period and reduce measures
//! - Pipeline: all of the above plus regression, in one run

pub mod aggregate;
pub mod align;
pub mod join;
pub mod normalize;
pub mod pipeline;

pub use aggregate::{aggregate, concat, default_reductions, with_label, ColumnReduction, Reduction};
pub use align::{align, AlignedPair};
pub use join::join;
pub use normalize::{clean, reshape_long_to_wide, reshape_wide_to_long};
pub use pipeline::*;
