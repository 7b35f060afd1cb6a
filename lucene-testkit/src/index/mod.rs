//! Index data model shared by codecs and testers

mod bitset;
mod field_info;
mod impacts;
mod options;

pub use bitset::FixedBitSet;
pub use field_info::{FieldInfo, FieldInfos};
pub use impacts::{
    Impact, ImpactLevel, Impacts, check_impacts, lower_bound_by_freq, pareto_frontier,
};
pub use options::{IndexOptions, PostingsFlags};
