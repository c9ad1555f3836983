//! Compiles bookworm search requests into SQL.
//!
//! A request is parsed into a [`SearchSpec`], its constraint tree is rendered
//! by the [`PredicateCompiler`], and the [`QueryPlanner`] assembles grouped
//! numerator and denominator counts around the right fact table.

pub mod explain;
pub mod grouping;
pub mod predicate;
pub mod query_planner;
pub mod search_spec;
pub mod statistics;
pub mod word_resolver;

pub use explain::*;
pub use grouping::*;
pub use predicate::*;
pub use query_planner::*;
pub use search_spec::*;
pub use statistics::*;
pub use word_resolver::*;
