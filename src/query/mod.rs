/*!
The query executor (spec §4.8): filter language, planner, sort, projection
and the executor that ties them together over a [crate::table::Table].
*/

pub mod executor;
pub mod filter;
pub mod planner;
pub mod projection;
pub mod sort;

pub use executor::{QueryExecutor, QueryOptions};
pub use filter::{Filter, Op};
pub use planner::{plan, PlanRoute, QueryPlan};
pub use projection::Projection;
pub use sort::{Direction, SortKey};
