/*!
Columnar I/O and Variant shredding (spec §4.6). This layer sits directly
above the storage abstraction: it knows nothing about namespaces, OCC, or
the event log, only how to turn entities into bytes and back.
*/

pub mod reader;
pub mod stats;
pub mod variant;
pub mod writer;

pub use reader::read_entities;
pub use stats::ColumnStats;
pub use writer::{write_entities, DEFAULT_ROW_GROUP_SIZE};
