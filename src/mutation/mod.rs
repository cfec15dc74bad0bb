/*!
The mutation executor (spec §4.9): update operators and the
create/update/delete/restore/upsert operations built on top of them.
*/

pub mod executor;
pub mod operators;

pub use executor::{DeleteOutcome, MutationExecutor, UpdateOptions};
pub use operators::{apply_update_ops, UpdateOps};
