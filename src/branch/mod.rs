/*!
Branching and commits (spec §4.11, §4.12): content-addressed objects, ref
management, commit/checkout, and conflict detection/resolution.
*/

pub mod commit;
pub mod conflict;
pub mod objects;
pub mod refs;

pub use commit::{BranchManager, CheckoutOptions, RelationshipManifest};
pub use conflict::{all_resolved, apply_manual_resolution, resolve, resolve_all, Conflict, ConflictKind, Resolution, Strategy};
pub use objects::{hash_content, ObjectStore};
pub use refs::{RefManager, DEFAULT_BRANCH};
