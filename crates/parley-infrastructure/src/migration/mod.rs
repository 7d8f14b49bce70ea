//! Schema migrations for record collections.
//!
//! Migrations run only when a collection is opened at a higher version than
//! the one stored on disk, inside the same transaction as the version bump.

pub mod chat;
pub mod legacy;
pub mod plan;
pub mod traits;

pub use chat::ChatAnswersV1Migration;
pub use legacy::{AnswersV1Record, LegacyAnswer, LegacyChatRecord};
pub use plan::{MigrationPlan, MigrationReport};
pub use traits::{Migration, RecordMigration};
