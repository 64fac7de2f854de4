/*!
 * Storage engines built on the primitive backend operations
 *
 * - [`listing`]: page-by-page and recursive listing with cancellation
 * - [`tree`]: delete, copy, move, clone and rename of whole folders in bounded batches
 * - [`transfer`]: chunked downloads and uploads tracked as job trees
 *
 * The remaining modules hold the pieces they share: object classification,
 * key helpers, progress arithmetic, job events and previews.
 */

pub mod events;
pub mod file_type;
pub mod listing;
pub mod path;
pub mod preview;
pub mod progress;
pub mod transfer;
pub mod tree;

pub use file_type::FileCategory;
pub use progress::Progress;
pub use transfer::{FailurePolicy, JobKind, JobStatus, TransferJob, TransferManager};
pub use tree::TreeOperations;
