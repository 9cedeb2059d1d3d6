pub mod dispatch;
pub mod loop_;
pub mod reconcile;
pub mod success;

pub use dispatch::{dispatch_pass, materialize_and_dispatch};
pub use loop_::{LeaseBusyError, SchedulerLoop, EXIT_CODE_BUSY};
pub use reconcile::reconcile_pass;
pub use success::{LegacyResultPredicate, SuccessPredicate};
