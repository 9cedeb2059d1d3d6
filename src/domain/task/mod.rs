pub mod model;
pub mod store;

pub use model::{TaskInstance, TaskState};
pub use store::TaskStore;
