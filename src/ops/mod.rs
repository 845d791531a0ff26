pub mod query;
pub mod task_ops;
