//! Todo 层：计划步骤与带游标的 Todo List

pub mod list;
pub mod step;

pub use list::TodoList;
pub use step::{Step, StepStatus};
