mod case;
mod step;
mod template;

pub use case::Case;
pub use step::{StepKind, WorkflowStep};
pub use template::{WorkflowTemplate, incremental_mean};
