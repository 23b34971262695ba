mod replayer;
mod state;

pub use replayer::{ReplayOptions, Replayer};
pub use state::{ReplayMachine, ReplayReport, ReplayState, StepReport, StepStatus, Transition};
