//! Pipeline definition, construction and execution.

mod builder;
mod coordinator;
mod spec;
mod state;


pub use builder::PipelineBuilder;
pub use coordinator::{Pipeline, PipelineRun, RunInputs};
pub use spec::StageSpec;
pub use state::RunState;
