//! Declarative workflow graphs over file artifacts.
//!
//! A workflow is a set of tasks and nested sub-workflows connected by the
//! artifacts they read and write. Tasks may be replicated over named axes
//! (per cell, per chromosome, per region). A validated [`Workflow`] is
//! flattened into a [`Plan`] of concrete jobs, which [`LocalRunner`] can run
//! in order on one machine.

// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms
)]

pub mod artifact;
pub mod axis;
pub mod context;
mod error;
pub mod local;
pub mod plan;
pub mod task;
pub mod workflow;

pub use artifact::{Artifact, ArtifactDecl, FileNames};
pub use axis::{AxisBinding, AxisName, Instance};
pub use context::ExecContext;
pub use error::GraphError;
pub use local::{LocalRunner, RunSummary};
pub use plan::{Job, Plan, TempFile};
pub use task::{Arg, Execute, Files, KeyedFiles, TaskBuilder, TaskCall};
pub use workflow::{Interface, SubworkflowBuilder, Workflow, WorkflowBuilder};
