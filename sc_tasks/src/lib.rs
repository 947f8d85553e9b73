//! Task kinds for single-cell pipelines: external tool invocations with fixed
//! argument templates and native file aggregation.

pub mod bam;
mod kind;
pub mod metrics;
pub mod remixt;
mod report;
pub mod tables;
pub mod tool;
pub mod vcf;

pub use kind::TaskKind;
pub use remixt::RemixtCall;
pub use report::{ConcatReport, ConcatWarning};
pub use tool::{ToolCommand, ToolError};
