//! Single-cell pipelines assembled from `sc_graph` workflows and `sc_tasks`
//! task kinds: BAM merging, pseudo-bulk QC, variant merging and haplotype
//! inference.

// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms
)]

pub mod config;
pub mod regions;
pub mod source;
pub mod workflows;

pub use config::{ConfigError, PipelineConfig};
pub use source::{BamSource, PseudoWgsInputs, SourceError};
