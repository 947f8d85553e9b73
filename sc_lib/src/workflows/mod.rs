//! Pipeline assemblies. Each function returns a validated workflow ready to
//! be planned and run.

mod extract_seqdata;
mod infer_haps;
mod merge_bams;
mod pseudo_wgs;
mod variants;

pub use extract_seqdata::{create_extract_seqdata_workflow, BAM_PORT, SEQDATA_PORT};
pub use infer_haps::{
    extract_allele_readcounts, infer_haps, infer_haps_workflow, InferHapsArgs, InferHapsResults,
    ALLELE_COUNTS_PORT, HAPLOTYPES_PORT,
};
pub use merge_bams::{create_cell_region_merge_workflow, create_merge_bams_workflow};
pub use pseudo_wgs::{create_pseudo_wgs_workflow, PseudoWgsOutputs};
pub use variants::create_variant_merge_workflow;
