//! Reusable seqdata extraction: one BAM in, one seqdata file out.

use anyhow::Result;
use sc_graph::{Artifact, AxisBinding, ExecContext, Workflow, WorkflowBuilder};
use sc_tasks::{RemixtCall, TaskKind};
use serde_json::Value;
use std::path::Path;

/// Input port: the indexed BAM to read.
pub const BAM_PORT: &str = "bam";
/// Output port: the merged seqdata store.
pub const SEQDATA_PORT: &str = "seqdata";

/// Per-chromosome seqdata written to temporaries private to this workflow,
/// then merged into the `seqdata` port. `remixt_config` is passed through
/// to every remixt call.
pub fn create_extract_seqdata_workflow(
    remixt_config: &Value,
    ref_data_dir: &Path,
    chromosomes: &[String],
) -> Result<Workflow<TaskKind>> {
    let mut wf = WorkflowBuilder::new();
    let bam = wf.declare_input(BAM_PORT).extensions([".bai"]);
    let seqdata = wf.declare_output(SEQDATA_PORT);
    wf.set_axis(AxisBinding::new("chromosome", chromosomes.iter()))?;

    wf.task(
        "create_chromosome_seqdata",
        TaskKind::Remixt(RemixtCall::CreateChromosomeSeqdata),
    )
    .axis("chromosome")
    .ctx(ExecContext::new().mem(16).mem_retry_increment(2).ncpus(1))
    .input("bam", bam)
    .output(
        "seqdata",
        Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
    )
    .instance("chromosome", "chromosome")
    .value("ref_data_dir", ref_data_dir.display().to_string())
    .value("config", remixt_config.clone());

    wf.task(
        "merge_chromosome_seqdata",
        TaskKind::Remixt(RemixtCall::MergeSeqdata),
    )
    .ctx(ExecContext::new().mem(16).mem_retry_increment(2).ncpus(1))
    .input(
        "inputs",
        Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
    )
    .output("seqdata", seqdata);

    Ok(wf.build()?)
}
