//! Pseudo-bulk BAM from single cells, with QC metrics.

use crate::config::PipelineConfig;
use anyhow::{Context, Result};
use sc_graph::{Artifact, AxisBinding, ExecContext, Workflow, WorkflowBuilder};
use sc_tasks::TaskKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files written by the pseudo-WGS workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PseudoWgsOutputs {
    /// Merged, sorted, duplicate-marked BAM; `.bai` is written beside it.
    pub bam: PathBuf,
    pub markdups_metrics: PathBuf,
    pub flagstat: PathBuf,
    pub wgs_metrics: PathBuf,
    pub gc_metrics: PathBuf,
    pub gc_summary: PathBuf,
    pub gc_chart: PathBuf,
    pub insert_metrics: PathBuf,
    pub insert_histogram: PathBuf,
    pub summary: PathBuf,
}

impl PseudoWgsOutputs {
    /// The usual layout: `<dir>/<sample_id>_<suffix>`.
    pub fn in_dir(dir: &Path, sample_id: &str) -> Self {
        let f = |suffix: &str| dir.join(format!("{sample_id}_{suffix}"));
        PseudoWgsOutputs {
            bam: f("merged.bam"),
            markdups_metrics: f("markdups_metrics.txt"),
            flagstat: f("flagstat_metrics.txt"),
            wgs_metrics: f("wgs_metrics.txt"),
            gc_metrics: f("gc_metrics.txt"),
            gc_summary: f("gc_summary.txt"),
            gc_chart: f("gc_chart.pdf"),
            insert_metrics: f("insert_metrics.txt"),
            insert_histogram: f("insert_histogram.pdf"),
            summary: f("summary_metrics.csv"),
        }
    }
}

fn u32_at(config: &PipelineConfig, key: &str) -> Result<u32> {
    u32::try_from(config.u64_at(key)?).with_context(|| format!("{key} is too large"))
}

/// Merge every cell BAM into one pseudo-bulk BAM for `sample_id`, then collect
/// WGS, GC-bias and insert-size metrics and a one-row summary table.
pub fn create_pseudo_wgs_workflow(
    cell_bams: &BTreeMap<String, PathBuf>,
    outputs: &PseudoWgsOutputs,
    sample_id: &str,
    config: &PipelineConfig,
) -> Result<Workflow<TaskKind>> {
    let reference = PathBuf::from(config.str_at("ref_genome")?);
    let high_mem = ExecContext::new()
        .mem(config.u64_at("memory.high")?)
        .ncpus(1);
    let low_mem = ExecContext::new()
        .mem(config.u64_at("memory.low")?)
        .ncpus(1);

    let mut wf = WorkflowBuilder::new().with_ctx(
        ExecContext::new()
            .mem_retry_increment(2)
            .merged(&config.container_ctx("single_cell_pipeline")?),
    );
    wf.set_axis(AxisBinding::from_keys("cell_id", cell_bams))?;

    wf.task("bam_postprocess", TaskKind::BamPostprocess)
        .ctx(high_mem.clone())
        .input(
            "bams",
            Artifact::named("cell.bam").axis("cell_id").fnames(cell_bams),
        )
        .output(
            "bam",
            Artifact::file(&outputs.bam).extensions([".bai"]),
        )
        .output("markdups_metrics", Artifact::file(&outputs.markdups_metrics))
        .output("flagstat", Artifact::file(&outputs.flagstat));

    let merged = || Artifact::file(&outputs.bam).extensions([".bai"]);

    wf.task(
        "collect_wgs_metrics",
        TaskKind::CollectWgsMetrics {
            min_bqual: u32_at(config, "picard_wgs_params.min_bqual")?,
            min_mqual: u32_at(config, "picard_wgs_params.min_mqual")?,
            count_unpaired: config.bool_at("picard_wgs_params.count_unpaired")?,
        },
    )
    .ctx(high_mem.clone())
    .input("bam", merged())
    .input("reference", Artifact::file(&reference))
    .output("metrics", Artifact::file(&outputs.wgs_metrics));

    wf.task("collect_gc_metrics", TaskKind::CollectGcMetrics)
        .ctx(high_mem)
        .input("bam", merged())
        .input("reference", Artifact::file(&reference))
        .output("metrics", Artifact::file(&outputs.gc_metrics))
        .output("summary", Artifact::file(&outputs.gc_summary))
        .output("chart", Artifact::file(&outputs.gc_chart));

    wf.task("collect_insert_metrics", TaskKind::CollectInsertMetrics)
        .ctx(low_mem.clone())
        .input("bam", merged())
        .input("flagstat", Artifact::file(&outputs.flagstat))
        .output("metrics", Artifact::file(&outputs.insert_metrics))
        .output("histogram", Artifact::file(&outputs.insert_histogram));

    wf.task(
        "collect_metrics",
        TaskKind::CollectMetrics {
            sample_id: sample_id.to_string(),
        },
    )
    .ctx(low_mem)
    .input("flagstat", Artifact::file(&outputs.flagstat))
    .input("markdups", Artifact::file(&outputs.markdups_metrics))
    .input("insert", Artifact::file(&outputs.insert_metrics))
    .input("wgs", Artifact::file(&outputs.wgs_metrics))
    .output("summary", Artifact::file(&outputs.summary));

    Ok(wf.build()?)
}
