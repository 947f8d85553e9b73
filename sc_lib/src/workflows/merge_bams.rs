//! Merging per-cell BAMs into per-region BAMs.

use crate::config::PipelineConfig;
use anyhow::{Context, Result};
use sc_graph::{Artifact, AxisBinding, ExecContext, Workflow, WorkflowBuilder};
use sc_tasks::TaskKind;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn select_regions(
    region_bams: &BTreeMap<String, PathBuf>,
    regions: &[String],
) -> Result<BTreeMap<String, PathBuf>> {
    regions
        .iter()
        .map(|r| {
            let path = region_bams
                .get(r)
                .with_context(|| format!("no output BAM given for region {r}"))?;
            Ok((r.clone(), path.clone()))
        })
        .collect()
}

/// One multicore task merging every cell BAM into one BAM per region. Only
/// the listed regions are written.
pub fn create_merge_bams_workflow(
    cell_bams: &BTreeMap<String, PathBuf>,
    merged_bams: &BTreeMap<String, PathBuf>,
    regions: &[String],
    config: &PipelineConfig,
) -> Result<Workflow<TaskKind>> {
    let merged_bams = select_regions(merged_bams, regions)?;
    let max_cores = config.u64_at("max_cores")?;

    let ctx = ExecContext::new()
        .mem_retry_increment(2)
        .merged(&config.container_ctx("single_cell_pipeline")?);
    let mut wf = WorkflowBuilder::new().with_ctx(ctx);
    wf.set_axis(AxisBinding::from_keys("cell_id", cell_bams))?;
    wf.set_axis(AxisBinding::new("region", regions.iter()))?;

    wf.task(
        "merge_bams",
        TaskKind::MergeBams {
            ncores: u32::try_from(max_cores).context("max_cores is too large")?,
        },
    )
    .ctx(
        ExecContext::new()
            .mem(config.u64_at("memory.high")?)
            .pool_id(config.str_at("pools.multicore")?)
            .ncpus(max_cores),
    )
    .input(
        "bams",
        Artifact::named("bam").axis("cell_id").fnames(cell_bams),
    )
    .output(
        "merged",
        Artifact::named("merged.bam")
            .axis("region")
            .fnames(&merged_bams)
            .extensions([".bai"]),
    );
    Ok(wf.build()?)
}

/// One task per region merging the region's reads from every cell BAM.
pub fn create_cell_region_merge_workflow(
    cell_bams: &BTreeMap<String, PathBuf>,
    region_bams: &BTreeMap<String, PathBuf>,
    regions: &[String],
    config: &PipelineConfig,
) -> Result<Workflow<TaskKind>> {
    let region_bams = select_regions(region_bams, regions)?;
    let mut wf = WorkflowBuilder::new().with_ctx(config.container_ctx("samtools")?);
    wf.set_axis(AxisBinding::from_keys("cell_id", cell_bams))?;
    wf.set_axis(AxisBinding::new("region", regions.iter()))?;

    wf.task("split_merge_tumour", TaskKind::CellRegionMergeBams)
        .axis("region")
        .input(
            "bams",
            Artifact::named("tumour_cells.bam")
                .axis("cell_id")
                .fnames(cell_bams)
                .extensions([".bai"]),
        )
        .output(
            "merged",
            Artifact::named("tumour_regions.bam")
                .axis("region")
                .fnames(&region_bams)
                .extensions([".bai"]),
        )
        .instance("region", "region");
    Ok(wf.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sc_graph::Files;
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig::from_value(json!({
            "max_cores": 8,
            "memory": {"high": 16},
            "pools": {"multicore": "multicore"},
        }))
    }

    fn cells() -> BTreeMap<String, PathBuf> {
        ["A", "B", "C"]
            .iter()
            .map(|c| (c.to_string(), PathBuf::from(format!("/cells/{c}.bam"))))
            .collect()
    }

    fn region_bams() -> BTreeMap<String, PathBuf> {
        ["1-1-1000", "1-1001-2000", "2-1-1000"]
            .iter()
            .map(|r| (r.to_string(), PathBuf::from(format!("/regions/{r}.bam"))))
            .collect()
    }

    #[test]
    fn test_merge_bams_keeps_listed_regions() {
        let regions = vec!["1-1-1000".to_string(), "2-1-1000".to_string()];
        let wf = create_merge_bams_workflow(&cells(), &region_bams(), &regions, &config()).unwrap();
        let plan = wf.plan("/tmp/merge").unwrap();
        assert_eq!(plan.jobs.len(), 1);
        let job = &plan.jobs[0];
        let Files::Many(merged) = &job.outputs["merged"] else {
            panic!("expected one output per region");
        };
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["1-1-1000", "2-1-1000"]);
        assert!(job
            .output_files
            .contains(&PathBuf::from("/regions/2-1-1000.bam.bai")));
        assert_eq!(job.ctx.mem_gb(), Some(16));
        assert_eq!(job.ctx.num_cpus(), Some(8));
        assert_eq!(job.ctx.get("pool_id"), Some(&json!("multicore")));
        assert_eq!(job.ctx.get("mem_retry_increment"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_bams_missing_region_output() {
        let regions = vec!["3-1-1000".to_string()];
        assert!(create_merge_bams_workflow(&cells(), &region_bams(), &regions, &config()).is_err());
    }

    #[test]
    fn test_cell_region_merge_one_job_per_region() {
        let regions: Vec<String> = region_bams().into_keys().collect();
        let wf =
            create_cell_region_merge_workflow(&cells(), &region_bams(), &regions, &config()).unwrap();
        let plan = wf.plan("/tmp/merge").unwrap();
        assert_eq!(plan.jobs.len(), 3);
        let job = plan.job("split_merge_tumour[region=1-1001-2000]").unwrap();
        assert_eq!(job.params["region"], json!("1-1001-2000"));
        assert_eq!(
            job.outputs["merged"],
            Files::One("/regions/1-1001-2000.bam".into())
        );
        // every cell BAM and its index
        assert_eq!(job.input_files.len(), 6);
    }
}
