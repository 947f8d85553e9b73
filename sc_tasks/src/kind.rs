//! The closed set of task kinds pipelines are assembled from.

use crate::bam::{self, PostprocessOutputs};
use crate::metrics::{self, MetricsInputs, WgsParams};
use crate::remixt::RemixtCall;
use crate::tables::concatenate_csv;
use crate::vcf;
use anyhow::{Context, Result};
use log::info;
use sc_graph::artifact::companion_path;
use sc_graph::{Execute, TaskCall};
use serde::Serialize;

/// What a task does. Each kind reads its files and values from the job by
/// argument name; the names are listed on each variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// in: `bams` (per cell); out: `merged` (per region, each with `.bai`).
    MergeBams { ncores: u32 },
    /// in: `bams` (per cell); out: `merged` (with `.bai`); values: `region`.
    CellRegionMergeBams,
    /// in: `bams`; out: `bam` (with `.bai`), `markdups_metrics`, `flagstat`.
    BamPostprocess,
    /// in: `bam`; out: `bai`.
    IndexBam,
    /// in: `bam`; out: `flagstat`.
    FlagstatBam,
    /// in: `bam`, `reference`; out: `metrics`.
    CollectWgsMetrics {
        min_bqual: u32,
        min_mqual: u32,
        count_unpaired: bool,
    },
    /// in: `bam`, `reference`; out: `metrics`, `summary`, `chart`.
    CollectGcMetrics,
    /// in: `bam`, `flagstat`; out: `metrics`, `histogram`.
    CollectInsertMetrics,
    /// in: `flagstat`, `markdups`, `insert`, `wgs`; out: `summary`.
    CollectMetrics { sample_id: String },
    /// in: `inputs` (multi); out: `output`.
    ConcatenateCsv {
        key_column: Option<String>,
        sep: char,
    },
    /// in: `inputs` (multi); out: `output`.
    ConcatenateVcf,
    /// in: `inputs` (multi); out: `output`.
    MergeVcfs,
    Remixt(RemixtCall),
}

impl Execute for TaskKind {
    fn name(&self) -> &str {
        match self {
            TaskKind::MergeBams { .. } => "merge_bams",
            TaskKind::CellRegionMergeBams => "cell_region_merge_bams",
            TaskKind::BamPostprocess => "bam_postprocess",
            TaskKind::IndexBam => "index_bam",
            TaskKind::FlagstatBam => "flagstat_bam",
            TaskKind::CollectWgsMetrics { .. } => "collect_wgs_metrics",
            TaskKind::CollectGcMetrics => "collect_gc_metrics",
            TaskKind::CollectInsertMetrics => "collect_insert_metrics",
            TaskKind::CollectMetrics { .. } => "collect_metrics",
            TaskKind::ConcatenateCsv { .. } => "concatenate_csv",
            TaskKind::ConcatenateVcf => "concatenate_vcf",
            TaskKind::MergeVcfs => "merge_vcfs",
            TaskKind::Remixt(call) => call.subcommand(),
        }
    }

    fn execute(&self, call: &TaskCall<'_>) -> Result<()> {
        match self {
            TaskKind::MergeBams { ncores } => {
                let bams = call.inputs("bams")?;
                for (region, out) in call.outputs("merged")? {
                    bam::merge_region(bams.values().map(|p| p.as_path()), region, out, *ncores)?;
                    bam::index_bam(out, &companion_path(out, ".bai"))?;
                }
            }
            TaskKind::CellRegionMergeBams => {
                let out = call.output("merged")?;
                bam::merge_region(
                    call.inputs("bams")?.values().map(|p| p.as_path()),
                    call.param_str("region")?,
                    out,
                    1,
                )?;
                bam::index_bam(out, &companion_path(out, ".bai"))?;
            }
            TaskKind::BamPostprocess => {
                let out = call.output("bam")?;
                bam::bam_postprocess(
                    call.inputs("bams")?.values().map(|p| p.as_path()),
                    PostprocessOutputs {
                        bam: out,
                        bai: &companion_path(out, ".bai"),
                        markdups_metrics: call.output("markdups_metrics")?,
                        flagstat: call.output("flagstat")?,
                    },
                    call.temp_dir(),
                )?;
            }
            TaskKind::IndexBam => bam::index_bam(call.input("bam")?, call.output("bai")?)?,
            TaskKind::FlagstatBam => {
                bam::flagstat_bam(call.input("bam")?, call.output("flagstat")?)?
            }
            TaskKind::CollectWgsMetrics {
                min_bqual,
                min_mqual,
                count_unpaired,
            } => metrics::collect_wgs_metrics(
                call.input("bam")?,
                call.input("reference")?,
                call.output("metrics")?,
                WgsParams {
                    min_bqual: *min_bqual,
                    min_mqual: *min_mqual,
                    count_unpaired: *count_unpaired,
                },
            )?,
            TaskKind::CollectGcMetrics => metrics::collect_gc_metrics(
                call.input("bam")?,
                call.input("reference")?,
                call.output("metrics")?,
                call.output("summary")?,
                call.output("chart")?,
            )?,
            TaskKind::CollectInsertMetrics => {
                metrics::collect_insert_metrics(
                    call.input("bam")?,
                    call.input("flagstat")?,
                    call.output("metrics")?,
                    call.output("histogram")?,
                )?;
            }
            TaskKind::CollectMetrics { sample_id } => metrics::collect_metrics(
                sample_id,
                MetricsInputs {
                    flagstat: call.input("flagstat")?,
                    markdups: call.input("markdups")?,
                    insert: call.input("insert")?,
                    wgs: call.input("wgs")?,
                },
                call.output("summary")?,
            )?,
            TaskKind::ConcatenateCsv { key_column, sep } => {
                let sep = u8::try_from(*sep)
                    .with_context(|| format!("separator {sep:?} is not a single byte"))?;
                let inputs = call.inputs("inputs")?;
                let report = concatenate_csv(
                    inputs.iter().map(|(k, p)| (k.as_str(), p.as_path())),
                    call.output("output")?,
                    key_column.as_deref(),
                    sep,
                )?;
                info!("{}: wrote {} rows", call.job_id(), report.records);
            }
            TaskKind::ConcatenateVcf => {
                let report = vcf::concatenate_vcf(
                    call.inputs("inputs")?.values().map(|p| p.as_path()),
                    call.output("output")?,
                )?;
                info!("{}: wrote {} records", call.job_id(), report.records);
            }
            TaskKind::MergeVcfs => vcf::merge_vcfs(
                call.inputs("inputs")?.values().map(|p| p.as_path()),
                call.output("output")?,
            )?,
            TaskKind::Remixt(remixt) => remixt.command(call)?.run()?,
        }
        Ok(())
    }
}
