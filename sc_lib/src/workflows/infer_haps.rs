//! Haplotype inference and allele read counting.

use super::extract_seqdata::{create_extract_seqdata_workflow, BAM_PORT, SEQDATA_PORT};
use crate::config::PipelineConfig;
use crate::source::{BamSource, PseudoWgsInputs};
use anyhow::{Context, Result};
use log::info;
use sc_graph::{Artifact, AxisBinding, ExecContext, Workflow, WorkflowBuilder};
use sc_tasks::{RemixtCall, TaskKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output port of [`infer_haps`]: haplotype blocks of every chromosome.
pub const HAPLOTYPES_PORT: &str = "haplotypes";
/// Output port of [`infer_haps`]: haplotype allele read counts.
pub const ALLELE_COUNTS_PORT: &str = "allele_counts";

const DOCKER_IMAGE: &str = "single_cell_pipeline";

fn remixt_config(config: &PipelineConfig) -> Value {
    config.section_or_empty("extract_seqdata").as_value().clone()
}

fn standard_ctx() -> ExecContext {
    ExecContext::new().mem(16).mem_retry_increment(2).ncpus(1)
}

/// Infer per-chromosome haplotypes of one sample and count haplotype alleles.
///
/// `config` is the `infer_haps` section. Per-cell sources get their seqdata
/// extracted cell by cell and merged; a merged BAM is extracted directly.
/// Either way the result lands on the `seqdata` output port, which every
/// later stage reads.
pub fn infer_haps(
    source: &BamSource,
    config: &PipelineConfig,
    normal: bool,
) -> Result<Workflow<TaskKind>> {
    let ref_data_dir = PathBuf::from(config.str_at("ref_data_dir")?);
    let chromosomes = config.strings_at("chromosomes")?;
    let remixt_config = remixt_config(config);

    let mut wf = WorkflowBuilder::new().with_ctx(config.docker_ctx(DOCKER_IMAGE)?);
    let seqdata = wf.declare_output(SEQDATA_PORT);
    let haplotypes = wf.declare_output(HAPLOTYPES_PORT);
    let allele_counts = wf.declare_output(ALLELE_COUNTS_PORT);

    let extract = create_extract_seqdata_workflow(&remixt_config, &ref_data_dir, &chromosomes)?;
    match source {
        BamSource::PerCell(cells) => {
            wf.set_axis(AxisBinding::from_keys("cell_id", cells))?;
            wf.subworkflow("extract_seqdata", extract)
                .axis("cell_id")
                .bind_input(
                    BAM_PORT,
                    Artifact::named("bam_markdups")
                        .axis("cell_id")
                        .fnames(cells)
                        .extensions([".bai"]),
                )
                .bind_output(SEQDATA_PORT, Artifact::temp("tumour.h5").axis("cell_id"));
            wf.task(
                "merge_all_seqdata",
                TaskKind::Remixt(RemixtCall::MergeOverlappingSeqdata),
            )
            .ctx(ExecContext::new().mem_retry_increment(2).ncpus(1))
            .input("inputs", Artifact::temp("tumour.h5").axis("cell_id"))
            .output("seqdata", seqdata.clone())
            .value("chromosomes", chromosomes.clone());
        }
        BamSource::Merged(bam) => {
            wf.subworkflow("extract_seqdata", extract)
                .bind_input(BAM_PORT, Artifact::file(bam).extensions([".bai"]))
                .bind_output(SEQDATA_PORT, seqdata.clone());
        }
    }

    wf.set_axis(AxisBinding::new("chromosome", chromosomes.iter()))?;

    wf.task(
        "infer_snp_genotype",
        TaskKind::Remixt(RemixtCall::InferSnpGenotype { normal }),
    )
    .axis("chromosome")
    .ctx(standard_ctx())
    .input("seqdata", seqdata.clone())
    .output(
        "snp_genotype",
        Artifact::temp("snp_genotype.tsv").axis("chromosome"),
    )
    .instance("chromosome", "chromosome")
    .value("config", config.as_value().clone());

    wf.task("infer_haps", TaskKind::Remixt(RemixtCall::InferHaps))
        .axis("chromosome")
        .ctx(ExecContext::new().mem(16))
        .input(
            "snp_genotype",
            Artifact::temp("snp_genotype.tsv").axis("chromosome"),
        )
        .output(
            "haplotypes",
            Artifact::temp("haplotypes.tsv").axis("chromosome"),
        )
        .instance("chromosome", "chromosome")
        .temp_space("haplotyping")
        .value("ref_data_dir", ref_data_dir.display().to_string())
        .value("config", remixt_config);

    wf.task(
        "merge_haps",
        TaskKind::ConcatenateCsv {
            key_column: None,
            sep: '\t',
        },
    )
    .ctx(ExecContext::new().mem(16))
    .input(
        "inputs",
        Artifact::temp("haplotypes.tsv").axis("chromosome"),
    )
    .output("output", haplotypes.clone());

    wf.task("create_segments", TaskKind::Remixt(RemixtCall::CreateSegments))
        .ctx(standard_ctx())
        .output("segments", Artifact::temp("segments.tsv"))
        .value("ref_data_dir", ref_data_dir.display().to_string())
        .value("config", config.as_value().clone());

    wf.task(
        "haplotype_allele_readcount",
        TaskKind::Remixt(RemixtCall::HaplotypeAlleleReadcount),
    )
    .ctx(standard_ctx())
    .input("segments", Artifact::temp("segments.tsv"))
    .input("seqdata", seqdata)
    .input("haplotypes", haplotypes)
    .output("allele_counts", allele_counts)
    .value("config", config.as_value().clone());

    Ok(wf.build()?)
}

/// Per-cell haplotype allele counts against known haplotypes, concatenated
/// into one table keyed by `cell_id`. Seqdata is extracted for every cell in
/// `cell_bams` into the matching `cell_seqdata` path.
pub fn extract_allele_readcounts(
    haplotypes: &Path,
    cell_bams: &BTreeMap<String, PathBuf>,
    cell_seqdata: &BTreeMap<String, PathBuf>,
    allele_counts: &Path,
    config: &PipelineConfig,
) -> Result<Workflow<TaskKind>> {
    let cell_seqdata: BTreeMap<&String, &PathBuf> = cell_bams
        .keys()
        .map(|cell| {
            let path = cell_seqdata
                .get(cell)
                .with_context(|| format!("no seqdata path given for cell {cell}"))?;
            Ok((cell, path))
        })
        .collect::<Result<_>>()?;
    let ref_data_dir = PathBuf::from(config.str_at("ref_data_dir")?);
    let chromosomes = config.strings_at("chromosomes")?;
    let remixt_config = remixt_config(config);

    let mut wf = WorkflowBuilder::new().with_ctx(config.docker_ctx(DOCKER_IMAGE)?);
    wf.set_filenames("cell.bam", "cell_id", cell_bams);
    wf.set_filenames("seqdata.h5", "cell_id", cell_seqdata);
    wf.set_axis(AxisBinding::from_keys("cell_id", cell_bams))?;

    wf.subworkflow(
        "create_chromosome_seqdata",
        create_extract_seqdata_workflow(&remixt_config, &ref_data_dir, &chromosomes)?,
    )
    .axis("cell_id")
    .bind_input(
        BAM_PORT,
        Artifact::named("cell.bam")
            .axis("cell_id")
            .extensions([".bai"]),
    )
    .bind_output(SEQDATA_PORT, Artifact::named("seqdata.h5").axis("cell_id"));

    wf.task("create_segments", TaskKind::Remixt(RemixtCall::CreateSegments))
        .output("segments", Artifact::temp("segments.tsv"))
        .value("ref_data_dir", ref_data_dir.display().to_string())
        .value("config", remixt_config.clone());

    wf.task(
        "haplotype_allele_readcount",
        TaskKind::Remixt(RemixtCall::HaplotypeAlleleReadcount),
    )
    .axis("cell_id")
    .ctx(ExecContext::new().mem(16))
    .input("segments", Artifact::temp("segments.tsv"))
    .input("seqdata", Artifact::named("seqdata.h5").axis("cell_id"))
    .input("haplotypes", Artifact::file(haplotypes))
    .output(
        "allele_counts",
        Artifact::temp("allele_counts.tsv").axis("cell_id"),
    )
    .value("config", remixt_config);

    wf.task(
        "merge_allele_readcount",
        TaskKind::ConcatenateCsv {
            key_column: Some("cell_id".to_string()),
            sep: '\t',
        },
    )
    .ctx(ExecContext::new().mem(16))
    .input(
        "inputs",
        Artifact::temp("allele_counts.tsv").axis("cell_id"),
    )
    .output("output", Artifact::file(allele_counts));

    Ok(wf.build()?)
}

/// Command-line arguments of the `infer-haps` pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferHapsArgs {
    pub out_dir: PathBuf,
    /// Pseudo-WGS inputs file listing the tumour and normal BAMs.
    pub input_file: PathBuf,
    pub normal: bool,
}

/// Final files of the `infer-haps` pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferHapsResults {
    pub seqdata: PathBuf,
    pub haplotypes: PathBuf,
    pub allele_counts: PathBuf,
}

impl InferHapsResults {
    /// `<out_dir>/infer_haps/results/...`
    pub fn under(out_dir: &Path) -> Self {
        let results = out_dir.join("infer_haps").join("results");
        InferHapsResults {
            seqdata: results.join("seqdata.h5"),
            haplotypes: results.join("haplotypes.tsv"),
            allele_counts: results.join("allele_counts.tsv"),
        }
    }
}

/// The top-level `infer-haps` pipeline: picks the sample's BAMs from the
/// inputs file and runs [`infer_haps`] as one node writing the result files.
pub fn infer_haps_workflow(
    args: &InferHapsArgs,
    config: &PipelineConfig,
) -> Result<Workflow<TaskKind>> {
    let config = config.section("infer_haps")?;
    let results = InferHapsResults::under(&args.out_dir);

    let inputs = PseudoWgsInputs::load(&args.input_file)?;
    let source = inputs.select(args.normal)?;
    match &source {
        BamSource::PerCell(cells) => info!("inferring haplotypes from {} cell BAMs", cells.len()),
        BamSource::Merged(bam) => info!("inferring haplotypes from {}", bam.display()),
    }

    let mut wf = WorkflowBuilder::new();
    wf.subworkflow("infer_haps", infer_haps(&source, &config, args.normal)?)
        .ctx(config.docker_ctx(DOCKER_IMAGE)?)
        .bind_output(SEQDATA_PORT, Artifact::file(&results.seqdata))
        .bind_output(HAPLOTYPES_PORT, Artifact::file(&results.haplotypes))
        .bind_output(ALLELE_COUNTS_PORT, Artifact::file(&results.allele_counts));
    Ok(wf.build()?)
}
