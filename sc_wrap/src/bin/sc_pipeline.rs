//! sc_pipeline
#![deny(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use sc_lib::regions::{read_fai, sort_regions, split_regions};
use sc_lib::source::load_path_map;
use sc_lib::workflows::{
    create_cell_region_merge_workflow, create_merge_bams_workflow, create_pseudo_wgs_workflow,
    create_variant_merge_workflow, infer_haps_workflow, InferHapsArgs, PseudoWgsOutputs,
};
use sc_lib::PipelineConfig;
use sc_wrap::run::RunArgs;
use sc_wrap::utils::{init_logging, print_error_chain, region_bam_paths};
use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;

/// Single-cell genome pipelines run as local workflow plans
#[derive(Parser, Debug)]
#[clap(name = "sc_pipeline")]
struct ScPipeline {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Infer haplotypes and haplotype allele counts for one sample.
    #[clap(name = "infer-haps")]
    InferHaps(InferHaps),

    /// Merge per-cell BAMs into one BAM per genome region.
    #[clap(name = "merge-bams")]
    MergeBams(MergeBams),

    /// Merge per-cell BAMs region by region, one job per region.
    #[clap(name = "cell-region-merge")]
    CellRegionMerge(MergeBams),

    /// Build a pseudo-bulk BAM from per-cell BAMs and collect its metrics.
    #[clap(name = "pseudo-wgs")]
    PseudoWgs(PseudoWgs),

    /// Combine per-region VCFs into one.
    #[clap(name = "merge-vcfs")]
    MergeVcfs(MergeVcfs),
}

#[derive(Parser, Debug)]
struct InferHaps {
    /// Output directory; results go to <out-dir>/infer_haps/results.
    #[clap(long, value_name = "PATH")]
    out_dir: PathBuf,

    /// TOML or JSON file listing tumour and normal BAMs.
    #[clap(long, value_name = "PATH")]
    input_file: PathBuf,

    /// Genotype SNPs from the normal sample.
    #[clap(long)]
    normal: bool,

    #[clap(flatten)]
    run: RunArgs,
}

#[derive(Parser, Debug)]
struct MergeBams {
    /// TOML or JSON mapping of cell id to BAM.
    #[clap(long, value_name = "PATH")]
    cell_bams: PathBuf,

    /// Directory receiving one <region>.bam per region.
    #[clap(long, value_name = "PATH")]
    out_dir: PathBuf,

    #[clap(flatten)]
    run: RunArgs,
}

#[derive(Parser, Debug)]
struct PseudoWgs {
    /// TOML or JSON mapping of cell id to BAM.
    #[clap(long, value_name = "PATH")]
    cell_bams: PathBuf,

    /// Directory receiving the merged BAM and metrics.
    #[clap(long, value_name = "PATH")]
    out_dir: PathBuf,

    /// Sample name used in output file names and the summary table.
    #[clap(long, value_name = "ID")]
    sample_id: String,

    #[clap(flatten)]
    run: RunArgs,
}

#[derive(Parser, Debug)]
struct MergeVcfs {
    /// TOML or JSON mapping of region to VCF. Regions are combined in
    /// genomic order.
    #[clap(long, value_name = "PATH")]
    vcfs: PathBuf,

    /// Combined VCF.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,

    /// Index and merge with bcftools instead of concatenating.
    #[clap(long)]
    merge: bool,

    #[clap(flatten)]
    run: RunArgs,
}

/// Regions from the reference index, the configured chromosomes and split size.
fn genome_regions(config: &PipelineConfig) -> Result<Vec<String>> {
    let fai = PathBuf::from(format!("{}.fai", config.str_at("ref_genome")?));
    let lengths = read_fai(&fai).with_context(|| format!("reading {}", fai.display()))?;
    split_regions(
        &lengths,
        &config.strings_at("chromosomes")?,
        config.u64_at("split_size")?,
    )
}

fn inner_main() -> Result<()> {
    let opts = ScPipeline::parse();
    match opts.subcmd {
        SubCommand::InferHaps(c) => {
            let config = c.run.load_config()?;
            let args = InferHapsArgs {
                out_dir: c.out_dir,
                input_file: c.input_file,
                normal: c.normal,
            };
            c.run.execute(&infer_haps_workflow(&args, &config)?, stdout())?;
        }
        SubCommand::MergeBams(c) => {
            let config = c.run.load_config()?;
            let regions = genome_regions(&config)?;
            info!("merging into {} regions", regions.len());
            let cell_bams = load_path_map(&c.cell_bams)?;
            let merged = region_bam_paths(&c.out_dir, &regions);
            let wf = create_merge_bams_workflow(&cell_bams, &merged, &regions, &config)?;
            c.run.execute(&wf, stdout())?;
        }
        SubCommand::CellRegionMerge(c) => {
            let config = c.run.load_config()?;
            let regions = genome_regions(&config)?;
            let cell_bams = load_path_map(&c.cell_bams)?;
            let merged = region_bam_paths(&c.out_dir, &regions);
            let wf = create_cell_region_merge_workflow(&cell_bams, &merged, &regions, &config)?;
            c.run.execute(&wf, stdout())?;
        }
        SubCommand::PseudoWgs(c) => {
            let config = c.run.load_config()?;
            let cell_bams = load_path_map(&c.cell_bams)?;
            let outputs = PseudoWgsOutputs::in_dir(&c.out_dir, &c.sample_id);
            let wf = create_pseudo_wgs_workflow(&cell_bams, &outputs, &c.sample_id, &config)?;
            c.run.execute(&wf, stdout())?;
        }
        SubCommand::MergeVcfs(c) => {
            let vcfs = load_path_map(&c.vcfs)?;
            let regions = sort_regions(vcfs.keys());
            let wf = create_variant_merge_workflow(&vcfs, &regions, &c.output, c.merge)?;
            c.run.execute(&wf, stdout())?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    match inner_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}
