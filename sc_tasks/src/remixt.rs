//! Entry points of the remixt seqdata and haplotype library, run as
//! `remixt <subcommand>`.

use crate::tool::ToolCommand;
use anyhow::{Context, Result};
use sc_graph::TaskCall;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// File the stage configuration is written to inside the job's temp dir.
const CONFIG_JSON: &str = "remixt_config.json";

/// One remixt entry point. Argument names each variant reads from its job are
/// listed on the variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemixtCall {
    /// in: `bam`; out: `seqdata`; values: `chromosome`, `ref_data_dir`, `config`.
    CreateChromosomeSeqdata,
    /// in: `inputs` (per chromosome); out: `seqdata`.
    MergeSeqdata,
    /// in: `inputs` (per cell); out: `seqdata`; values: `chromosomes`.
    MergeOverlappingSeqdata,
    /// in: `seqdata`; out: `snp_genotype`; values: `chromosome`, `config`.
    InferSnpGenotype { normal: bool },
    /// in: `snp_genotype`; out: `haplotypes`; temp: `haplotyping`;
    /// values: `chromosome`, `ref_data_dir`, `config`.
    InferHaps,
    /// out: `segments`; values: `ref_data_dir`, `config`.
    CreateSegments,
    /// in: `segments`, `seqdata`, `haplotypes`; out: `allele_counts`;
    /// values: `config`.
    HaplotypeAlleleReadcount,
}

impl RemixtCall {
    pub fn subcommand(&self) -> &'static str {
        match self {
            RemixtCall::CreateChromosomeSeqdata => "create_chromosome_seqdata",
            RemixtCall::MergeSeqdata => "merge_seqdata",
            RemixtCall::MergeOverlappingSeqdata => "merge_overlapping_seqdata",
            RemixtCall::InferSnpGenotype { normal: true } => "infer_snp_genotype_from_normal",
            RemixtCall::InferSnpGenotype { normal: false } => "infer_snp_genotype_from_tumour",
            RemixtCall::InferHaps => "infer_haps",
            RemixtCall::CreateSegments => "create_segments",
            RemixtCall::HaplotypeAlleleReadcount => "haplotype_allele_readcount",
        }
    }

    /// Assemble the command line for `call`.
    pub fn command(&self, call: &TaskCall<'_>) -> Result<ToolCommand> {
        let cmd = ToolCommand::new("remixt").arg(self.subcommand());
        let cmd = match self {
            RemixtCall::CreateChromosomeSeqdata => cmd
                .arg("--bam")
                .arg(call.input("bam")?)
                .arg("--chromosome")
                .arg(call.param_str("chromosome")?)
                .arg("--ref-data-dir")
                .arg(call.param_str("ref_data_dir")?)
                .arg("--config")
                .arg(write_config(call)?)
                .arg("--out")
                .arg(call.output("seqdata")?),
            RemixtCall::MergeSeqdata => cmd
                .arg("--out")
                .arg(call.output("seqdata")?)
                .args(call.inputs("inputs")?.values()),
            RemixtCall::MergeOverlappingSeqdata => {
                let mut cmd = cmd.arg("--out").arg(call.output("seqdata")?);
                for chrom in string_list(call.param("chromosomes")?) {
                    cmd = cmd.arg("--chromosome").arg(chrom);
                }
                cmd.args(call.inputs("inputs")?.values())
            }
            RemixtCall::InferSnpGenotype { .. } => cmd
                .arg("--seqdata")
                .arg(call.input("seqdata")?)
                .arg("--chromosome")
                .arg(call.param_str("chromosome")?)
                .arg("--config")
                .arg(write_config(call)?)
                .arg("--out")
                .arg(call.output("snp_genotype")?),
            RemixtCall::InferHaps => cmd
                .arg("--snp-genotype")
                .arg(call.input("snp_genotype")?)
                .arg("--chromosome")
                .arg(call.param_str("chromosome")?)
                .arg("--tmpdir")
                .arg(call.temp_space("haplotyping")?)
                .arg("--ref-data-dir")
                .arg(call.param_str("ref_data_dir")?)
                .arg("--config")
                .arg(write_config(call)?)
                .arg("--out")
                .arg(call.output("haplotypes")?),
            RemixtCall::CreateSegments => cmd
                .arg("--ref-data-dir")
                .arg(call.param_str("ref_data_dir")?)
                .arg("--config")
                .arg(write_config(call)?)
                .arg("--out")
                .arg(call.output("segments")?),
            RemixtCall::HaplotypeAlleleReadcount => cmd
                .arg("--segments")
                .arg(call.input("segments")?)
                .arg("--seqdata")
                .arg(call.input("seqdata")?)
                .arg("--haplotypes")
                .arg(call.input("haplotypes")?)
                .arg("--config")
                .arg(write_config(call)?)
                .arg("--out")
                .arg(call.output("allele_counts")?),
        };
        Ok(cmd)
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}

/// Write the job's `config` value (an empty object if unset) as JSON into its
/// temp dir.
fn write_config(call: &TaskCall<'_>) -> Result<PathBuf> {
    let empty = Value::Object(Default::default());
    let config = call.param("config").unwrap_or(&empty);
    let path = call.temp_dir().join(CONFIG_JSON);
    write_json(&path, config)?;
    Ok(path)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
