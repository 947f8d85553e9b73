//! BAM merging, post-processing, indexing and flagstat through samtools and picard.

use crate::tool::{ToolCommand, MAX_RECORDS_IN_RAM};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Convert a region name `chrom-start-end` to samtools' `chrom:start-end`.
///
/// The chromosome may itself contain dashes; the last two fields must be
/// integers.
pub fn samtools_region(region: &str) -> Result<String> {
    let mut fields = region.rsplitn(3, '-');
    let (Some(end), Some(start), Some(chrom)) = (fields.next(), fields.next(), fields.next())
    else {
        bail!("region '{region}' is not of the form chrom-start-end");
    };
    if chrom.is_empty() || start.parse::<u64>().is_err() || end.parse::<u64>().is_err() {
        bail!("region '{region}' is not of the form chrom-start-end");
    }
    Ok(format!("{chrom}:{start}-{end}"))
}

/// `samtools index <bam> <bai>`.
pub fn index_bam(bam: &Path, bai: &Path) -> Result<()> {
    ToolCommand::samtools("index").arg(bam).arg(bai).run()?;
    Ok(())
}

/// `samtools flagstat <bam> > <output>`.
pub fn flagstat_bam(bam: &Path, output: &Path) -> Result<()> {
    ToolCommand::samtools("flagstat")
        .arg(bam)
        .stdout_to(output)
        .run()?;
    Ok(())
}

/// Merge the reads of `inputs` overlapping `region` into `output`.
pub fn merge_region<'a>(
    inputs: impl IntoIterator<Item = &'a Path>,
    region: &str,
    output: &Path,
    ncores: u32,
) -> Result<()> {
    ToolCommand::samtools("merge")
        .arg("-f")
        .arg("-@")
        .arg(ncores.to_string())
        .arg("-R")
        .arg(samtools_region(region)?)
        .arg(output)
        .args(inputs)
        .run()?;
    Ok(())
}

pub fn picard_merge<'a>(
    inputs: impl IntoIterator<Item = &'a Path>,
    output: &Path,
    tmp_dir: &Path,
) -> Result<()> {
    let mut cmd = ToolCommand::picard("MergeSamFiles")
        .kv("OUTPUT", output)
        .arg("SORT_ORDER=coordinate")
        .arg("ASSUME_SORTED=true")
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .arg(MAX_RECORDS_IN_RAM)
        .kv("TMP_DIR", tmp_dir);
    for bam in inputs {
        cmd = cmd.kv("I", bam);
    }
    cmd.run()?;
    Ok(())
}

pub fn picard_sort(input: &Path, output: &Path, tmp_dir: &Path) -> Result<()> {
    ToolCommand::picard("SortSam")
        .kv("INPUT", input)
        .kv("OUTPUT", output)
        .arg("SORT_ORDER=coordinate")
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .kv("TMP_DIR", tmp_dir)
        .arg(MAX_RECORDS_IN_RAM)
        .run()?;
    Ok(())
}

pub fn mark_duplicates(input: &Path, output: &Path, metrics: &Path, tmp_dir: &Path) -> Result<()> {
    ToolCommand::picard("MarkDuplicates")
        .kv("INPUT", input)
        .kv("OUTPUT", output)
        .kv("METRICS_FILE", metrics)
        .arg("REMOVE_DUPLICATES=False")
        .arg("ASSUME_SORTED=True")
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .kv("TMP_DIR", tmp_dir)
        .arg(MAX_RECORDS_IN_RAM)
        .run()?;
    Ok(())
}

/// Output files of [`bam_postprocess`].
#[derive(Clone, Copy, Debug)]
pub struct PostprocessOutputs<'a> {
    pub bam: &'a Path,
    pub bai: &'a Path,
    pub markdups_metrics: &'a Path,
    pub flagstat: &'a Path,
}

/// Merge, sort and mark duplicates in `inputs`, then index the result and
/// write its flagstat report. Intermediates live in `tmp_dir` and are removed
/// as soon as the next step has consumed them.
pub fn bam_postprocess<'a>(
    inputs: impl IntoIterator<Item = &'a Path>,
    outputs: PostprocessOutputs<'_>,
    tmp_dir: &Path,
) -> Result<()> {
    fs::create_dir_all(tmp_dir).with_context(|| format!("creating {}", tmp_dir.display()))?;

    let merged = tmp_dir.join("merged.bam");
    picard_merge(inputs, &merged, tmp_dir)?;

    let sorted = tmp_dir.join("sorted.bam");
    picard_sort(&merged, &sorted, tmp_dir)?;
    fs::remove_file(&merged).with_context(|| format!("removing {}", merged.display()))?;

    mark_duplicates(&sorted, outputs.bam, outputs.markdups_metrics, tmp_dir)?;
    fs::remove_file(&sorted).with_context(|| format!("removing {}", sorted.display()))?;

    index_bam(outputs.bam, outputs.bai)?;
    flagstat_bam(outputs.bam, outputs.flagstat)
}
