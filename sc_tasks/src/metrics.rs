//! Picard metric collection and the per-sample metrics summary.

use crate::tool::{ToolCommand, MAX_RECORDS_IN_RAM};
use anyhow::{Context, Result};
use log::warn;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker written in place of insert-size metrics when they cannot be computed.
pub const NO_PROPERLY_PAIRED: &str = "## FAILED: No properly paired reads\n";

const METRICS_CLASS: &str = "## METRICS CLASS";
const NA: &str = "NA";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("unable to determine number of properly paired reads from {}", .path.display())]
    NoProperlyPairedLine { path: PathBuf },
}

/// Parameters of `picard CollectWgsMetrics`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WgsParams {
    pub min_bqual: u32,
    pub min_mqual: u32,
    pub count_unpaired: bool,
}

pub fn collect_wgs_metrics(
    bam: &Path,
    reference: &Path,
    metrics: &Path,
    params: WgsParams,
) -> Result<()> {
    ToolCommand::picard("CollectWgsMetrics")
        .kv("INPUT", bam)
        .kv("OUTPUT", metrics)
        .kv("REFERENCE_SEQUENCE", reference)
        .kv("MINIMUM_BASE_QUALITY", params.min_bqual.to_string())
        .kv("MINIMUM_MAPPING_QUALITY", params.min_mqual.to_string())
        .arg("COVERAGE_CAP=500")
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .arg(MAX_RECORDS_IN_RAM)
        .kv(
            "COUNT_UNPAIRED",
            if params.count_unpaired { "True" } else { "False" },
        )
        .run()?;
    Ok(())
}

pub fn collect_gc_metrics(
    bam: &Path,
    reference: &Path,
    metrics: &Path,
    summary: &Path,
    chart: &Path,
) -> Result<()> {
    ToolCommand::picard("CollectGcBiasMetrics")
        .kv("INPUT", bam)
        .kv("OUTPUT", metrics)
        .kv("REFERENCE_SEQUENCE", reference)
        .kv("S", summary)
        .kv("CHART_OUTPUT", chart)
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .arg(MAX_RECORDS_IN_RAM)
        .run()?;
    Ok(())
}

/// Whether a samtools flagstat report counts any properly paired reads.
pub fn has_properly_paired(flagstat: &Path) -> Result<bool> {
    let file = File::open(flagstat).with_context(|| format!("opening {}", flagstat.display()))?;
    let mut found = None;
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("reading {}", flagstat.display()))?;
        if line.contains("properly paired") {
            found = Some(!line.starts_with("0 "));
        }
    }
    found.ok_or_else(|| {
        MetricsError::NoProperlyPairedLine {
            path: flagstat.to_path_buf(),
        }
        .into()
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertMetrics {
    Collected,
    /// No properly paired reads; placeholder outputs were written.
    NoProperlyPairedReads,
}

/// Run `picard CollectInsertSizeMetrics`, unless the flagstat report shows no
/// properly paired reads. In that case the metrics file gets a failure marker,
/// the histogram is left empty and picard is not run.
pub fn collect_insert_metrics(
    bam: &Path,
    flagstat: &Path,
    metrics: &Path,
    histogram: &Path,
) -> Result<InsertMetrics> {
    if !has_properly_paired(flagstat)? {
        warn!(
            "{}: no properly paired reads, skipping insert size metrics",
            bam.display()
        );
        fs::write(metrics, NO_PROPERLY_PAIRED)
            .with_context(|| format!("writing {}", metrics.display()))?;
        File::create(histogram).with_context(|| format!("creating {}", histogram.display()))?;
        return Ok(InsertMetrics::NoProperlyPairedReads);
    }
    ToolCommand::picard("CollectInsertSizeMetrics")
        .kv("INPUT", bam)
        .kv("OUTPUT", metrics)
        .kv("HISTOGRAM_FILE", histogram)
        .arg("ASSUME_SORTED=True")
        .arg("VALIDATION_STRINGENCY=LENIENT")
        .arg(MAX_RECORDS_IN_RAM)
        .run()?;
    Ok(InsertMetrics::Collected)
}

/// First row of the table following `## METRICS CLASS` in a picard metrics
/// file, keyed by column name. Files without such a table give an empty map.
pub fn read_picard_metrics(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut lines = text
        .lines()
        .skip_while(|l| !l.starts_with(METRICS_CLASS))
        .skip(1)
        .filter(|l| !l.trim().is_empty());
    let (Some(header), Some(values)) = (lines.next(), lines.next()) else {
        return Ok(BTreeMap::new());
    };
    Ok(header
        .split('\t')
        .zip(values.split('\t'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

/// Counts taken from a samtools flagstat report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagstatCounts {
    pub total: u64,
    pub duplicates: u64,
    pub mapped: u64,
    pub properly_paired: u64,
}

pub fn read_flagstat(path: &Path) -> Result<FlagstatCounts> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut counts = FlagstatCounts::default();
    for line in text.lines() {
        // `<passed> + <failed> <label>`
        let mut fields = line.splitn(4, ' ');
        let (Some(passed), Some("+"), Some(_), Some(label)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Ok(n) = passed.parse::<u64>() else {
            continue;
        };
        if label.starts_with("in total") {
            counts.total = n;
        } else if label == "duplicates" {
            counts.duplicates = n;
        } else if label.starts_with("mapped (") {
            counts.mapped = n;
        } else if label.starts_with("properly paired") {
            counts.properly_paired = n;
        }
    }
    Ok(counts)
}

/// Column order of the metrics summary.
pub const SUMMARY_COLUMNS: [&str; 11] = [
    "sample_id",
    "total_reads",
    "mapped_reads",
    "duplicate_reads",
    "properly_paired_reads",
    "percent_duplication",
    "mean_insert_size",
    "median_insert_size",
    "standard_deviation_insert_size",
    "mean_coverage",
    "median_coverage",
];

/// Inputs of the metrics summary.
#[derive(Clone, Copy, Debug)]
pub struct MetricsInputs<'a> {
    pub flagstat: &'a Path,
    pub markdups: &'a Path,
    pub insert: &'a Path,
    pub wgs: &'a Path,
}

/// Write a one-row CSV summary for `sample_id`. Values missing from the
/// picard tables are written as `NA`.
pub fn collect_metrics(sample_id: &str, inputs: MetricsInputs<'_>, output: &Path) -> Result<()> {
    let flagstat = read_flagstat(inputs.flagstat)?;
    let markdups = read_picard_metrics(inputs.markdups)?;
    let insert = read_picard_metrics(inputs.insert)?;
    let wgs = read_picard_metrics(inputs.wgs)?;
    let field = |table: &BTreeMap<String, String>, key: &str| {
        table.get(key).cloned().unwrap_or_else(|| NA.to_string())
    };

    let row = [
        sample_id.to_string(),
        flagstat.total.to_string(),
        flagstat.mapped.to_string(),
        flagstat.duplicates.to_string(),
        flagstat.properly_paired.to_string(),
        field(&markdups, "PERCENT_DUPLICATION"),
        field(&insert, "MEAN_INSERT_SIZE"),
        field(&insert, "MEDIAN_INSERT_SIZE"),
        field(&insert, "STANDARD_DEVIATION"),
        field(&wgs, "MEAN_COVERAGE"),
        field(&wgs, "MEDIAN_COVERAGE"),
    ];
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    writer.write_record(SUMMARY_COLUMNS)?;
    writer.write_record(&row)?;
    writer
        .flush()
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FLAGSTAT: &str = "\
2000 + 0 in total (QC-passed reads + QC-failed reads)
0 + 0 secondary
0 + 0 supplementary
120 + 0 duplicates
1990 + 0 mapped (99.50% : N/A)
2000 + 0 paired in sequencing
1000 + 0 read1
1000 + 0 read2
1900 + 0 properly paired (95.00% : N/A)
1980 + 0 with itself and mate mapped
";

    const UNPAIRED: &str = "\
500 + 0 in total (QC-passed reads + QC-failed reads)
480 + 0 mapped (96.00% : N/A)
0 + 0 properly paired (N/A : N/A)
";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_degrades_without_properly_paired_reads() {
        let dir = tempfile::tempdir().unwrap();
        let flagstat = write(dir.path(), "flagstat.txt", UNPAIRED);
        let metrics = dir.path().join("insert_metrics.txt");
        let histogram = dir.path().join("insert_histogram.pdf");
        // The BAM does not exist; picard would fail if it were run.
        let outcome = collect_insert_metrics(
            &dir.path().join("missing.bam"),
            &flagstat,
            &metrics,
            &histogram,
        )
        .unwrap();
        assert_eq!(outcome, InsertMetrics::NoProperlyPairedReads);
        assert_eq!(fs::read_to_string(&metrics).unwrap(), NO_PROPERLY_PAIRED);
        assert_eq!(fs::metadata(&histogram).unwrap().len(), 0);
    }

    #[test]
    fn test_properly_paired_detection() {
        let dir = tempfile::tempdir().unwrap();
        let paired = write(dir.path(), "paired.txt", FLAGSTAT);
        assert!(has_properly_paired(&paired).unwrap());
        let unpaired = write(dir.path(), "unpaired.txt", UNPAIRED);
        assert!(!has_properly_paired(&unpaired).unwrap());
        let garbage = write(dir.path(), "garbage.txt", "not a flagstat report\n");
        let err = has_properly_paired(&garbage).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MetricsError>(),
            Some(&MetricsError::NoProperlyPairedLine { path: garbage })
        );
    }

    #[test]
    fn test_read_flagstat() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "flagstat.txt", FLAGSTAT);
        assert_eq!(
            read_flagstat(&path).unwrap(),
            FlagstatCounts {
                total: 2000,
                duplicates: 120,
                mapped: 1990,
                properly_paired: 1900,
            }
        );
    }

    #[test]
    fn test_read_flagstat_with_primary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "flagstat.txt",
            "2000 + 0 in total (QC-passed reads + QC-failed reads)\n\
             1980 + 0 primary\n\
             0 + 0 secondary\n\
             20 + 0 supplementary\n\
             120 + 0 duplicates\n\
             100 + 0 primary duplicates\n\
             1990 + 0 mapped (99.50% : N/A)\n\
             1970 + 0 primary mapped (99.49% : N/A)\n\
             1980 + 0 paired in sequencing\n\
             1900 + 0 properly paired (95.96% : N/A)\n",
        );
        assert_eq!(
            read_flagstat(&path).unwrap(),
            FlagstatCounts {
                total: 2000,
                duplicates: 120,
                mapped: 1990,
                properly_paired: 1900,
            }
        );
    }

    #[test]
    fn test_collect_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let flagstat = write(dir.path(), "flagstat.txt", FLAGSTAT);
        let markdups = write(
            dir.path(),
            "markdups.txt",
            "## htsjdk.samtools.metrics.StringHeader\n\
             # MarkDuplicates INPUT=[merged.bam]\n\
             \n\
             ## METRICS CLASS\tpicard.sam.DuplicationMetrics\n\
             LIBRARY\tUNPAIRED_READS_EXAMINED\tPERCENT_DUPLICATION\n\
             lib1\t10\t0.06\n\
             \n\
             ## HISTOGRAM\tjava.lang.Double\n",
        );
        let insert = write(dir.path(), "insert.txt", NO_PROPERLY_PAIRED);
        let wgs = write(
            dir.path(),
            "wgs.txt",
            "## METRICS CLASS\tpicard.analysis.WgsMetrics\n\
             GENOME_TERRITORY\tMEAN_COVERAGE\tSD_COVERAGE\tMEDIAN_COVERAGE\n\
             2864785220\t0.021\t0.2\t0\n",
        );
        let out = dir.path().join("summary.csv");
        collect_metrics(
            "SA1090",
            MetricsInputs {
                flagstat: &flagstat,
                markdups: &markdups,
                insert: &insert,
                wgs: &wgs,
            },
            &out,
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            format!(
                "{}\nSA1090,2000,1990,120,1900,0.06,NA,NA,NA,0.021,0\n",
                SUMMARY_COLUMNS.join(",")
            )
        );
    }
}
