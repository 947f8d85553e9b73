//! VCF header handling, concatenation and merging.

use crate::report::{ConcatReport, ConcatWarning};
use crate::tool::ToolCommand;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VcfError {
    #[error("invalid header in {}: data at line {line} before the #CHROM line", .path.display())]
    MissingColumnHeader { path: PathBuf, line: usize },
}

/// Read the `##` meta lines and the `#CHROM` line from `reader`, leaving it
/// positioned at the first data line. Lines keep their terminators.
///
/// Returns `None` when the input ends before a column header is seen.
fn read_header<R: BufRead>(reader: &mut R, path: &Path) -> Result<Option<Vec<String>>> {
    let mut header = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader
            .read_line(&mut line)
            .with_context(|| format!("reading {}", path.display()))?
            == 0
        {
            return Ok(None);
        }
        if line.starts_with("##") {
            header.push(line.clone());
        } else if line.starts_with('#') {
            header.push(line.clone());
            return Ok(Some(header));
        } else {
            return Err(VcfError::MissingColumnHeader {
                path: path.to_path_buf(),
                line: header.len() + 1,
            }
            .into());
        }
    }
}

/// Header lines of the VCF at `path`, or `None` if it has none.
pub fn get_header(path: &Path) -> Result<Option<Vec<String>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_header(&mut BufReader::new(file), path)
}

/// Write the first non-empty header followed by the data lines of every input,
/// in order. Inputs with a different header or none at all only warn.
pub fn concatenate_vcf<'a>(
    inputs: impl IntoIterator<Item = &'a Path>,
    output: &Path,
) -> Result<ConcatReport> {
    let mut out = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    let mut report = ConcatReport::default();
    let mut header: Option<Vec<String>> = None;

    for path in inputs {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let Some(this) = read_header(&mut reader, path)? else {
            report.warn(ConcatWarning::EmptyInput {
                path: path.to_path_buf(),
            });
            continue;
        };
        match &header {
            Some(first) if *first != this => {
                report.warn(ConcatWarning::MismatchedHeader {
                    path: path.to_path_buf(),
                });
            }
            Some(_) => {}
            None => {
                for line in &this {
                    out.write_all(line.as_bytes())?;
                }
            }
        }
        if header.is_none() {
            header = Some(this);
        }

        let mut line = String::new();
        while reader
            .read_line(&mut line)
            .with_context(|| format!("reading {}", path.display()))?
            > 0
        {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            out.write_all(line.as_bytes())?;
            report.records += 1;
            line.clear();
        }
    }
    out.flush()
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(report)
}

/// Index each input with tabix, then merge with bcftools into a bgzipped VCF.
pub fn merge_vcfs<'a>(inputs: impl IntoIterator<Item = &'a Path>, output: &Path) -> Result<()> {
    let inputs: Vec<&Path> = inputs.into_iter().collect();
    for vcf in &inputs {
        ToolCommand::new("tabix")
            .args(["-f", "-p", "vcf"])
            .arg(vcf)
            .run()?;
    }
    ToolCommand::new("bcftools")
        .args(["merge", "-O", "z", "-o"])
        .arg(output)
        .args(&inputs)
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const HEADER: &str = "##fileformat=VCFv4.1\n##source=museq\n#CHROM\tPOS\tID\tREF\tALT\n";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_identical_headers() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.vcf", &format!("{HEADER}1\t100\t.\tA\tT\n"));
        let b = write(
            dir.path(),
            "b.vcf",
            &format!("{HEADER}1\t200\t.\tC\tG\n2\t5\t.\tG\tA"),
        );
        let out = dir.path().join("out.vcf");
        let report = concatenate_vcf([a.as_path(), b.as_path()], &out).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            format!("{HEADER}1\t100\t.\tA\tT\n1\t200\t.\tC\tG\n2\t5\t.\tG\tA\n")
        );
        assert_eq!(report.records, 3);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_mismatched_header_warns_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.vcf", &format!("{HEADER}1\t100\t.\tA\tT\n"));
        let other = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\n";
        let b = write(dir.path(), "b.vcf", &format!("{other}1\t200\t.\tC\tG\n"));
        let out = dir.path().join("out.vcf");
        let report = concatenate_vcf([a.as_path(), b.as_path()], &out).unwrap();
        assert_eq!(
            report.warnings,
            vec![ConcatWarning::MismatchedHeader { path: b }]
        );
        let merged = fs::read_to_string(&out).unwrap();
        assert!(merged.starts_with(HEADER));
        assert_eq!(merged.lines().filter(|l| !l.starts_with('#')).count(), 2);
    }

    #[test]
    fn test_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(dir.path(), "empty.vcf", "");
        assert_eq!(get_header(&empty).unwrap(), None);

        let out = dir.path().join("out.vcf");
        let report = concatenate_vcf([empty.as_path()], &out).unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(
            report.warnings,
            vec![ConcatWarning::EmptyInput { path: empty }]
        );
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn test_empty_first_input_takes_next_header() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(dir.path(), "empty.vcf", "");
        let a = write(dir.path(), "a.vcf", &format!("{HEADER}1\t100\t.\tA\tT\n"));
        let out = dir.path().join("out.vcf");
        let report = concatenate_vcf([empty.as_path(), a.as_path()], &out).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            format!("{HEADER}1\t100\t.\tA\tT\n")
        );
    }

    #[test]
    fn test_data_before_column_header() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.vcf", "##fileformat=VCFv4.1\n1\t100\t.\tA\tT\n");
        let err = get_header(&bad).unwrap_err();
        assert_eq!(
            err.downcast_ref::<VcfError>(),
            Some(&VcfError::MissingColumnHeader { path: bad, line: 2 })
        );
    }
}
