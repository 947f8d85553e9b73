//! Concatenation of delimited tables.

use crate::report::{ConcatReport, ConcatWarning};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::path::Path;

/// Concatenate delimited tables that share a header.
///
/// Inputs are `(key, path)` pairs read in the order given. With `key_column`
/// each row is prefixed with its input's key under a header column of that
/// name. `sep` is used for both reading and writing.
pub fn concatenate_csv<'a>(
    inputs: impl IntoIterator<Item = (&'a str, &'a Path)>,
    output: &Path,
    key_column: Option<&str>,
    sep: u8,
) -> Result<ConcatReport> {
    let mut writer = WriterBuilder::new()
        .delimiter(sep)
        .flexible(true)
        .from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut report = ConcatReport::default();
    let mut header: Option<StringRecord> = None;

    for (key, path) in inputs {
        let mut reader = ReaderBuilder::new()
            .delimiter(sep)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let this = reader
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .clone();
        if this.is_empty() {
            report.warn(ConcatWarning::EmptyInput {
                path: path.to_path_buf(),
            });
            continue;
        }
        match &header {
            Some(first) if *first != this => report.warn(ConcatWarning::MismatchedHeader {
                path: path.to_path_buf(),
            }),
            Some(_) => {}
            None => {
                let mut out = StringRecord::new();
                out.extend(key_column);
                out.extend(this.iter());
                writer.write_record(&out)?;
            }
        }
        if header.is_none() {
            header = Some(this);
        }

        let mut row = StringRecord::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            row.clear();
            if key_column.is_some() {
                row.push_field(key);
            }
            row.extend(record.iter());
            writer.write_record(&row)?;
            report.records += 1;
        }
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::fs;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_keyed_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tsv", "chromosome\tstart\tallele\n1\t100\t0\n1\t200\t1\n");
        let b = write(dir.path(), "b.tsv", "chromosome\tstart\tallele\n2\t50\t1\n");
        let out = dir.path().join("out.tsv");
        let report = concatenate_csv(
            [("SA1-A", a.as_path()), ("SA1-B", b.as_path())],
            &out,
            Some("cell_id"),
            b'\t',
        )
        .unwrap();
        assert_eq!(report.records, 3);
        assert!(report.warnings.is_empty());
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "cell_id\tchromosome\tstart\tallele\n\
             SA1-A\t1\t100\t0\n\
             SA1-A\t1\t200\t1\n\
             SA1-B\t2\t50\t1\n"
        );
    }

    #[test]
    fn test_keyless_merge() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "1.tsv", "chromosome\tposition\n1\t10\n");
        let b = write(dir.path(), "2.tsv", "chromosome\tposition\n2\t20\n");
        let out = dir.path().join("haps.tsv");
        concatenate_csv([("1", a.as_path()), ("2", b.as_path())], &out, None, b'\t').unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "chromosome\tposition\n1\t10\n2\t20\n"
        );
    }

    #[test]
    fn test_mismatch_and_empty_warn() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.csv", "x,y\n1,2\n");
        let empty = write(dir.path(), "empty.csv", "");
        let b = write(dir.path(), "b.csv", "x,z\n3,4\n");
        let out = dir.path().join("out.csv");
        let report = concatenate_csv(
            [("a", a.as_path()), ("e", empty.as_path()), ("b", b.as_path())],
            &out,
            None,
            b',',
        )
        .unwrap();
        assert_eq!(
            report.warnings,
            vec![
                ConcatWarning::EmptyInput { path: empty },
                ConcatWarning::MismatchedHeader { path: b },
            ]
        );
        assert_eq!(fs::read_to_string(&out).unwrap(), "x,y\n1,2\n3,4\n");
    }

    proptest! {
        #[test]
        fn prop_rows_tagged_in_input_order(
            tables in prop::collection::vec(prop::collection::vec(0u32..1000, 0..8), 1..6)
        ) {
            let dir = tempfile::tempdir().unwrap();
            let mut inputs = Vec::new();
            for (i, rows) in tables.iter().enumerate() {
                let mut text = String::from("value\n");
                for r in rows {
                    text.push_str(&format!("{r}\n"));
                }
                inputs.push((format!("k{i}"), write(dir.path(), &format!("{i}.csv"), &text)));
            }
            let out = dir.path().join("out.csv");
            let report = concatenate_csv(
                inputs.iter().map(|(k, p)| (k.as_str(), p.as_path())),
                &out,
                Some("key"),
                b',',
            )
            .unwrap();

            let expected: Vec<String> = tables
                .iter()
                .enumerate()
                .flat_map(|(i, rows)| rows.iter().map(move |r| format!("k{i},{r}")))
                .collect();
            let text = fs::read_to_string(&out).unwrap();
            let lines: Vec<&str> = text.lines().skip(1).collect();
            prop_assert_eq!(report.records, expected.len());
            prop_assert_eq!(lines, expected);
        }
    }
}
