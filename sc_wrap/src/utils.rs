use chrono::Local;
use env_logger::{Builder, Env};
use itertools::Itertools;
use log::LevelFilter;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Convert an io::error to a string and strip "(os error 4)" from the end.
fn io_error_to_string(err: &std::io::Error) -> String {
    let s = err.to_string();
    s.strip_suffix(&format!(" (os error {})", err.raw_os_error().unwrap_or(0)))
        .unwrap_or(&s)
        .to_string()
}

/// Print an error chain.
pub fn print_error_chain(err: &anyhow::Error) {
    let error_chain = err.chain().join("\n\tCaused by: ");
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        let io_err_str = io_error_to_string(io_err);
        match err.chain().len() {
            1 => println!("ERROR: {io_err_str}"),
            2 => println!("ERROR: {io_err_str}: {err}"),
            _ => println!("ERROR: {error_chain}"),
        };
    } else {
        println!("ERROR: {error_chain}");
    };
}

/// Timestamped logging to stderr; `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_env(Env::default())
        .init();
}

/// One output BAM per region: `<out_dir>/<region>.bam`.
pub fn region_bam_paths(out_dir: &Path, regions: &[String]) -> BTreeMap<String, PathBuf> {
    regions
        .iter()
        .map(|r| (r.clone(), out_dir.join(format!("{r}.bam"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_to_string() {
        let err = std::io::Error::from_raw_os_error(2);
        assert!(!io_error_to_string(&err).contains("os error"));
    }

    #[test]
    fn test_region_bam_paths() {
        let paths = region_bam_paths(Path::new("/out"), &["1-1-1000".to_string()]);
        assert_eq!(paths["1-1-1000"], PathBuf::from("/out/1-1-1000.bam"));
    }
}
