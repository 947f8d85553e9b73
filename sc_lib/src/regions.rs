//! Genome regions of the form `chrom-start-end` from a FASTA index.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// `(name, length)` of each sequence in a `.fai` index, in file order.
pub fn read_fai(path: &Path) -> Result<Vec<(String, u64)>> {
    let text = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    let mut lengths = Vec::new();
    for (i, line) in text.lines().enumerate().filter(|(_, l)| !l.is_empty()) {
        let mut fields = line.split('\t');
        let (Some(name), Some(len)) = (fields.next(), fields.next()) else {
            bail!("{}:{}: expected name and length", path.display(), i + 1);
        };
        let len = len
            .parse::<u64>()
            .with_context(|| format!("{}:{}: bad length '{len}'", path.display(), i + 1))?;
        lengths.push((name.to_string(), len));
    }
    Ok(lengths)
}

/// Split each of `chromosomes` into windows of `split_size` bases, 1-based
/// and inclusive. Chromosomes absent from `lengths` are an error.
pub fn split_regions(
    lengths: &[(String, u64)],
    chromosomes: &[String],
    split_size: u64,
) -> Result<Vec<String>> {
    if split_size == 0 {
        bail!("split size must be positive");
    }
    let mut regions = Vec::new();
    for chrom in chromosomes {
        let Some((_, len)) = lengths.iter().find(|(name, _)| name == chrom) else {
            bail!("chromosome {chrom} is not in the reference index");
        };
        let mut start = 1;
        while start <= *len {
            let end = (start + split_size - 1).min(*len);
            regions.push(format!("{chrom}-{start}-{end}"));
            start = end + 1;
        }
    }
    Ok(regions)
}

/// Order `chrom-start-end` region names genomically: numbered chromosomes by
/// number, then the others by name, then by start. Names that do not parse
/// as regions go last, in string order.
pub fn sort_regions<'a>(regions: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut regions: Vec<String> = regions.into_iter().cloned().collect();
    regions.sort_by_cached_key(|r| region_sort_key(r));
    regions
}

fn region_sort_key(region: &str) -> (u8, u64, String, u64, String) {
    let mut fields = region.rsplitn(3, '-');
    let (Some(end), Some(start), Some(chrom)) = (fields.next(), fields.next(), fields.next())
    else {
        return (2, 0, region.to_string(), 0, String::new());
    };
    let (Ok(start), Ok(_)) = (start.parse::<u64>(), end.parse::<u64>()) else {
        return (2, 0, region.to_string(), 0, String::new());
    };
    match chrom.parse::<u64>() {
        Ok(n) => (0, n, String::new(), start, region.to_string()),
        Err(_) => (1, 0, chrom.to_string(), start, region.to_string()),
    }
}
