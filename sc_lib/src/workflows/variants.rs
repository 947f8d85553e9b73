//! Merging per-region variant calls into one file.

use anyhow::{Context, Result};
use sc_graph::{Artifact, AxisBinding, Workflow, WorkflowBuilder};
use sc_tasks::TaskKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Concatenate the per-region VCFs into `output` in the order of `regions`,
/// or with `merge` index each input and merge them with bcftools. Every
/// region needs an entry in `vcfs`.
pub fn create_variant_merge_workflow(
    vcfs: &BTreeMap<String, PathBuf>,
    regions: &[String],
    output: &Path,
    merge: bool,
) -> Result<Workflow<TaskKind>> {
    for region in regions {
        vcfs.get(region)
            .with_context(|| format!("no VCF given for region {region}"))?;
    }
    let mut wf = WorkflowBuilder::new();
    wf.set_axis(AxisBinding::new("region", regions.iter()))?;

    let (name, kind) = if merge {
        ("merge_vcfs", TaskKind::MergeVcfs)
    } else {
        ("concatenate_vcf", TaskKind::ConcatenateVcf)
    };
    wf.task(name, kind)
        .input(
            "inputs",
            Artifact::named("region.vcf").axis("region").fnames(vcfs),
        )
        .output("output", Artifact::file(output));
    Ok(wf.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_graph::{Execute, LocalRunner};
    use std::fs;

    #[test]
    fn test_concatenate_regions() {
        let dir = tempfile::tempdir().unwrap();
        let header = "##fileformat=VCFv4.1\n#CHROM\tPOS\tID\tREF\tALT\n";
        let mut vcfs = BTreeMap::new();
        let mut regions = Vec::new();
        for (region, record) in [("1-1-100", "1\t10\t.\tA\tC"), ("1-101-200", "1\t150\t.\tG\tT")] {
            let path = dir.path().join(format!("{region}.vcf"));
            fs::write(&path, format!("{header}{record}\n")).unwrap();
            vcfs.insert(region.to_string(), path);
            regions.push(region.to_string());
        }
        let output = dir.path().join("merged.vcf");
        let wf = create_variant_merge_workflow(&vcfs, &regions, &output, false).unwrap();
        let plan = wf.plan(dir.path().join("tmp")).unwrap();
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].kind.name(), "concatenate_vcf");

        LocalRunner::new().run(&plan).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            format!("{header}1\t10\t.\tA\tC\n1\t150\t.\tG\tT\n")
        );
    }

    #[test]
    fn test_merge_selects_bcftools() {
        let vcfs: BTreeMap<String, PathBuf> = [("1-1-100", "/calls/a.vcf.gz")]
            .into_iter()
            .map(|(r, p)| (r.to_string(), PathBuf::from(p)))
            .collect();
        let regions = ["1-1-100".to_string()];
        let wf =
            create_variant_merge_workflow(&vcfs, &regions, Path::new("/out/all.vcf.gz"), true)
                .unwrap();
        let plan = wf.plan("/tmp/vcf").unwrap();
        let job = &plan.jobs[0];
        assert_eq!(job.kind.name(), "merge_vcfs");
        assert_eq!(job.input_files, vec![PathBuf::from("/calls/a.vcf.gz")]);
        assert_eq!(job.output_files, vec![PathBuf::from("/out/all.vcf.gz")]);
    }

    #[test]
    fn test_concatenates_in_region_order() {
        let dir = tempfile::tempdir().unwrap();
        let header = "##fileformat=VCFv4.1\n#CHROM\tPOS\n";
        let regions: Vec<String> = ["1-1-1000000", "1-1000001-2000000", "1-10000001-11000000"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut vcfs = BTreeMap::new();
        for (region, pos) in regions.iter().zip(["10", "1000010", "10000010"]) {
            let path = dir.path().join(format!("{region}.vcf"));
            fs::write(&path, format!("{header}1\t{pos}\n")).unwrap();
            vcfs.insert(region.clone(), path);
        }
        let output = dir.path().join("merged.vcf");
        let wf = create_variant_merge_workflow(&vcfs, &regions, &output, false).unwrap();
        LocalRunner::new().run(&wf.plan(dir.path().join("tmp")).unwrap()).unwrap();

        let merged = fs::read_to_string(&output).unwrap();
        let data: Vec<&str> = merged.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data, vec!["1\t10", "1\t1000010", "1\t10000010"]);
    }

    #[test]
    fn test_region_without_vcf() {
        let vcfs = BTreeMap::new();
        let err = create_variant_merge_workflow(
            &vcfs,
            &["2-1-100".to_string()],
            Path::new("/out/all.vcf"),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("2-1-100"));
    }
}
