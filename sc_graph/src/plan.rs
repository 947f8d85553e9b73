//! Flattening a validated workflow into concrete, ordered jobs.

use crate::artifact::{companion_path, Artifact, ArtifactDecl, FileNames};
use crate::axis::{AxisName, Instance};
use crate::context::ExecContext;
use crate::error::GraphError;
use crate::task::{Arg, Files, KeyedFiles, TaskBuilder, TaskCall};
use crate::workflow::{SubworkflowBuilder, Workflow};
use itertools::Itertools;
use log::debug;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// One replica of a task with every argument resolved to concrete paths.
#[derive(Clone, Debug, Serialize)]
pub struct Job<K> {
    pub id: String,
    pub kind: K,
    pub instance: Instance,
    pub ctx: ExecContext,
    pub temp_dir: PathBuf,
    pub inputs: BTreeMap<String, Files>,
    pub outputs: BTreeMap<String, Files>,
    pub params: BTreeMap<String, Value>,
    pub temp_spaces: BTreeMap<String, PathBuf>,
    /// Every file read, companions included.
    pub input_files: Vec<PathBuf>,
    /// Every file written, companions included.
    pub output_files: Vec<PathBuf>,
    pub depends_on: Vec<String>,
}

impl<K> Job<K> {
    pub fn call(&self) -> TaskCall<'_> {
        TaskCall {
            job: &self.id,
            inputs: &self.inputs,
            outputs: &self.outputs,
            params: &self.params,
            temp_spaces: &self.temp_spaces,
            temp_dir: &self.temp_dir,
            ctx: &self.ctx,
        }
    }
}

/// Who writes and who reads a temporary file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TempFile {
    pub producer: Option<String>,
    pub consumers: Vec<String>,
}

/// A flattened workflow: jobs in dependency order.
#[derive(Debug, Serialize)]
pub struct Plan<K> {
    pub tmp_root: PathBuf,
    pub jobs: Vec<Job<K>>,
    pub temp_files: BTreeMap<PathBuf, TempFile>,
}

impl<K> Plan<K> {
    pub fn job(&self, id: &str) -> Option<&Job<K>> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

impl<K: Clone> Workflow<K> {
    /// Expand every task and nested sub-workflow instance into jobs whose
    /// managed files and scratch space live under `tmp_root`.
    pub fn plan(&self, tmp_root: impl AsRef<Path>) -> Result<Plan<K>, GraphError> {
        let tmp_root = tmp_root.as_ref().to_path_buf();
        let mut flat = Flattener {
            tmp_root: &tmp_root,
            jobs: Vec::new(),
            temp: BTreeSet::new(),
        };
        let root = Scope {
            dir: PathBuf::new(),
            id_prefix: String::new(),
            ports: BTreeMap::new(),
            ctx: self.ctx.clone(),
        };
        flat.workflow(self, &root)?;
        let Flattener { jobs, temp, .. } = flat;
        let (jobs, temp_files) = order(jobs, temp)?;
        debug!("planned {} jobs under {}", jobs.len(), tmp_root.display());
        Ok(Plan {
            tmp_root,
            jobs,
            temp_files,
        })
    }
}

/// Where a workflow instance sits in the flattened tree.
struct Scope {
    dir: PathBuf,
    id_prefix: String,
    ports: BTreeMap<String, PathBuf>,
    ctx: ExecContext,
}

struct Flattener<'a, K> {
    tmp_root: &'a Path,
    jobs: Vec<Job<K>>,
    temp: BTreeSet<PathBuf>,
}

fn node_id(prefix: &str, name: &str, inst: &Instance) -> String {
    if inst.is_empty() {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}{name}[{inst}]")
    }
}

fn node_dir(scope: &Scope, name: &str, inst: &Instance) -> PathBuf {
    let dir = scope.dir.join(name);
    match inst.dir_name() {
        Some(d) => dir.join(d),
        None => dir,
    }
}

impl<'a, K: Clone> Flattener<'a, K> {
    fn workflow(&mut self, wf: &Workflow<K>, scope: &Scope) -> Result<(), GraphError> {
        for task in &wf.tasks {
            for inst in wf.axes.instances(&task.axes) {
                self.task(wf, scope, task, inst)?;
            }
        }
        for sub in &wf.subworkflows {
            for inst in wf.axes.instances(&sub.axes) {
                self.subworkflow(wf, scope, sub, &inst)?;
            }
        }
        Ok(())
    }

    fn subworkflow(
        &mut self,
        wf: &Workflow<K>,
        scope: &Scope,
        sub: &SubworkflowBuilder<K>,
        inst: &Instance,
    ) -> Result<(), GraphError> {
        let mut ports = BTreeMap::new();
        for (port, art) in sub.inputs.iter().chain(&sub.outputs) {
            let (files, _) = self.resolve(wf, scope, art, inst)?;
            let Files::One(path) = files else {
                return Err(GraphError::AxisMismatch {
                    node: sub.name.clone(),
                    artifact: art.name.clone(),
                    detail: format!("port '{port}' would receive several files"),
                });
            };
            ports.insert(port.clone(), path);
        }
        let inner = Scope {
            dir: node_dir(scope, &sub.name, inst),
            id_prefix: format!("{}/", node_id(&scope.id_prefix, &sub.name, inst)),
            ports,
            ctx: scope.ctx.merged(&sub.ctx).merged(&sub.workflow.ctx),
        };
        self.workflow(&sub.workflow, &inner)
    }

    fn task(
        &mut self,
        wf: &Workflow<K>,
        scope: &Scope,
        task: &TaskBuilder<K>,
        inst: Instance,
    ) -> Result<(), GraphError> {
        let id = node_id(&scope.id_prefix, &task.name, &inst);
        let temp_dir = self
            .tmp_root
            .join(node_dir(scope, &task.name, &inst))
            .join("_tmp");
        let mut job = Job {
            id,
            kind: task.kind.clone(),
            instance: inst,
            ctx: scope.ctx.merged(&task.ctx),
            temp_dir,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            params: BTreeMap::new(),
            temp_spaces: BTreeMap::new(),
            input_files: Vec::new(),
            output_files: Vec::new(),
            depends_on: Vec::new(),
        };
        for (name, arg) in &task.args {
            match arg {
                Arg::Input(art) => {
                    let (files, all) = self.resolve(wf, scope, art, &job.instance)?;
                    job.input_files.extend(all);
                    job.inputs.insert(name.clone(), files);
                }
                Arg::Output(art) => {
                    let (files, all) = self.resolve(wf, scope, art, &job.instance)?;
                    job.output_files.extend(all);
                    job.outputs.insert(name.clone(), files);
                }
                Arg::Instance(axis) => {
                    let value = job.instance.get(axis).ok_or_else(|| GraphError::AxisMismatch {
                        node: task.name.clone(),
                        artifact: axis.to_string(),
                        detail: "instance argument without a value".to_string(),
                    })?;
                    job.params.insert(name.clone(), Value::from(value));
                }
                Arg::TempSpace(dir) => {
                    let path = job.temp_dir.join(dir);
                    job.temp_spaces.insert(name.clone(), path);
                }
                Arg::Value(v) => {
                    job.params.insert(name.clone(), v.clone());
                }
            }
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Files of `art` seen from a node at `inst`, plus the full list of paths
    /// including companions.
    fn resolve(
        &mut self,
        wf: &Workflow<K>,
        scope: &Scope,
        art: &Artifact,
        inst: &Instance,
    ) -> Result<(Files, Vec<PathBuf>), GraphError> {
        let decl = wf
            .artifacts
            .get(&art.name)
            .ok_or_else(|| GraphError::UndeclaredArtifact {
                node: scope.id_prefix.clone(),
                artifact: art.name.clone(),
            })?;
        let free: Vec<AxisName> = decl
            .axes
            .iter()
            .filter(|a| inst.get(a).is_none())
            .cloned()
            .collect();
        let files = if free.is_empty() {
            Files::One(self.path(scope, decl, inst)?)
        } else {
            let mut many = KeyedFiles::default();
            for coords in wf.axes.instances(&free) {
                let key = coords.iter().map(|(_, v)| v).join("/");
                many.push(key, self.path(scope, decl, &inst.union(&coords))?);
            }
            Files::Many(many)
        };
        let mut all = Vec::new();
        for p in files.paths() {
            all.push(p.clone());
            all.extend(decl.extensions.iter().map(|ext| companion_path(p, ext)));
        }
        if decl.temp {
            self.temp.extend(all.iter().cloned());
        }
        Ok((files, all))
    }

    fn path(
        &self,
        scope: &Scope,
        decl: &ArtifactDecl,
        coords: &Instance,
    ) -> Result<PathBuf, GraphError> {
        if let Some(p) = decl.fixed_path(coords)? {
            return Ok(p);
        }
        if let Some(FileNames::Port(port)) = &decl.location {
            return scope
                .ports
                .get(port)
                .cloned()
                .ok_or_else(|| GraphError::UnboundPort {
                    node: scope.id_prefix.trim_end_matches('/').to_string(),
                    port: port.clone(),
                });
        }
        // Managed, or produced without an explicit location.
        let mut path = self.tmp_root.join(&scope.dir).join(&decl.name);
        for axis in &decl.axes {
            let value = coords
                .get(axis)
                .ok_or_else(|| GraphError::MissingFilename {
                    artifact: decl.name.clone(),
                    key: format!("unset axis {axis}"),
                })?;
            path.push(format!("{axis}={value}"));
        }
        Ok(path.join(&decl.name))
    }
}

/// Derive job dependencies from shared paths and sort jobs topologically.
fn order<K>(
    jobs: Vec<Job<K>>,
    temp: BTreeSet<PathBuf>,
) -> Result<(Vec<Job<K>>, BTreeMap<PathBuf, TempFile>), GraphError> {
    let mut producer: HashMap<&Path, usize> = HashMap::new();
    for (i, job) in jobs.iter().enumerate() {
        for path in &job.output_files {
            if let Some(&first) = producer.get(path.as_path()) {
                return Err(GraphError::DuplicateProducer {
                    artifact: path.display().to_string(),
                    first: jobs[first].id.clone(),
                    second: job.id.clone(),
                });
            }
            producer.insert(path.as_path(), i);
        }
    }

    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..jobs.len()).map(|i| graph.add_node(i)).collect();
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); jobs.len()];
    for (i, job) in jobs.iter().enumerate() {
        for path in &job.input_files {
            if let Some(&p) = producer.get(path.as_path()) {
                if deps[i].insert(p) {
                    graph.add_edge(nodes[p], nodes[i], ());
                }
            }
        }
    }
    let sorted = toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
        node: jobs[graph[cycle.node_id()]].id.clone(),
    })?;

    let mut temp_files: BTreeMap<PathBuf, TempFile> = temp
        .into_iter()
        .map(|path| {
            let producer = producer.get(path.as_path()).map(|&i| jobs[i].id.clone());
            (
                path,
                TempFile {
                    producer,
                    consumers: Vec::new(),
                },
            )
        })
        .collect();

    let ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
    let mut slots: Vec<Option<Job<K>>> = jobs.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for node in sorted {
        let i = graph[node];
        let Some(mut job) = slots[i].take() else {
            continue;
        };
        job.depends_on = deps[i].iter().map(|&d| ids[d].clone()).collect();
        for path in &job.input_files {
            if let Some(t) = temp_files.get_mut(path) {
                if !t.consumers.contains(&job.id) {
                    t.consumers.push(job.id.clone());
                }
            }
        }
        ordered.push(job);
    }
    Ok((ordered, temp_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisBinding;
    use crate::workflow::WorkflowBuilder;
    use pretty_assertions::assert_eq;

    fn extract_seqdata() -> Workflow<&'static str> {
        let mut wf = WorkflowBuilder::new().with_ctx(ExecContext::new().mem(6));
        wf.set_axis(AxisBinding::new("chromosome", ["1", "2"]))
            .unwrap();
        let bam = wf.declare_input("bam").extensions([".bai"]);
        let seqdata = wf.declare_output("seqdata");
        wf.task("create_chromosome_seqdata", "create")
            .axis("chromosome")
            .input("bam", bam)
            .output(
                "seqdata",
                Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
            )
            .instance("chromosome", "chromosome")
            .temp_space("tempdir");
        wf.task("merge_seqdata", "merge")
            .input(
                "inputs",
                Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
            )
            .output("merged", seqdata)
            .ctx(ExecContext::new().mem(12));
        wf.build().unwrap()
    }

    fn per_cell() -> Workflow<&'static str> {
        let mut wf = WorkflowBuilder::new().with_ctx(
            ExecContext::new()
                .mem(4)
                .docker_image("remixt:v0.5"),
        );
        wf.set_axis(AxisBinding::new("cell_id", ["A", "B"]))
            .unwrap();
        wf.subworkflow("extract_seqdata", extract_seqdata())
            .axis("cell_id")
            .bind_input(
                "bam",
                Artifact::named("bam")
                    .axis("cell_id")
                    .fnames([("A", "/in/A.bam"), ("B", "/in/B.bam")]),
            )
            .bind_output("seqdata", Artifact::temp("cell_seqdata.h5").axis("cell_id"))
            .ctx(ExecContext::new().ncpus(2));
        wf.task("merge_overlapping_seqdata", "merge")
            .input(
                "inputs",
                Artifact::temp("cell_seqdata.h5").axis("cell_id"),
            )
            .output("seqdata", Artifact::file("/out/seqdata.h5"));
        wf.build().unwrap()
    }

    #[test]
    fn test_flatten_nested() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        // 2 cells x (2 chromosomes + 1 merge) + final merge
        assert_eq!(plan.jobs.len(), 7);
        assert_eq!(
            plan.jobs.last().unwrap().id,
            "merge_overlapping_seqdata"
        );

        let create = plan
            .job("extract_seqdata[cell_id=B]/create_chromosome_seqdata[chromosome=2]")
            .unwrap();
        assert_eq!(
            create.inputs["bam"],
            Files::One(PathBuf::from("/in/B.bam"))
        );
        assert_eq!(
            create.input_files,
            vec![PathBuf::from("/in/B.bam"), PathBuf::from("/in/B.bam.bai")]
        );
        assert_eq!(
            create.outputs["seqdata"],
            Files::One(PathBuf::from(
                "/tmp/run/extract_seqdata/cell_id=B/chrom_seqdata.h5/chromosome=2/chrom_seqdata.h5"
            ))
        );
        assert_eq!(create.params["chromosome"], Value::from("2"));
        assert_eq!(
            create.temp_spaces["tempdir"],
            PathBuf::from(
                "/tmp/run/extract_seqdata/cell_id=B/create_chromosome_seqdata/chromosome=2/_tmp/tempdir"
            )
        );

        let merge = plan
            .job("extract_seqdata[cell_id=A]/merge_seqdata")
            .unwrap();
        let Files::Many(inputs) = &merge.inputs["inputs"] else {
            panic!("expected a multi-valued input");
        };
        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(merge.depends_on.len(), 2);
        assert_eq!(
            merge.outputs["merged"],
            Files::One(PathBuf::from(
                "/tmp/run/cell_seqdata.h5/cell_id=A/cell_seqdata.h5"
            ))
        );
    }

    #[test]
    fn test_gathered_inputs_keep_axis_order() {
        let mut wf = WorkflowBuilder::new();
        wf.set_axis(AxisBinding::new("chromosome", ["2", "10", "X"]))
            .unwrap();
        wf.task("call", "call")
            .axis("chromosome")
            .output("vcf", Artifact::temp("calls.vcf").axis("chromosome"));
        wf.task("concat", "concat")
            .input("inputs", Artifact::temp("calls.vcf").axis("chromosome"))
            .output("output", Artifact::file("/out/calls.vcf"));
        let plan = wf.build().unwrap().plan("/tmp/run").unwrap();

        let concat = plan.job("concat").unwrap();
        let Files::Many(inputs) = &concat.inputs["inputs"] else {
            panic!("expected a multi-valued input");
        };
        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["2", "10", "X"]);
        let json = serde_json::to_string(&concat.inputs["inputs"]).unwrap();
        let (two, ten) = (json.find("\"2\"").unwrap(), json.find("\"10\"").unwrap());
        assert!(two < ten);
    }

    #[test]
    fn test_context_chain() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        let create = plan
            .job("extract_seqdata[cell_id=A]/create_chromosome_seqdata[chromosome=1]")
            .unwrap();
        // inner default overrides outer default; node context fills ncpus
        assert_eq!(create.ctx.mem_gb(), Some(6));
        assert_eq!(create.ctx.num_cpus(), Some(2));
        assert_eq!(create.ctx.image(), Some("remixt:v0.5"));
        let merge = plan
            .job("extract_seqdata[cell_id=A]/merge_seqdata")
            .unwrap();
        assert_eq!(merge.ctx.mem_gb(), Some(12));
        let top = plan.job("merge_overlapping_seqdata").unwrap();
        assert_eq!(top.ctx.mem_gb(), Some(4));
        assert_eq!(top.ctx.num_cpus(), None);
    }

    #[test]
    fn test_temp_consumers() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        let cell = PathBuf::from("/tmp/run/cell_seqdata.h5/cell_id=A/cell_seqdata.h5");
        assert_eq!(
            plan.temp_files[&cell],
            TempFile {
                producer: Some("extract_seqdata[cell_id=A]/merge_seqdata".into()),
                consumers: vec!["merge_overlapping_seqdata".into()],
            }
        );
        assert_eq!(plan.temp_files.len(), 6);
    }

    #[test]
    fn test_replicas_have_distinct_temp_dirs() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        let dirs: BTreeSet<_> = plan.jobs.iter().map(|j| &j.temp_dir).collect();
        assert_eq!(dirs.len(), plan.jobs.len());
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        let pos: HashMap<_, _> = plan
            .jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (j.id.as_str(), i))
            .collect();
        for (i, job) in plan.jobs.iter().enumerate() {
            for dep in &job.depends_on {
                assert!(pos[dep.as_str()] < i);
            }
        }
    }

    #[test]
    fn test_plan_serializes() {
        let plan = per_cell().plan("/tmp/run").unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["jobs"].as_array().unwrap().len(), 7);
    }
}
