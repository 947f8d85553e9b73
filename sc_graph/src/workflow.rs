//! Workflow builder, validation and the immutable validated workflow.

use crate::artifact::{Artifact, ArtifactDecl, FileNames};
use crate::axis::{AxisBinding, AxisName, AxisTable};
use crate::context::ExecContext;
use crate::error::GraphError;
use crate::task::{Arg, TaskBuilder};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::path::PathBuf;

/// A sub-workflow instantiated as one node of a parent workflow.
#[derive(Debug)]
pub struct SubworkflowBuilder<K> {
    pub(crate) name: String,
    pub(crate) workflow: Workflow<K>,
    pub(crate) axes: Vec<AxisName>,
    pub(crate) inputs: Vec<(String, Artifact)>,
    pub(crate) outputs: Vec<(String, Artifact)>,
    pub(crate) ctx: ExecContext,
}

impl<K> SubworkflowBuilder<K> {
    pub fn axis(&mut self, axis: impl Into<AxisName>) -> &mut Self {
        self.axes.push(axis.into());
        self
    }

    /// Feed `artifact` of the parent scope into the inner input port `port`.
    pub fn bind_input(&mut self, port: impl Into<String>, artifact: Artifact) -> &mut Self {
        self.inputs.push((port.into(), artifact));
        self
    }

    /// Materialise the inner output port `port` as `artifact` of the parent scope.
    pub fn bind_output(&mut self, port: impl Into<String>, artifact: Artifact) -> &mut Self {
        self.outputs.push((port.into(), artifact));
        self
    }

    pub fn ctx(&mut self, ctx: ExecContext) -> &mut Self {
        self.ctx = self.ctx.merged(&ctx);
        self
    }
}

/// Names a parent may bind on a sub-workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Interface {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Accumulates the declarations of one workflow scope.
#[derive(Debug)]
pub struct WorkflowBuilder<K> {
    axes: AxisTable,
    tasks: Vec<TaskBuilder<K>>,
    subworkflows: Vec<SubworkflowBuilder<K>>,
    filenames: Vec<Artifact>,
    interface: Interface,
    ctx: ExecContext,
}

impl<K> Default for WorkflowBuilder<K> {
    fn default() -> Self {
        WorkflowBuilder {
            axes: AxisTable::default(),
            tasks: Vec::new(),
            subworkflows: Vec::new(),
            filenames: Vec::new(),
            interface: Interface::default(),
            ctx: ExecContext::new(),
        }
    }
}

impl<K> WorkflowBuilder<K> {
    pub fn new() -> Self {
        WorkflowBuilder::default()
    }

    /// Default context for everything declared in this scope.
    pub fn with_ctx(mut self, ctx: ExecContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Declare the values of an axis in this scope. Each axis may be set once.
    pub fn set_axis<T: Display>(&mut self, binding: AxisBinding<T>) -> Result<(), GraphError> {
        let values = binding
            .rendered()
            .map_err(|value| GraphError::DuplicateAxisValue {
                axis: binding.axis().clone(),
                value,
            })?;
        if !self.axes.insert(binding.axis().clone(), values) {
            return Err(GraphError::AxisRedeclared {
                axis: binding.axis().clone(),
            });
        }
        Ok(())
    }

    /// Give the artifact `name` one path per value of `axis`.
    pub fn set_filenames<V: Display, P: Into<PathBuf>>(
        &mut self,
        name: impl Into<String>,
        axis: impl Into<AxisName>,
        fnames: impl IntoIterator<Item = (V, P)>,
    ) -> &mut Self {
        self.filenames
            .push(Artifact::named(name).axis(axis).fnames(fnames));
        self
    }

    /// Declare an input port and return a reference to it for use by tasks.
    pub fn declare_input(&mut self, port: impl Into<String>) -> Artifact {
        let port = port.into();
        self.interface.inputs.push(port.clone());
        Artifact::port(port)
    }

    /// Declare an output port and return a reference to it for use by tasks.
    pub fn declare_output(&mut self, port: impl Into<String>) -> Artifact {
        let port = port.into();
        self.interface.outputs.push(port.clone());
        Artifact::port(port)
    }

    pub fn task(&mut self, name: impl Into<String>, kind: K) -> &mut TaskBuilder<K> {
        let idx = self.tasks.len();
        self.tasks.push(TaskBuilder::new(name, kind));
        &mut self.tasks[idx]
    }

    pub fn subworkflow(
        &mut self,
        name: impl Into<String>,
        workflow: Workflow<K>,
    ) -> &mut SubworkflowBuilder<K> {
        let idx = self.subworkflows.len();
        self.subworkflows.push(SubworkflowBuilder {
            name: name.into(),
            workflow,
            axes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ctx: ExecContext::new(),
        });
        &mut self.subworkflows[idx]
    }

    /// Validate every declaration and freeze the workflow.
    pub fn build(self) -> Result<Workflow<K>, GraphError> {
        let mut v = Validator::new(&self.axes, &self.interface);

        for art in &self.filenames {
            v.declare("set_filenames", art)?;
        }

        let mut seen_nodes = HashSet::new();
        let node_names = self
            .tasks
            .iter()
            .map(|t| &t.name)
            .chain(self.subworkflows.iter().map(|s| &s.name));
        for name in node_names {
            if !seen_nodes.insert(name.as_str()) {
                return Err(GraphError::DuplicateNode { name: name.clone() });
            }
        }

        for task in &self.tasks {
            v.check_node_axes(&task.name, &task.axes)?;
            for (_, arg) in &task.args {
                match arg {
                    Arg::Input(art) => v.consume(&task.name, art)?,
                    Arg::Output(art) => {
                        for axis in &task.axes {
                            if !art.axes.contains(axis) {
                                return Err(GraphError::AxisMismatch {
                                    node: task.name.clone(),
                                    artifact: art.name.clone(),
                                    detail: format!("output lacks task axis '{axis}'"),
                                });
                            }
                        }
                        v.produce(&task.name, art)?;
                    }
                    Arg::Instance(axis) => {
                        if !task.axes.contains(axis) {
                            return Err(GraphError::AxisMismatch {
                                node: task.name.clone(),
                                artifact: axis.to_string(),
                                detail: format!("instance argument on undeclared task axis '{axis}'"),
                            });
                        }
                    }
                    Arg::TempSpace(_) | Arg::Value(_) => {}
                }
            }
        }

        for sub in &self.subworkflows {
            v.check_node_axes(&sub.name, &sub.axes)?;
            let inner = sub.workflow.interface();
            check_ports(&sub.name, &inner.inputs, &sub.inputs)?;
            check_ports(&sub.name, &inner.outputs, &sub.outputs)?;
            for (_, art) in &sub.inputs {
                if let Some(axis) = art.axes.iter().find(|a| !sub.axes.contains(a)) {
                    return Err(GraphError::AxisMismatch {
                        node: sub.name.clone(),
                        artifact: art.name.clone(),
                        detail: format!("input binding uses axis '{axis}' the node is not expanded over"),
                    });
                }
                v.consume(&sub.name, art)?;
            }
            for (_, art) in &sub.outputs {
                let same = art.axes.len() == sub.axes.len()
                    && sub.axes.iter().all(|a| art.axes.contains(a));
                if !same {
                    return Err(GraphError::AxisMismatch {
                        node: sub.name.clone(),
                        artifact: art.name.clone(),
                        detail: "output binding axes must equal the node axes".to_string(),
                    });
                }
                v.produce(&sub.name, art)?;
            }
        }

        let (artifacts, graph) = v.finish()?;
        Ok(Workflow {
            axes: self.axes,
            tasks: self.tasks,
            subworkflows: self.subworkflows,
            artifacts,
            interface: self.interface,
            ctx: self.ctx,
            graph,
        })
    }
}

fn check_ports(
    node: &str,
    declared: &[String],
    bound: &[(String, Artifact)],
) -> Result<(), GraphError> {
    for (port, _) in bound {
        if !declared.contains(port) {
            return Err(GraphError::UnknownPort {
                node: node.to_string(),
                port: port.clone(),
            });
        }
    }
    for port in declared {
        if !bound.iter().any(|(p, _)| p == port) {
            return Err(GraphError::UnboundPort {
                node: node.to_string(),
                port: port.clone(),
            });
        }
    }
    Ok(())
}

/// Bookkeeping for `WorkflowBuilder::build`.
struct Validator<'a> {
    axes: &'a AxisTable,
    interface: &'a Interface,
    decls: BTreeMap<String, ArtifactDecl>,
    producers: HashMap<String, String>,
    consumers: Vec<(String, String)>,
    nodes: Vec<String>,
}

impl<'a> Validator<'a> {
    fn new(axes: &'a AxisTable, interface: &'a Interface) -> Self {
        Validator {
            axes,
            interface,
            decls: BTreeMap::new(),
            producers: HashMap::new(),
            consumers: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn check_node_axes(&mut self, node: &str, axes: &[AxisName]) -> Result<(), GraphError> {
        self.nodes.push(node.to_string());
        for axis in axes {
            if !self.axes.contains(axis) {
                return Err(GraphError::UnboundAxis {
                    node: node.to_string(),
                    axis: axis.clone(),
                });
            }
        }
        Ok(())
    }

    fn declare(&mut self, node: &str, art: &Artifact) -> Result<(), GraphError> {
        for axis in &art.axes {
            if !self.axes.contains(axis) {
                return Err(GraphError::UnboundAxis {
                    node: node.to_string(),
                    axis: axis.clone(),
                });
            }
        }
        if let Some(FileNames::Port(port)) = &art.fnames {
            let known = self.interface.inputs.contains(port) || self.interface.outputs.contains(port);
            if !known {
                return Err(GraphError::UnknownPort {
                    node: node.to_string(),
                    port: port.clone(),
                });
            }
        }
        match self.decls.get_mut(&art.name) {
            Some(decl) => decl.reconcile(art),
            None => {
                self.decls
                    .insert(art.name.clone(), ArtifactDecl::from_ref(art));
                Ok(())
            }
        }
    }

    fn consume(&mut self, node: &str, art: &Artifact) -> Result<(), GraphError> {
        self.declare(node, art)?;
        self.consumers.push((art.name.clone(), node.to_string()));
        Ok(())
    }

    fn produce(&mut self, node: &str, art: &Artifact) -> Result<(), GraphError> {
        self.declare(node, art)?;
        if let Some(FileNames::Port(port)) = &art.fnames {
            if self.interface.inputs.contains(port) {
                return Err(GraphError::DuplicateProducer {
                    artifact: art.name.clone(),
                    first: format!("input port '{port}'"),
                    second: node.to_string(),
                });
            }
        }
        if let Some(first) = self.producers.get(&art.name) {
            return Err(GraphError::DuplicateProducer {
                artifact: art.name.clone(),
                first: first.clone(),
                second: node.to_string(),
            });
        }
        self.producers.insert(art.name.clone(), node.to_string());
        Ok(())
    }

    fn finish(self) -> Result<(BTreeMap<String, ArtifactDecl>, DiGraph<String, String>), GraphError> {
        // Inputs must come from somewhere in this scope.
        for (artifact, node) in &self.consumers {
            if self.producers.contains_key(artifact) {
                continue;
            }
            let provided = matches!(
                self.decls.get(artifact).and_then(|d| d.location.as_ref()),
                Some(FileNames::Path(_))
                    | Some(FileNames::PerValue(_))
                    | Some(FileNames::Template(_))
                    | Some(FileNames::Port(_))
            );
            if !provided {
                return Err(GraphError::UndeclaredArtifact {
                    node: node.clone(),
                    artifact: artifact.clone(),
                });
            }
        }
        for port in &self.interface.outputs {
            let produced = self.decls.values().any(|d| {
                d.location == Some(FileNames::Port(port.clone()))
                    && self.producers.contains_key(&d.name)
            });
            if !produced {
                return Err(GraphError::UndeclaredArtifact {
                    node: "output port".to_string(),
                    artifact: port.clone(),
                });
            }
        }

        let mut graph = DiGraph::new();
        let index: HashMap<&str, NodeIndex> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), graph.add_node(n.clone())))
            .collect();
        for (artifact, consumer) in &self.consumers {
            if let Some(producer) = self.producers.get(artifact) {
                graph.add_edge(
                    index[producer.as_str()],
                    index[consumer.as_str()],
                    artifact.clone(),
                );
            }
        }
        toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
            node: graph[cycle.node_id()].clone(),
        })?;
        Ok((self.decls, graph))
    }
}

/// A validated, immutable workflow.
#[derive(Debug)]
pub struct Workflow<K> {
    pub(crate) axes: AxisTable,
    pub(crate) tasks: Vec<TaskBuilder<K>>,
    pub(crate) subworkflows: Vec<SubworkflowBuilder<K>>,
    pub(crate) artifacts: BTreeMap<String, ArtifactDecl>,
    pub(crate) interface: Interface,
    pub(crate) ctx: ExecContext,
    graph: DiGraph<String, String>,
}

impl<K> Workflow<K> {
    /// Declaration-level DAG: one vertex per task or sub-workflow, one edge per
    /// artifact flowing between them.
    pub fn graph(&self) -> &DiGraph<String, String> {
        &self.graph
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Artifacts declared in this scope. Nested sub-workflows' internals are not
    /// included.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactDecl> {
        self.artifacts.values()
    }

    pub fn ctx(&self) -> &ExecContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type Wf = WorkflowBuilder<&'static str>;

    fn extract_seqdata() -> Workflow<&'static str> {
        let mut wf = Wf::new();
        wf.set_axis(AxisBinding::new("chromosome", ["1", "2"]))
            .unwrap();
        let bam = wf.declare_input("bam");
        let seqdata = wf.declare_output("seqdata");
        wf.task("create_chromosome_seqdata", "create")
            .axis("chromosome")
            .input("bam", bam)
            .output(
                "seqdata",
                Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
            )
            .instance("chromosome", "chromosome");
        wf.task("merge_seqdata", "merge")
            .input(
                "inputs",
                Artifact::temp("chrom_seqdata.h5").axis("chromosome"),
            )
            .output("merged", seqdata);
        wf.build().unwrap()
    }

    #[test]
    fn test_subworkflow_temporaries_stay_inside() {
        let inner = extract_seqdata();
        assert_eq!(
            inner.interface(),
            &Interface {
                inputs: vec!["bam".into()],
                outputs: vec!["seqdata".into()],
            }
        );

        let mut wf = Wf::new();
        wf.set_axis(AxisBinding::new("cell_id", ["A", "B"]))
            .unwrap();
        wf.subworkflow("extract_seqdata", inner)
            .axis("cell_id")
            .bind_input(
                "bam",
                Artifact::named("bam")
                    .axis("cell_id")
                    .fnames([("A", "a.bam"), ("B", "b.bam")]),
            )
            .bind_output("seqdata", Artifact::temp("cell_seqdata").axis("cell_id"));
        wf.task("merge", "merge")
            .input("seqdata", Artifact::temp("cell_seqdata").axis("cell_id"))
            .output("merged", Artifact::file("/out/seqdata.h5"));
        let wf = wf.build().unwrap();

        let names: Vec<_> = wf.artifacts().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["/out/seqdata.h5", "bam", "cell_seqdata"]);
        assert!(!names.contains(&"chrom_seqdata.h5"));
        assert_eq!(wf.graph().node_count(), 2);
        assert_eq!(wf.graph().edge_count(), 1);
    }

    #[test]
    fn test_axis_redeclared() {
        let mut wf = Wf::new();
        wf.set_axis(AxisBinding::new("region", ["1-1-10"])).unwrap();
        assert_eq!(
            wf.set_axis(AxisBinding::new("region", ["2-1-10"])),
            Err(GraphError::AxisRedeclared {
                axis: "region".into()
            })
        );
    }

    #[test]
    fn test_undeclared_input() {
        let mut wf = Wf::new();
        wf.task("index", "index")
            .input("bam", Artifact::temp("merged.bam"))
            .output("bai", Artifact::file("merged.bam.bai"));
        assert!(matches!(
            wf.build(),
            Err(GraphError::UndeclaredArtifact { .. })
        ));
    }

    #[test]
    fn test_instance_on_undeclared_task_axis() {
        let mut wf = Wf::new();
        wf.set_axis(AxisBinding::new("chromosome", ["1"])).unwrap();
        wf.task("infer", "infer")
            .input("seqdata", Artifact::file("seqdata.h5"))
            .output("out", Artifact::file("out.tsv"))
            .instance("chromosome", "chromosome");
        assert!(matches!(wf.build(), Err(GraphError::AxisMismatch { .. })));
    }

    #[test]
    fn test_output_missing_task_axis() {
        let mut wf = Wf::new();
        wf.set_axis(AxisBinding::new("chromosome", ["1"])).unwrap();
        wf.task("infer", "infer")
            .axis("chromosome")
            .output("out", Artifact::file("out.tsv"));
        assert!(matches!(wf.build(), Err(GraphError::AxisMismatch { .. })));
    }

    #[test]
    fn test_unbound_axis() {
        let mut wf = Wf::new();
        wf.task("merge", "merge")
            .axis("region")
            .output("out", Artifact::temp("x").axis("region"));
        assert_eq!(
            wf.build().unwrap_err(),
            GraphError::UnboundAxis {
                node: "merge".into(),
                axis: "region".into()
            }
        );
    }

    #[test]
    fn test_cycle() {
        let mut wf = Wf::new();
        wf.task("a", "a")
            .input("in", Artifact::temp("y"))
            .output("out", Artifact::temp("x"));
        wf.task("b", "b")
            .input("in", Artifact::temp("x"))
            .output("out", Artifact::temp("y"));
        assert!(matches!(wf.build(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_duplicate_producer() {
        let mut wf = Wf::new();
        wf.task("a", "a").output("out", Artifact::file("x.csv"));
        wf.task("b", "b").output("out", Artifact::file("x.csv"));
        assert!(matches!(
            wf.build(),
            Err(GraphError::DuplicateProducer { .. })
        ));
    }

    #[test]
    fn test_unbound_port() {
        let inner = extract_seqdata();
        let mut wf = Wf::new();
        wf.subworkflow("extract", inner)
            .bind_input("bam", Artifact::file("tumour.bam"));
        assert_eq!(
            wf.build().unwrap_err(),
            GraphError::UnboundPort {
                node: "extract".into(),
                port: "seqdata".into()
            }
        );
    }
}
