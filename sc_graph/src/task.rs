//! Task declarations and the runtime view a task body gets of its job.

use crate::artifact::Artifact;
use crate::axis::AxisName;
use crate::context::ExecContext;
use crate::error::GraphError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One named argument of a task.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Input(Artifact),
    Output(Artifact),
    /// The replica's value of an axis the task is declared over.
    Instance(AxisName),
    /// Scratch directory private to the replica.
    TempSpace(String),
    Value(Value),
}

/// Collects the declaration of one task. Obtained from
/// `WorkflowBuilder::task`; nothing runs until the workflow is planned.
#[derive(Clone, Debug)]
pub struct TaskBuilder<K> {
    pub(crate) name: String,
    pub(crate) kind: K,
    pub(crate) axes: Vec<AxisName>,
    pub(crate) args: Vec<(String, Arg)>,
    pub(crate) ctx: ExecContext,
}

impl<K> TaskBuilder<K> {
    pub(crate) fn new(name: impl Into<String>, kind: K) -> Self {
        TaskBuilder {
            name: name.into(),
            kind,
            axes: Vec::new(),
            args: Vec::new(),
            ctx: ExecContext::new(),
        }
    }

    /// Replicate the task once per value of `axis`.
    pub fn axis(&mut self, axis: impl Into<AxisName>) -> &mut Self {
        self.axes.push(axis.into());
        self
    }

    pub fn axes<A: Into<AxisName>>(&mut self, axes: impl IntoIterator<Item = A>) -> &mut Self {
        self.axes.extend(axes.into_iter().map(Into::into));
        self
    }

    pub fn input(&mut self, name: impl Into<String>, artifact: Artifact) -> &mut Self {
        self.args.push((name.into(), Arg::Input(artifact)));
        self
    }

    pub fn output(&mut self, name: impl Into<String>, artifact: Artifact) -> &mut Self {
        self.args.push((name.into(), Arg::Output(artifact)));
        self
    }

    pub fn instance(&mut self, name: impl Into<String>, axis: impl Into<AxisName>) -> &mut Self {
        self.args.push((name.into(), Arg::Instance(axis.into())));
        self
    }

    pub fn temp_space(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.args.push((name.clone(), Arg::TempSpace(name)));
        self
    }

    pub fn value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.args.push((name.into(), Arg::Value(value.into())));
        self
    }

    /// Context hints for this task; merged over the enclosing workflow's.
    pub fn ctx(&mut self, ctx: ExecContext) -> &mut Self {
        self.ctx = self.ctx.merged(&ctx);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

/// Paths keyed by axis values, kept in the order the axis values were
/// declared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyedFiles(Vec<(String, PathBuf)>);

impl KeyedFiles {
    pub(crate) fn push(&mut self, key: String, path: PathBuf) {
        self.0.push((key, path));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> + '_ {
        self.0.iter().map(|(k, p)| (k, p))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> + '_ {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.0.iter().map(|(_, p)| p)
    }
}

impl<'a> IntoIterator for &'a KeyedFiles {
    type Item = (&'a String, &'a PathBuf);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl Serialize for KeyedFiles {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, p) in &self.0 {
            map.serialize_entry(k, p)?;
        }
        map.end()
    }
}

/// Concrete file(s) bound to an input or output argument of a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Files {
    One(PathBuf),
    /// Keyed by the values of the axes the job is not replicated over.
    Many(KeyedFiles),
}

impl Files {
    pub fn paths(&self) -> Box<dyn Iterator<Item = &PathBuf> + '_> {
        match self {
            Files::One(p) => Box::new(std::iter::once(p)),
            Files::Many(m) => Box::new(m.values()),
        }
    }
}

/// Everything a task body needs to run one job.
#[derive(Debug, Clone, Copy)]
pub struct TaskCall<'a> {
    pub(crate) job: &'a str,
    pub(crate) inputs: &'a BTreeMap<String, Files>,
    pub(crate) outputs: &'a BTreeMap<String, Files>,
    pub(crate) params: &'a BTreeMap<String, Value>,
    pub(crate) temp_spaces: &'a BTreeMap<String, PathBuf>,
    pub(crate) temp_dir: &'a Path,
    pub(crate) ctx: &'a ExecContext,
}

impl<'a> TaskCall<'a> {
    fn missing(&self, arg: &str) -> GraphError {
        GraphError::MissingArgument {
            job: self.job.to_string(),
            arg: arg.to_string(),
        }
    }

    pub fn job_id(&self) -> &'a str {
        self.job
    }

    pub fn input(&self, name: &str) -> Result<&'a Path, GraphError> {
        match self.inputs.get(name) {
            Some(Files::One(p)) => Ok(p),
            _ => Err(self.missing(name)),
        }
    }

    pub fn inputs(&self, name: &str) -> Result<&'a KeyedFiles, GraphError> {
        match self.inputs.get(name) {
            Some(Files::Many(m)) => Ok(m),
            _ => Err(self.missing(name)),
        }
    }

    pub fn output(&self, name: &str) -> Result<&'a Path, GraphError> {
        match self.outputs.get(name) {
            Some(Files::One(p)) => Ok(p),
            _ => Err(self.missing(name)),
        }
    }

    pub fn outputs(&self, name: &str) -> Result<&'a KeyedFiles, GraphError> {
        match self.outputs.get(name) {
            Some(Files::Many(m)) => Ok(m),
            _ => Err(self.missing(name)),
        }
    }

    /// Literal value or instance value bound to `name`.
    pub fn param(&self, name: &str) -> Result<&'a Value, GraphError> {
        self.params.get(name).ok_or_else(|| self.missing(name))
    }

    pub fn param_str(&self, name: &str) -> Result<&'a str, GraphError> {
        self.param(name)?
            .as_str()
            .ok_or_else(|| self.missing(name))
    }

    pub fn temp_space(&self, name: &str) -> Result<&'a Path, GraphError> {
        self.temp_spaces
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| self.missing(name))
    }

    /// The job's private temporary directory; exists while the job runs.
    pub fn temp_dir(&self) -> &'a Path {
        self.temp_dir
    }

    pub fn ctx(&self) -> &'a ExecContext {
        self.ctx
    }
}

/// Uniform "perform this task" capability implemented by task kinds.
pub trait Execute {
    /// Short name used in logs and plans.
    fn name(&self) -> &str;

    fn execute(&self, call: &TaskCall<'_>) -> anyhow::Result<()>;
}
