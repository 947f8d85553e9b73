//! Sequential single-machine execution of a plan.

use crate::error::GraphError;
use crate::plan::Plan;
use crate::task::Execute;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What a run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub removed: Vec<PathBuf>,
}

/// Runs jobs one at a time in plan order, skipping jobs whose outputs already
/// exist.
#[derive(Clone, Debug, Default)]
pub struct LocalRunner {
    rerun: bool,
    keep_temps: bool,
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

impl LocalRunner {
    pub fn new() -> Self {
        LocalRunner::default()
    }

    /// Run every job even if its outputs exist.
    pub fn rerun(mut self, rerun: bool) -> Self {
        self.rerun = rerun;
        self
    }

    /// Leave temporary files and job scratch directories in place.
    pub fn keep_temps(mut self, keep: bool) -> Self {
        self.keep_temps = keep;
        self
    }

    /// Which jobs must run. A job is needed when a kept output is missing,
    /// when a job it depends on is needed, or when a temporary output is
    /// missing and some job reading it is needed.
    fn needed<K>(&self, plan: &Plan<K>) -> Vec<bool> {
        let index: HashMap<&str, usize> = plan
            .jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (j.id.as_str(), i))
            .collect();
        let mut dependents = vec![Vec::new(); plan.jobs.len()];
        for (i, job) in plan.jobs.iter().enumerate() {
            for dep in &job.depends_on {
                if let Some(&d) = index.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }
        let mut needed = vec![self.rerun; plan.jobs.len()];
        if self.rerun {
            return needed;
        }
        let mut any_missing = Vec::with_capacity(plan.jobs.len());
        for (i, job) in plan.jobs.iter().enumerate() {
            let missing: Vec<_> = job.output_files.iter().filter(|p| !p.exists()).collect();
            needed[i] = missing.iter().any(|p| !plan.temp_files.contains_key(*p));
            any_missing.push(!missing.is_empty());
        }
        // Jobs are in topological order. A needed reader forces its missing
        // temporaries to be regenerated, and a needed job invalidates
        // everything downstream of it; repeat both passes until stable.
        loop {
            let mut changed = false;
            for i in (0..plan.jobs.len()).rev() {
                if !needed[i] && any_missing[i] && dependents[i].iter().any(|&d| needed[d]) {
                    needed[i] = true;
                    changed = true;
                }
            }
            for (i, job) in plan.jobs.iter().enumerate() {
                let upstream = job
                    .depends_on
                    .iter()
                    .filter_map(|dep| index.get(dep.as_str()))
                    .any(|&d| needed[d]);
                if !needed[i] && upstream {
                    needed[i] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        needed
    }

    pub fn run<K: Execute>(&self, plan: &Plan<K>) -> Result<RunSummary> {
        let needed = self.needed(plan);
        let mut remaining: HashMap<&Path, usize> = plan
            .temp_files
            .iter()
            .map(|(p, t)| (p.as_path(), t.consumers.len()))
            .collect();
        let mut summary = RunSummary::default();

        for (job, needed) in plan.jobs.iter().zip(needed) {
            if needed {
                info!("running {} ({})", job.id, job.kind.name());
                fs::create_dir_all(&job.temp_dir)
                    .with_context(|| format!("creating {}", job.temp_dir.display()))?;
                for dir in job.temp_spaces.values() {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                }
                for parent in job.output_files.iter().filter_map(|p| p.parent()) {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }

                job.kind
                    .execute(&job.call())
                    .with_context(|| format!("job {} failed", job.id))?;

                for path in &job.output_files {
                    if !path.exists() {
                        return Err(GraphError::MissingOutput {
                            job: job.id.clone(),
                            path: path.clone(),
                        }
                        .into());
                    }
                }
                if !self.keep_temps {
                    fs::remove_dir_all(&job.temp_dir)
                        .with_context(|| format!("removing {}", job.temp_dir.display()))?;
                }
                summary.executed.push(job.id.clone());
            } else {
                info!("skipping {}: outputs exist", job.id);
                summary.skipped.push(job.id.clone());
            }

            if self.keep_temps {
                continue;
            }
            for path in &job.output_files {
                if remaining.get(path.as_path()) == Some(&0) && remove_if_exists(path)? {
                    summary.removed.push(path.clone());
                }
            }
            for path in &job.input_files {
                if let Some(n) = remaining.get_mut(path.as_path()) {
                    *n = n.saturating_sub(1);
                    if *n == 0 && remove_if_exists(path)? {
                        debug!("removed temporary {}", path.display());
                        summary.removed.push(path.clone());
                    }
                }
            }
        }
        Ok(summary)
    }
}
