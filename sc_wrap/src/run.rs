//! Options shared by every pipeline subcommand and the plan/run step.

use anyhow::{bail, Context, Result};
use clap::Args;
use log::info;
use sc_graph::{Execute, LocalRunner, RunSummary, Workflow};
use sc_lib::PipelineConfig;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline configuration, TOML or JSON (by extension).
    #[clap(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for temporary files and job scratch space.
    #[clap(long, value_name = "PATH", default_value = "sc_pipeline_tmp")]
    pub tmpdir: PathBuf,

    /// Print the job plan as JSON instead of running it.
    #[clap(long)]
    pub dry_run: bool,

    /// Run every job even when its outputs already exist.
    #[clap(long)]
    pub rerun: bool,

    /// Keep temporary files and job scratch directories.
    #[clap(long)]
    pub keep_temps: bool,
}

impl RunArgs {
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let Some(path) = &self.config else {
            bail!("this pipeline needs a configuration file (--config)");
        };
        PipelineConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))
    }

    /// Plan `workflow` under the temp dir, then print or run the plan.
    pub fn execute<K>(&self, workflow: &Workflow<K>, out: impl Write) -> Result<Option<RunSummary>>
    where
        K: Execute + Clone + Serialize,
    {
        let plan = workflow.plan(&self.tmpdir)?;
        info!("planned {} jobs", plan.jobs.len());
        if self.dry_run {
            serde_json::to_writer_pretty(out, &plan).context("writing plan")?;
            return Ok(None);
        }
        let summary = LocalRunner::new()
            .rerun(self.rerun)
            .keep_temps(self.keep_temps)
            .run(&plan)?;
        info!(
            "done: {} jobs run, {} skipped, {} temporaries removed",
            summary.executed.len(),
            summary.skipped.len(),
            summary.removed.len()
        );
        Ok(Some(summary))
    }
}
