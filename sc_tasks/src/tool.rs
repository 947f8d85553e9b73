//! Synchronous external tool invocations with fixed argument templates.

use log::info;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// JVM flags every picard invocation starts with.
pub const PICARD_JVM_ARGS: [&str; 3] = ["-Xmx12G", "-Xms12G", "-XX:ParallelGCThreads=2"];

/// Records held in memory by picard before spilling to `TMP_DIR`.
pub const MAX_RECORDS_IN_RAM: &str = "MAX_RECORDS_IN_RAM=150000";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}", describe_exit(.code))]
    Failed { command: String, code: Option<i32> },

    #[error("cannot redirect output of `{command}` to {}", .path.display())]
    Redirect {
        command: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// A command line under construction.
#[derive(Clone, Debug)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    stdout: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        ToolCommand {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            stdout: None,
        }
    }

    /// `picard <jvm flags> <tool>`.
    pub fn picard(tool: &str) -> Self {
        ToolCommand::new("picard").args(PICARD_JVM_ARGS).arg(tool)
    }

    pub fn samtools(subcommand: &str) -> Self {
        ToolCommand::new("samtools").arg(subcommand)
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<S: AsRef<OsStr>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// A picard-style `KEY=value` argument.
    pub fn kv(self, key: &str, value: impl AsRef<OsStr>) -> Self {
        let mut arg = OsString::from(key);
        arg.push("=");
        arg.push(value);
        self.arg(arg)
    }

    /// Send standard output to `path` instead of inheriting it.
    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn argv(&self) -> impl Iterator<Item = &OsStr> {
        std::iter::once(self.program.as_os_str()).chain(self.args.iter().map(OsString::as_os_str))
    }

    /// Shell-like rendering used in logs and errors.
    pub fn command_line(&self) -> String {
        let mut line = self
            .argv()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(out) = &self.stdout {
            line.push_str(&format!(" > {}", out.display()));
        }
        line
    }

    /// Run to completion. A non-zero exit is an error.
    pub fn run(&self) -> Result<(), ToolError> {
        let command = self.command_line();
        info!("{command}");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(path) = &self.stdout {
            let file = File::create(path).map_err(|source| ToolError::Redirect {
                command: command.clone(),
                path: path.clone(),
                source,
            })?;
            cmd.stdout(Stdio::from(file));
        }
        let status = cmd.status().map_err(|source| ToolError::Spawn {
            command: command.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                command,
                code: status.code(),
            })
        }
    }
}
