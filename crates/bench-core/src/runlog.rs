use anyhow::{Context, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    /// Marker that starts every status line.
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Producer => "PROD",
            Role::Consumer => "OBS",
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            Role::Producer => "prod",
            Role::Consumer => "cons",
        }
    }
}

/// Which file status lines go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// No run identified yet
    Default,
    RunScoped(String),
}

/// Status-line sink: every line is echoed to stdout and appended to a file.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
    label: String,
    role: Role,
    target: LogTarget,
    echo: bool,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>, role: Role) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            role,
            target: LogTarget::Default,
            echo: true,
        }
    }

    /// Start directly on a run-scoped file (the producer knows its run id up front).
    pub fn for_run(
        dir: impl Into<PathBuf>,
        label: impl Into<String>,
        role: Role,
        run_id: impl Into<String>,
    ) -> Self {
        let mut log = Self::new(dir, label, role);
        log.target = LogTarget::RunScoped(run_id.into());
        log
    }

    /// Disable the stdout echo; the file is still written.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    pub fn path(&self) -> PathBuf {
        let suffix = match &self.target {
            LogTarget::Default => "pending",
            LogTarget::RunScoped(run_id) => run_id.as_str(),
        };
        self.dir.join(format!(
            "{}-{}-{}.log",
            self.label,
            self.role.file_stem(),
            suffix
        ))
    }

    /// Move from the default file to the run's file. Only the first call switches.
    pub fn switch_to_run(&mut self, run_id: &str) -> bool {
        if self.target != LogTarget::Default {
            return false;
        }
        self.target = LogTarget::RunScoped(run_id.to_string());
        true
    }

    pub fn line(&self, msg: impl fmt::Display) -> Result<()> {
        let line = format!("{} {}", self.role.tag(), msg);
        if self.echo {
            println!("{line}");
        }
        append_line(&self.path(), &line)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;
    writeln!(file, "{line}").with_context(|| format!("Failed to write log file {:?}", path))?;
    Ok(())
}
