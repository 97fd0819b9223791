// src/sink/file.rs

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{BatchError, Result};
use crate::runs::Run;
use crate::runs::run::NO_RUN_NUMBER;

use super::{OutputSink, SinkFactory};

/// One output file per (run, run number) in a fixed directory.
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    /// Use `dir`, or the current working directory when `None`.
    ///
    /// Fails if a configured directory does not exist, so a bad path is
    /// reported before any process is spawned.
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => {
                if !dir.is_dir() {
                    return Err(BatchError::ConfigError(format!(
                        "output directory {:?} does not exist",
                        dir
                    )));
                }
                dir
            }
            None => std::env::current_dir()?,
        };
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run: &Run, run_number: Option<&str>) -> PathBuf {
        self.dir.join(output_file_name(run, run_number))
    }
}

impl SinkFactory for FileSinkFactory {
    fn create(&self, run: &Run, run_number: Option<&str>) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(FileSink::new(self.path_for(run, run_number))))
    }
}

/// Deterministic output file name: `run_<rn>_<v1>_<v2>....out`.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced with `_`.
pub fn output_file_name(run: &Run, run_number: Option<&str>) -> String {
    let mut name = format!("run_{}", sanitize(run_number.unwrap_or(NO_RUN_NUMBER)));
    for value in run.values() {
        name.push('_');
        name.push_str(&sanitize(value));
    }
    name.push_str(".out");
    name
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sink writing to a single file, truncated on open.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn open(&mut self) -> Result<()> {
        let file = File::create(&self.path)?;
        debug!(path = ?self.path, "opened output file");
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(text.as_bytes())?;
                Ok(())
            }
            None => Err(BatchError::ConfigError(format!(
                "output file {:?} written before it was opened",
                self.path
            ))),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}
