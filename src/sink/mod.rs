// src/sink/mod.rs

//! Output capture for workers.
//!
//! A worker never talks to files or streams directly; it receives a boxed
//! [`OutputSink`] and wraps it in a [`SinkScope`], which opens the sink up
//! front and guarantees it is closed on every exit path.
//!
//! Sinks are produced per (run, run number) by a [`SinkFactory`]:
//! - [`FileSinkFactory`] (default): one file per pair in an output directory.
//! - [`StreamSinkFactory`]: shared stdout, lines prefixed with the label.
//! - [`DiscardSinkFactory`]: drop everything.
//! - [`MemorySinkFactory`]: in-memory capture.

use std::fmt::Debug;
use std::io::Write;

use tracing::warn;

use crate::errors::Result;
use crate::runs::Run;

pub mod file;
pub mod memory;

pub use file::{FileSink, FileSinkFactory, output_file_name};
pub use memory::{MemoryRecord, MemorySinkFactory};

/// Destination for one worker's output.
pub trait OutputSink: Send {
    fn open(&mut self) -> Result<()>;
    fn write(&mut self, text: &str) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Creates the sink for one (run, run number) pair.
pub trait SinkFactory: Send + Sync + Debug {
    fn create(&self, run: &Run, run_number: Option<&str>) -> Result<Box<dyn OutputSink>>;
}

/// An opened sink that is closed when finished or dropped.
pub struct SinkScope {
    sink: Box<dyn OutputSink>,
    open: bool,
}

impl SinkScope {
    pub fn open(mut sink: Box<dyn OutputSink>) -> Result<Self> {
        sink.open()?;
        Ok(Self { sink, open: true })
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        self.sink.write(text)
    }

    /// Close the sink and report any error from doing so.
    pub fn finish(mut self) -> Result<()> {
        self.open = false;
        self.sink.close()
    }
}

impl Drop for SinkScope {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.sink.close() {
                warn!(error = %e, "failed to close output sink");
            }
        }
    }
}

/// Writes every line to the process stdout, prefixed with the worker label.
#[derive(Debug, Clone, Default)]
pub struct StreamSinkFactory;

impl SinkFactory for StreamSinkFactory {
    fn create(&self, run: &Run, run_number: Option<&str>) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(StreamSink {
            label: run.label(run_number),
        }))
    }
}

struct StreamSink {
    label: String,
}

impl OutputSink for StreamSink {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        write!(out, "[{}] {}", self.label, text)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Discards all output.
#[derive(Debug, Clone, Default)]
pub struct DiscardSinkFactory;

impl SinkFactory for DiscardSinkFactory {
    fn create(&self, _run: &Run, _run_number: Option<&str>) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(DiscardSink))
    }
}

struct DiscardSink;

impl OutputSink for DiscardSink {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
