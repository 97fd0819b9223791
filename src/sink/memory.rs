// src/sink/memory.rs

use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::Result;
use crate::runs::Run;

use super::{OutputSink, SinkFactory};

/// What one in-memory sink saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRecord {
    pub label: String,
    pub opened: bool,
    pub closed: bool,
    pub lines: Vec<String>,
}

/// Captures every sink's output in memory, in creation order.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    records: Arc<Mutex<Vec<MemoryRecord>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far.
    pub fn records(&self) -> Vec<MemoryRecord> {
        lock(&self.records).clone()
    }

    pub fn record(&self, label: &str) -> Option<MemoryRecord> {
        lock(&self.records)
            .iter()
            .find(|r| r.label == label)
            .cloned()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, run: &Run, run_number: Option<&str>) -> Result<Box<dyn OutputSink>> {
        let mut records = lock(&self.records);
        records.push(MemoryRecord {
            label: run.label(run_number),
            ..MemoryRecord::default()
        });
        Ok(Box::new(MemorySink {
            records: Arc::clone(&self.records),
            index: records.len() - 1,
        }))
    }
}

fn lock(records: &Mutex<Vec<MemoryRecord>>) -> MutexGuard<'_, Vec<MemoryRecord>> {
    records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct MemorySink {
    records: Arc<Mutex<Vec<MemoryRecord>>>,
    index: usize,
}

impl MemorySink {
    fn update(&self, f: impl FnOnce(&mut MemoryRecord)) {
        let mut records = lock(&self.records);
        f(&mut records[self.index]);
    }
}

impl OutputSink for MemorySink {
    fn open(&mut self) -> Result<()> {
        self.update(|r| r.opened = true);
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let line = text.trim_end_matches('\n').to_string();
        self.update(|r| r.lines.push(line));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.update(|r| r.closed = true);
        Ok(())
    }
}
