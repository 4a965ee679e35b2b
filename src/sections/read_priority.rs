use super::rw::{Bias, RwSection};
use crate::executors::SharedExecutor;

/// A reader-writer section that favours readers.
///
/// Readers share the section and a new reader joins a running batch even while a writer
/// is waiting. A writer runs alone once the last reader is out. When a writer finishes,
/// every reader that queued up behind it is let in together, and the next writer only gets
/// a turn if none were waiting.
///
/// A steady stream of overlapping readers can keep writers waiting indefinitely; use
/// [`WritePrioritySection`](crate::WritePrioritySection) when that matters.
#[derive(Debug)]
pub struct ReadPrioritySection {
    core: RwSection,
}

impl ReadPrioritySection {
    pub fn new() -> Self {
        Self {
            core: RwSection::new(Bias::Read),
        }
    }

    /// Runs `operation` alongside other readers, waiting only while a writer holds the
    /// section.
    ///
    /// Runs inline when admitted straight away; otherwise the calling task suspends and
    /// `operation` later runs as a new task on `executor`.
    pub fn read<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        self.core.read(executor, operation)
    }

    /// Runs `operation` with the section to itself.
    pub fn write<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        self.core.write(executor, operation)
    }

    /// Runs `operation` as a writer unless that would mean waiting behind another writer.
    ///
    /// Returns `Ok(false)` without running anything if a writer holds the section or one is
    /// already queued. If only readers hold it, the caller queues as the single pending
    /// writer and gets `Ok(true)` once `operation` has run.
    pub fn try_unique_write<F>(
        &self,
        executor: &SharedExecutor,
        operation: F,
    ) -> anyhow::Result<bool>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.core.try_unique_write(executor, operation)
    }

    /// Readers currently holding the section.
    pub fn readers(&self) -> usize {
        self.core.readers()
    }

    pub fn is_writing(&self) -> bool {
        self.core.is_writing()
    }
}

impl Default for ReadPrioritySection {
    fn default() -> Self {
        Self::new()
    }
}
