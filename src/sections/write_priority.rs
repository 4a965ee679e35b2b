use super::rw::{Bias, RwSection};
use crate::executors::SharedExecutor;

/// A reader-writer section that keeps writers from starving.
///
/// Same contract as [`ReadPrioritySection`](crate::ReadPrioritySection) except for
/// [`read`](Self::read): once a writer is waiting or writing, new readers queue instead of
/// joining the running batch, and the last reader out hands the section to the oldest
/// writer. A finishing writer still lets every reader queued during its turn in as one
/// batch before the next writer runs.
#[derive(Debug)]
pub struct WritePrioritySection {
    core: RwSection,
}

impl WritePrioritySection {
    pub fn new() -> Self {
        Self {
            core: RwSection::new(Bias::Write),
        }
    }

    /// Runs `operation` alongside other readers, queueing behind any writer that is waiting
    /// or writing.
    pub fn read<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        self.core.read(executor, operation)
    }

    pub fn write<R, F>(&self, executor: &SharedExecutor, operation: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        self.core.write(executor, operation)
    }

    /// See [`ReadPrioritySection::try_unique_write`](crate::ReadPrioritySection::try_unique_write).
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

    pub fn readers(&self) -> usize {
        self.core.readers()
    }

    pub fn is_writing(&self) -> bool {
        self.core.is_writing()
    }
}

impl Default for WritePrioritySection {
    fn default() -> Self {
        Self::new()
    }
}
