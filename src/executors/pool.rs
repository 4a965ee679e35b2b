use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use num_cpus::get;
use parking_lot::{Condvar, Mutex, MutexGuard};
use threadpool::{Builder, ThreadPool};

use super::{
    timer::{Fired, TimerJob, TimerQueue},
    Executor, Job, RepeatingJob, ScheduledHandle,
};
use crate::error::{Error, Result};

/// Settings for a [`ThreadPoolExecutor`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    threads: usize,
    thread_name: String,
    stack_size: Option<usize>,
    timer_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: get(),
            thread_name: "cosections-worker".to_owned(),
            stack_size: None,
            timer_name: "cosections-timer".to_owned(),
        }
    }
}

impl PoolConfig {
    /// Number of worker threads. Defaults to the number of CPUs; zero is treated as one.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Name of the thread that fires delayed and fixed rate jobs.
    pub fn timer_name(mut self, name: impl Into<String>) -> Self {
        self.timer_name = name.into();
        self
    }
}

/// Runs jobs on a fixed pool of worker threads, with one extra thread firing timers.
///
/// # Example
///
/// ```rust
/// use cosections::{Executor, PoolConfig, ThreadPoolExecutor};
/// use std::sync::mpsc::channel;
///
/// let executor = ThreadPoolExecutor::with_config(PoolConfig::default().threads(2)).unwrap();
/// let (sender, receiver) = channel();
/// executor.submit(Box::new(move || sender.send(7).unwrap())).unwrap();
/// assert_eq!(receiver.recv().unwrap(), 7);
/// ```
pub struct ThreadPoolExecutor {
    pool: Mutex<ThreadPool>,
    timers: Arc<Timers>,
    shutdown: AtomicBool,
}

struct Timers {
    state: Mutex<TimerState>,
    cvar: Condvar,
}

struct TimerState {
    queue: TimerQueue<Instant>,
    stopped: bool,
}

impl ThreadPoolExecutor {
    pub fn new() -> Result<Arc<Self>> {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Result<Arc<Self>> {
        let mut builder: Builder = Builder::new()
            .num_threads(config.threads.max(1))
            .thread_name(config.thread_name);
        if let Some(size) = config.stack_size {
            builder = builder.thread_stack_size(size);
        }
        let pool: ThreadPool = builder.build();

        let timers = Arc::new(Timers {
            state: Mutex::new(TimerState {
                queue: TimerQueue::new(),
                stopped: false,
            }),
            cvar: Condvar::new(),
        });
        let timer_pool: ThreadPool = pool.clone();
        let timer_shared = timers.clone();
        thread::Builder::new()
            .name(config.timer_name)
            .spawn(move || run_timers(&timer_shared, &timer_pool))?;

        Ok(Arc::new(Self {
            pool: Mutex::new(pool),
            timers,
            shutdown: AtomicBool::new(false),
        }))
    }
}

impl ThreadPoolExecutor {
    /// Blocks until every queued and running job has finished.
    pub fn join(&self) {
        // cloned so jobs submitting more work don't contend on the lock while we wait
        let pool: ThreadPool = self.pool.lock().clone();
        pool.join();
    }

    pub fn threads(&self) -> usize {
        self.pool.lock().max_count()
    }

    fn check_open(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::ExecutorShutdown);
        }
        Ok(())
    }

    fn arm(&self, delay: Duration, job: TimerJob) -> ScheduledHandle {
        let handle = ScheduledHandle::new();
        let unarmed = self
            .timers
            .state
            .lock()
            .queue
            .push(Instant::now(), delay, handle.clone(), job);
        match unarmed {
            Some(job) => drop(job),
            None => {
                self.timers.cvar.notify_one();
            }
        }
        handle
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, job: Job) -> Result<()> {
        self.check_open()?;
        self.pool.lock().execute(job);
        Ok(())
    }

    fn schedule(&self, job: Job, delay: Duration) -> Result<ScheduledHandle> {
        self.check_open()?;
        Ok(self.arm(delay, TimerJob::Once(job)))
    }

    fn schedule_at_fixed_rate(
        &self,
        job: RepeatingJob,
        delay: Duration,
        interval: Duration,
    ) -> Result<ScheduledHandle> {
        self.check_open()?;
        if interval.is_zero() {
            return Err(Error::ZeroInterval);
        }
        Ok(self.arm(delay, TimerJob::Repeating { job, interval }))
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("thread pool executor shutting down");

        let abandoned = {
            let mut state = self.timers.state.lock();
            state.stopped = true;
            state.queue.take()
        };
        self.timers.cvar.notify_all();
        // scheduled jobs may hold the last handle to this executor
        drop(abandoned);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timers(timers: &Timers, pool: &ThreadPool) {
    let mut state: MutexGuard<'_, TimerState> = timers.state.lock();
    loop {
        if state.stopped {
            return;
        }
        let now = Instant::now();
        match state.queue.next_at() {
            None => timers.cvar.wait(&mut state),
            Some(at) if at > now => {
                _ = timers.cvar.wait_until(&mut state, at);
            }
            Some(_) => {
                let Some(timer) = state.queue.pop_due(now) else {
                    continue;
                };
                let fired = state.queue.fire(timer);
                // run and drop jobs unlocked: they may own the last handle to the executor
                MutexGuard::unlocked(&mut state, || match fired {
                    Fired::Run(job) => pool.execute(job),
                    Fired::Cancelled(timer) => drop(timer),
                });
            }
        }
    }
}
