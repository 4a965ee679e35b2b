use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::anyhow;
use futures_lite::future::block_on;
use parking_lot::Mutex;

use super::*;
use crate::{
    executors::{ManualExecutor, PoolConfig, ThreadPoolExecutor},
    task::TaskState,
};

fn manual() -> (Arc<ManualExecutor>, SharedExecutor) {
    let executor = ManualExecutor::new();
    let shared: SharedExecutor = executor.clone();
    (executor, shared)
}

fn pool() -> SharedExecutor {
    ThreadPoolExecutor::with_config(PoolConfig::default().threads(2)).unwrap()
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn submitted_job_runs_inside_a_task() {
    let (_, executor) = manual();
    let seen = Arc::new(Mutex::new(None));
    let out = seen.clone();
    submit(&executor, move || {
        *out.lock() = Task::current().map(|task| task.state());
        Ok(())
    })
    .unwrap();
    assert_eq!(*seen.lock(), Some(TaskState::Running));
}

#[test]
fn failing_job_shuts_the_executor_down() {
    let (manual, executor) = manual();
    submit(&executor, || Err(anyhow!("boom"))).unwrap();
    assert!(manual.is_shutdown());
    assert!(matches!(
        submit(&executor, || Ok(())),
        Err(Error::ExecutorShutdown)
    ));
}

#[test]
fn panicking_job_shuts_the_executor_down() {
    let (manual, executor) = manual();
    submit(&executor, || panic!("job exploded")).unwrap();
    assert!(manual.is_shutdown());
}

#[test]
fn delayed_job_waits_and_can_be_cancelled() {
    let (manual, executor) = manual();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    delay(&executor, ms(10), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    let counter = ran.clone();
    let cancelled = delay(&executor, ms(10), move || {
        counter.fetch_add(10, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    assert!(cancelled.cancel());

    manual.advance(ms(9));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    manual.advance(ms(1));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn delay_beyond_the_clock_is_accepted_and_never_runs() {
    let executor = pool();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let handle = delay(&executor, Duration::MAX, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let (done, finished) = std::sync::mpsc::channel();
    delay(&executor, ms(5), move || {
        done.send(()).unwrap();
        Ok(())
    })
    .unwrap();
    finished.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(handle.cancel());
    assert!(!executor.is_shutdown());
}

#[test]
fn repeat_rejects_zero_interval() {
    let (_, executor) = manual();
    assert!(matches!(
        repeat_at_fixed_rate(&executor, Duration::ZERO, || Ok(())),
        Err(Error::ZeroInterval)
    ));
}

#[test]
fn repeat_first_runs_after_one_interval() {
    let (manual, executor) = manual();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    repeat_at_fixed_rate(&executor, ms(10), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    manual.advance(ms(9));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    manual.advance(ms(21));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn repeat_skips_ticks_while_previous_run_is_suspended() {
    let (manual, executor) = manual();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let sleeper = executor.clone();
    let handle = repeat_at_fixed_rate(&executor, ms(10), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        sleep(&sleeper, ms(25))
    })
    .unwrap();

    // first run at 10 sleeps until 35, so the ticks at 20 and 30 are dropped
    manual.advance(ms(10));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    manual.advance(ms(25));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    manual.advance(ms(5));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    manual.advance(ms(30));
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    assert!(handle.cancel());
    assert!(!manual.is_shutdown());
}

#[test]
fn sleep_resumes_after_the_duration() {
    let (manual, executor) = manual();
    let woke = Arc::new(AtomicUsize::new(0));
    let counter = woke.clone();
    let sleeper = executor.clone();
    submit(&executor, move || {
        sleep(&sleeper, ms(50))?;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    manual.advance(ms(49));
    assert_eq!(woke.load(Ordering::SeqCst), 0);
    manual.advance(ms(1));
    assert_eq!(woke.load(Ordering::SeqCst), 1);
}

#[test]
fn offloaded_work_returns_its_value() {
    let executor = pool();
    let worker = executor.clone();
    let value = run_blockingly(move || {
        let name = offload_blocking(&worker, || {
            Ok(thread::current().name().map(str::to_owned))
        })?;
        Ok(name)
    })
    .unwrap();
    assert_eq!(value.as_deref(), Some("cosections-worker"));
}

#[test]
fn offloaded_failure_reaches_the_task() {
    let executor = pool();
    let worker = executor.clone();
    let error = run_blockingly(move || {
        offload_blocking_unit(&worker, || Err(anyhow!("disk on fire")))
    })
    .unwrap_err();
    assert_eq!(error.to_string(), "disk on fire");
    assert!(!executor.is_shutdown());
}

#[test]
fn offloaded_panic_reaches_the_task() {
    let (_, executor) = manual();
    let seen = Arc::new(Mutex::new(None));
    let out = seen.clone();
    let worker = executor.clone();
    let task = Task::new(move || {
        let result = offload_blocking(&worker, || -> anyhow::Result<()> { panic!("worker died") });
        *out.lock() = result.err().map(|error| error.to_string());
        Ok(())
    });

    task.start().unwrap();
    assert!(task.is_finished());
    assert_eq!(seen.lock().as_deref(), Some("panicked: worker died"));
}

#[test]
fn offload_to_shut_down_executor_fails_the_task() {
    let (manual, executor) = manual();
    manual.shutdown();
    let seen = Arc::new(Mutex::new(false));
    let out = seen.clone();
    let worker = executor.clone();
    let task = Task::new(move || {
        let error = offload_blocking(&worker, || Ok(1)).unwrap_err();
        *out.lock() = matches!(error.downcast_ref::<Error>(), Some(Error::ExecutorShutdown));
        Ok(())
    });

    task.start().unwrap();
    assert!(task.is_finished());
    assert!(*seen.lock());
}

#[test]
fn offload_outside_a_task_fails() {
    let (_, executor) = manual();
    let error = offload_blocking(&executor, || Ok(1)).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::NotInTask)));
}

#[test]
fn external_completion_resumes_the_task() {
    let (completer, completion) = completion::<u32>();
    let value = thread::scope(|scope| {
        scope.spawn(move || {
            thread::sleep(ms(20));
            completer.succeed(9);
        });
        run_blockingly(move || await_external(completion))
    })
    .unwrap();
    assert_eq!(value, 9);
}

#[test]
fn already_completed_source_resumes_immediately() {
    let (completer, completion) = completion();
    completer.succeed("ready");
    assert!(completion.is_complete());

    let seen = Arc::new(Mutex::new(None));
    let out = seen.clone();
    let task = Task::new(move || {
        *out.lock() = Some(await_external(completion)?);
        Ok(())
    });
    task.start().unwrap();
    assert!(task.is_finished());
    assert_eq!(*seen.lock(), Some("ready"));
}

#[test]
fn external_failure_is_raised_in_the_task() {
    let (completer, completion) = completion::<()>();
    let task = Task::new(move || await_external(completion));
    task.start().unwrap();
    assert_eq!(task.state(), TaskState::Suspended);

    completer.fail(anyhow!("remote refused"));
    assert!(task.is_finished());
}

#[test]
fn dropped_completer_abandons_the_completion() {
    let (completer, completion) = completion::<u8>();
    drop(completer);
    let error = block_on(completion).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Abandoned)));
}

#[test]
fn run_blockingly_returns_body_errors_and_panics() {
    let error = run_blockingly(|| -> anyhow::Result<()> { Err(anyhow!("nope")) }).unwrap_err();
    assert_eq!(error.to_string(), "nope");

    let error = run_blockingly(|| -> anyhow::Result<()> { panic!("gone") }).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Panicked(_))));
}

#[test]
fn fatal_logs_and_shuts_down() {
    let (manual, _) = manual();
    fatal(manual.as_ref(), anyhow!("unrecoverable"));
    assert!(manual.is_shutdown());
}
