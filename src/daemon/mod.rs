//! Foreground daemon: periodic tasks around a shared [`Cortex`].
//!
//! Every task is a thread running a tick loop gated on one stop flag;
//! SIGINT/SIGTERM set the flag, each loop observes it at its next tick
//! boundary, and shutdown runs a final consolidation before the stores
//! snapshot.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cortexd::config::Config;
use cortexd::constants::*;
use cortexd::hooks::LogHooks;
use cortexd::ports::{NullCalendarPort, NullChatPort};
use cortexd::Cortex;

/// Fence one tick off from the rest of the daemon: a panic inside it is
/// reported and swallowed, and the loop goes on to its next tick.
fn run_task(name: &str, task: impl FnOnce()) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(task));
    if let Err(payload) = outcome {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(task = name, detail = %detail, "Tick panicked, skipping to next tick");
    }
}

/// Spawn a tick loop. `run_immediately` controls whether the first tick
/// happens before the first sleep; slow housekeeping tasks wait first.
fn spawn_loop(
    name: &'static str,
    stop: Arc<AtomicBool>,
    period: Duration,
    run_immediately: bool,
    task: impl Fn() + Send + 'static,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Task started");
            let mut first = true;
            while !stop.load(Ordering::Relaxed) {
                if !first || run_immediately {
                    run_task(name, &task);
                }
                first = false;
                // Sleep in slices so the stop flag is observed promptly.
                let mut remaining = period;
                while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
                    let slice = remaining.min(Duration::from_millis(100));
                    std::thread::sleep(slice);
                    remaining -= slice;
                }
            }
            tracing::debug!(task = name, "Task stopped");
        })
        .expect("Failed to spawn task thread")
}

pub fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    cortexd::storage::path_utils::ensure_state_dir(&config.state_path)?;
    cortexd::tracing_init::init_file_tracing(&config.state_path);

    tracing::info!(
        state_path = %config.state_path.display(),
        budget_min = config.daily_budget_min,
        autonomous_wake = config.autonomous_wake,
        synthetic = config.synthetic,
        "Starting cortexd"
    );

    let model = crate::build_model(&config);
    // Chat/calendar SDK bindings are external collaborators; without
    // them the journals remain the daemon's only I/O surface.
    let chat = Arc::new(NullChatPort);
    let calendar = Arc::new(NullCalendarPort);
    let wake_interval = Duration::from_secs(config.wake_interval_min.max(1) * 60);

    let cortex = Arc::new(Cortex::new(
        config,
        model,
        chat,
        calendar,
        Arc::new(LogHooks),
    )?);
    cortex.load_state()?;
    let seeded = cortex.bootstrap()?;
    if seeded > 0 {
        tracing::info!(seeded = seeded, "Core seed applied");
    }

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, stop.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, stop.clone())?;

    let mut handles = Vec::new();
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "router",
            stop.clone(),
            Duration::from_millis(ROUTER_TICK_MS),
            true,
            move || {
                if let Err(e) = c.router.tick() {
                    tracing::error!(error = %e, "Router tick failed");
                }
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "scheduler",
            stop.clone(),
            Duration::from_millis(SCHEDULER_TICK_MS),
            true,
            move || c.scheduler.tick(),
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "effector",
            stop.clone(),
            Duration::from_millis(EFFECTOR_TICK_MS),
            true,
            move || {
                c.effector.tick();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "chat-sensor",
            stop.clone(),
            Duration::from_millis(200),
            true,
            move || {
                c.chat_sensor.tick();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "consolidator",
            stop.clone(),
            Duration::from_secs(CONSOLIDATOR_INTERVAL_SECS),
            false,
            move || {
                if let Err(e) = c.consolidator.run(false) {
                    tracing::error!(error = %e, "Consolidation failed");
                }
                c.consolidator.maintenance();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "task-check",
            stop.clone(),
            Duration::from_secs(TASK_CHECK_SECS),
            true,
            move || {
                c.calendar_sensor.tick();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "wake-timer",
            stop.clone(),
            wake_interval,
            false,
            move || {
                c.wake_timer.tick();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "health",
            stop.clone(),
            Duration::from_secs(HEALTH_CHECK_SECS),
            false,
            move || {
                c.health.tick();
            },
        ));
    }
    {
        let c = cortex.clone();
        handles.push(spawn_loop(
            "snapshot",
            stop.clone(),
            Duration::from_secs(SNAPSHOT_INTERVAL_SECS),
            false,
            move || {
                if let Err(e) = c.save_state() {
                    tracing::error!(error = %e, "Periodic snapshot failed");
                }
            },
        ));
    }

    // Park until a signal flips the stop flag.
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }
    tracing::info!("Stop requested, draining tasks");
    for handle in handles {
        let _ = handle.join();
    }
    cortex.shutdown()?;
    Ok(())
}
