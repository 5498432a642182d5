//! Daemon assembly: stores, intelligence, sensors wired to capability
//! ports. The binary spawns periodic tasks around this; embedders (and
//! the scenario suite) drive the tick methods directly.

use std::sync::Arc;

use crate::arousal::Arousal;
use crate::config::Config;
use crate::hooks::Hooks;
use crate::intelligence::{
    AttentionScheduler, BudgetTracker, Consolidator, Effector, ReflexChain, Router,
};
use crate::ports::{CalendarPort, ChatPort};
use crate::processing::ModelClient;
use crate::sensors::{CalendarSensor, ChatSensor, HealthMonitor, WakeTimer};
use crate::storage::{path_utils, Inbox, Outbox, PerceptStore, ThreadStore, TraceStore};
use crate::thread::ThreadStatus;
use crate::CortexResult;

/// Effector tag for the chat platform.
pub const CHAT_EFFECTOR: &str = "chat";

pub struct Cortex {
    pub config: Config,
    pub inbox: Arc<Inbox>,
    pub outbox: Arc<Outbox>,
    pub percepts: Arc<PerceptStore>,
    pub threads: Arc<ThreadStore>,
    pub traces: Arc<TraceStore>,
    pub arousal: Arc<Arousal>,
    pub budget: Arc<BudgetTracker>,
    pub model: Arc<dyn ModelClient>,
    pub router: Router,
    pub scheduler: AttentionScheduler,
    pub consolidator: Consolidator,
    pub effector: Effector,
    pub chat_sensor: ChatSensor,
    pub calendar_sensor: CalendarSensor,
    pub wake_timer: WakeTimer,
    pub health: HealthMonitor,
}

impl Cortex {
    pub fn new(
        config: Config,
        model: Arc<dyn ModelClient>,
        chat: Arc<dyn ChatPort>,
        calendar: Arc<dyn CalendarPort>,
        hooks: Arc<dyn Hooks>,
    ) -> CortexResult<Self> {
        path_utils::ensure_state_dir(&config.state_path)?;

        let inbox = Arc::new(Inbox::new(&config.state_path));
        let outbox = Arc::new(Outbox::new(&config.state_path));
        let percepts = Arc::new(PerceptStore::new(&config.state_path));
        let threads = Arc::new(ThreadStore::new(&config.state_path));
        let traces = Arc::new(TraceStore::new(&config.state_path));
        let arousal = Arc::new(Arousal::new());
        let budget = Arc::new(BudgetTracker::new(
            &config.state_path,
            config.daily_budget_min,
        ));

        let router = Router::new(
            inbox.clone(),
            outbox.clone(),
            percepts.clone(),
            threads.clone(),
            traces.clone(),
            model.clone(),
            budget.clone(),
            arousal.clone(),
            ReflexChain::with_defaults(),
            CHAT_EFFECTOR,
        );
        let scheduler = AttentionScheduler::new(
            percepts.clone(),
            threads.clone(),
            traces.clone(),
            arousal.clone(),
            budget.clone(),
            hooks.clone(),
        );
        let consolidator = Consolidator::new(percepts.clone(), traces.clone(), model.clone());
        let effector = Effector::new(
            outbox.clone(),
            chat.clone(),
            hooks,
            arousal.clone(),
            CHAT_EFFECTOR,
        );
        let chat_sensor = ChatSensor::new(chat.clone(), inbox.clone());
        let calendar_sensor = CalendarSensor::new(calendar, inbox.clone());
        let wake_timer = WakeTimer::new(inbox.clone(), config.autonomous_wake);
        let health = HealthMonitor::new(chat, arousal.clone());

        Ok(Self {
            config,
            inbox,
            outbox,
            percepts,
            threads,
            traces,
            arousal,
            budget,
            model,
            router,
            scheduler,
            consolidator,
            effector,
            chat_sensor,
            calendar_sensor,
            wake_timer,
            health,
        })
    }

    /// Rebuild every store from its snapshot; queue offsets land at
    /// end-of-journal so only new writes are tailed.
    pub fn load_state(&self) -> CortexResult<()> {
        self.inbox.load()?;
        self.outbox.load()?;
        self.percepts.load()?;
        self.threads.load()?;
        self.traces.load()?;
        self.budget.load()?;
        tracing::info!(
            threads = self.threads.count(),
            traces = self.traces.len(),
            percepts = self.percepts.len(),
            "State loaded"
        );
        Ok(())
    }

    /// Seed core identity traces from `{state_path}/core_seed.md` if the
    /// file exists. Idempotent across restarts.
    pub fn bootstrap(&self) -> CortexResult<usize> {
        let seed = path_utils::seed_file(&self.config.state_path);
        self.traces.bootstrap_from_seed(&seed, self.model.as_ref())
    }

    pub fn save_state(&self) -> CortexResult<()> {
        self.inbox.save()?;
        self.outbox.save()?;
        self.percepts.save()?;
        self.threads.save()?;
        self.traces.save()?;
        self.budget.save()?;
        Ok(())
    }

    /// Graceful shutdown: stop typing refreshers, run the final
    /// consolidation pass (freshness gate off), snapshot everything.
    pub fn shutdown(&self) -> CortexResult<()> {
        self.effector.stop_all_typing();
        if let Err(e) = self.consolidator.run(true) {
            tracing::error!(error = %e, "Final consolidation failed");
        }
        self.save_state()?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Executive surface: the selected thread's new content has been
    /// processed; notifications stop until more content arrives.
    pub fn complete_thread_processing(&self, thread_id: &str) -> CortexResult<()> {
        self.threads.mark_processed(thread_id)
    }

    /// Executive surface: a thread's goal is finished; it leaves the
    /// selection pool for good.
    pub fn complete_thread(&self, thread_id: &str) -> CortexResult<()> {
        self.threads.set_status(thread_id, ThreadStatus::Complete)
    }
}
