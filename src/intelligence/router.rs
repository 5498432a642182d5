//! Router: drains the inbox and turns items into percepts.
//!
//! Signals are consumed by internal handlers, impulses are budget-gated,
//! messages run the reflex chain first. Anything that survives is
//! embedded, spreads activation through trace memory, and is attached to
//! the best-associated thread (or founds a new one).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::association;
use super::budget::BudgetTracker;
use super::reflexes::ReflexChain;
use crate::arousal::Arousal;
use crate::constants::*;
use crate::item::{Action, InboxItem, ItemType};
use crate::percept::Percept;
use crate::processing::synthetic::truncate_on_word;
use crate::processing::ModelClient;
use crate::storage::{Inbox, Outbox, PerceptStore, ThreadStore, TraceStore};
use crate::thread::{Thread, ThreadStatus};
use crate::trace::Trace;
use crate::{id_gen, time_utils, CortexResult};

pub struct Router {
    inbox: Arc<Inbox>,
    outbox: Arc<Outbox>,
    percepts: Arc<PerceptStore>,
    threads: Arc<ThreadStore>,
    traces: Arc<TraceStore>,
    model: Arc<dyn ModelClient>,
    budget: Arc<BudgetTracker>,
    arousal: Arc<Arousal>,
    reflexes: ReflexChain,
    effector_tag: String,
    recent_replies: Mutex<VecDeque<String>>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inbox: Arc<Inbox>,
        outbox: Arc<Outbox>,
        percepts: Arc<PerceptStore>,
        threads: Arc<ThreadStore>,
        traces: Arc<TraceStore>,
        model: Arc<dyn ModelClient>,
        budget: Arc<BudgetTracker>,
        arousal: Arc<Arousal>,
        reflexes: ReflexChain,
        effector_tag: &str,
    ) -> Self {
        Self {
            inbox,
            outbox,
            percepts,
            threads,
            traces,
            model,
            budget,
            arousal,
            reflexes,
            effector_tag: effector_tag.to_string(),
            recent_replies: Mutex::new(VecDeque::new()),
        }
    }

    /// One router pass: tail the journal, then dispatch everything
    /// pending. Each item is marked processed *before* dispatch so a
    /// concurrent tick cannot pick it up again.
    pub fn tick(&self) -> CortexResult<usize> {
        self.inbox.poll()?;
        let pending = self.inbox.pending();
        let mut dispatched = 0;
        for item in pending {
            self.inbox.mark_processed(&item.id);
            if let Err(e) = self.dispatch(&item) {
                tracing::error!(item_id = %item.id, error = %e, "Dispatch failed");
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn dispatch(&self, item: &InboxItem) -> CortexResult<()> {
        match item.kind {
            ItemType::Signal => self.handle_signal(item),
            ItemType::Impulse => self.handle_impulse(item),
            ItemType::Message => self.handle_message(item),
        }
    }

    fn handle_signal(&self, item: &InboxItem) -> CortexResult<()> {
        match item.subtype.as_deref() {
            Some("session_end") => {
                self.budget.end_session();
                self.arousal.set_budget_pressure(self.budget.pressured());
            }
            other => {
                tracing::debug!(subtype = ?other, item_id = %item.id, "Unhandled signal");
            }
        }
        Ok(())
    }

    fn handle_impulse(&self, item: &InboxItem) -> CortexResult<()> {
        let urgent = item.priority == 1
            && (item.subtype_is("due") || item.subtype_is("upcoming"));
        if !urgent && !self.budget.can_do_autonomous_work() {
            tracing::info!(
                item_id = %item.id,
                subtype = ?item.subtype,
                "Autonomous impulse dropped, budget exhausted"
            );
            return Ok(());
        }
        let percept = self.percept_from_impulse(item);
        self.route(percept)
    }

    fn handle_message(&self, item: &InboxItem) -> CortexResult<()> {
        let percept = self.percept_from_message(item);
        let human = percept.source == "inbox";

        if let Some((_, reply)) = self.reflexes.handle(&percept) {
            self.percepts.insert(percept.clone());
            if let Some(channel) = percept.channel_id() {
                self.outbox.append(Action::send_message(
                    &self.effector_tag,
                    channel,
                    &reply.reply,
                ))?;
            }
            self.push_recent_reply(&reply.reply);
            if let Some(fact) = reply.remember {
                self.commit_immediate_trace(&percept, &fact);
            }
            return Ok(());
        }

        if human {
            self.arousal.set_user_waiting(true);
        }
        self.route(percept)
    }

    /// Embed, spread activation, then attach or found a thread.
    fn route(&self, mut percept: Percept) -> CortexResult<()> {
        match self.model.embed(percept.content()) {
            Ok(v) => percept.embedding = v,
            Err(e) => {
                tracing::warn!(percept_id = %percept.id, error = %e, "Embedding failed; routing without semantics");
            }
        }
        self.percepts.insert(percept.clone());

        if percept.has_embedding() {
            self.traces
                .spread_activation(&percept.embedding, SPREAD_BOOST, SPREAD_THRESHOLD);
        }

        let now = time_utils::now();
        let candidates = self.threads.list_non_terminal();
        let thread_id = match association::best_match(&percept, &candidates, &now) {
            Some(best) => {
                tracing::debug!(
                    thread_id = %best.thread_id,
                    score = best.score,
                    similarity = best.similarity,
                    "Percept associated to thread"
                );
                self.threads.attach_percept(&best.thread_id, &percept)?;
                best.thread_id
            }
            None => self.create_thread(&percept)?,
        };
        self.percepts
            .set_feature(&percept.id, CLUSTER_FEATURE, &thread_id);
        Ok(())
    }

    fn create_thread(&self, percept: &Percept) -> CortexResult<String> {
        let goal = match self.model.generate(&format!(
            "In a few words, state the goal of a conversation that begins:\n{}",
            percept.content()
        )) {
            Ok(g) if !g.trim().is_empty() => g.trim().to_string(),
            Ok(_) => truncate_on_word(percept.content(), 80),
            Err(e) => {
                tracing::warn!(error = %e, "Goal generation failed, using content prefix");
                truncate_on_word(percept.content(), 80)
            }
        };
        let topic = match self.model.embed(&goal) {
            Ok(v) => v,
            Err(_) => Vec::new(),
        };

        let now = time_utils::now();
        let mut source_weights = HashMap::new();
        source_weights.insert(percept.source.clone(), FEATURE_INITIAL);
        let mut channel_weights = HashMap::new();
        if let Some(c) = percept.channel_id() {
            channel_weights.insert(c.to_string(), FEATURE_INITIAL);
        }
        let mut author_weights = HashMap::new();
        if let Some(a) = percept.author_key() {
            author_weights.insert(a.to_string(), FEATURE_INITIAL);
        }

        let thread = Thread {
            id: id_gen::thread_id(),
            goal: goal.clone(),
            status: ThreadStatus::Paused,
            activation: 1.0,
            salience: 0.0,
            percept_refs: vec![percept.id.clone()],
            source_weights,
            channel_weights,
            author_weights,
            centroid: percept.embedding.clone(),
            topic,
            created_at: now,
            last_active: now,
            processed_at: None,
        };
        let id = thread.id.clone();
        tracing::info!(thread_id = %id, goal = %goal, "New thread created");
        self.threads.insert(thread);
        Ok(id)
    }

    fn percept_from_message(&self, item: &InboxItem) -> Percept {
        let thought = item.subtype_is("thought");
        let source = if thought { "bud" } else { "inbox" };

        let mut tags = HashSet::new();
        let mut intensity: f64 = if thought { 0.4 } else { 0.5 };
        if item.extra_flag("from_owner") {
            tags.insert("from:owner".to_string());
            intensity += 0.2;
        }
        if item.extra_flag("dm") {
            tags.insert("dm".to_string());
            intensity += 0.2;
        }
        if item.extra_flag("mention") {
            tags.insert("mention".to_string());
            intensity += 0.1;
        }

        let mut attributes = HashMap::new();
        attributes.insert("content".to_string(), item.content.clone());
        if let Some(c) = &item.channel_id {
            attributes.insert("channel_id".to_string(), c.clone());
        }
        if let Some(a) = &item.author_id {
            attributes.insert("author_id".to_string(), a.clone());
        }
        if let Some(a) = &item.author {
            attributes.insert("author".to_string(), a.clone());
        }

        Percept {
            id: id_gen::percept_id(),
            source: source.to_string(),
            kind: if thought { "thought" } else { "message" }.to_string(),
            intensity: intensity.clamp(0.0, 1.0),
            created_at: item.timestamp,
            tags,
            attributes,
            embedding: Vec::new(),
            features: HashMap::new(),
        }
    }

    fn percept_from_impulse(&self, item: &InboxItem) -> Percept {
        let subtype = item.subtype.clone().unwrap_or_else(|| "wake".to_string());
        let mut attributes = HashMap::new();
        attributes.insert("content".to_string(), item.content.clone());

        Percept {
            id: id_gen::percept_id(),
            source: format!("impulse:{}", subtype),
            kind: subtype,
            intensity: if item.priority == 1 { 0.9 } else { 0.5 },
            created_at: item.timestamp,
            tags: HashSet::new(),
            attributes,
            embedding: Vec::new(),
            features: HashMap::new(),
        }
    }

    fn commit_immediate_trace(&self, percept: &Percept, fact: &str) {
        let embedding = match self.model.embed(fact) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Immediate trace not embedded");
                Vec::new()
            }
        };
        let now = time_utils::now();
        let trace = Trace {
            id: id_gen::trace_id(),
            summary: fact.to_string(),
            embedding,
            activation: 0.5,
            strength: 1,
            sources: vec![percept.id.clone()],
            is_core: false,
            labile_until: None,
            inhibits: Vec::new(),
            created_at: now,
            last_access: now,
        };
        tracing::info!(trace_id = %trace.id, "Immediate trace committed by reflex");
        self.traces.insert(trace);
    }

    fn push_recent_reply(&self, reply: &str) {
        let mut ring = self.recent_replies.lock().expect("reply ring poisoned");
        ring.push_back(reply.to_string());
        while ring.len() > MAX_RECENT_REPLIES {
            ring.pop_front();
        }
    }

    /// Recent reflex replies, oldest first.
    pub fn recent_replies(&self) -> Vec<String> {
        self.recent_replies
            .lock()
            .expect("reply ring poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::SyntheticModelClient;
    use chrono::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        inbox: Arc<Inbox>,
        outbox: Arc<Outbox>,
        percepts: Arc<PerceptStore>,
        threads: Arc<ThreadStore>,
        traces: Arc<TraceStore>,
        budget: Arc<BudgetTracker>,
        router: Router,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Arc::new(Inbox::new(dir.path()));
        let outbox = Arc::new(Outbox::new(dir.path()));
        let percepts = Arc::new(PerceptStore::new(dir.path()));
        let threads = Arc::new(ThreadStore::new(dir.path()));
        let traces = Arc::new(TraceStore::new(dir.path()));
        let budget = Arc::new(BudgetTracker::new(dir.path(), 30));
        let router = Router::new(
            inbox.clone(),
            outbox.clone(),
            percepts.clone(),
            threads.clone(),
            traces.clone(),
            Arc::new(SyntheticModelClient::new()),
            budget.clone(),
            Arc::new(Arousal::new()),
            ReflexChain::with_defaults(),
            "chat",
        );
        Fixture { _dir: dir, inbox, outbox, percepts, threads, traces, budget, router }
    }

    fn message(id: &str, content: &str) -> InboxItem {
        let mut item = InboxItem::new_message(id, content);
        item.channel_id = Some("c1".to_string());
        item.author_id = Some("u1".to_string());
        item.author = Some("Dana".to_string());
        item
    }

    #[test]
    fn test_message_creates_thread_and_percept() {
        let f = fixture();
        f.inbox.add(message("m-1", "let's plan the offsite agenda"));
        assert_eq!(f.router.tick().unwrap(), 1);

        assert_eq!(f.threads.count(), 1);
        assert_eq!(f.percepts.len(), 1);
        let thread = f.threads.list().pop().unwrap();
        assert_eq!(thread.status, ThreadStatus::Paused);
        assert!((thread.activation - 1.0).abs() < 1e-9);
        assert_eq!(thread.percept_refs.len(), 1);
        assert!(!thread.goal.is_empty());
        // The percept's clustering feature points at the resolved thread.
        let percept = f.percepts.get(&thread.percept_refs[0]).unwrap();
        assert_eq!(percept.conversation_id(), Some(thread.id.as_str()));
        // Dispatch consumed the item.
        assert_eq!(f.inbox.pending_count(), 0);
    }

    #[test]
    fn test_similar_followup_attaches_to_same_thread() {
        let f = fixture();
        f.inbox.add(message("m-1", "planning the offsite agenda for friday"));
        f.router.tick().unwrap();
        f.inbox.add(message("m-2", "the offsite agenda needs a budget slot"));
        f.router.tick().unwrap();

        assert_eq!(f.threads.count(), 1, "follow-up should not found a new thread");
        let thread = f.threads.list().pop().unwrap();
        assert_eq!(thread.percept_refs.len(), 2);
    }

    #[test]
    fn test_unrelated_message_to_stale_thread_founds_new_one() {
        let f = fixture();
        // A thread that went quiet: heavy age decay, drained activation,
        // features from another channel/author.
        f.threads.insert(
            crate::test_helpers::ThreadBuilder::new()
                .id("stale")
                .idle_hours(2)
                .activation(0.05)
                .channel_weight("c9", 0.5)
                .author_weight("u9", 0.5)
                .build(),
        );
        let mut other = message("m-2", "my cat knocked over the ficus again");
        other.channel_id = Some("c2".to_string());
        other.author_id = Some("u2".to_string());
        f.inbox.add(other);
        f.router.tick().unwrap();
        assert_eq!(f.threads.count(), 2);
        assert_eq!(f.threads.get("stale").unwrap().percept_refs.len(), 0);
    }

    #[test]
    fn test_reflex_handles_without_routing() {
        let f = fixture();
        f.inbox.add(message("m-1", "ping"));
        f.router.tick().unwrap();

        assert_eq!(f.threads.count(), 0);
        assert_eq!(f.percepts.len(), 1);
        let actions = f.outbox.pending_for("chat");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].payload_str("content"), Some("pong"));
        assert_eq!(f.router.recent_replies(), vec!["pong"]);
    }

    #[test]
    fn test_remember_reflex_commits_trace() {
        let f = fixture();
        f.inbox.add(message("m-1", "remember: the router password is in the safe"));
        f.router.tick().unwrap();

        assert_eq!(f.threads.count(), 0);
        assert_eq!(f.traces.len(), 1);
        let trace = f.traces.list().pop().unwrap();
        assert_eq!(trace.summary, "the router password is in the safe");
        assert_eq!(trace.strength, 1);
        assert!(!trace.is_core);
        assert_eq!(trace.sources.len(), 1);
    }

    #[test]
    fn test_signal_never_becomes_percept() {
        let f = fixture();
        f.inbox.add(InboxItem::new_signal("s-1", "session_end"));
        f.router.tick().unwrap();
        assert_eq!(f.percepts.len(), 0);
        assert_eq!(f.threads.count(), 0);
    }

    #[test]
    fn test_budget_gate_drops_routine_impulse() {
        let f = fixture();
        f.budget.consume(Duration::minutes(30));

        f.inbox.add(InboxItem::new_impulse("w-1", "wake", "autonomous wake", 2));
        f.router.tick().unwrap();
        assert_eq!(f.percepts.len(), 0, "routine wake must be dropped");

        f.inbox.add(InboxItem::new_impulse("d-1", "due", "standup in 2 min", 1));
        f.router.tick().unwrap();
        assert_eq!(f.percepts.len(), 1, "urgent due impulse bypasses the gate");
        assert_eq!(f.threads.count(), 1);
    }

    #[test]
    fn test_impulse_source_carries_subtype() {
        let f = fixture();
        f.inbox.add(InboxItem::new_impulse("w-1", "wake", "look around", 2));
        f.router.tick().unwrap();
        let percept = f
            .percepts
            .lookup_refs(&f.threads.list().pop().unwrap().percept_refs)
            .pop()
            .unwrap();
        assert_eq!(percept.source, "impulse:wake");
    }

    #[test]
    fn test_thought_message_uses_bud_source() {
        let f = fixture();
        let mut item = message("t-1", "I should tidy the backlog");
        item.subtype = Some("thought".to_string());
        f.inbox.add(item);
        f.router.tick().unwrap();
        let thread = f.threads.list().pop().unwrap();
        let percept = f.percepts.lookup_refs(&thread.percept_refs).pop().unwrap();
        assert_eq!(percept.source, "bud");
        assert!(thread.source_weights.contains_key("bud"));
    }

    #[test]
    fn test_owner_dm_tags_and_intensity() {
        let f = fixture();
        let mut item = message("m-1", "are you there?");
        item.extra.insert("from_owner".to_string(), serde_json::Value::Bool(true));
        item.extra.insert("dm".to_string(), serde_json::Value::Bool(true));
        f.inbox.add(item);
        f.router.tick().unwrap();
        let thread = f.threads.list().pop().unwrap();
        let percept = f.percepts.lookup_refs(&thread.percept_refs).pop().unwrap();
        assert!(percept.tags.contains("from:owner"));
        assert!(percept.tags.contains("dm"));
        assert!((percept.intensity - 0.9).abs() < 1e-9);
    }
}
