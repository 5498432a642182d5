//! Reflexes: fast pattern -> response rules consulted before any routing.
//!
//! A reflex that handles a percept produces the full reply itself; the
//! percept is stored but never reaches a thread, so the executive is not
//! woken for it. State-mutating reflexes additionally hand back a fact to
//! commit as an immediate trace.

use regex::Regex;

use crate::percept::Percept;

#[derive(Debug, Clone)]
pub struct ReflexReply {
    pub reply: String,
    /// A fact to commit as an immediate trace, for reflexes that mutate
    /// memory state.
    pub remember: Option<String>,
}

pub trait Reflex: Send + Sync {
    fn name(&self) -> &'static str;
    /// Return a reply to fully handle the percept, or None to decline.
    fn try_handle(&self, percept: &Percept) -> Option<ReflexReply>;
}

/// Liveness check: "ping" -> "pong".
pub struct PingReflex;

impl Reflex for PingReflex {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn try_handle(&self, percept: &Percept) -> Option<ReflexReply> {
        if percept.content().trim().eq_ignore_ascii_case("ping") {
            Some(ReflexReply { reply: "pong".to_string(), remember: None })
        } else {
            None
        }
    }
}

/// Explicit memory commit: "remember: the wifi password is hunter2".
pub struct RememberReflex {
    pattern: Regex,
}

impl RememberReflex {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?i)^(?:remember|note)(?:\s+this)?\s*[:,]\s*(.+)$")
                .expect("remember pattern is valid"),
        }
    }
}

impl Default for RememberReflex {
    fn default() -> Self {
        Self::new()
    }
}

impl Reflex for RememberReflex {
    fn name(&self) -> &'static str {
        "remember"
    }

    fn try_handle(&self, percept: &Percept) -> Option<ReflexReply> {
        let caps = self.pattern.captures(percept.content().trim())?;
        let fact = caps.get(1)?.as_str().trim().to_string();
        if fact.is_empty() {
            return None;
        }
        Some(ReflexReply {
            reply: "Noted.".to_string(),
            remember: Some(fact),
        })
    }
}

pub struct ReflexChain {
    reflexes: Vec<Box<dyn Reflex>>,
}

impl ReflexChain {
    pub fn new(reflexes: Vec<Box<dyn Reflex>>) -> Self {
        Self { reflexes }
    }

    pub fn with_defaults() -> Self {
        Self::new(vec![Box::new(PingReflex), Box::new(RememberReflex::new())])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// First reflex that claims the percept wins.
    pub fn handle(&self, percept: &Percept) -> Option<(&'static str, ReflexReply)> {
        for reflex in &self.reflexes {
            if let Some(reply) = reflex.try_handle(percept) {
                tracing::debug!(reflex = reflex.name(), percept_id = %percept.id, "Reflex handled percept");
                return Some((reflex.name(), reply));
            }
        }
        None
    }
}
