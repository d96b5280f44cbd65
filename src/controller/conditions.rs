//! # Condition Sets
//!
//! A [`ConditionSet`] declares the leaf condition types of a parent kind in
//! dependency order plus the aggregate `Ready` type. [`aggregate`] derives
//! `Ready` from the leaves:
//!
//! - True when every leaf is True
//! - otherwise False, copying reason and message from the first False leaf
//! - otherwise Unknown, copying from the first Unknown leaf
//!
//! Declared order decides which reason surfaces when several leaves are
//! unhealthy at once.

use crate::crd::{Condition, ConditionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionSet {
    pub ready: &'static str,
    pub leaves: &'static [&'static str],
}

/// Compute the aggregate condition of type `ready` from `leaves`, in order
pub fn aggregate<'a>(ready: &str, leaves: impl IntoIterator<Item = &'a Condition>) -> Condition {
    let mut first_unknown: Option<&Condition> = None;
    for leaf in leaves {
        match leaf.status {
            ConditionStatus::False => return copy_reason(ready, ConditionStatus::False, leaf),
            ConditionStatus::Unknown if first_unknown.is_none() => first_unknown = Some(leaf),
            _ => {}
        }
    }
    match first_unknown {
        Some(leaf) => copy_reason(ready, ConditionStatus::Unknown, leaf),
        None => Condition::new(ready, ConditionStatus::True),
    }
}

fn copy_reason(ready: &str, status: ConditionStatus, leaf: &Condition) -> Condition {
    Condition {
        reason: leaf.reason.clone(),
        message: leaf.message.clone(),
        ..Condition::new(ready, status)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl ConditionSet {
    pub const fn new(ready: &'static str, leaves: &'static [&'static str]) -> Self {
        Self { ready, leaves }
    }

    /// Ensure every declared condition exists, ordered leaves first and
    /// `Ready` last. Missing conditions start Unknown. Undeclared conditions
    /// are kept after `Ready`.
    pub fn initialize(&self, conditions: &mut Vec<Condition>) {
        let mut existing = std::mem::take(conditions);
        for r#type in self.leaves.iter().chain(std::iter::once(&self.ready)) {
            let condition = match existing.iter().position(|c| c.r#type == *r#type) {
                Some(i) => existing.remove(i),
                None => Condition {
                    last_transition_time: Some(now()),
                    ..Condition::new(*r#type, ConditionStatus::Unknown)
                },
            };
            conditions.push(condition);
        }
        conditions.extend(existing);
    }

    pub fn manage<'a>(&self, conditions: &'a mut Vec<Condition>) -> ConditionManager<'a> {
        ConditionManager {
            set: *self,
            conditions,
        }
    }

    /// Recompute `Ready` from the current leaves
    pub fn recompute(&self, conditions: &mut Vec<Condition>) {
        let ready = aggregate(
            self.ready,
            self.leaves
                .iter()
                .filter_map(|t| conditions.iter().find(|c| c.r#type == *t)),
        );
        set_condition(conditions, ready);
    }
}

/// Insert or replace a condition, keeping the previous transition time when
/// the status is unchanged
fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.take()
            } else {
                Some(now())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(now());
            conditions.push(condition);
        }
    }
}

/// Mutates the leaves of one status and keeps `Ready` in step
#[derive(Debug)]
pub struct ConditionManager<'a> {
    set: ConditionSet,
    conditions: &'a mut Vec<Condition>,
}

impl ConditionManager<'_> {
    pub fn mark_true(&mut self, r#type: &str) {
        self.apply(Condition::new(r#type, ConditionStatus::True));
    }

    pub fn mark_false(&mut self, r#type: &str, reason: &str, message: impl Into<String>) {
        self.apply(Condition::new(r#type, ConditionStatus::False).with_reason(reason, message));
    }

    pub fn mark_unknown(&mut self, r#type: &str, reason: &str, message: impl Into<String>) {
        self.apply(Condition::new(r#type, ConditionStatus::Unknown).with_reason(reason, message));
    }

    /// Copy status, reason and message from a condition observed elsewhere
    pub fn propagate(&mut self, r#type: &str, source: &Condition) {
        self.apply(Condition {
            reason: source.reason.clone(),
            message: source.message.clone(),
            ..Condition::new(r#type, source.status)
        });
    }

    pub fn get(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    pub fn is_ready(&self) -> bool {
        self.get(self.set.ready).is_some_and(Condition::is_true)
    }

    fn apply(&mut self, condition: Condition) {
        set_condition(self.conditions, condition);
        self.set.recompute(self.conditions);
    }
}
