//! Per-category publication policy.
//!
//! The filter sits between the normalizer and the sink.  It is a pure change
//! gate over the per-tick "changed" report; it never delays or rate-limits
//! anything on its own.

use std::collections::BTreeMap;

use crate::snapshot::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPolicy {
    /// Decode and store the category, but never forward it downstream.
    /// Used for categories that update at high frequency with low consumer
    /// value.
    Suppress,
    /// Forward the category whenever its decoded value changed this tick.
    PublishOnChange,
}

/// Static policy table, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct UpdateFilter {
    policies: BTreeMap<Category, PublishPolicy>,
}

impl UpdateFilter {
    /// Builds a table where every category publishes on change except the
    /// given suppressed ones.
    pub fn new(suppressed: &[Category]) -> Self {
        let policies = Category::ALL
            .into_iter()
            .map(|category| {
                let policy = if suppressed.contains(&category) {
                    PublishPolicy::Suppress
                } else {
                    PublishPolicy::PublishOnChange
                };
                (category, policy)
            })
            .collect();
        Self { policies }
    }

    pub fn policy(&self, category: Category) -> PublishPolicy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or(PublishPolicy::PublishOnChange)
    }

    /// Narrows the normalizer's per-tick change report down to the
    /// categories that may be forwarded to the sink.
    pub fn publishable(&self, changed: &[Category]) -> Vec<Category> {
        changed
            .iter()
            .copied()
            .filter(|&category| self.policy(category) == PublishPolicy::PublishOnChange)
            .collect()
    }
}

impl Default for UpdateFilter {
    fn default() -> Self {
        Self::new(&[])
    }
}
