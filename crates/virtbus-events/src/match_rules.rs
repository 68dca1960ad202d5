//! Reference-counted bus match rules
//!
//! Every subscription needs the bus daemon to route its signal to this
//! connection. Subscriptions for the same `interface.member` share one
//! installed rule: the first acquire installs it, the last release removes
//! it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use virtbus_core::domain::{BusError, MatchRule};
use virtbus_core::ports::BusSession;

use crate::metrics::DispatchMetrics;

/// Per-connection match rule reference counts
pub struct MatchRuleManager {
    session: Arc<dyn BusSession>,
    // Held across the bus call so that add and remove of one rule never
    // interleave.
    counts: Mutex<HashMap<MatchRule, usize>>,
    metrics: Arc<DispatchMetrics>,
    /// Connection token; once cancelled no rule is installed again
    closed: CancellationToken,
}

impl MatchRuleManager {
    pub fn new(
        session: Arc<dyn BusSession>,
        metrics: Arc<DispatchMetrics>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            session,
            counts: Mutex::new(HashMap::new()),
            metrics,
            closed,
        }
    }

    /// Takes one reference on `rule`, installing it on first use
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] once the connection token is cancelled, or the
    /// bus rejection when the rule had to be installed. The count is left
    /// as it was.
    pub async fn acquire(&self, rule: &MatchRule) -> Result<(), BusError> {
        let mut counts = self.counts.lock().await;
        // Checked under the lock: `release_all` runs after cancellation and
        // takes the same lock, so nothing is installed behind its back
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        match counts.get_mut(rule) {
            Some(count) => {
                *count += 1;
                debug!(rule = %rule, refs = *count, "Match rule reference added");
            }
            None => {
                self.session.add_match(rule).await?;
                counts.insert(rule.clone(), 1);
                debug!(rule = %rule, "Match rule installed");
            }
        }
        self.metrics.active_match_rules.set(counts.len() as i64);
        Ok(())
    }

    /// Drops one reference on `rule`, removing it from the bus on last use
    ///
    /// Unknown rules are ignored. A failing removal is logged; the rule is
    /// forgotten locally either way.
    pub async fn release(&self, rule: &MatchRule) {
        let mut counts = self.counts.lock().await;
        let Some(count) = counts.get_mut(rule) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            debug!(rule = %rule, refs = *count, "Match rule reference dropped");
            return;
        }
        counts.remove(rule);
        self.metrics.active_match_rules.set(counts.len() as i64);
        match self.session.remove_match(rule).await {
            Ok(()) => debug!(rule = %rule, "Match rule removed"),
            Err(e) => warn!(rule = %rule, error = %e, "Failed to remove match rule"),
        }
    }

    /// Removes every installed rule regardless of references
    ///
    /// Returns how many rules were installed.
    pub async fn release_all(&self) -> usize {
        let mut counts = self.counts.lock().await;
        let rules: Vec<MatchRule> = counts.drain().map(|(rule, _)| rule).collect();
        self.metrics.active_match_rules.set(0);
        for rule in &rules {
            if let Err(e) = self.session.remove_match(rule).await {
                warn!(rule = %rule, error = %e, "Failed to remove match rule");
            }
        }
        rules.len()
    }

    /// Current rules and their reference counts, sorted by rule
    pub async fn active_rules(&self) -> Vec<(MatchRule, usize)> {
        let counts = self.counts.lock().await;
        let mut rules: Vec<(MatchRule, usize)> =
            counts.iter().map(|(rule, n)| (rule.clone(), *n)).collect();
        rules.sort();
        rules
    }

    /// References currently held on `rule`
    pub async fn refs(&self, rule: &MatchRule) -> usize {
        self.counts.lock().await.get(rule).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for MatchRuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRuleManager").finish_non_exhaustive()
    }
}
