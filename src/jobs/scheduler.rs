//! Recurring task registration (spec §4.12, §9 "Decorator-based scheduling
//! ... re-architected as explicit registration"). Grounded on the teacher
//! pack's `RuleScheduler` (cron-expression due-check + cooldown), simplified
//! to a named-handler registry with no cooldown concept.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::jobs::queue;
use crate::state::AppState;

pub struct JobDefinition {
    pub name: &'static str,
    pub cron_expression: &'static str,
    pub queue: &'static str,
    pub timeout_secs: u64,
}

pub struct Scheduler {
    definitions: Vec<JobDefinition>,
    last_triggered: HashMap<&'static str, DateTime<Utc>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { definitions: Vec::new(), last_triggered: HashMap::new() }
    }

    /// `register_job(name, handler, default_queue, default_timeout)` per
    /// spec §9: identity is the name, not a closure. Handlers are dispatched
    /// by `jobs::handlers::dispatch` using `job_type`, so registration here
    /// only carries the scheduling metadata.
    pub fn register(&mut self, definition: JobDefinition) {
        self.definitions.push(definition);
    }

    /// Enqueues every due job through the queue so cancellation and status
    /// stay uniform with ad-hoc jobs (spec §4.12).
    pub async fn tick(&mut self, state: &AppState, now: DateTime<Utc>) -> crate::error::Result<Vec<String>> {
        let Some(pool) = state.kv().await else {
            tracing::warn!("scheduler tick skipped: KV substrate unavailable");
            return Ok(Vec::new());
        };

        let mut enqueued = Vec::new();
        for definition in &self.definitions {
            let schedule = match Schedule::from_str(definition.cron_expression) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(job = definition.name, %e, "invalid cron expression, skipping");
                    continue;
                }
            };

            let last = self.last_triggered.get(definition.name).copied();
            if !is_due(&schedule, now, last) {
                continue;
            }

            let job_id = queue::enqueue(
                &pool,
                state.breakers(),
                definition.name,
                serde_json::json!({}),
                definition.queue,
                definition.timeout_secs,
            )
            .await?;

            self.last_triggered.insert(definition.name, now);
            enqueued.push(job_id);
        }

        Ok(enqueued)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_due(schedule: &Schedule, now: DateTime<Utc>, last_run: Option<DateTime<Utc>>) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));
    schedule.after(&check_from).next().is_some_and(|next| next <= now)
}

/// Builds the default set of recurring tasks (spec §4.12 "Built-in jobs").
pub fn default_schedule() -> Scheduler {
    let mut scheduler = Scheduler::new();
    scheduler.register(JobDefinition {
        name: "catalogue_sync",
        cron_expression: "0 0 * * * *",
        queue: "sync",
        timeout_secs: 120,
    });
    scheduler.register(JobDefinition {
        name: "cleanup",
        cron_expression: "0 0 3 * * *",
        queue: "cleanup",
        timeout_secs: 300,
    });
    scheduler.register(JobDefinition {
        name: "aggregation",
        cron_expression: "0 30 * * * *",
        queue: "analytics",
        timeout_secs: 180,
    });
    scheduler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_due_without_a_prior_tick_within_the_lookback_window() {
        let schedule = Schedule::from_str("0 0 0 1 1 *").unwrap();
        let now = Utc::now();
        assert!(!is_due(&schedule, now, Some(now)));
    }
}
