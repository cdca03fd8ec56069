use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tracing::{error, info};

use crate::services::analytics::AnalyticsService;
use crate::services::budgets::BudgetService;

/// Five minutes past midnight on the first of each month, after the last
/// transactions of the old month have settled.
const SNAPSHOT_SCHEDULE: &str = "0 5 0 1 * *";

/// Shortly past midnight every day.
const BUDGET_SWEEP_SCHEDULE: &str = "0 10 0 * * *";

pub struct Scheduler {
    analytics: Arc<AnalyticsService>,
    budgets: Arc<BudgetService>,
}

impl Scheduler {
    pub fn new(analytics: Arc<AnalyticsService>, budgets: Arc<BudgetService>) -> Self {
        Self { analytics, budgets }
    }

    /// Spawns the background jobs. Each job is idempotent, so a missed or
    /// doubled run changes nothing.
    pub fn start(self) {
        let analytics = self.analytics;
        let budgets = self.budgets;

        tokio::spawn(run_on_schedule(SNAPSHOT_SCHEDULE, "monthly snapshots", move || {
            let analytics = Arc::clone(&analytics);
            async move {
                match analytics.build_previous_month_snapshots().await {
                    Ok(built) => info!(built, "monthly snapshot job finished"),
                    Err(e) => error!(error = %e, "monthly snapshot job failed"),
                }
            }
        }));

        tokio::spawn(run_on_schedule(BUDGET_SWEEP_SCHEDULE, "budget sweep", move || {
            let budgets = Arc::clone(&budgets);
            async move {
                match budgets.sweep_expired().await {
                    Ok(closed) => info!(closed, "budget sweep finished"),
                    Err(e) => error!(error = %e, "budget sweep failed"),
                }
            }
        }));
    }
}

async fn run_on_schedule<F, Fut>(expression: &'static str, name: &'static str, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let schedule = match Schedule::from_str(expression) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!(job = name, error = %e, "invalid cron expression, job disabled");
            return;
        }
    };

    loop {
        let next = match schedule.upcoming(Utc).next() {
            Some(next) => next,
            None => {
                error!(job = name, "cron schedule has no upcoming runs, job stopped");
                return;
            }
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        info!(job = name, "scheduled job starting");
        job().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_parse() {
        assert!(Schedule::from_str(SNAPSHOT_SCHEDULE).is_ok());
        assert!(Schedule::from_str(BUDGET_SWEEP_SCHEDULE).is_ok());
    }

    #[test]
    fn snapshot_job_fires_on_the_first_of_the_month() {
        use chrono::{Datelike, Timelike};

        let schedule = Schedule::from_str(SNAPSHOT_SCHEDULE).unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.day(), 1);
        assert_eq!(next.hour(), 0);
        assert_eq!(next.minute(), 5);
    }
}
