//! Built-in cron trigger for the daily run.
//!
//! Polls the configured cron expression every few seconds and, when a
//! scheduled occurrence passes, POSTs to the service's own trigger
//! endpoint. The call is fire-and-forget with a short timeout and no
//! retry; a missed trigger is logged and the next occurrence stands.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local};
use cron::Schedule;
use pilot_common::config::ScheduleConfig;
use pilot_common::{Error, Result};
use tracing::{error, info};

/// Seconds between schedule checks.
const TICK_SECS: u64 = 10;

pub struct DailyScheduler {
    schedule: Schedule,
    cron_expression: String,
    trigger_url: String,
    client: reqwest::Client,
}

impl DailyScheduler {
    pub fn new(config: &ScheduleConfig, trigger_url: String) -> Result<Self> {
        let schedule = Schedule::from_str(&config.daily_trigger).map_err(|e| {
            Error::Config(format!(
                "invalid cron expression '{}': {e}",
                config.daily_trigger
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.trigger_timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            schedule,
            cron_expression: config.daily_trigger.clone(),
            trigger_url,
            client,
        })
    }

    /// Poll forever, firing the trigger when an occurrence passes.
    pub async fn run(self) {
        info!(
            cron = %self.cron_expression,
            trigger_url = %self.trigger_url,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(TICK_SECS));
        let mut last_check = Local::now();
        loop {
            interval.tick().await;
            let now = Local::now();
            if occurrence_between(&self.schedule, last_check, now) {
                self.fire().await;
            }
            last_check = now;
        }
    }

    /// POST the trigger endpoint once; failures are logged only.
    async fn fire(&self) {
        info!(trigger_url = %self.trigger_url, "Scheduled daily trigger firing");
        match self.client.post(&self.trigger_url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(status = %response.status(), "Daily trigger accepted");
            }
            Ok(response) => {
                error!(status = %response.status(), "Daily trigger rejected");
            }
            Err(e) => {
                error!(error = %e, "Daily trigger call failed");
            }
        }
    }
}

/// Whether the schedule has an occurrence in `(last_check, now]`.
fn occurrence_between(
    schedule: &Schedule,
    last_check: DateTime<Local>,
    now: DateTime<Local>,
) -> bool {
    schedule
        .after(&last_check)
        .next()
        .is_some_and(|occurrence| occurrence <= now)
}
