use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use croner::Cron;
use regex::Regex;
use tracing::{error, info, warn};

use crate::config::JobConfig;
use crate::manager::TaskManager;
use crate::types::{Turn, SOURCE_SCHEDULER};

/// A config-declared job with its schedule resolved to a cron expression.
struct Job {
    name: String,
    cron_expr: String,
    prompt: String,
    next_run: DateTime<Local>,
}

/// Timer surface: ticks over the configured jobs and submits the due ones
/// as scheduler turns. Jobs are in-memory only; the config is the source
/// of truth and a restart reseeds them.
pub struct Scheduler {
    jobs: Vec<Job>,
    manager: Arc<TaskManager>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn from_config(configs: &[JobConfig], manager: Arc<TaskManager>) -> Self {
        let mut jobs = Vec::new();
        for config in configs {
            let cron_expr = match parse_schedule(&config.schedule) {
                Ok(expr) => expr,
                Err(e) => {
                    error!(
                        name = %config.name,
                        schedule = %config.schedule,
                        "Failed to parse schedule: {}",
                        e
                    );
                    continue;
                }
            };
            let next_run = match compute_next_run(&cron_expr) {
                Ok(dt) => dt,
                Err(e) => {
                    error!(name = %config.name, "Failed to compute next run: {}", e);
                    continue;
                }
            };
            info!(
                name = %config.name,
                cron = %cron_expr,
                next_run = %next_run,
                "Scheduled job"
            );
            jobs.push(Job {
                name: config.name.clone(),
                cron_expr,
                prompt: config.prompt.clone(),
                next_run,
            });
        }
        Self {
            jobs,
            manager,
            tick_interval: Duration::from_secs(30),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Tick loop. Runs until the process exits.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let now = Local::now();
            for job in self.jobs.iter_mut() {
                if job.next_run > now {
                    continue;
                }
                info!(name = %job.name, "Job due, submitting");
                let turn = Turn::new(SOURCE_SCHEDULER, None, &job.prompt);
                if let Err(e) = self.manager.submit(turn).await {
                    warn!(name = %job.name, "Job submission failed: {}", e);
                }
                match compute_next_run(&job.cron_expr) {
                    Ok(dt) => job.next_run = dt,
                    Err(e) => {
                        // Push it an hour out rather than hot-looping.
                        warn!(name = %job.name, "Failed to compute next run: {}", e);
                        job.next_run = now + chrono::Duration::hours(1);
                    }
                }
            }
        }
    }
}

/// Parse a human-friendly schedule string into a 5-field cron expression.
/// Supports natural shortcuts and raw cron pass-through.
pub fn parse_schedule(input: &str) -> anyhow::Result<String> {
    let input = input.trim();

    match input.to_lowercase().as_str() {
        "hourly" => return Ok("0 * * * *".to_string()),
        "daily" => return Ok("0 0 * * *".to_string()),
        "weekly" => return Ok("0 0 * * 0".to_string()),
        "monthly" => return Ok("0 0 1 * *".to_string()),
        _ => {}
    }

    // "every 5m" / "every 15 minutes"
    let re_minutes = Regex::new(r"(?i)^every\s+(\d+)\s*(?:m|min|mins|minutes?)$")?;
    if let Some(caps) = re_minutes.captures(input) {
        let n: u32 = caps[1].parse()?;
        if n == 0 || n > 59 {
            anyhow::bail!("Minutes interval must be between 1 and 59");
        }
        return Ok(format!("*/{} * * * *", n));
    }

    // "every 2h" / "every 4 hours"
    let re_hours = Regex::new(r"(?i)^every\s+(\d+)\s*(?:h|hrs?|hours?)$")?;
    if let Some(caps) = re_hours.captures(input) {
        let n: u32 = caps[1].parse()?;
        if n == 0 || n > 23 {
            anyhow::bail!("Hours interval must be between 1 and 23");
        }
        return Ok(format!("0 */{} * * *", n));
    }

    // "daily at 9am" / "daily at 14:30" / "daily at 2:30pm"
    let re_daily = Regex::new(r"(?i)^daily\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")?;
    if let Some(caps) = re_daily.captures(input) {
        let (hour, minute) = parse_time_captures(&caps)?;
        return Ok(format!("{} {} * * *", minute, hour));
    }

    // "weekdays at 8:30"
    let re_weekdays = Regex::new(r"(?i)^weekdays?\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")?;
    if let Some(caps) = re_weekdays.captures(input) {
        let (hour, minute) = parse_time_captures(&caps)?;
        return Ok(format!("{} {} * * 1-5", minute, hour));
    }

    // "weekends at 10am"
    let re_weekends = Regex::new(r"(?i)^weekends?\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")?;
    if let Some(caps) = re_weekends.captures(input) {
        let (hour, minute) = parse_time_captures(&caps)?;
        return Ok(format!("{} {} * * 0,6", minute, hour));
    }

    // Raw cron pass-through, validated with croner.
    if input.split_whitespace().count() == 5 {
        Cron::new(input)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", input, e))?;
        return Ok(input.to_string());
    }

    anyhow::bail!(
        "Unrecognized schedule '{}'. Use a shortcut ('hourly', 'every 5m', \
         'daily at 9am', 'weekdays at 8:30') or a 5-field cron expression.",
        input
    )
}

/// Hour/minute from a time regex capture, handling am/pm.
fn parse_time_captures(caps: &regex::Captures) -> anyhow::Result<(u32, u32)> {
    let mut hour: u32 = caps[1].parse()?;
    let minute: u32 = caps.get(2).map(|m| m.as_str().parse()).transpose()?.unwrap_or(0);

    match caps.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(ref meridiem) if meridiem == "pm" && hour != 12 => hour += 12,
        Some(ref meridiem) if meridiem == "am" && hour == 12 => hour = 0,
        _ => {}
    }

    if hour > 23 {
        anyhow::bail!("Hour must be between 0 and 23");
    }
    if minute > 59 {
        anyhow::bail!("Minute must be between 0 and 59");
    }
    Ok((hour, minute))
}

/// Next occurrence of a cron expression in the system timezone.
pub fn compute_next_run(cron_expr: &str) -> anyhow::Result<DateTime<Local>> {
    let cron: Cron = Cron::new(cron_expr)
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse cron '{}': {}", cron_expr, e))?;

    cron.find_next_occurrence(&Local::now(), false)
        .map_err(|e| anyhow::anyhow!("No next occurrence for '{}': {}", cron_expr, e))
}
