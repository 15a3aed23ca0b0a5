use std::io::Write;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, info, warn};

use crate::nudge::clock::Clock;
use crate::nudge::model::{NudgeConfig, Snapshot};
use crate::nudge::scheduler::NudgeScheduler;
use crate::nudge::store::SnapshotStore;
use crate::sink::ActionSink;

pub const COMMAND_LIST: &str = "Commands: start | stop | test | set interval H M | exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Test,
    SetInterval { hours: u32, minutes: u32 },
    Exit,
}

/// Parse one line of console input. Unknown input answers `None` so the
/// caller can reprint the command list.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "start" => Some(Command::Start),
        "stop" => Some(Command::Stop),
        "test" => Some(Command::Test),
        "exit" | "quit" => Some(Command::Exit),
        "set" if words.next() == Some("interval") => {
            let hours = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
            let minutes = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
            Some(Command::SetInterval { hours, minutes })
        }
        _ => None,
    }
}

/// Owns the scheduler, its settings, and the persistence and action seams.
/// All mutation goes through one task, so no locking around the countdown.
pub struct NudgeRuntime {
    scheduler: NudgeScheduler,
    config: NudgeConfig,
    store: Box<dyn SnapshotStore>,
    sink: Arc<dyn ActionSink>,
}

impl NudgeRuntime {
    pub fn new(config: NudgeConfig, store: Box<dyn SnapshotStore>, sink: Arc<dyn ActionSink>) -> Self {
        Self {
            scheduler: NudgeScheduler::new(),
            config,
            store,
            sink,
        }
    }

    pub fn config(&self) -> &NudgeConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &NudgeScheduler {
        &self.scheduler
    }

    /// Load the persisted snapshot, if any, and resume its countdown when the
    /// deadline is still ahead of `now`. An expired deadline is dropped: a
    /// restart never replays nudges missed while the process was down.
    pub fn restore(&mut self, now: DateTime<Utc>) {
        let Some(snapshot) = self.store.load() else {
            return;
        };
        self.config = snapshot.config();
        self.scheduler = NudgeScheduler::with_history(snapshot.history.clone());

        if !snapshot.running {
            return;
        }
        let Some(target) = snapshot
            .target_time
            .and_then(DateTime::from_timestamp_millis)
        else {
            warn!("running snapshot has no deadline; starting stopped");
            return;
        };
        if self.scheduler.resume(target, snapshot.total_seconds, now) {
            info!(
                remaining = self.scheduler.remaining_seconds(now),
                "resumed countdown from previous run"
            );
        } else {
            println!("Previous deadline already passed; scheduler is stopped.");
        }
    }

    pub async fn handle_command(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Start if self.scheduler.is_running() => {
                println!("Already running.");
            }
            Command::Start => match self.scheduler.start(self.config.interval_seconds(), now) {
                Ok(()) => {
                    info!(
                        hours = self.config.interval_hours,
                        minutes = self.config.interval_minutes,
                        "scheduler started"
                    );
                    println!(
                        "Started: next nudge in {}h {}m.",
                        self.config.interval_hours, self.config.interval_minutes
                    );
                    self.persist();
                }
                Err(err) => println!("Cannot start: {err}"),
            },
            Command::Stop => {
                self.scheduler.stop();
                info!("scheduler stopped");
                println!("Stopped.");
                self.persist();
            }
            Command::Test => {
                // One-off probe: no history entry, no countdown change.
                self.perform_nudge().await;
            }
            Command::SetInterval { hours, minutes } => {
                if hours == 0 && minutes == 0 {
                    println!("Interval must be greater than zero.");
                    return;
                }
                self.config.interval_hours = hours;
                self.config.interval_minutes = minutes;
                println!("Interval set to {hours}h {minutes}m; applies on next start.");
                self.persist();
            }
            Command::Exit => {
                // Countdown stays armed in the snapshot so a restart resumes it.
                self.persist();
            }
        }
    }

    /// Resync against `now` and, if the deadline was crossed, fire. The
    /// scheduler re-arms before the sink runs, so a slow or failing action
    /// never delays or duplicates the next cycle.
    pub async fn on_deadline(&mut self, now: DateTime<Utc>) {
        let message = self.config.message.clone();
        let Some(fired) = self.scheduler.tick(now, &message) else {
            return;
        };
        self.persist();
        self.perform_nudge().await;
        info!(next = %fired.next_target, "re-armed for next cycle");
    }

    pub async fn perform_nudge(&self) -> bool {
        match self.sink.perform(&self.config.message).await {
            Ok(outcome) => {
                if outcome.reply.is_empty() {
                    info!(message = %self.config.message, "nudge sent");
                } else {
                    info!(message = %self.config.message, reply = %outcome.reply, "nudge sent");
                }
                true
            }
            Err(err) => {
                error!("nudge failed: {err}");
                false
            }
        }
    }

    /// Probe the sink once at startup and arm the countdown if it answers.
    pub async fn auto_start(&mut self, now: DateTime<Utc>) {
        if !self.perform_nudge().await {
            println!("Startup nudge failed; scheduler not started.");
            return;
        }
        self.handle_command(Command::Start, now).await;
    }

    fn persist(&mut self) {
        let snapshot = Snapshot {
            running: self.scheduler.is_running(),
            target_time: self.scheduler.target().map(|t| t.timestamp_millis()),
            total_seconds: self.scheduler.total_seconds(),
            interval_hours: self.config.interval_hours,
            interval_minutes: self.config.interval_minutes,
            nudge_message: self.config.message.clone(),
            notifications_enabled: self.config.notifications_enabled,
            sound_enabled: self.config.sound_enabled,
            history: self.scheduler.history().clone(),
        };
        if let Err(err) = self.store.save(&snapshot) {
            warn!("snapshot not saved: {err:#}");
        }
    }
}

/// Drive the runtime: wait for console commands while stopped, and race them
/// against the countdown while running. The display refresh and the deadline
/// are separate timers; both resync from the wall clock when they wake, so a
/// suspended process fires once and re-arms instead of replaying a backlog.
pub async fn run(
    mut runtime: NudgeRuntime,
    mut commands: mpsc::Receiver<Command>,
    clock: Arc<dyn Clock>,
) {
    loop {
        if !runtime.scheduler.is_running() {
            match commands.recv().await {
                Some(Command::Exit) | None => {
                    runtime.handle_command(Command::Exit, clock.now()).await;
                    return;
                }
                Some(command) => runtime.handle_command(command, clock.now()).await,
            }
            continue;
        }

        let now = clock.now();
        let remaining = runtime.scheduler.remaining_seconds(now);
        print_countdown(remaining);
        let deadline = Instant::now() + StdDuration::from_secs(remaining);

        tokio::select! {
            received = commands.recv() => match received {
                Some(Command::Exit) | None => {
                    runtime.handle_command(Command::Exit, clock.now()).await;
                    return;
                }
                Some(command) => runtime.handle_command(command, clock.now()).await,
            },
            _ = sleep_until(deadline) => {
                runtime.on_deadline(clock.now()).await;
            }
            _ = sleep(StdDuration::from_secs(1)) => {
                // Display refresh; also catches a deadline crossed while the
                // process was suspended past both timers.
                runtime.on_deadline(clock.now()).await;
            }
        }
    }
}

fn print_countdown(remaining: u64) {
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;
    print!("\r{hours:02}:{minutes:02}:{seconds:02}   ");
    let _ = std::io::stdout().flush();
}
