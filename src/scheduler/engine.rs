use crate::scheduler::Scheduler;
use crate::sign::SignWorkflow;
use crate::storage::Trigger;
use chrono::Local;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often the loop checks whether the daily run is owed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Main scheduler execution loop.
/// Runs the check-in with trigger `scheduled` whenever the schedule is due.
pub async fn run_scheduler_loop(scheduler: Scheduler, workflow: SignWorkflow) {
    info!("Scheduler engine started");

    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        interval.tick().await;

        let now = Local::now();
        match scheduler.is_due_at(now).await {
            Ok(true) => {
                // Mark as run BEFORE execution to prevent double-scheduling
                if let Err(e) = scheduler.mark_run(now).await {
                    error!("Failed to update last_run: {}", e);
                    continue;
                }

                let workflow = workflow.clone();
                tokio::spawn(async move {
                    let result = workflow.run(Trigger::Scheduled).await;
                    if result.success {
                        info!(message = %result.message, "Scheduled check-in complete");
                    } else {
                        warn!(message = %result.message, kind = ?result.kind, "Scheduled check-in failed");
                    }
                });
            }
            Ok(false) => {}
            Err(e) => {
                error!("Failed to check schedule: {}", e);
            }
        }
    }
}
