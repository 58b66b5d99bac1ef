use crate::processor::Processor;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Time until the next occurrence of `hour:00` after `now`. A boundary
/// hit rolls over to the following day, so the result is never zero.
pub fn duration_until_hour(now: NaiveDateTime, hour: u32) -> Duration {
    let target_time = NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut target = now.date().and_time(target_time);
    if target <= now {
        target += TimeDelta::days(1);
    }
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Daily failure check: sleep until the configured local wall-clock hour,
/// then exit non-zero if any upload exhausted its retries this process
/// lifetime. The supervisor is expected to restart the agent, whose
/// startup scan re-discovers the failed files.
pub async fn run(processor: Arc<Processor>, hour: u32) {
    loop {
        let wait = duration_until_hour(Local::now().naive_local(), hour);
        debug!(?wait, hour, "next failure check scheduled");
        tokio::time::sleep(wait).await;

        if !processor.has_failures() {
            continue;
        }

        let sample = processor.failed_files();
        error!(
            ?sample,
            "exiting due to failed uploads; the post-restart scan will retry them"
        );
        processor.stop();
        processor.wait_drained().await;
        std::process::exit(1);
    }
}
