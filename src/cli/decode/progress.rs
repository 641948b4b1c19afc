use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::timestamp::time_str;

const RUNNING_TEMPLATE: &str = "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}";
const FINISHED_TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise}";

/// Bar measured in output frames across every track of the run.
pub fn create_progress_bar(multi: &MultiProgress, total_frames: u64) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(total_frames));
    pb.set_style(ProgressStyle::with_template(RUNNING_TEMPLATE)?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("opening source");
    Ok(pb)
}

/// Tracks converted audio time against wall time for the progress message.
pub struct Throughput {
    start: Instant,
    sample_rate: u32,
    frames: u64,
}

impl Throughput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            start: Instant::now(),
            sample_rate,
            frames: 0,
        }
    }

    pub fn add(&mut self, frames: u64) {
        self.frames += frames;
    }

    pub fn message(&self) -> String {
        let audio_secs = self.frames as f64 / self.sample_rate as f64;
        let elapsed = self.start.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { audio_secs / elapsed } else { 0.0 };
        format!("speed: {speed:.1}x | timestamp: {}", time_str(audio_secs))
    }
}

pub fn finalize_progress_bar(pb: &ProgressBar, throughput: &Throughput) {
    pb.set_style(
        ProgressStyle::with_template(FINISHED_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.finish_with_message(throughput.message());
}
