use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of handled frames, reset on every read.
#[derive(Default)]
pub struct Meter {
    processed_frames: AtomicU64,
    failed_frames: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            processed_frames: AtomicU64::new(0),
            failed_frames: AtomicU64::new(0),
        }
    }

    pub fn tick_processed(&self) {
        self.processed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_processed(&self) -> u64 {
        self.processed_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_failed(&self) -> u64 {
        self.failed_frames.swap(0, Ordering::Relaxed)
    }
}

/// Log the rate of processed frames every `period`.
///
/// Failed frames are not part of the rate. They are reported as a warning with their count
/// over the last period, and only when there were any.
pub fn spawn_meter_logger(period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(period);
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let processed_frames = METER.get_reset_processed();
            let failed_frames = METER.get_reset_failed();
            let elapsed = start.elapsed().as_secs_f32();
            let fps_processed = processed_frames as f32 / elapsed;

            if processed_frames > 0 {
                log::info!("Processed frames per second: {fps_processed:.2}")
            }
            if failed_frames > 0 {
                log::warn!("Failed frames in the last {elapsed:.1}s: {failed_frames}")
            }
        }
    })
}
