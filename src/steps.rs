use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::{calculate_mean, calculate_std, Sample};
use crate::history::RingBuffer;

// 峰值检测：取最近 10 个幅值，检查第 3 个是否为 5 点局部最大
const RECENT_WINDOW: usize = 10;
const PEAK_INDEX: usize = 2;
const PEAK_SPAN: usize = 5;
const STEP_TIMES_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDetectorConfig {
    pub buffer_capacity: usize,
    /// Samples required before any detection is attempted.
    pub min_samples: usize,
    /// Lower bound on the margin above the mean, keeps the threshold sane while still.
    pub threshold_floor: f64,
    pub std_multiplier: f64,
    pub min_step_interval_s: f64,
    pub max_step_interval_s: f64,
    pub cadence_window_s: f64,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        StepDetectorConfig {
            buffer_capacity: 100,
            min_samples: 5,
            threshold_floor: 0.3,
            std_multiplier: 1.5,
            min_step_interval_s: 0.3,
            max_step_interval_s: 2.0,
            cadence_window_s: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub step_detected: bool,
    pub step_count: u32,
}

/// Adaptive peak-based step detector over acceleration magnitude.
pub struct StepDetector {
    config: StepDetectorConfig,
    buffer: RingBuffer<(f64, f64)>,
    step_times: RingBuffer<f64>,
    last_step_time: Option<f64>,
    step_count: u32,
}

impl StepDetector {
    pub fn new(config: StepDetectorConfig) -> Self {
        let capacity = config.buffer_capacity.max(RECENT_WINDOW);
        StepDetector {
            buffer: RingBuffer::with_capacity(capacity),
            step_times: RingBuffer::with_capacity(STEP_TIMES_CAPACITY),
            last_step_time: None,
            step_count: 0,
            config,
        }
    }

    pub fn process_sample(&mut self, sample: &Sample, timestamp: f64) -> StepOutcome {
        self.process_magnitude(timestamp, sample.accel_magnitude())
    }

    pub fn process_magnitude(&mut self, timestamp: f64, accel_magnitude: f64) -> StepOutcome {
        self.buffer.push((timestamp, accel_magnitude));

        if self.buffer.len() < self.config.min_samples.max(PEAK_SPAN) {
            return self.outcome(false);
        }

        let magnitudes: Vec<f64> = self.buffer.iter().map(|(_, m)| *m).collect();
        let threshold = self.adaptive_threshold(&magnitudes);
        let recent = &magnitudes[magnitudes.len().saturating_sub(RECENT_WINDOW)..];

        if !is_local_peak(recent, PEAK_INDEX, threshold) {
            return self.outcome(false);
        }

        let detected = match self.last_step_time {
            // 第一个候选只记录时间，不计数
            None => {
                self.last_step_time = Some(timestamp);
                true
            }
            Some(last) => {
                let elapsed = timestamp - last;
                if elapsed >= self.config.min_step_interval_s
                    && elapsed <= self.config.max_step_interval_s
                {
                    self.last_step_time = Some(timestamp);
                    self.step_count += 1;
                    true
                } else {
                    debug!(elapsed, "step candidate rejected outside refractory window");
                    false
                }
            }
        };

        if detected {
            self.step_times.push(timestamp);
            debug!(step_count = self.step_count, threshold, "step accepted");
        }
        self.outcome(detected)
    }

    fn adaptive_threshold(&self, magnitudes: &[f64]) -> f64 {
        let mean = calculate_mean(magnitudes);
        let std = calculate_std(magnitudes);
        mean + (self.config.std_multiplier * std).max(self.config.threshold_floor)
    }

    /// Steps per minute from accepted steps inside the trailing cadence window.
    pub fn cadence_spm(&self, now: f64) -> f64 {
        let window = self.config.cadence_window_s;
        if window <= 0.0 {
            return 0.0;
        }
        let window_start = now - window;
        let steps = self.step_times.iter().filter(|t| **t >= window_start).count();
        steps as f64 * (60.0 / window)
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn last_step_time(&self) -> Option<f64> {
        self.last_step_time
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset_count(&mut self) {
        self.step_count = 0;
    }

    fn outcome(&self, step_detected: bool) -> StepOutcome {
        StepOutcome {
            step_detected,
            step_count: self.step_count,
        }
    }
}

fn is_local_peak(values: &[f64], mid: usize, threshold: f64) -> bool {
    if mid < 2 || mid + 2 >= values.len() {
        return false;
    }
    let centre = values[mid];
    centre > threshold
        && centre > values[mid - 2]
        && centre > values[mid - 1]
        && centre > values[mid + 1]
        && centre > values[mid + 2]
}
