use crate::features::calculate_variance;
use crate::history::RingBuffer;
use crate::pose::{Cue, ExerciseThresholds};

const MIN_STABILITY_SAMPLES: usize = 5;
const STABILITY_WINDOW: usize = 5;
const PITCH_VARIANCE_LIMIT: f64 = 100.0;
const ROLL_VARIANCE_LIMIT: f64 = 50.0;
const PITCH_VARIANCE_PENALTY: i32 = 20;
const ROLL_VARIANCE_PENALTY: i32 = 15;

const FAST_RATE_DPS: f64 = 200.0;
const SLOW_RATE_DPS: f64 = 50.0;
const TEMPO_REPS: usize = 2;
const FAST_TEMPO_PENALTY: i32 = 10;
const SLOW_TEMPO_PENALTY: i32 = 5;
// 全部历史动作的平均时长（秒）
const QUICK_REP_S: f64 = 1.5;
const SLUGGISH_REP_S: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSample {
    pub pitch: f64,
    pub roll: f64,
    pub timestamp: f64,
}

/// Sliding window of recent orientation samples.
#[derive(Debug, Clone)]
pub struct MovementHistory {
    entries: RingBuffer<MovementSample>,
}

impl MovementHistory {
    pub fn new(capacity: usize) -> Self {
        MovementHistory {
            entries: RingBuffer::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, pitch: f64, roll: f64, timestamp: f64) {
        self.entries.push(MovementSample { pitch, roll, timestamp });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MovementSample> + '_ {
        self.entries.iter()
    }

    /// Largest absolute pitch change between consecutive entries, not counting the
    /// change into the newest entry.
    pub fn max_pitch_step(&self) -> Option<f64> {
        let pitches: Vec<f64> = self.entries.iter().map(|m| m.pitch).collect();
        let settled = &pitches[..pitches.len().saturating_sub(1)];
        settled
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
    }

    fn recent_variances(&self, n: usize) -> (f64, f64) {
        let recent: Vec<&MovementSample> = self.entries.recent(n).collect();
        let pitches: Vec<f64> = recent.iter().map(|m| m.pitch).collect();
        let rolls: Vec<f64> = recent.iter().map(|m| m.roll).collect();
        (calculate_variance(&pitches), calculate_variance(&rolls))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StabilityReport {
    pub score: i32,
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TempoReport {
    pub penalty: i32,
    pub cues: Vec<Cue>,
}

/// 稳定性与节奏分析
#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    history: MovementHistory,
}

impl StabilityAnalyzer {
    pub fn new(history_capacity: usize) -> Self {
        StabilityAnalyzer {
            history: MovementHistory::new(history_capacity),
        }
    }

    pub fn record(&mut self, pitch: f64, roll: f64, timestamp: f64) {
        self.history.push(pitch, roll, timestamp);
    }

    pub fn history(&self) -> &MovementHistory {
        &self.history
    }

    pub fn stability(&self) -> StabilityReport {
        let mut report = StabilityReport {
            score: 100,
            cues: Vec::new(),
        };
        if self.history.len() < MIN_STABILITY_SAMPLES {
            return report;
        }

        let (pitch_variance, roll_variance) = self.history.recent_variances(STABILITY_WINDOW);
        if pitch_variance > PITCH_VARIANCE_LIMIT {
            report.score -= PITCH_VARIANCE_PENALTY;
            report.cues.push(Cue::TooMuchVariation);
        }
        if roll_variance > ROLL_VARIANCE_LIMIT {
            report.score -= ROLL_VARIANCE_PENALTY;
            report.cues.push(Cue::ReduceSwaying);
        }
        report
    }

    /// `angular_rate` is the current rate about the exercise axis in deg/s.
    ///
    /// Exercises with thresholds are scored on the last two reps against their ideal
    /// tempo. Every exercise also gets unscored cues from the angular rate and from the
    /// mean of all stored rep durations, once the history holds two entries.
    pub fn tempo(
        &self,
        angular_rate: f64,
        rep_durations: &[f64],
        thresholds: Option<&ExerciseThresholds>,
    ) -> TempoReport {
        let mut report = TempoReport::default();

        // 最近两次动作的平均时长
        if let Some(th) = thresholds {
            if rep_durations.len() >= TEMPO_REPS {
                let recent = &rep_durations[rep_durations.len() - TEMPO_REPS..];
                let avg = recent.iter().sum::<f64>() / TEMPO_REPS as f64;
                if avg < th.ideal_tempo_s - th.tempo_range_s {
                    report.penalty += FAST_TEMPO_PENALTY;
                    report.cues.push(Cue::SlowDownReps);
                } else if avg > th.ideal_tempo_s + th.tempo_range_s {
                    report.penalty += SLOW_TEMPO_PENALTY;
                    report.cues.push(Cue::KeepSteadyPace);
                }
            }
        }

        if self.history.len() >= 2 {
            let rate = angular_rate.abs();
            if rate > FAST_RATE_DPS {
                report.cues.push(Cue::MovementTooFast);
            } else if rate < SLOW_RATE_DPS {
                report.cues.push(Cue::MovementTooSlow);
            }

            if !rep_durations.is_empty() {
                let avg = rep_durations.iter().sum::<f64>() / rep_durations.len() as f64;
                if avg < QUICK_REP_S {
                    report.cues.push(Cue::RepsTooQuick);
                } else if avg > SLUGGISH_REP_S {
                    report.cues.push(Cue::SpeedUpSlightly);
                }
            }
        }
        report
    }
}
