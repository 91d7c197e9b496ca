use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::features::Sample;
use crate::history::RingBuffer;
use crate::stability::MovementHistory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exercise {
    BicepCurl,
    LateralRaise,
    ShoulderPress,
    Running,
    Unsupported(String),
}

impl Exercise {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bicep_curl" => Exercise::BicepCurl,
            "lateral_raise" => Exercise::LateralRaise,
            "shoulder_press" => Exercise::ShoulderPress,
            "running" => Exercise::Running,
            _ => Exercise::Unsupported(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Exercise::BicepCurl => "bicep_curl",
            Exercise::LateralRaise => "lateral_raise",
            Exercise::ShoulderPress => "shoulder_press",
            Exercise::Running => "running",
            Exercise::Unsupported(name) => name,
        }
    }

    /// Only the rep-counted exercises carry a thresholds entry.
    pub fn thresholds(&self) -> Option<&'static ExerciseThresholds> {
        match self {
            Exercise::BicepCurl => Some(&BICEP_CURL),
            Exercise::LateralRaise => Some(&LATERAL_RAISE),
            Exercise::ShoulderPress => Some(&SHOULDER_PRESS),
            Exercise::Running | Exercise::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Angle bands in degrees, tempo in seconds per rep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExerciseThresholds {
    /// Pitch above which the rep enters the up phase.
    pub min_angle: f64,
    pub max_angle: f64,
    pub target_angle: f64,
    /// Pitch below which the rep completes.
    pub release_angle: f64,
    pub max_roll: f64,
    pub ideal_tempo_s: f64,
    pub tempo_range_s: f64,
}

pub const BICEP_CURL: ExerciseThresholds = ExerciseThresholds {
    min_angle: 60.0,
    max_angle: 120.0,
    target_angle: 90.0,
    release_angle: 20.0,
    max_roll: 10.0,
    ideal_tempo_s: 2.0,
    tempo_range_s: 0.5,
};

pub const LATERAL_RAISE: ExerciseThresholds = ExerciseThresholds {
    min_angle: 20.0,
    max_angle: 100.0,
    target_angle: 20.0,
    release_angle: 20.0,
    max_roll: 12.0,
    ideal_tempo_s: 2.0,
    tempo_range_s: 0.6,
};

pub const SHOULDER_PRESS: ExerciseThresholds = ExerciseThresholds {
    min_angle: 30.0,
    max_angle: 120.0,
    target_angle: 30.0,
    release_angle: 30.0,
    max_roll: 12.0,
    ideal_tempo_s: 2.2,
    tempo_range_s: 0.6,
};

/// 反馈标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    PerfectCurlHeight,
    CurlHigher,
    Overextension,
    ControlTheCurl,
    ReduceBodySwing,
    ExtendFully,
    GoodExtension,
    GoodRaise,
    GoodPress,
    KeepRightArmSteady,
    KeepLeftArmSteady,
    KeepWristSteady,
    KeepElbowsSteady,
    SmoothMovement,
    SlowDownReps,
    KeepSteadyPace,
    RepsTooQuick,
    SpeedUpSlightly,
    MovementTooFast,
    MovementTooSlow,
    TooMuchVariation,
    ReduceSwaying,
    RunningMode,
    SelectSupportedExercise,
}

impl Cue {
    pub fn tag(&self) -> &'static str {
        match self {
            Cue::PerfectCurlHeight => "perfect_curl_height",
            Cue::CurlHigher => "curl_higher",
            Cue::Overextension => "overextension",
            Cue::ControlTheCurl => "control_the_curl",
            Cue::ReduceBodySwing => "reduce_body_swing",
            Cue::ExtendFully => "extend_fully",
            Cue::GoodExtension => "good_extension",
            Cue::GoodRaise => "good_raise",
            Cue::GoodPress => "good_press",
            Cue::KeepRightArmSteady => "keep_right_arm_steady",
            Cue::KeepLeftArmSteady => "keep_left_arm_steady",
            Cue::KeepWristSteady => "keep_wrist_steady",
            Cue::KeepElbowsSteady => "keep_elbows_steady",
            Cue::SmoothMovement => "smooth_movement",
            Cue::SlowDownReps => "slow_down_reps",
            Cue::KeepSteadyPace => "keep_steady_pace",
            Cue::RepsTooQuick => "reps_too_quick",
            Cue::SpeedUpSlightly => "speed_up_slightly",
            Cue::MovementTooFast => "movement_too_fast",
            Cue::MovementTooSlow => "movement_too_slow",
            Cue::TooMuchVariation => "too_much_variation",
            Cue::ReduceSwaying => "reduce_swaying",
            Cue::RunningMode => "running_mode",
            Cue::SelectSupportedExercise => "select_supported_exercise",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Cue::PerfectCurlHeight => "Perfect curl height!",
            Cue::CurlHigher => "Curl a bit higher",
            Cue::Overextension => "Overextension - maintain control",
            Cue::ControlTheCurl => "Slower, control the curl",
            Cue::ReduceBodySwing => "Reduce body swing",
            Cue::ExtendFully => "Extend arms fully",
            Cue::GoodExtension => "Good extension!",
            Cue::GoodRaise => "Good raise",
            Cue::GoodPress => "Good press",
            Cue::KeepRightArmSteady => "Keep right arm steady",
            Cue::KeepLeftArmSteady => "Keep left arm steady",
            Cue::KeepWristSteady => "Keep wrist steady",
            Cue::KeepElbowsSteady => "Keep elbows steady",
            Cue::SmoothMovement => "Smooth out the movement",
            Cue::SlowDownReps => "Slow down for better form",
            Cue::KeepSteadyPace => "Maintain steady pace",
            Cue::RepsTooQuick => "Slow down your reps",
            Cue::SpeedUpSlightly => "Speed up slightly",
            Cue::MovementTooFast => "Movement too fast - maintain control",
            Cue::MovementTooSlow => "Movement too slow - maintain momentum",
            Cue::TooMuchVariation => "Stabilize your movement - too much variation",
            Cue::ReduceSwaying => "Keep your form steady - reduce swaying",
            Cue::RunningMode => "Running mode: use steps and heart rate metrics",
            Cue::SelectSupportedExercise => "Select a wrist-compatible exercise to begin",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepPhase {
    Up,
    Down,
}

/// 动作峰值所处的高度区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum HeightBand {
    Short,
    OnTarget,
    Over,
}

impl HeightBand {
    fn of(pitch: f64, th: &ExerciseThresholds) -> Self {
        if pitch > th.max_angle {
            HeightBand::Over
        } else if pitch >= th.target_angle {
            HeightBand::OnTarget
        } else {
            HeightBand::Short
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PhaseTransition {
    None,
    Raised(HeightBand),
    PeakRaised(HeightBand),
    Lowered,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeOfMotion {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
pub struct RepState {
    pub phase: RepPhase,
    pub last_rep_time: Option<f64>,
    rep_durations: RingBuffer<f64>,
    range_of_motion: Option<RangeOfMotion>,
    peak_band: Option<HeightBand>,
}

impl RepState {
    fn new(duration_history: usize) -> Self {
        RepState {
            phase: RepPhase::Down,
            last_rep_time: None,
            rep_durations: RingBuffer::with_capacity(duration_history),
            range_of_motion: None,
            peak_band: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseAnalysis {
    pub form_score: i32,
    pub cues: Vec<Cue>,
    pub rep_detected: bool,
}

/// Rep-detection state machines for the supported exercises.
pub struct PoseAnalyzer {
    state: RepState,
    duration_history: usize,
}

impl PoseAnalyzer {
    pub fn new(duration_history: usize) -> Self {
        PoseAnalyzer {
            state: RepState::new(duration_history),
            duration_history,
        }
    }

    pub fn analyze_pose(
        &mut self,
        exercise: &Exercise,
        sample: &Sample,
        timestamp: f64,
        history: &MovementHistory,
    ) -> PoseAnalysis {
        match exercise {
            Exercise::BicepCurl => self.analyze_bicep_curl(sample, timestamp, history),
            Exercise::LateralRaise => self.analyze_lateral_raise(sample, timestamp),
            Exercise::ShoulderPress => self.analyze_shoulder_press(sample, timestamp),
            Exercise::Running => PoseAnalysis {
                form_score: 100,
                cues: vec![Cue::RunningMode],
                rep_detected: false,
            },
            Exercise::Unsupported(_) => Self::unsupported(),
        }
    }

    /// 不识别的动作：零分，不改变状态
    pub fn unsupported() -> PoseAnalysis {
        PoseAnalysis {
            form_score: 0,
            cues: vec![Cue::SelectSupportedExercise],
            rep_detected: false,
        }
    }

    fn analyze_bicep_curl(&mut self, sample: &Sample, timestamp: f64, history: &MovementHistory) -> PoseAnalysis {
        let th = &BICEP_CURL;
        let mut score = 100;
        let mut cues = Vec::new();

        let transition = self.detect_phase(sample.pitch, th, timestamp);
        match transition {
            PhaseTransition::Raised(band) | PhaseTransition::PeakRaised(band) => {
                let (cue, penalty) = match band {
                    HeightBand::Over => (Cue::Overextension, 15),
                    HeightBand::OnTarget => (Cue::PerfectCurlHeight, 0),
                    HeightBand::Short => (Cue::CurlHigher, 15),
                };
                cues.push(cue);
                score -= penalty;

                if matches!(transition, PhaseTransition::Raised(_)) {
                    // 上举速度与借力
                    if sample.gy.abs() > 200.0 {
                        cues.push(Cue::ControlTheCurl);
                        score -= 15;
                    }
                    if sample.ax.abs() > 0.5 {
                        cues.push(Cue::ReduceBodySwing);
                        score -= 20;
                    }
                }
            }
            PhaseTransition::Lowered => {
                if sample.pitch > 5.0 {
                    cues.push(Cue::ExtendFully);
                    score -= 10;
                } else {
                    cues.push(Cue::GoodExtension);
                }
            }
            PhaseTransition::None => {}
        }

        if sample.roll.abs() > th.max_roll {
            score -= 20;
            cues.push(if sample.roll > 0.0 {
                Cue::KeepRightArmSteady
            } else {
                Cue::KeepLeftArmSteady
            });
        }

        if history.len() >= 3 && history.max_pitch_step().unwrap_or(0.0) > 20.0 {
            cues.push(Cue::SmoothMovement);
            score -= 10;
        }

        self.finish(score, cues, transition)
    }

    fn analyze_lateral_raise(&mut self, sample: &Sample, timestamp: f64) -> PoseAnalysis {
        let th = &LATERAL_RAISE;
        let mut score = 100;
        let mut cues = Vec::new();

        let transition = self.detect_phase(sample.pitch, th, timestamp);
        match transition {
            PhaseTransition::Raised(HeightBand::Over) | PhaseTransition::PeakRaised(HeightBand::Over) => {
                cues.push(Cue::Overextension);
                score -= 10;
            }
            PhaseTransition::Raised(_) => cues.push(Cue::GoodRaise),
            _ => {}
        }

        if sample.roll.abs() > th.max_roll {
            cues.push(Cue::KeepWristSteady);
            score -= 10;
        }

        self.finish(score, cues, transition)
    }

    fn analyze_shoulder_press(&mut self, sample: &Sample, timestamp: f64) -> PoseAnalysis {
        let th = &SHOULDER_PRESS;
        let mut score = 100;
        let mut cues = Vec::new();

        let transition = self.detect_phase(sample.pitch, th, timestamp);
        match transition {
            PhaseTransition::Raised(HeightBand::Over) | PhaseTransition::PeakRaised(HeightBand::Over) => {
                cues.push(Cue::Overextension);
                score -= 10;
            }
            PhaseTransition::Raised(_) => cues.push(Cue::GoodPress),
            _ => {}
        }

        if sample.roll.abs() > th.max_roll {
            cues.push(Cue::KeepElbowsSteady);
            score -= 12;
        }

        self.finish(score, cues, transition)
    }

    fn finish(&self, score: i32, cues: Vec<Cue>, transition: PhaseTransition) -> PoseAnalysis {
        PoseAnalysis {
            form_score: score,
            cues,
            rep_detected: transition == PhaseTransition::Lowered,
        }
    }

    fn detect_phase(&mut self, pitch: f64, th: &ExerciseThresholds, timestamp: f64) -> PhaseTransition {
        self.track_range_of_motion(pitch);

        match self.state.phase {
            RepPhase::Down => {
                if pitch > th.min_angle {
                    let band = HeightBand::of(pitch, th);
                    self.state.phase = RepPhase::Up;
                    self.state.peak_band = Some(band);
                    PhaseTransition::Raised(band)
                } else {
                    PhaseTransition::None
                }
            }
            RepPhase::Up => {
                if pitch < th.release_angle {
                    self.state.phase = RepPhase::Down;
                    self.complete_rep(timestamp);
                    PhaseTransition::Lowered
                } else {
                    let band = HeightBand::of(pitch, th);
                    if self.state.peak_band.map_or(true, |peak| band > peak) {
                        self.state.peak_band = Some(band);
                        PhaseTransition::PeakRaised(band)
                    } else {
                        PhaseTransition::None
                    }
                }
            }
        }
    }

    fn track_range_of_motion(&mut self, pitch: f64) {
        let rom = self.state.range_of_motion.get_or_insert(RangeOfMotion { min: pitch, max: pitch });
        rom.min = rom.min.min(pitch);
        rom.max = rom.max.max(pitch);
    }

    fn complete_rep(&mut self, timestamp: f64) {
        if let Some(last) = self.state.last_rep_time {
            let duration = (timestamp - last).max(0.0);
            self.state.rep_durations.push(duration);
            debug!(duration, "rep completed");
        }
        self.state.last_rep_time = Some(timestamp);
        self.state.range_of_motion = None;
        self.state.peak_band = None;
    }

    pub fn phase(&self) -> RepPhase {
        self.state.phase
    }

    pub fn rep_durations(&self) -> Vec<f64> {
        self.state.rep_durations.iter().copied().collect()
    }

    pub fn range_of_motion(&self) -> Option<RangeOfMotion> {
        self.state.range_of_motion
    }

    pub fn last_rep_time(&self) -> Option<f64> {
        self.state.last_rep_time
    }

    pub fn reset(&mut self) {
        self.state = RepState::new(self.duration_history);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stability::MovementHistory;

    struct Rig {
        analyzer: PoseAnalyzer,
        history: MovementHistory,
        t: f64,
    }

    impl Rig {
        fn new() -> Self {
            Rig {
                analyzer: PoseAnalyzer::new(5),
                history: MovementHistory::new(20),
                t: 0.0,
            }
        }

        fn feed(&mut self, exercise: &Exercise, sample: Sample) -> PoseAnalysis {
            self.t += 0.1;
            self.history.push(sample.pitch, sample.roll, self.t);
            self.analyzer.analyze_pose(exercise, &sample, self.t, &self.history)
        }

        fn pitch(&mut self, exercise: &Exercise, pitch: f64) -> PoseAnalysis {
            self.feed(exercise, Sample::with_orientation(pitch, 0.0, 0.0))
        }
    }

    #[test]
    fn bicep_curl_scenario() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        let results: Vec<PoseAnalysis> = [0.0, 30.0, 70.0, 95.0, 60.0, 15.0, 3.0]
            .iter()
            .map(|p| rig.pitch(&ex, *p))
            .collect();

        let reps: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.rep_detected)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(reps, vec![5]);
        assert!(results[2].cues.contains(&Cue::CurlHigher));
        assert!(results[3].cues.contains(&Cue::PerfectCurlHeight));
        assert!(results[5].cues.contains(&Cue::ExtendFully));
        assert_eq!(rig.analyzer.phase(), RepPhase::Down);
    }

    #[test]
    fn peak_cue_emitted_once_per_rep() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        rig.pitch(&ex, 70.0);
        assert!(rig.pitch(&ex, 92.0).cues.contains(&Cue::PerfectCurlHeight));
        assert!(!rig.pitch(&ex, 95.0).cues.contains(&Cue::PerfectCurlHeight));
        let over = rig.pitch(&ex, 125.0);
        assert!(over.cues.contains(&Cue::Overextension));
        assert!(!rig.pitch(&ex, 110.0).cues.contains(&Cue::PerfectCurlHeight));
    }

    #[test]
    fn only_release_emits_rep() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        let mut count = 0;
        for p in [10.0, 65.0, 100.0, 40.0, 25.0, 21.0, 65.0, 19.0, 0.0, 70.0, 15.0] {
            if rig.pitch(&ex, p).rep_detected {
                count += 1;
            }
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn curl_form_penalties() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        let fast = Sample {
            pitch: 95.0,
            gy: -250.0,
            ax: 0.7,
            roll: -15.0,
            ..Sample::default()
        };
        let r = rig.feed(&ex, fast);
        assert_eq!(
            r.cues,
            vec![
                Cue::PerfectCurlHeight,
                Cue::ControlTheCurl,
                Cue::ReduceBodySwing,
                Cue::KeepLeftArmSteady
            ]
        );
        assert_eq!(r.form_score, 100 - 15 - 20 - 20);
    }

    #[test]
    fn jerky_curl_is_flagged() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        rig.pitch(&ex, 0.0);
        rig.pitch(&ex, 5.0);
        // 刚发生的跳变要到下一帧才计入
        let r = rig.pitch(&ex, 40.0);
        assert!(r.cues.is_empty());
        assert_eq!(r.form_score, 100);
        let r = rig.pitch(&ex, 45.0);
        assert_eq!(r.cues, vec![Cue::SmoothMovement]);
        assert_eq!(r.form_score, 90);
    }

    #[test]
    fn lateral_raise_and_shoulder_press() {
        let mut rig = Rig::new();
        let raise = Exercise::LateralRaise;
        assert_eq!(rig.pitch(&raise, 45.0).cues, vec![Cue::GoodRaise]);
        assert!(rig.pitch(&raise, 19.0).rep_detected);
        let high = rig.pitch(&raise, 105.0);
        assert_eq!((high.cues.clone(), high.form_score), (vec![Cue::Overextension], 90));

        let mut rig = Rig::new();
        let press = Exercise::ShoulderPress;
        let tilted = Sample {
            pitch: 80.0,
            roll: 13.0,
            ..Sample::default()
        };
        let r = rig.feed(&press, tilted);
        assert_eq!(r.cues, vec![Cue::GoodPress, Cue::KeepElbowsSteady]);
        assert_eq!(r.form_score, 88);
        assert!(!rig.pitch(&press, 30.0).rep_detected);
        assert!(rig.pitch(&press, 29.0).rep_detected);
    }

    #[test]
    fn rep_durations_are_bounded() {
        let mut rig = Rig::new();
        let ex = Exercise::LateralRaise;
        for _ in 0..8 {
            rig.pitch(&ex, 50.0);
            rig.pitch(&ex, 10.0);
        }
        let durations = rig.analyzer.rep_durations();
        assert_eq!(durations.len(), 5);
        assert!(durations.iter().all(|d| (d - 0.2).abs() < 1e-9));
        assert!(rig.analyzer.range_of_motion().is_none());
    }

    #[test]
    fn unsupported_exercise_leaves_state() {
        let mut rig = Rig::new();
        rig.pitch(&Exercise::BicepCurl, 80.0);
        let r = rig.pitch(&Exercise::from_name("deadlift"), 0.0);
        assert_eq!(r.form_score, 0);
        assert_eq!(r.cues, vec![Cue::SelectSupportedExercise]);
        assert_eq!(rig.analyzer.phase(), RepPhase::Up);
    }

    #[test]
    fn range_of_motion_tracks_current_rep() {
        let mut rig = Rig::new();
        let ex = Exercise::BicepCurl;
        for p in [10.0, 70.0, 110.0, 50.0] {
            rig.pitch(&ex, p);
        }
        assert_eq!(
            rig.analyzer.range_of_motion(),
            Some(RangeOfMotion { min: 10.0, max: 110.0 })
        );
    }

    #[test]
    fn thresholds_lookup_by_name() {
        assert_eq!(Exercise::from_name("shoulder_press").thresholds(), Some(&SHOULDER_PRESS));
        assert_eq!(Exercise::from_name("burpee").thresholds(), None);
        assert_eq!(Exercise::Running.thresholds(), None);
        assert_eq!(Exercise::from_name("Bicep_Curl"), Exercise::BicepCurl);
        assert_eq!(Exercise::from_name("burpee").name(), "burpee");
    }

    #[test]
    fn cue_serializes_as_tag() {
        let json = serde_json::to_string(&vec![Cue::PerfectCurlHeight, Cue::KeepLeftArmSteady]).unwrap();
        assert_eq!(json, r#"["perfect_curl_height","keep_left_arm_steady"]"#);
        assert_eq!(Cue::ReduceSwaying.to_string(), "reduce_swaying");
    }
}
