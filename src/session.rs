use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{AnalyzerMode, EngineConfig, ProfileUpdate, UserProfile};
use crate::error::EngineResult;
use crate::features::{now_seconds, FeatureVector, Sample};
use crate::health::{estimate_speed_kmh, EnergyEstimator};
use crate::inference::{Activity, ActivityModel, ClassifierBridge, ClassifierInput};
use crate::pose::{Cue, Exercise, PoseAnalyzer, RangeOfMotion};
use crate::stability::StabilityAnalyzer;
use crate::steps::StepDetector;

/// Live metrics snapshot, replaced wholesale after every sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub step_count: u32,
    pub step_detected: bool,
    pub activity: Option<Activity>,
    pub activity_confidence: f64,
    pub running_speed_kmh: f64,
    pub calories_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResult {
    pub form_score: u8,
    pub feedback: Vec<Cue>,
    pub rep_detected: bool,
}

impl FormResult {
    fn idle() -> Self {
        FormResult {
            form_score: 0,
            feedback: Vec::new(),
            rep_detected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleAnalysis {
    #[serde(flatten)]
    pub form: FormResult,
    pub rep_count: u32,
    pub metrics: SessionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub exercise: Option<String>,
    pub duration_s: f64,
    pub total_reps: u32,
    pub total_steps: u32,
    pub calories_total: f64,
    pub activity: Option<Activity>,
}

/// One user's analytics session. Not shared between threads; callers serialize samples.
pub struct MotionSession {
    config: EngineConfig,
    profile: UserProfile,
    mode: AnalyzerMode,
    exercise: Option<Exercise>,
    pose_analyzer: PoseAnalyzer,
    stability: StabilityAnalyzer,
    step_detector: StepDetector,
    classifier: ClassifierBridge,
    energy: EnergyEstimator,
    rep_count: u32,
    metrics: SessionMetrics,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
}

impl MotionSession {
    pub fn new(config: EngineConfig) -> Self {
        MotionSession {
            profile: config.profile,
            mode: config.mode,
            exercise: None,
            pose_analyzer: PoseAnalyzer::new(config.rep_history_len),
            stability: StabilityAnalyzer::new(config.movement_history_capacity),
            step_detector: StepDetector::new(config.steps.clone()),
            classifier: ClassifierBridge::new(None),
            energy: EnergyEstimator::new(),
            rep_count: 0,
            metrics: SessionMetrics::default(),
            first_timestamp: None,
            last_timestamp: None,
            config,
        }
    }

    pub fn with_model(config: EngineConfig, model: Box<dyn ActivityModel>) -> Self {
        let mut session = Self::new(config);
        session.classifier.set_model(Some(model));
        session
    }

    pub fn set_model(&mut self, model: Option<Box<dyn ActivityModel>>) {
        self.classifier.set_model(model);
    }

    /// Selects the exercise by name; `"ready"` or an empty name clears it.
    /// Rep tracking always restarts.
    pub fn set_exercise(&mut self, name: &str) {
        let trimmed = name.trim();
        self.exercise = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ready") {
            None
        } else {
            Some(Exercise::from_name(trimmed))
        };
        self.pose_analyzer.reset();
        info!(exercise = ?self.exercise.as_ref().map(Exercise::name), "exercise selected");
    }

    pub fn clear_exercise(&mut self) {
        self.set_exercise("");
    }

    pub fn exercise(&self) -> Option<&Exercise> {
        self.exercise.as_ref()
    }

    pub fn set_mode(&mut self, mode: AnalyzerMode) {
        self.mode = mode;
        info!(%mode, "analyzer mode set");
    }

    pub fn mode(&self) -> AnalyzerMode {
        self.mode
    }

    pub fn set_user_profile(&mut self, update: ProfileUpdate) -> EngineResult<()> {
        self.profile.apply(update)?;
        info!(
            height_cm = self.profile.height_cm,
            weight_kg = self.profile.weight_kg,
            age = self.profile.age,
            "user profile updated"
        );
        Ok(())
    }

    pub fn user_profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn process(&mut self, sample: &Sample) -> SampleAnalysis {
        let timestamp = sample.resolve_timestamp(now_seconds);
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |last| last.max(timestamp)));

        // 动作分析
        let form = self.analyze_form(sample, timestamp);
        if form.rep_detected {
            self.rep_count += 1;
            debug!(rep_count = self.rep_count, "rep counted");
        }

        // 步数、活动、卡路里
        let metrics = self.update_metrics(sample, timestamp);

        SampleAnalysis {
            form,
            rep_count: self.rep_count,
            metrics,
        }
    }

    fn analyze_form(&mut self, sample: &Sample, timestamp: f64) -> FormResult {
        let exercise = match &self.exercise {
            None => return FormResult::idle(),
            Some(Exercise::Unsupported(_)) => {
                let analysis = PoseAnalyzer::unsupported();
                return FormResult {
                    form_score: 0,
                    feedback: analysis.cues,
                    rep_detected: false,
                };
            }
            Some(exercise) => exercise,
        };

        self.stability.record(sample.pitch, sample.roll, timestamp);
        let pose = self
            .pose_analyzer
            .analyze_pose(exercise, sample, timestamp, self.stability.history());

        let mut score = pose.form_score;
        let mut feedback = pose.cues;

        let tempo = self.stability.tempo(
            sample.gy,
            &self.pose_analyzer.rep_durations(),
            exercise.thresholds(),
        );
        score -= tempo.penalty;
        feedback.extend(tempo.cues);

        let stability = self.stability.stability();
        if !stability.cues.is_empty() {
            feedback.extend(stability.cues);
            score = score.min(stability.score);
        }

        FormResult {
            form_score: score.clamp(0, 100) as u8,
            feedback,
            rep_detected: pose.rep_detected,
        }
    }

    fn update_metrics(&mut self, sample: &Sample, timestamp: f64) -> SessionMetrics {
        let step = self.step_detector.process_sample(sample, timestamp);
        let cadence = self.step_detector.cadence_spm(timestamp);

        let input = ClassifierInput {
            features: FeatureVector::from_sample(sample),
            cadence_spm: cadence,
        };
        let classification = self.classifier.classify(&input, self.mode);
        let speed = estimate_speed_kmh(cadence, classification.activity, &self.profile);

        self.energy.accumulate(
            timestamp,
            sample.valid_heart_rate(),
            classification.activity,
            &self.profile,
        );

        // 一次性替换快照
        self.metrics = SessionMetrics {
            step_count: step.step_count,
            step_detected: step.step_detected,
            activity: Some(classification.activity),
            activity_confidence: classification.confidence,
            running_speed_kmh: round_to(speed, 2),
            calories_total: round_to(self.energy.calories_total(), 4),
        };
        self.metrics.clone()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn range_of_motion(&self) -> Option<RangeOfMotion> {
        self.pose_analyzer.range_of_motion()
    }

    pub fn model_info(&self) -> HashMap<String, String> {
        let mut info = self.classifier.model_info();
        info.insert("model_loaded".to_string(), self.classifier.has_model().to_string());
        info.insert("mode".to_string(), self.mode.to_string());
        info
    }

    pub fn reset_reps(&mut self) {
        self.rep_count = 0;
        info!("rep counter reset");
    }

    pub fn reset_steps(&mut self) {
        self.step_detector.reset_count();
        self.metrics.step_count = 0;
        self.metrics.step_detected = false;
        info!("step counter reset");
    }

    pub fn summary(&self) -> SessionSummary {
        let duration_s = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };
        SessionSummary {
            exercise: self.exercise.as_ref().map(|e| e.name().to_string()),
            duration_s,
            total_reps: self.rep_count,
            total_steps: self.step_detector.step_count(),
            calories_total: round_to(self.energy.calories_total(), 4),
            activity: self.metrics.activity,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for MotionSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
