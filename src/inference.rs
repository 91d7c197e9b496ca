use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::config::AnalyzerMode;
use crate::error::ClassifierError;
use crate::features::FeatureVector;

// 启发式阈值
const IDLE_CADENCE_SPM: f64 = 20.0;
const IDLE_ACCEL_G: f64 = 1.05;
const IDLE_GYRO_DPS: f64 = 80.0;
const RUNNING_CADENCE_SPM: f64 = 80.0;
const RUNNING_GYRO_DPS: f64 = 300.0;
const RUNNING_ACCEL_G: f64 = 1.2;
const WALKING_GYRO_DPS: f64 = 120.0;

const IDLE_CONFIDENCE: f64 = 0.9;
const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Stationary,
    Walking,
    Running,
}

impl Activity {
    pub const LABELS: [Activity; 3] = [Activity::Stationary, Activity::Walking, Activity::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Stationary => "stationary",
            Activity::Walking => "walking",
            Activity::Running => "running",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activity {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        Activity::LABELS
            .iter()
            .copied()
            .find(|a| a.as_str() == label)
            .ok_or_else(|| ClassifierError::UnknownLabel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Heuristic,
    StationaryOverride,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub activity: Activity,
    pub confidence: f64,
    pub source: ClassificationSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierInput {
    pub features: FeatureVector,
    pub cadence_spm: f64,
}

impl ClassifierInput {
    fn is_idle(&self) -> bool {
        self.cadence_spm < IDLE_CADENCE_SPM
            && self.features.accel_magnitude() < IDLE_ACCEL_G
            && self.features.gyro_magnitude() < IDLE_GYRO_DPS
    }
}

/// A pre-trained activity model supplied by the host application.
///
/// `predict` returns a label (`stationary`, `walking`, `running`, any case).
/// `predict_proba`, when the model supports it, returns one probability per class.
pub trait ActivityModel: Send {
    fn predict(&self, features: &FeatureVector) -> Result<String, ClassifierError>;

    fn predict_proba(&self, _features: &FeatureVector) -> Option<Result<Vec<f64>, ClassifierError>> {
        None
    }

    fn model_info(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

pub trait ActivityClassifier {
    fn classify(&self, input: &ClassifierInput) -> Result<Classification, ClassifierError>;
}

/// Cadence and magnitude band rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn evaluate(&self, input: &ClassifierInput) -> Classification {
        let cadence = input.cadence_spm;
        let acc_mag = input.features.accel_magnitude();
        let gyro_mag = input.features.gyro_magnitude();

        let (activity, confidence) = if input.is_idle() {
            (Activity::Stationary, IDLE_CONFIDENCE)
        } else if cadence >= RUNNING_CADENCE_SPM || (gyro_mag > RUNNING_GYRO_DPS && acc_mag > RUNNING_ACCEL_G) {
            let excess = ((cadence - RUNNING_CADENCE_SPM) / 120.0).max((gyro_mag - RUNNING_GYRO_DPS) / 400.0);
            (Activity::Running, (0.5 + excess).min(1.0))
        } else if cadence >= IDLE_CADENCE_SPM || acc_mag > IDLE_ACCEL_G || gyro_mag > WALKING_GYRO_DPS {
            let excess = (cadence / 120.0).max(acc_mag - 1.0);
            (Activity::Walking, (0.3 + excess).min(0.9))
        } else {
            (Activity::Stationary, 0.85)
        };

        Classification {
            activity,
            confidence,
            source: ClassificationSource::Heuristic,
        }
    }
}

impl ActivityClassifier for HeuristicClassifier {
    fn classify(&self, input: &ClassifierInput) -> Result<Classification, ClassifierError> {
        Ok(self.evaluate(input))
    }
}

/// Adapter from an injected [`ActivityModel`] to [`ActivityClassifier`].
pub struct ModelClassifier<'a> {
    model: &'a dyn ActivityModel,
}

impl<'a> ModelClassifier<'a> {
    pub fn new(model: &'a dyn ActivityModel) -> Self {
        ModelClassifier { model }
    }
}

impl ActivityClassifier for ModelClassifier<'_> {
    fn classify(&self, input: &ClassifierInput) -> Result<Classification, ClassifierError> {
        let label = self.model.predict(&input.features)?;
        let activity: Activity = label.parse()?;

        let confidence = match self.model.predict_proba(&input.features) {
            Some(proba) => max_probability(&proba?)?,
            None => DEFAULT_MODEL_CONFIDENCE,
        };

        Ok(Classification {
            activity,
            confidence,
            source: ClassificationSource::Model,
        })
    }
}

fn max_probability(proba: &[f64]) -> Result<f64, ClassifierError> {
    if proba.is_empty() || proba.iter().any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0) {
        return Err(ClassifierError::InvalidProbabilities);
    }
    Ok(proba.iter().copied().fold(0.0, f64::max))
}

/// Accuracy of `model` against labelled feature vectors: `overall_accuracy`
/// plus one `<label>_accuracy` entry per label present. Failed predictions count as misses.
pub fn evaluate_model(
    model: &dyn ActivityModel,
    features: &[FeatureVector],
    labels: &[Activity],
) -> Result<HashMap<String, f64>, ClassifierError> {
    if features.len() != labels.len() {
        return Err(ClassifierError::Inference(format!(
            "{} feature vectors but {} labels",
            features.len(),
            labels.len()
        )));
    }

    let mut correct = 0usize;
    let mut per_class: HashMap<Activity, (usize, usize)> = HashMap::new();
    for (fv, truth) in features.iter().zip(labels) {
        let hit = matches!(
            model.predict(fv).and_then(|label| label.parse::<Activity>()),
            Ok(predicted) if predicted == *truth
        );
        let entry = per_class.entry(*truth).or_insert((0, 0));
        entry.1 += 1;
        if hit {
            entry.0 += 1;
            correct += 1;
        }
    }

    let mut metrics = HashMap::new();
    let overall = if labels.is_empty() { 0.0 } else { correct as f64 / labels.len() as f64 };
    metrics.insert("overall_accuracy".to_string(), overall);
    for (activity, (hits, total)) in per_class {
        metrics.insert(format!("{}_accuracy", activity), hits as f64 / total as f64);
    }
    Ok(metrics)
}

/// 选择模型或启发式分类，并做最终的静止判定
#[derive(Default)]
pub struct ClassifierBridge {
    model: Option<Box<dyn ActivityModel>>,
    heuristic: HeuristicClassifier,
}

impl ClassifierBridge {
    pub fn new(model: Option<Box<dyn ActivityModel>>) -> Self {
        ClassifierBridge {
            model,
            heuristic: HeuristicClassifier,
        }
    }

    pub fn set_model(&mut self, model: Option<Box<dyn ActivityModel>>) {
        self.model = model;
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_info(&self) -> HashMap<String, String> {
        self.model.as_ref().map(|m| m.model_info()).unwrap_or_default()
    }

    /// The classifier in charge for `mode`: the model in normal mode when one is loaded,
    /// the heuristic otherwise.
    fn primary(&self, mode: AnalyzerMode) -> Option<ModelClassifier<'_>> {
        match (&self.model, mode) {
            (Some(model), AnalyzerMode::Normal) => Some(ModelClassifier::new(model.as_ref())),
            _ => None,
        }
    }

    pub fn classify(&self, input: &ClassifierInput, mode: AnalyzerMode) -> Classification {
        let model = self.primary(mode);
        let classifier: &dyn ActivityClassifier = match &model {
            Some(model) => model,
            None => &self.heuristic,
        };

        let fallback: &dyn ActivityClassifier = &self.heuristic;
        let classification = classifier
            .classify(input)
            .or_else(|e| {
                warn!(error = %e, "activity model failed, falling back to heuristic");
                fallback.classify(input)
            })
            .unwrap_or_else(|_| self.heuristic.evaluate(input));

        // 防止模型噪声把静止误判成跑步
        if input.is_idle() {
            return Classification {
                activity: Activity::Stationary,
                confidence: IDLE_CONFIDENCE,
                source: if classification.activity == Activity::Stationary
                    && classification.source == ClassificationSource::Heuristic
                {
                    ClassificationSource::Heuristic
                } else {
                    ClassificationSource::StationaryOverride
                },
            };
        }
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn input(cadence: f64, acc_mag: f64, gyro_mag: f64) -> ClassifierInput {
        let mut raw = [0.0; 8];
        raw[2] = acc_mag;
        raw[4] = gyro_mag;
        raw[6] = acc_mag;
        raw[7] = gyro_mag;
        ClassifierInput {
            features: FeatureVector(raw),
            cadence_spm: cadence,
        }
    }

    struct FixedModel {
        label: &'static str,
        proba: Option<Vec<f64>>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedModel {
        fn new(label: &'static str, proba: Option<Vec<f64>>) -> Self {
            FixedModel {
                label,
                proba,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ActivityModel for FixedModel {
        fn predict(&self, _features: &FeatureVector) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.to_string())
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Option<Result<Vec<f64>, ClassifierError>> {
            self.proba.clone().map(Ok)
        }
    }

    struct FailingModel;

    impl ActivityModel for FailingModel {
        fn predict(&self, _features: &FeatureVector) -> Result<String, ClassifierError> {
            Err(ClassifierError::Inference("shape mismatch".into()))
        }
    }

    #[test]
    fn heuristic_bands() {
        let h = HeuristicClassifier;

        let idle = h.evaluate(&input(0.0, 1.0, 10.0));
        assert_eq!((idle.activity, idle.confidence), (Activity::Stationary, 0.9));

        let run = h.evaluate(&input(90.0, 1.3, 100.0));
        assert_eq!(run.activity, Activity::Running);
        assert_relative_eq!(run.confidence, 0.5 + 10.0 / 120.0);

        let spin = h.evaluate(&input(0.0, 1.3, 350.0));
        assert_eq!(spin.activity, Activity::Running);
        assert_relative_eq!(spin.confidence, 0.5 + 50.0 / 400.0);

        let sprint = h.evaluate(&input(300.0, 1.0, 0.0));
        assert_eq!(sprint.confidence, 1.0);

        let walk = h.evaluate(&input(30.0, 1.1, 50.0));
        assert_eq!(walk.activity, Activity::Walking);
        assert_relative_eq!(walk.confidence, 0.3 + 30.0 / 120.0);

        let brisk = h.evaluate(&input(75.0, 1.0, 0.0));
        assert_relative_eq!(brisk.confidence, 0.9);

        let fidget = h.evaluate(&input(0.0, 1.0, 100.0));
        assert_eq!((fidget.activity, fidget.confidence), (Activity::Stationary, 0.85));
    }

    #[test]
    fn heuristic_is_deterministic() {
        let bridge = ClassifierBridge::new(None);
        let sample = input(45.0, 1.08, 95.0);
        let first = bridge.classify(&sample, AnalyzerMode::Normal);
        for _ in 0..10 {
            assert_eq!(bridge.classify(&sample, AnalyzerMode::Normal), first);
        }
    }

    #[test]
    fn bridge_without_model_uses_heuristic_classifier() {
        let bridge = ClassifierBridge::default();
        let sample = input(90.0, 1.3, 100.0);
        let direct = ActivityClassifier::classify(&HeuristicClassifier, &sample).unwrap();
        assert_eq!(bridge.classify(&sample, AnalyzerMode::Normal), direct);
        assert_eq!(bridge.classify(&sample, AnalyzerMode::Workout), direct);
        assert_eq!(direct.source, ClassificationSource::Heuristic);
    }

    #[test]
    fn model_confidence_is_max_probability() {
        let bridge = ClassifierBridge::new(Some(Box::new(FixedModel::new(
            "Walking",
            Some(vec![0.1, 0.7, 0.2]),
        ))));
        let c = bridge.classify(&input(30.0, 1.1, 90.0), AnalyzerMode::Normal);
        assert_eq!(c.activity, Activity::Walking);
        assert_eq!(c.confidence, 0.7);
        assert_eq!(c.source, ClassificationSource::Model);
    }

    #[test]
    fn model_without_probabilities_uses_default_confidence() {
        let bridge = ClassifierBridge::new(Some(Box::new(FixedModel::new("running", None))));
        let c = bridge.classify(&input(100.0, 1.4, 250.0), AnalyzerMode::Normal);
        assert_eq!(c.activity, Activity::Running);
        assert_eq!(c.confidence, 0.8);
    }

    #[test]
    fn failing_model_falls_back_to_heuristic() {
        let bridge = ClassifierBridge::new(Some(Box::new(FailingModel)));
        let sample = input(30.0, 1.1, 50.0);
        let c = bridge.classify(&sample, AnalyzerMode::Normal);
        assert_eq!(c, HeuristicClassifier.evaluate(&sample));
    }

    #[test]
    fn unknown_label_or_bad_distribution_falls_back() {
        let sample = input(30.0, 1.1, 50.0);
        let expected = HeuristicClassifier.evaluate(&sample);

        let cycling = ClassifierBridge::new(Some(Box::new(FixedModel::new("cycling", None))));
        assert_eq!(cycling.classify(&sample, AnalyzerMode::Normal), expected);

        let empty = ClassifierBridge::new(Some(Box::new(FixedModel::new("walking", Some(vec![])))));
        assert_eq!(empty.classify(&sample, AnalyzerMode::Normal), expected);
    }

    #[test]
    fn workout_mode_skips_model() {
        let model = FixedModel::new("running", Some(vec![0.0, 0.0, 1.0]));
        let calls = Arc::clone(&model.calls);
        let bridge = ClassifierBridge::new(Some(Box::new(model)));

        let c = bridge.classify(&input(30.0, 1.1, 50.0), AnalyzerMode::Workout);
        assert_eq!(c.source, ClassificationSource::Heuristic);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bridge.classify(&input(30.0, 1.1, 50.0), AnalyzerMode::Normal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_input_overrides_model_output() {
        let bridge = ClassifierBridge::new(Some(Box::new(FixedModel::new(
            "running",
            Some(vec![0.0, 0.01, 0.99]),
        ))));
        for (cadence, acc, gyro) in [(0.0, 1.0, 0.0), (19.9, 1.049, 79.9), (6.0, 0.2, 40.0)] {
            let c = bridge.classify(&input(cadence, acc, gyro), AnalyzerMode::Normal);
            assert_eq!(c.activity, Activity::Stationary);
            assert_eq!(c.confidence, 0.9);
            assert_eq!(c.source, ClassificationSource::StationaryOverride);
        }
    }

    #[test]
    fn evaluation_reports_per_class_accuracy() {
        let model = FixedModel::new("walking", None);
        let fv = input(30.0, 1.1, 50.0).features;
        let metrics = evaluate_model(
            &model,
            &[fv, fv, fv, fv],
            &[Activity::Walking, Activity::Walking, Activity::Running, Activity::Walking],
        )
        .unwrap();
        assert_relative_eq!(metrics["overall_accuracy"], 0.75);
        assert_eq!(metrics["walking_accuracy"], 1.0);
        assert_eq!(metrics["running_accuracy"], 0.0);
        assert!(!metrics.contains_key("stationary_accuracy"));

        assert!(evaluate_model(&FailingModel, &[fv], &[]).is_err());
        let failing = evaluate_model(&FailingModel, &[fv], &[Activity::Walking]).unwrap();
        assert_eq!(failing["overall_accuracy"], 0.0);
    }

    #[test]
    fn label_parsing_is_case_insensitive() {
        assert_eq!(" RUNNING ".parse::<Activity>().unwrap(), Activity::Running);
        assert!(matches!("jog".parse::<Activity>(), Err(ClassifierError::UnknownLabel(_))));
    }
}
