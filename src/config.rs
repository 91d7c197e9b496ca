use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::steps::StepDetectorConfig;

/// `Workout` 模式下不调用分类模型，只用启发式规则
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerMode {
    #[default]
    Normal,
    Workout,
}

impl FromStr for AnalyzerMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(AnalyzerMode::Normal),
            "workout" => Ok(AnalyzerMode::Workout),
            _ => Err(EngineError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for AnalyzerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerMode::Normal => f.write_str("normal"),
            AnalyzerMode::Workout => f.write_str("workout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: u32,
}

impl Default for UserProfile {
    fn default() -> Self {
        UserProfile {
            height_cm: 170.0,
            weight_kg: 70.0,
            age: 30,
        }
    }
}

/// Partial profile update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub age: Option<u32>,
}

impl UserProfile {
    pub fn apply(&mut self, update: ProfileUpdate) -> EngineResult<()> {
        let height_cm = match update.height_cm {
            Some(h) => positive("height_cm", h)?,
            None => self.height_cm,
        };
        let weight_kg = match update.weight_kg {
            Some(w) => positive("weight_kg", w)?,
            None => self.weight_kg,
        };
        // 全部校验通过后再写入
        self.height_cm = height_cm;
        self.weight_kg = weight_kg;
        if let Some(age) = update.age {
            self.age = age;
        }
        Ok(())
    }

    pub fn height_m(&self) -> f64 {
        (self.height_cm / 100.0).max(0.5)
    }
}

fn positive(field: &'static str, value: f64) -> EngineResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::InvalidProfile { field, value })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: AnalyzerMode,
    pub profile: UserProfile,
    pub steps: StepDetectorConfig,
    pub movement_history_capacity: usize,
    pub rep_history_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mode: AnalyzerMode::Normal,
            profile: UserProfile::default(),
            steps: StepDetectorConfig::default(),
            movement_history_capacity: 20,
            rep_history_len: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!("Workout".parse::<AnalyzerMode>().unwrap(), AnalyzerMode::Workout);
        assert_eq!(" normal ".parse::<AnalyzerMode>().unwrap(), AnalyzerMode::Normal);
        assert!(matches!(
            "sprint".parse::<AnalyzerMode>(),
            Err(EngineError::InvalidMode(m)) if m == "sprint"
        ));
    }

    #[test]
    fn partial_json_config_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"mode":"workout","profile":{"height_cm":182,"weight_kg":80,"age":41}}"#,
        )
        .unwrap();
        assert_eq!(config.mode, AnalyzerMode::Workout);
        assert_eq!(config.profile.age, 41);
        assert_eq!(config.steps, StepDetectorConfig::default());
        assert_eq!(config.movement_history_capacity, 20);
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{mode:"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn profile_update_is_all_or_nothing() {
        let mut profile = UserProfile::default();
        let err = profile
            .apply(ProfileUpdate {
                height_cm: Some(180.0),
                weight_kg: Some(-1.0),
                age: Some(50),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidProfile { field: "weight_kg", .. }));
        assert_eq!(profile, UserProfile::default());

        profile
            .apply(ProfileUpdate {
                weight_kg: Some(82.5),
                ..ProfileUpdate::default()
            })
            .unwrap();
        assert_eq!(profile.weight_kg, 82.5);
        assert_eq!(profile.height_cm, 170.0);
    }

    #[test]
    fn height_is_floored_for_stride() {
        let profile = UserProfile {
            height_cm: 20.0,
            ..UserProfile::default()
        };
        assert_eq!(profile.height_m(), 0.5);
    }
}
