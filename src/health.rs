use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UserProfile;
use crate::inference::Activity;

// 心率卡路里公式系数 (kcal/min)
const HR_INTERCEPT: f64 = -55.0969;
const HR_COEF: f64 = 0.6309;
const WEIGHT_COEF: f64 = 0.1988;
const AGE_COEF: f64 = 0.2017;
const KJ_PER_KCAL: f64 = 4.184;

const RUNNING_STRIDE_RATIO: f64 = 0.65;
const WALKING_STRIDE_RATIO: f64 = 0.415;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyMethod {
    HeartRate,
    Met,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyIncrement {
    pub kcal: f64,
    pub method: EnergyMethod,
}

pub fn met_for(activity: Activity) -> f64 {
    match activity {
        Activity::Stationary => 1.0,
        Activity::Walking => 3.5,
        Activity::Running => 9.8,
    }
}

/// Heart-rate formula, clamped at zero.
pub fn heart_rate_kcal_per_min(heart_rate: f64, weight_kg: f64, age: u32) -> f64 {
    let kcal = (HR_INTERCEPT + HR_COEF * heart_rate + WEIGHT_COEF * weight_kg + AGE_COEF * age as f64)
        / KJ_PER_KCAL;
    kcal.max(0.0)
}

/// Calories for one interval. Heart rate wins when it is inside (0, 200) BPM
/// and time has actually passed, otherwise MET × kg × hours.
pub fn calorie_increment(
    heart_rate: Option<f64>,
    activity: Activity,
    weight_kg: f64,
    age: u32,
    elapsed_seconds: f64,
) -> EnergyIncrement {
    let elapsed_seconds = if elapsed_seconds.is_finite() { elapsed_seconds.max(0.0) } else { 0.0 };
    let minutes = elapsed_seconds / 60.0;

    match heart_rate.filter(|hr| *hr > 0.0 && *hr < 200.0) {
        Some(hr) if minutes > 0.0 => EnergyIncrement {
            kcal: heart_rate_kcal_per_min(hr, weight_kg, age) * minutes,
            method: EnergyMethod::HeartRate,
        },
        _ => EnergyIncrement {
            kcal: (met_for(activity) * weight_kg * (minutes / 60.0)).max(0.0),
            method: EnergyMethod::Met,
        },
    }
}

/// 卡路里累加器，只增不减
#[derive(Debug, Clone, Default)]
pub struct EnergyEstimator {
    calories_total: f64,
    last_metric_time: Option<f64>,
}

impl EnergyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(
        &mut self,
        now: f64,
        heart_rate: Option<f64>,
        activity: Activity,
        profile: &UserProfile,
    ) -> EnergyIncrement {
        let last = *self.last_metric_time.get_or_insert(now);
        // 时钟回拨时按 0 处理
        let elapsed = (now - last).max(0.0);

        let increment = calorie_increment(heart_rate, activity, profile.weight_kg, profile.age, elapsed);
        if elapsed > 0.0 {
            debug!(
                method = ?increment.method,
                kcal = increment.kcal,
                ?activity,
                "calorie increment"
            );
        }

        self.calories_total += increment.kcal;
        // 回拨后不让时间基准倒退
        self.last_metric_time = Some(now.max(last));
        increment
    }

    pub fn calories_total(&self) -> f64 {
        self.calories_total
    }
}

pub fn stride_length_m(activity: Activity, profile: &UserProfile) -> f64 {
    match activity {
        Activity::Running => RUNNING_STRIDE_RATIO * profile.height_m(),
        Activity::Walking => WALKING_STRIDE_RATIO * profile.height_m(),
        Activity::Stationary => 0.0,
    }
}

pub fn estimate_speed_kmh(cadence_spm: f64, activity: Activity, profile: &UserProfile) -> f64 {
    (cadence_spm / 60.0) * stride_length_m(activity, profile) * 3.6
}
