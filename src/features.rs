use chrono::{DateTime, NaiveDateTime};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// One IMU reading from the wrist device. Accel in g, gyro in deg/s, angles in degrees.
///
/// Deserialization never rejects a reading over one bad field: `null` or non-numeric
/// axis values read as 0, and an unusable heart rate or timestamp reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(default, deserialize_with = "loose_f64")]
    pub ax: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub ay: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub az: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub gx: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub gy: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub gz: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub pitch: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub roll: f64,
    #[serde(default, deserialize_with = "loose_f64")]
    pub yaw: f64,
    #[serde(default, deserialize_with = "loose_opt_f64", skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "loose_timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,
}

/// 设备时间戳：秒数或 ISO-8601 字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

// 任意 JSON 值：数字、字符串，其余一律忽略
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

impl LooseValue {
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            LooseValue::Number(n) => Some(*n),
            LooseValue::Text(text) => text.trim().parse::<f64>().ok(),
            LooseValue::Other(_) => None,
        };
        value.filter(|n| n.is_finite())
    }
}

fn loose_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    loose_opt_f64(deserializer).map(|v| v.unwrap_or(0.0))
}

fn loose_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    LooseValue::deserialize(deserializer).map(|v| v.as_f64())
}

fn loose_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RawTimestamp>, D::Error> {
    Ok(match LooseValue::deserialize(deserializer)? {
        LooseValue::Number(secs) => Some(RawTimestamp::Seconds(secs)),
        LooseValue::Text(text) => Some(RawTimestamp::Text(text)),
        LooseValue::Other(_) => None,
    })
}

impl RawTimestamp {
    /// Epoch seconds, or `None` when the value cannot be interpreted.
    pub fn to_seconds(&self) -> Option<f64> {
        match self {
            RawTimestamp::Seconds(secs) => Some(*secs).filter(|s| s.is_finite()),
            RawTimestamp::Text(text) => parse_timestamp_text(text),
        }
    }
}

fn parse_timestamp_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<f64>() {
        return Some(secs).filter(|s| s.is_finite());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_micros() as f64 / 1e6);
    }
    // 无时区的 ISO 时间按 UTC 处理
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_micros() as f64 / 1e6)
}

pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

impl Sample {
    pub fn with_motion(accel: [f64; 3], gyro: [f64; 3], timestamp: f64) -> Self {
        Sample {
            ax: accel[0],
            ay: accel[1],
            az: accel[2],
            gx: gyro[0],
            gy: gyro[1],
            gz: gyro[2],
            timestamp: Some(RawTimestamp::Seconds(timestamp)),
            ..Sample::default()
        }
    }

    pub fn with_orientation(pitch: f64, roll: f64, timestamp: f64) -> Self {
        Sample {
            az: 1.0,
            pitch,
            roll,
            timestamp: Some(RawTimestamp::Seconds(timestamp)),
            ..Sample::default()
        }
    }

    /// Resolves the sample time, substituting `now()` for missing or unparsable values.
    pub fn resolve_timestamp(&self, now: impl FnOnce() -> f64) -> f64 {
        self.timestamp
            .as_ref()
            .and_then(RawTimestamp::to_seconds)
            .unwrap_or_else(now)
    }

    pub fn accel_magnitude(&self) -> f64 {
        (self.ax.powi(2) + self.ay.powi(2) + self.az.powi(2)).sqrt()
    }

    pub fn gyro_magnitude(&self) -> f64 {
        (self.gx.powi(2) + self.gy.powi(2) + self.gz.powi(2)).sqrt()
    }

    /// Heart rate usable for calorie estimation, i.e. inside (0, 200) BPM.
    pub fn valid_heart_rate(&self) -> Option<f64> {
        self.heart_rate.filter(|hr| *hr > 0.0 && *hr < 200.0)
    }
}

pub const FEATURE_COUNT: usize = 8;

/// 分类器输入 `[ax, ay, az, gx, gy, gz, accMag, gyroMag]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn from_sample(sample: &Sample) -> Self {
        FeatureVector([
            sample.ax,
            sample.ay,
            sample.az,
            sample.gx,
            sample.gy,
            sample.gz,
            sample.accel_magnitude(),
            sample.gyro_magnitude(),
        ])
    }

    pub fn accel_magnitude(&self) -> f64 {
        self.0[6]
    }

    pub fn gyro_magnitude(&self) -> f64 {
        self.0[7]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

pub(crate) fn calculate_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub(crate) fn calculate_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = calculate_mean(values);
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
}

pub(crate) fn calculate_std(values: &[f64]) -> f64 {
    calculate_variance(values).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn deserializes_device_payload() {
        let json = r#"{"ax":0.1,"ay":0.2,"az":0.98,"gx":1,"gy":2,"gz":3,
            "pitch":45.0,"roll":-3.5,"yaw":0,"heartRate":92,"timestamp":1700000000.5}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.heart_rate, Some(92.0));
        assert_eq!(sample.resolve_timestamp(|| 0.0), 1_700_000_000.5);
        assert_eq!(sample.pitch, 45.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let sample: Sample = serde_json::from_str(r#"{"pitch": 12}"#).unwrap();
        assert_eq!(sample.ax, 0.0);
        assert_eq!(sample.heart_rate, None);
        assert_eq!(sample.resolve_timestamp(|| 42.0), 42.0);
    }

    #[test]
    fn parses_iso_timestamps() {
        let rfc = RawTimestamp::Text("2024-01-01T00:00:01Z".into());
        assert_relative_eq!(rfc.to_seconds().unwrap(), 1_704_067_201.0);

        let naive = RawTimestamp::Text("2024-01-01T00:00:01.500".into());
        assert_relative_eq!(naive.to_seconds().unwrap(), 1_704_067_201.5);

        let numeric = RawTimestamp::Text(" 12.25 ".into());
        assert_eq!(numeric.to_seconds(), Some(12.25));
    }

    #[test]
    fn malformed_fields_do_not_reject_the_reading() {
        let json = r#"{"ax":null,"ay":"0.5","az":"n/a","gy":true,"pitch":30,
            "heartRate":"128","timestamp":{"sec":5}}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.ax, 0.0);
        assert_eq!(sample.ay, 0.5);
        assert_eq!(sample.az, 0.0);
        assert_eq!(sample.gy, 0.0);
        assert_eq!(sample.pitch, 30.0);
        assert_eq!(sample.heart_rate, Some(128.0));
        assert_eq!(sample.timestamp, None);
        assert_eq!(sample.resolve_timestamp(|| 7.0), 7.0);

        let sample: Sample = serde_json::from_str(r#"{"heartRate":null,"timestamp":[1,2]}"#).unwrap();
        assert_eq!(sample.heart_rate, None);
        assert_eq!(sample.timestamp, None);

        let sample: Sample = serde_json::from_str(r#"{"heartRate":"fast","timestamp":"2024-01-01T00:00:01Z"}"#).unwrap();
        assert_eq!(sample.heart_rate, None);
        assert_relative_eq!(sample.resolve_timestamp(|| 0.0), 1_704_067_201.0);
    }

    #[test]
    fn unparsable_timestamp_falls_back_to_now() {
        let sample = Sample {
            timestamp: Some(RawTimestamp::Text("yesterday-ish".into())),
            ..Sample::default()
        };
        assert_eq!(sample.resolve_timestamp(|| 99.0), 99.0);
    }

    #[test]
    fn heart_rate_range_is_exclusive() {
        let mut sample = Sample::default();
        for (hr, expected) in [(0.0, None), (200.0, None), (-5.0, None), (120.0, Some(120.0))] {
            sample.heart_rate = Some(hr);
            assert_eq!(sample.valid_heart_rate(), expected);
        }
    }

    #[test]
    fn feature_vector_layout() {
        let sample = Sample::with_motion([0.0, 0.6, 0.8], [3.0, 4.0, 0.0], 1.0);
        let features = FeatureVector::from_sample(&sample);
        assert_relative_eq!(features.accel_magnitude(), 1.0);
        assert_relative_eq!(features.gyro_magnitude(), 5.0);
        assert_eq!(features.as_slice()[4], 4.0);
    }

    #[test]
    fn window_statistics() {
        let values = [1.0, 1.0, 2.0, 1.0, 1.0];
        assert_relative_eq!(calculate_mean(&values), 1.2);
        assert_relative_eq!(calculate_variance(&values), 0.16, epsilon = 1e-12);
        assert_relative_eq!(calculate_std(&values), 0.4, epsilon = 1e-12);
    }
}
