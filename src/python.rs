use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::HashMap;

use crate::config::{AnalyzerMode, EngineConfig, ProfileUpdate};
use crate::error::{ClassifierError, EngineError};
use crate::features::{FeatureVector, RawTimestamp, Sample};
use crate::inference::{self, Activity, ActivityModel};
use crate::session::MotionSession;

impl From<EngineError> for PyErr {
    fn from(err: EngineError) -> PyErr {
        match err {
            EngineError::Io(e) => PyIOError::new_err(e.to_string()),
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

fn to_py<T: serde::Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    pythonize::pythonize(py, value)
        .map(|obj| obj.to_object(py))
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Wraps any Python object exposing a scikit-learn style `predict` (and optionally `predict_proba`).
pub struct PyActivityModel(PyObject);

impl PyActivityModel {
    fn row(features: &FeatureVector) -> Vec<Vec<f64>> {
        vec![features.as_slice().to_vec()]
    }
}

fn inference_error(err: PyErr) -> ClassifierError {
    ClassifierError::Inference(err.to_string())
}

impl ActivityModel for PyActivityModel {
    fn predict(&self, features: &FeatureVector) -> Result<String, ClassifierError> {
        Python::with_gil(|py| {
            let out = self.0.bind(py).call_method1("predict", (Self::row(features),))?;
            let label = out.get_item(0)?;
            Ok(label.str()?.to_string())
        })
        .map_err(inference_error)
    }

    fn predict_proba(&self, features: &FeatureVector) -> Option<Result<Vec<f64>, ClassifierError>> {
        Python::with_gil(|py| {
            let model = self.0.bind(py);
            if !model.hasattr("predict_proba").unwrap_or(false) {
                return None;
            }
            let proba = model
                .call_method1("predict_proba", (Self::row(features),))
                .and_then(|out| out.get_item(0))
                .and_then(|row| row.extract::<Vec<f64>>());
            Some(proba.map_err(inference_error))
        })
    }

    fn model_info(&self) -> HashMap<String, String> {
        Python::with_gil(|py| {
            let mut info = HashMap::new();
            if let Ok(ty) = self.0.bind(py).get_type().name() {
                info.insert("model_type".to_string(), ty.to_string());
            }
            info
        })
    }
}

// 与 JSON 输入一致：坏字段不拒绝整条样本
fn loose_number(value: &Bound<'_, PyAny>) -> Option<f64> {
    if value.is_none() {
        return None;
    }
    value
        .extract::<f64>()
        .ok()
        .or_else(|| value.extract::<String>().ok().and_then(|s| s.trim().parse().ok()))
        .filter(|n| n.is_finite())
}

fn field(dict: &Bound<'_, PyDict>, keys: &[&str]) -> PyResult<Option<f64>> {
    for key in keys {
        if let Some(value) = dict.get_item(*key)? {
            return Ok(loose_number(&value));
        }
    }
    Ok(None)
}

fn sample_from_dict(dict: &Bound<'_, PyDict>) -> PyResult<Sample> {
    let num = |key: &str| field(dict, &[key]).map(|v| v.unwrap_or(0.0));
    let timestamp = dict.get_item("timestamp")?.and_then(|ts| {
        if let Ok(secs) = ts.extract::<f64>() {
            Some(RawTimestamp::Seconds(secs))
        } else {
            ts.extract::<String>().ok().map(RawTimestamp::Text)
        }
    });

    Ok(Sample {
        ax: num("ax")?,
        ay: num("ay")?,
        az: num("az")?,
        gx: num("gx")?,
        gy: num("gy")?,
        gz: num("gz")?,
        pitch: num("pitch")?,
        roll: num("roll")?,
        yaw: num("yaw")?,
        heart_rate: field(dict, &["heartRate", "heart_rate"])?,
        timestamp,
    })
}

#[pyclass(name = "MotionEngine")]
pub struct PyMotionEngine {
    session: MotionSession,
}

#[pymethods]
impl PyMotionEngine {
    #[new]
    #[pyo3(signature = (config_path=None, model=None))]
    fn new(config_path: Option<&str>, model: Option<PyObject>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        let mut session = MotionSession::new(config);
        session.set_model(model.map(|m| Box::new(PyActivityModel(m)) as Box<dyn ActivityModel>));
        Ok(PyMotionEngine { session })
    }

    fn process_sample(&mut self, py: Python<'_>, data: &Bound<'_, PyDict>) -> PyResult<PyObject> {
        let sample = sample_from_dict(data)?;
        let analysis = self.session.process(&sample);
        to_py(py, &analysis)
    }

    fn set_exercise(&mut self, exercise: &str) {
        self.session.set_exercise(exercise);
    }

    fn set_mode(&mut self, mode: &str) -> PyResult<()> {
        self.session.set_mode(mode.parse::<AnalyzerMode>()?);
        Ok(())
    }

    #[pyo3(signature = (height_cm=None, weight_kg=None, age=None))]
    fn set_user_profile(&mut self, height_cm: Option<f64>, weight_kg: Option<f64>, age: Option<u32>) -> PyResult<()> {
        self.session.set_user_profile(ProfileUpdate {
            height_cm,
            weight_kg,
            age,
        })?;
        Ok(())
    }

    #[pyo3(signature = (model=None))]
    fn set_model(&mut self, model: Option<PyObject>) {
        self.session
            .set_model(model.map(|m| Box::new(PyActivityModel(m)) as Box<dyn ActivityModel>));
    }

    fn get_metrics(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, self.session.metrics())
    }

    fn get_model_info(&self) -> HashMap<String, String> {
        self.session.model_info()
    }

    #[getter]
    fn rep_count(&self) -> u32 {
        self.session.rep_count()
    }

    fn reset_reps(&mut self) {
        self.session.reset_reps();
    }

    fn reset_steps(&mut self) {
        self.session.reset_steps();
    }

    fn summary(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.session.summary())
    }
}

/// Accuracy of a Python model over labelled 8-value feature rows.
#[pyfunction]
fn evaluate_model(model: PyObject, test_data: Vec<Vec<f64>>, test_labels: Vec<String>) -> PyResult<HashMap<String, f64>> {
    let features = test_data
        .iter()
        .map(|row| {
            <[f64; 8]>::try_from(row.as_slice())
                .map(FeatureVector)
                .map_err(|_| PyValueError::new_err(format!("expected 8 features, got {}", row.len())))
        })
        .collect::<PyResult<Vec<_>>>()?;
    let labels = test_labels
        .iter()
        .map(|l| l.parse::<Activity>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    inference::evaluate_model(&PyActivityModel(model), &features, &labels)
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

#[pymodule]
fn edgefit_motion(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMotionEngine>()?;
    m.add_function(wrap_pyfunction!(evaluate_model, m)?)?;
    Ok(())
}
