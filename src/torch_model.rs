use std::collections::HashMap;
use std::path::Path;
use tch::{nn, nn::Module, Device, Kind, Tensor};
use tracing::info;

use crate::error::ClassifierError;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::inference::{Activity, ActivityModel};

const HIDDEN_SIZE: i64 = 64;

/// MLP activity classifier over the 8-value feature vector, weights from a `.pt` VarStore.
#[derive(Debug)]
pub struct TorchActivityModel {
    vs: nn::VarStore,
    model: nn::Sequential,
    device: Device,
}

impl TorchActivityModel {
    pub fn load(weights: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let device = Device::cuda_if_available();
        let mut vs = nn::VarStore::new(device);
        let model = Self::build_model(&vs.root());

        let path = weights.as_ref();
        vs.load(path)
            .map_err(|e| ClassifierError::Inference(format!("failed to load {}: {}", path.display(), e)))?;
        info!(path = %path.display(), ?device, "activity model loaded");

        Ok(TorchActivityModel { vs, model, device })
    }

    fn build_model(vs: &nn::Path) -> nn::Sequential {
        let classes = Activity::LABELS.len() as i64;
        nn::seq()
            .add(nn::linear(vs / "layer1", FEATURE_COUNT as i64, HIDDEN_SIZE, Default::default()))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(vs / "layer2", HIDDEN_SIZE, HIDDEN_SIZE, Default::default()))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(vs / "layer3", HIDDEN_SIZE, classes, Default::default()))
            .add_fn(|xs| xs.softmax(-1, Kind::Float))
    }

    fn forward(&self, features: &FeatureVector) -> Tensor {
        let raw: Vec<f32> = features.as_slice().iter().map(|v| *v as f32).collect();
        let input = Tensor::from_slice(&raw).to_device(self.device).unsqueeze(0);
        tch::no_grad(|| self.model.forward(&input))
    }

    fn class_to_activity(idx: i64) -> Result<Activity, ClassifierError> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| Activity::LABELS.get(i).copied())
            .ok_or_else(|| ClassifierError::UnknownLabel(format!("class index {}", idx)))
    }
}

impl ActivityModel for TorchActivityModel {
    fn predict(&self, features: &FeatureVector) -> Result<String, ClassifierError> {
        let output = self.forward(features);
        let idx = output.argmax(1, false).int64_value(&[0]);
        Self::class_to_activity(idx).map(|a| a.as_str().to_string())
    }

    fn predict_proba(&self, features: &FeatureVector) -> Option<Result<Vec<f64>, ClassifierError>> {
        let output = self.forward(features).squeeze_dim(0).to_kind(Kind::Double);
        Some(Vec::<f64>::try_from(&output).map_err(|e| ClassifierError::Inference(e.to_string())))
    }

    fn model_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("device".to_string(), format!("{:?}", self.device));
        info.insert("model_type".to_string(), "mlp".to_string());
        info.insert("input_features".to_string(), FEATURE_COUNT.to_string());
        info.insert(
            "labels".to_string(),
            Activity::LABELS.iter().map(Activity::as_str).collect::<Vec<_>>().join(","),
        );
        info.insert("parameters".to_string(), self.vs.len().to_string());
        info
    }
}
