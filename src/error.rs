use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("unknown analyzer mode '{0}', expected 'normal' or 'workout'")]
    InvalidMode(String),

    #[error("invalid profile value for {field}: {value}")]
    InvalidProfile { field: &'static str, value: f64 },
}

/// 分类模型调用失败，只在分类步骤内部处理
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("model inference failed: {0}")]
    Inference(String),

    #[error("model returned unknown activity label '{0}'")]
    UnknownLabel(String),

    #[error("model returned an invalid probability distribution")]
    InvalidProbabilities,
}

pub type EngineResult<T> = Result<T, EngineError>;
