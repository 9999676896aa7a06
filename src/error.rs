use thiserror::Error;

/// Errors raised while configuring or running an experiment.
///
/// Some of them only abort the current (version, fold) iteration, the others abort
/// the whole experiment unit. See [`CpdpError::is_fatal`].
#[derive(Error, Debug)]
pub enum CpdpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error in {version}: {msg}")]
    Data { version: String, msg: String },

    #[error("[{experiment}] no training data for {version} (repeat {repeat}, fold {fold})")]
    EmptyTrainingData {
        experiment: String,
        version: String,
        repeat: usize,
        fold: usize,
    },

    #[error("stage {stage} failed: {msg}")]
    Stage { stage: String, msg: String },

    #[error("trainer {trainer} failed: {msg}")]
    Training { trainer: String, msg: String },

    #[error("result storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CpdpError>;

impl CpdpError {
    pub fn data(version: &str, msg: impl Into<String>) -> CpdpError {
        CpdpError::Data { version: version.to_string(), msg: msg.into() }
    }

    pub fn stage(stage: &str, msg: impl Into<String>) -> CpdpError {
        CpdpError::Stage { stage: stage.to_string(), msg: msg.into() }
    }

    pub fn training(trainer: &str, msg: impl Into<String>) -> CpdpError {
        CpdpError::Training { trainer: trainer.to_string(), msg: msg.into() }
    }

    /// Fatal errors abort the experiment unit. Everything else is local to one
    /// (version, fold) iteration and the loop moves on to the next one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CpdpError::Config(_)
                | CpdpError::Storage(_)
                | CpdpError::Io(_)
                | CpdpError::Csv(_)
                | CpdpError::Yaml(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_errors_are_not_fatal() {
        let empty = CpdpError::EmptyTrainingData {
            experiment: "exp".to_string(),
            version: "ant-1.3".to_string(),
            repeat: 0,
            fold: 3,
        };
        assert!(!empty.is_fatal());
        assert!(!CpdpError::training("NaiveBayes", "boom").is_fatal());
        assert!(!CpdpError::stage("ZScore", "boom").is_fatal());
        assert!(!CpdpError::data("ant-1.3", "missing column").is_fatal());
    }

    #[test]
    fn test_storage_and_config_errors_are_fatal() {
        assert!(CpdpError::Storage("disk full".to_string()).is_fatal());
        assert!(CpdpError::Config("unknown trainer".to_string()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "denied");
        assert!(CpdpError::from(io).is_fatal());
    }

    #[test]
    fn test_empty_training_data_message_carries_context() {
        let err = CpdpError::EmptyTrainingData {
            experiment: "exp".to_string(),
            version: "ant-1.3".to_string(),
            repeat: 2,
            fold: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("ant-1.3"));
        assert!(msg.contains("fold 3"));
    }
}
