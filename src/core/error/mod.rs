use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ConfigurationError => ErrorSeverity::Fatal,
            ErrorCategory::DiscoveryFailure => ErrorSeverity::Warning,
            ErrorCategory::ValidationRejection
            | ErrorCategory::ExecutionFailure
            | ErrorCategory::TimeoutFailure
            | ErrorCategory::TransportFailure
            | ErrorCategory::ConnectionFailure
            | ErrorCategory::SerializationError
            | ErrorCategory::IoError
            | ErrorCategory::InternalError => ErrorSeverity::Error,
        };
        AppError {
            category,
            severity,
            code: format!("RB-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: BTreeMap::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(source.into());
        error
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == ErrorSeverity::Fatal
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), e).with_code("RB-IO-001")
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::with_source(ErrorCategory::SerializationError, e.to_string(), e)
            .with_code("RB-SER-001")
    }
}
