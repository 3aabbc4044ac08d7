use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Unexpected API response format: {message}")]
    UnexpectedResponse { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Column '{column}' not found in {file}")]
    MissingColumn { file: String, column: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Stage '{stage}' failed: {details}")]
    StageFailed { stage: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::ApiStatus { .. } | EtlError::UnexpectedResponse { .. } => {
                ErrorCategory::Network
            }
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::MissingColumn { .. }
            | EtlError::ProcessingError { .. }
            | EtlError::StageFailed { .. } => ErrorCategory::Data,
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::ApiError(e) if e.is_timeout() || e.is_connect() => ErrorSeverity::Medium,
            EtlError::ApiStatus { status, .. } if *status == 429 || *status >= 500 => {
                ErrorSeverity::Medium
            }
            EtlError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::ApiError(_) => "Check network connectivity and rerun the images stage",
            EtlError::ApiStatus { status, .. } if *status == 429 => {
                "Lower images.requests_per_minute and rerun with --only images"
            }
            EtlError::ApiStatus { .. } | EtlError::UnexpectedResponse { .. } => {
                "Check images.endpoint and the requested fields against the iNaturalist API"
            }
            EtlError::CsvError(_) | EtlError::MissingColumn { .. } => {
                "Make sure the input dump is complete and uses the expected column names"
            }
            EtlError::IoError(_) => "Check that the data directory exists and is writable",
            EtlError::SerializationError(_) => "The API payload could not be decoded; retry later",
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => "Fix the configuration file and run again",
            EtlError::ProcessingError { .. } | EtlError::StageFailed { .. } => {
                "Rerun the failing stage with --verbose to see which rows are affected"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not fetch species data: {}", self),
            ErrorCategory::Data => format!("Could not process the input tables: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::System => format!("File system error: {}", self),
        }
    }

    /// Process exit code for the binaries.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
