use thiserror::Error;

/// Error type shared by indicators, collaborators and the emission path.
///
/// Variants map onto the four failure families of a scheduled run:
/// configuration (`Config`, `UnhandledSubmode`, `InvalidState`), data access
/// (`Query`), definition checks (`Validation`) and delivery (`Dispatch`,
/// `SenderUnreachable`).
#[derive(Error, Debug)]
pub enum IndicatorError {
    /// Missing or invalid indicator configuration, e.g. an empty submode at send time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A DataStore call failed or returned an unexpected shape.
    #[error("Query '{operation}' failed: {reason}")]
    Query { operation: String, reason: String },

    /// A custom measurement definition was rejected at save time.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The sender ran but reported failure through its exit status.
    #[error("Dispatch of '{key}' failed with status {status}: {output}")]
    Dispatch {
        key: String,
        status: i32,
        output: String,
    },

    /// The sender binary could not be started at all.
    #[error("Sender command '{command}' could not be run: {source}")]
    SenderUnreachable {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An indicator advertised a submode it has no acquisition branch for.
    #[error("Indicator '{indicator}' has no acquisition for submode '{submode}'")]
    UnhandledSubmode { indicator: String, submode: String },

    /// Acquisition cycle steps were called out of order.
    #[error("Indicator '{indicator}' is {actual}, expected {expected}")]
    InvalidState {
        indicator: String,
        expected: String,
        actual: String,
    },

    /// Tried to look up an indicator by name, but it was not registered.
    #[error("Indicator not found: {0}")]
    IndicatorNotFound(String),
}

impl IndicatorError {
    pub fn query(operation: impl Into<String>, reason: impl ToString) -> Self {
        IndicatorError::Query {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        IndicatorError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that only concern one submode and must not stop a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IndicatorError::Query { .. }
                | IndicatorError::Dispatch { .. }
                | IndicatorError::SenderUnreachable { .. }
        )
    }
}

impl From<validator::ValidationErrors> for IndicatorError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "definition".to_string());
        IndicatorError::Validation {
            field,
            reason: errors.to_string(),
        }
    }
}
