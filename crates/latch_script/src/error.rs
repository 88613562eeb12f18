use latch_interop::InteropError;
use thiserror::Error;

/// Errors surfaced by script runtimes and engine adapters.
///
/// Script-level throws never unwind across the adapter boundary; they
/// arrive here as `ScriptException`.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to initialize script engine: {0}")]
    EngineInit(String),

    #[error("uncaught script exception: {message}")]
    ScriptException {
        message: String,
        stack: Option<String>,
    },

    #[error("script runtime has been disposed")]
    RuntimeDisposed,

    #[error("script function '{0}' is not defined")]
    FunctionNotFound(String),

    #[error("operation not supported by this engine: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Conversion(#[from] InteropError),

    #[error("engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid runtime config: {0}")]
    Config(#[from] serde_json::Error),
}

impl ScriptError {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::ScriptException {
            message: message.into(),
            stack: None,
        }
    }
}

impl From<rquickjs::Error> for ScriptError {
    fn from(err: rquickjs::Error) -> Self {
        ScriptError::Engine(err.to_string())
    }
}
