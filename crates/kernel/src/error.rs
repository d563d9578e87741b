use stride_common::CallbackError;
use stride_ecs::StoreError;

use crate::config::ConfigError;

/// Failures reported by the window, graphics or sound collaborators.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("window: {0}")]
    Window(String),
    #[error("graphics: {0}")]
    Graphics(String),
    #[error("sound: {0}")]
    Sound(String),
}

/// Everything that can unwind out of a frame or out of `Engine::run`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A user callback failed. Displayed exactly as the callback reported it.
    #[error("{0}")]
    Callback(CallbackError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<CallbackError> for EngineError {
    fn from(err: CallbackError) -> Self {
        Self::Callback(err)
    }
}

impl EngineError {
    /// The original callback error, if this is one.
    pub fn callback(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Callback(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
