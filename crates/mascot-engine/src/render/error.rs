use thiserror::Error;

use crate::drawable::DrawableError;

use super::BackendError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer was already started with a view")]
    AlreadyStarted,

    #[error("renderer has not been started with a view")]
    NotStarted,

    #[error(transparent)]
    Drawable(#[from] DrawableError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
