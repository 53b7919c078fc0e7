use thiserror::Error;

use crate::model::{ParseIdError, ProgressError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
