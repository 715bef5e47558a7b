use thiserror::Error;

use crate::model::{ParseIdError, ProgressRecordError};
use crate::period::PeriodError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Record(#[from] ProgressRecordError),
    #[error(transparent)]
    Period(#[from] PeriodError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
