use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::{QuestionError, ResultError, SettingsError, TestError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Test(#[from] TestError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
