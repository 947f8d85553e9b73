use log::warn;
use std::path::PathBuf;
use thiserror::Error;

/// Non-fatal problems met while concatenating files.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConcatWarning {
    #[error("input {} is empty", .path.display())]
    EmptyInput { path: PathBuf },

    #[error("header of {} differs from the first input; keeping the first header", .path.display())]
    MismatchedHeader { path: PathBuf },
}

/// Outcome of a concatenation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConcatReport {
    /// Data records written, headers excluded.
    pub records: usize,
    pub warnings: Vec<ConcatWarning>,
}

impl ConcatReport {
    pub(crate) fn warn(&mut self, warning: ConcatWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}
