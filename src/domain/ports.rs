use crate::domain::model::{Extraction, Issue, ReportBundle};
use crate::utils::error::Result;
use std::future::Future;

pub trait Storage: Send + Sync {
    fn write_file(&self, path: &str, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Single-issue lookup. Implementations are expected to memoize for the
/// lifetime of the run and to map restricted issues (400/401) to `None`.
pub trait IssueSource: Send + Sync {
    fn issue(&self, id: u64) -> impl Future<Output = Result<Option<Issue>>> + Send;
}

pub trait Pipeline: Send + Sync {
    fn extract(&self) -> impl Future<Output = Result<Extraction>> + Send;
    fn transform(&self, extraction: Extraction)
        -> impl Future<Output = Result<ReportBundle>> + Send;
    fn load(&self, bundle: ReportBundle) -> impl Future<Output = Result<String>> + Send;
}
