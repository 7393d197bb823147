//! Handler registry for the known jobs.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use newsbrief_core::JobId;

/// Opaque zero-argument async job handler. The scheduler never inspects the
/// result beyond logging a failure.
pub type JobHandler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Adapt a plain async function (or closure) into a [`JobHandler`].
pub fn job_handler<F, Fut>(f: F) -> JobHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

pub(crate) struct JobDefinition {
    pub id: JobId,
    pub handler: JobHandler,
}

/// One handler per known job, fixed at construction.
///
/// Taking a dedicated argument per [`JobId`] variant keeps the mapping
/// exhaustive: adding a variant breaks this constructor until the new job
/// is wired.
pub struct JobRegistry {
    definitions: Vec<JobDefinition>,
}

impl JobRegistry {
    #[must_use]
    pub fn new(github_trends: JobHandler, feeds_parser: JobHandler) -> Self {
        Self {
            definitions: vec![
                JobDefinition {
                    id: JobId::GithubTrends,
                    handler: github_trends,
                },
                JobDefinition {
                    id: JobId::FeedsParser,
                    handler: feeds_parser,
                },
            ],
        }
    }

    pub(crate) fn definitions(&self) -> &[JobDefinition] {
        &self.definitions
    }

    pub(crate) fn handler(&self, id: JobId) -> Option<JobHandler> {
        self.definitions
            .iter()
            .find(|def| def.id == id)
            .map(|def| Arc::clone(&def.handler))
    }
}
