//! Wiring of the known report jobs to their dispatch endpoints.
//!
//! The report pipelines (scraping, summarization, channel posting) are
//! owned by the downstream report service. Each scheduled run POSTs to
//! that service's run endpoint and treats a non-2xx response as a failed
//! run. A job with no configured endpoint logs a warning and skips.

use std::time::Duration;

use newsbrief_core::{AppConfig, JobId};
use newsbrief_sched::{job_handler, JobHandler, JobRegistry};

/// Build the production registry from the configured endpoints.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn registry(config: &AppConfig) -> anyhow::Result<JobRegistry> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.job_request_timeout_secs))
        .build()?;

    Ok(JobRegistry::new(
        dispatch_handler(
            JobId::GithubTrends,
            client.clone(),
            config.github_trends_url.clone(),
        ),
        dispatch_handler(
            JobId::FeedsParser,
            client,
            config.feeds_parser_url.clone(),
        ),
    ))
}

fn dispatch_handler(id: JobId, client: reqwest::Client, endpoint: Option<String>) -> JobHandler {
    job_handler(move || {
        let client = client.clone();
        let endpoint = endpoint.clone();
        async move {
            let Some(endpoint) = endpoint else {
                tracing::warn!(job = %id, "no dispatch endpoint configured; skipping run");
                return Ok(());
            };
            dispatch(&client, id, &endpoint).await
        }
    })
}

async fn dispatch(client: &reqwest::Client, id: JobId, endpoint: &str) -> anyhow::Result<()> {
    tracing::info!(job = %id, endpoint, "dispatching run");
    let response = client
        .post(endpoint)
        .json(&serde_json::json!({ "job": id }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("dispatch endpoint returned {status}");
    }
    tracing::info!(job = %id, "dispatch accepted");
    Ok(())
}
