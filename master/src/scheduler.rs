use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProjectSpec;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Scheduler externo donde realmente corren los jobs.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Limpia (y por lo tanto re-ejecuta) las corridas de `job_name`
    /// entre `from` y `to`, ambos inclusive.
    async fn clear_runs(
        &self,
        project: &ProjectSpec,
        job_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ClearRunsBody<'a> {
    project: &'a str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    only_failed: bool,
    dry_run: bool,
}

pub struct HttpSchedulerClient {
    client: Client,
    base_url: String,
}

impl HttpSchedulerClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("no se pudo crear el cliente HTTP del scheduler")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    async fn clear_runs(
        &self,
        project: &ProjectSpec,
        job_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let url = format!(
            "{}/api/v1/dags/{}/clearTaskInstances",
            self.base_url, job_name
        );
        debug!("clear de {} entre {} y {} en {}", job_name, from, to, url);

        self.client
            .post(&url)
            .json(&ClearRunsBody {
                project: &project.name,
                start_date: from,
                end_date: to,
                only_failed: false,
                dry_run: false,
            })
            .send()
            .await
            .with_context(|| format!("error HTTP al llamar a {url}"))?
            .error_for_status()
            .with_context(|| format!("el scheduler rechazó el clear de {job_name}"))?;

        Ok(())
    }
}
