use anyhow::{bail, Context, Result};
use std::{env, str::FromStr, time::Duration};

use crate::replay::{ConflictPolicy, ReplayManagerConfig};

pub const DEFAULT_NUM_WORKERS: usize = 2;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_QUEUE_CAPACITY: usize = 0;
pub const DEFAULT_SCHEDULER_TIMEOUT_SECS: u64 = 30;

/// Configuración del master, toda desde variables de entorno.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub listen_addr: String,
    pub scheduler_url: String,
    pub scheduler_timeout: Duration,
    /// Patrón de archivos JSON con specs de jobs, ej: "/etc/replay/jobs/*.json"
    pub job_specs_glob: String,
    /// Nombre del proyecto si los archivos de specs no lo traen
    pub project: Option<String>,
    pub replay: ReplayManagerConfig,
}

impl MasterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let num_workers: usize = parse_or(&lookup, "REPLAY_NUM_WORKERS", DEFAULT_NUM_WORKERS)?;
        if num_workers == 0 {
            bail!("REPLAY_NUM_WORKERS tiene que ser mayor a 0");
        }

        let worker_timeout_secs: u64 = parse_or(
            &lookup,
            "REPLAY_WORKER_TIMEOUT_SECS",
            DEFAULT_WORKER_TIMEOUT_SECS,
        )?;
        let queue_capacity: usize =
            parse_or(&lookup, "REPLAY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        let conflict_policy: ConflictPolicy = match lookup("REPLAY_CONFLICT_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("REPLAY_CONFLICT_POLICY inválida")?,
            None => ConflictPolicy::default(),
        };
        let scheduler_timeout_secs: u64 = parse_or(
            &lookup,
            "SCHEDULER_TIMEOUT_SECS",
            DEFAULT_SCHEDULER_TIMEOUT_SECS,
        )?;

        Ok(Self {
            listen_addr: lookup("MASTER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            scheduler_url: lookup("SCHEDULER_URL")
                .unwrap_or_else(|| "http://scheduler:8080".to_string()),
            scheduler_timeout: Duration::from_secs(scheduler_timeout_secs),
            job_specs_glob: lookup("JOB_SPECS_GLOB")
                .unwrap_or_else(|| "/data/jobs/*.json".to_string()),
            project: lookup("REPLAY_PROJECT"),
            replay: ReplayManagerConfig {
                num_workers,
                worker_timeout: Duration::from_secs(worker_timeout_secs),
                queue_capacity,
                conflict_policy,
            },
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}={raw} inválido: {e}")),
        None => Ok(default),
    }
}
