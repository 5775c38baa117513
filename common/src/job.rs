use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type JobName = String;

/// Mapa nombre → spec, se usa para resolver dependientes al armar el árbol.
pub type JobSpecMap = HashMap<JobName, JobSpec>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: JobName,

    #[serde(default)]
    pub owner: String,

    pub schedule: JobSchedule,

    pub task: JobTask,

    /// Jobs upstream (dentro del mismo proyecto) de los que depende este job.
    #[serde(default)]
    pub dependencies: Vec<JobName>,
}

impl JobSpec {
    /// Instancias de ejecución del job dentro de `[from, to)`.
    pub fn runs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.schedule.runs_between(from, to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Primer instante en el que corre el job; el resto se alinea a este.
    pub start_date: DateTime<Utc>,
    pub interval: ScheduleInterval,
}

impl JobSchedule {
    pub fn runs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let step = self.interval.as_duration();
        if from >= to || step <= Duration::zero() {
            return Vec::new();
        }

        // saltamos directo a la primera ejecución >= from
        let mut next = Some(self.start_date);
        if self.start_date < from {
            let step_secs = step.num_seconds();
            let behind = (from - self.start_date).num_seconds();
            let steps = (behind + step_secs - 1) / step_secs;
            next = self
                .start_date
                .checked_add_signed(Duration::seconds(steps * step_secs));
        }

        // cerca del máximo representable la siguiente ejecución puede no existir
        let mut runs = Vec::new();
        while let Some(run) = next.filter(|run| *run < to) {
            runs.push(run);
            next = run.checked_add_signed(step);
        }
        runs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleInterval {
    Hourly,
    Daily,
    Weekly,
    EveryMinutes(u32),
}

impl ScheduleInterval {
    pub fn as_duration(&self) -> Duration {
        match self {
            ScheduleInterval::Hourly => Duration::hours(1),
            ScheduleInterval::Daily => Duration::days(1),
            ScheduleInterval::Weekly => Duration::weeks(1),
            ScheduleInterval::EveryMinutes(m) => Duration::minutes(i64::from(*m)),
        }
    }
}

/// Tipos de tarea soportados. Es un conjunto cerrado y se resuelven por nombre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Bq2bq,
    Python,
    Transporter,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Bq2bq => "bq2bq",
            TaskKind::Python => "python",
            TaskKind::Transporter => "transporter",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bq2bq" => Ok(TaskKind::Bq2bq),
            "python" => Ok(TaskKind::Python),
            "transporter" => Ok(TaskKind::Transporter),
            other => Err(format!("tipo de tarea desconocido: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub kind: TaskKind,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Archivo de specs tal como se guarda en disco (un proyecto + sus jobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpecFile {
    pub project: ProjectSpec,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// Indexa una lista de specs por nombre. Si hay nombres repetidos gana el último.
pub fn index_jobs(jobs: impl IntoIterator<Item = JobSpec>) -> Arc<JobSpecMap> {
    Arc::new(jobs.into_iter().map(|j| (j.name.clone(), j)).collect())
}
