use anyhow::{bail, Context, Result};
use common::{index_jobs, JobSpec, JobSpecFile, JobSpecMap, ProjectSpec};
use glob::glob;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// Specs de un proyecto cargados desde disco.
#[derive(Debug, Clone)]
pub struct LoadedSpecs {
    pub project: ProjectSpec,
    pub jobs: Arc<JobSpecMap>,
}

/// Lee todos los archivos que matchean `pattern` y junta sus jobs.
/// Todos los archivos tienen que pertenecer al mismo proyecto.
pub fn load_job_specs(pattern: &str, project_override: Option<&str>) -> Result<LoadedSpecs> {
    let mut project: Option<ProjectSpec> = None;
    let mut jobs: Vec<JobSpec> = Vec::new();

    let entries = glob(pattern).with_context(|| format!("patrón JOB_SPECS_GLOB inválido: {pattern}"))?;
    for entry in entries {
        let path = match entry {
            Ok(path) if path.is_file() => path,
            Ok(_) => continue,
            Err(e) => {
                warn!("no se pudo leer una entrada de {}: {}", pattern, e);
                continue;
            }
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("no se pudo leer {}", path.display()))?;
        let file: JobSpecFile = serde_json::from_str(&raw)
            .with_context(|| format!("spec inválido en {}", path.display()))?;

        match &project {
            Some(p) if p.name != file.project.name => bail!(
                "{} es del proyecto {} pero ya se cargó {}",
                path.display(),
                file.project.name,
                p.name
            ),
            Some(_) => {}
            None => project = Some(file.project.clone()),
        }

        info!("cargados {} jobs desde {}", file.jobs.len(), path.display());
        jobs.extend(file.jobs);
    }

    let mut project = project.unwrap_or_else(|| ProjectSpec {
        name: String::new(),
        config: HashMap::new(),
    });
    if let Some(name) = project_override {
        project.name = name.to_string();
    }
    if project.name.is_empty() {
        bail!("no hay proyecto: definí REPLAY_PROJECT o agregá specs en {pattern}");
    }

    Ok(LoadedSpecs {
        project,
        jobs: index_jobs(jobs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("job_specs_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn write_spec(dir: &PathBuf, file: &str, project: &str, jobs: &[&str]) {
        let jobs_json: Vec<String> = jobs
            .iter()
            .map(|name| {
                format!(
                    r#"{{"name":"{name}","schedule":{{"start_date":"2021-01-01T00:00:00Z","interval":"daily"}},"task":{{"kind":"python"}}}}"#
                )
            })
            .collect();
        let mut f = fs::File::create(dir.join(file)).unwrap();
        write!(
            f,
            r#"{{"project":{{"name":"{project}"}},"jobs":[{}]}}"#,
            jobs_json.join(",")
        )
        .unwrap();
    }

    #[test]
    fn junta_los_jobs_de_todos_los_archivos() {
        let tmp = temp_dir("merge");
        write_spec(&tmp, "a.json", "proj", &["x", "y"]);
        write_spec(&tmp, "b.json", "proj", &["z"]);

        let pattern = format!("{}/*.json", tmp.display());
        let loaded = load_job_specs(&pattern, None).unwrap();

        assert_eq!(loaded.project.name, "proj");
        let mut names: Vec<&String> = loaded.jobs.keys().collect();
        names.sort();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn proyectos_mezclados_es_error() {
        let tmp = temp_dir("mixed");
        write_spec(&tmp, "a.json", "proj-a", &["x"]);
        write_spec(&tmp, "b.json", "proj-b", &["y"]);

        let pattern = format!("{}/*.json", tmp.display());
        assert!(load_job_specs(&pattern, None).is_err());
    }

    #[test]
    fn sin_archivos_requiere_proyecto() {
        let tmp = temp_dir("empty");
        let pattern = format!("{}/*.json", tmp.display());

        assert!(load_job_specs(&pattern, None).is_err());
        let loaded = load_job_specs(&pattern, Some("proj")).unwrap();
        assert_eq!(loaded.project.name, "proj");
        assert!(loaded.jobs.is_empty());
    }

    #[test]
    fn json_invalido_es_error() {
        let tmp = temp_dir("broken");
        fs::write(tmp.join("roto.json"), "{no es json").unwrap();

        let pattern = format!("{}/*.json", tmp.display());
        let err = load_job_specs(&pattern, None).unwrap_err();
        assert!(format!("{err:#}").contains("roto.json"));
    }
}
