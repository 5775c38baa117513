use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::job::{JobSpec, JobSpecMap};
use crate::replay::{date_window, ReplayRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("rango inválido: start {start} es posterior a end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("job desconocido: {0}")]
    UnknownJob(String),

    #[error("dependencia cíclica detectada en el job {0}")]
    CyclicDependency(String),

    #[error("rango fuera de lo representable: {start} → {end}")]
    OutOfBounds { start: NaiveDate, end: NaiveDate },
}

/// Un job dentro del árbol junto con las ejecuciones que toca el rango pedido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub runs: BTreeSet<DateTime<Utc>>,
    /// Jobs downstream directos (dentro del árbol).
    pub dependents: Vec<String>,
}

impl TreeNode {
    /// Primera ejecución compartida con otro nodo, si la hay.
    pub fn first_shared_run(&self, other: &TreeNode) -> Option<DateTime<Utc>> {
        self.runs.intersection(&other.runs).next().copied()
    }
}

/// Árbol de dependencias de un replay: el job pedido más todos sus
/// dependientes downstream. Se arma de cero para cada pedido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTree {
    pub root: String,
    pub nodes: BTreeMap<String, TreeNode>,
}

impl DependencyTree {
    pub fn node(&self, name: &str) -> Option<&TreeNode> {
        self.nodes.get(name)
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn total_runs(&self) -> usize {
        self.nodes.values().map(|n| n.runs.len()).sum()
    }

    /// Nodos en orden BFS desde la raíz: un upstream siempre aparece
    /// antes que sus dependientes directos.
    pub fn walk_order(&self) -> Vec<&TreeNode> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::from([self.root.as_str()]);

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(node) = self.nodes.get(name) {
                order.push(node);
                queue.extend(node.dependents.iter().map(|d| d.as_str()));
            }
        }
        order
    }
}

/// Arma el árbol de un pedido de replay.
pub fn prepare_tree(request: &ReplayRequest) -> Result<DependencyTree, TreeError> {
    build_tree(
        &request.job,
        request.start_date,
        request.end_date,
        &request.job_spec_map,
    )
}

/// Igual que `prepare_tree` pero resolviendo el job raíz por nombre.
pub fn prepare_tree_for(
    job_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    job_spec_map: &JobSpecMap,
) -> Result<DependencyTree, TreeError> {
    let root = job_spec_map
        .get(job_name)
        .ok_or_else(|| TreeError::UnknownJob(job_name.to_string()))?;
    build_tree(root, start, end, job_spec_map)
}

fn build_tree(
    root: &JobSpec,
    start: NaiveDate,
    end: NaiveDate,
    job_spec_map: &JobSpecMap,
) -> Result<DependencyTree, TreeError> {
    if start > end {
        return Err(TreeError::InvalidRange { start, end });
    }

    let downstream = downstream_index(job_spec_map);
    let (from, to) = date_window(start, end).ok_or(TreeError::OutOfBounds { start, end })?;

    let mut nodes = BTreeMap::new();
    let mut visiting = HashSet::new();
    visit(
        root,
        &downstream,
        job_spec_map,
        (from, to),
        &mut visiting,
        &mut nodes,
    )?;

    Ok(DependencyTree {
        root: root.name.clone(),
        nodes,
    })
}

/// upstream → dependientes, ordenados para que el árbol sea determinístico.
fn downstream_index(job_spec_map: &JobSpecMap) -> HashMap<&str, Vec<&str>> {
    let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
    for spec in job_spec_map.values() {
        for upstream in &spec.dependencies {
            index.entry(upstream.as_str()).or_default().push(spec.name.as_str());
        }
    }
    for dependents in index.values_mut() {
        dependents.sort_unstable();
        dependents.dedup();
    }
    index
}

fn visit(
    spec: &JobSpec,
    downstream: &HashMap<&str, Vec<&str>>,
    job_spec_map: &JobSpecMap,
    window: (DateTime<Utc>, DateTime<Utc>),
    visiting: &mut HashSet<String>,
    nodes: &mut BTreeMap<String, TreeNode>,
) -> Result<(), TreeError> {
    if visiting.contains(&spec.name) {
        return Err(TreeError::CyclicDependency(spec.name.clone()));
    }
    if nodes.contains_key(&spec.name) {
        // ya lo recorrimos por otro camino (diamante)
        return Ok(());
    }

    visiting.insert(spec.name.clone());

    let dependents: Vec<String> = downstream
        .get(spec.name.as_str())
        .map(|d| d.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default();

    for name in &dependents {
        let child = job_spec_map
            .get(name)
            .ok_or_else(|| TreeError::UnknownJob(name.clone()))?;
        visit(child, downstream, job_spec_map, window, visiting, nodes)?;
    }

    visiting.remove(&spec.name);

    let runs = spec.runs_between(window.0, window.1).into_iter().collect();
    nodes.insert(
        spec.name.clone(),
        TreeNode {
            name: spec.name.clone(),
            runs,
            dependents,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{index_jobs, JobSchedule, JobTask, ProjectSpec, ScheduleInterval, TaskKind};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn job(name: &str, deps: &[&str], interval: ScheduleInterval) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            owner: "data-eng".to_string(),
            schedule: JobSchedule {
                start_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                interval,
            },
            task: JobTask {
                kind: TaskKind::Bq2bq,
                config: HashMap::new(),
            },
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(root: &str, jobs: Vec<JobSpec>, start: NaiveDate, end: NaiveDate) -> ReplayRequest {
        let map = index_jobs(jobs);
        let root = map[root].clone();
        ReplayRequest::new(
            root,
            start,
            end,
            ProjectSpec {
                name: "proj".to_string(),
                config: HashMap::new(),
            },
            map,
        )
    }

    #[test]
    fn arbol_incluye_dependientes_transitivos() {
        let jobs = vec![
            job("x", &[], ScheduleInterval::Daily),
            job("y", &["x"], ScheduleInterval::Daily),
            job("z", &["y"], ScheduleInterval::Daily),
            job("otro", &[], ScheduleInterval::Daily),
        ];
        let req = request("x", jobs, date(2021, 1, 1), date(2021, 1, 3));

        let tree = prepare_tree(&req).unwrap();

        let names: Vec<&str> = tree.nodes.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert_eq!(tree.root, "x");
        assert_eq!(tree.node("x").unwrap().dependents, vec!["y".to_string()]);
        assert_eq!(tree.node("z").unwrap().runs.len(), 3);
        assert_eq!(tree.total_runs(), 9);
    }

    #[test]
    fn cada_nodo_usa_su_propio_intervalo() {
        let jobs = vec![
            job("x", &[], ScheduleInterval::Daily),
            job("y", &["x"], ScheduleInterval::Hourly),
        ];
        let req = request("x", jobs, date(2021, 1, 1), date(2021, 1, 1));

        let tree = prepare_tree(&req).unwrap();

        assert_eq!(tree.node("x").unwrap().runs.len(), 1);
        assert_eq!(tree.node("y").unwrap().runs.len(), 24);
    }

    #[test]
    fn diamante_no_duplica_nodos() {
        let jobs = vec![
            job("a", &[], ScheduleInterval::Daily),
            job("b", &["a"], ScheduleInterval::Daily),
            job("c", &["a"], ScheduleInterval::Daily),
            job("d", &["b", "c"], ScheduleInterval::Daily),
        ];
        let req = request("a", jobs, date(2021, 1, 1), date(2021, 1, 1));

        let tree = prepare_tree(&req).unwrap();
        assert_eq!(tree.nodes.len(), 4);

        let order: Vec<&str> = tree.walk_order().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn ciclo_entre_dependientes_devuelve_error() {
        let jobs = vec![
            job("a", &[], ScheduleInterval::Daily),
            job("b", &["a", "c"], ScheduleInterval::Daily),
            job("c", &["b"], ScheduleInterval::Daily),
        ];
        let req = request("a", jobs, date(2021, 1, 1), date(2021, 1, 1));

        let err = prepare_tree(&req).unwrap_err();
        assert!(matches!(err, TreeError::CyclicDependency(_)));
    }

    #[test]
    fn rango_invertido_devuelve_error() {
        let jobs = vec![job("x", &[], ScheduleInterval::Daily)];
        let req = request("x", jobs, date(2021, 1, 5), date(2021, 1, 1));

        assert_eq!(
            prepare_tree(&req).unwrap_err(),
            TreeError::InvalidRange {
                start: date(2021, 1, 5),
                end: date(2021, 1, 1)
            }
        );
    }

    #[test]
    fn rango_hasta_la_fecha_maxima_devuelve_error() {
        let jobs = vec![job("x", &[], ScheduleInterval::Weekly)];
        let start = NaiveDate::MAX - chrono::Duration::days(20);
        let req = request("x", jobs, start, NaiveDate::MAX);

        assert_eq!(
            prepare_tree(&req).unwrap_err(),
            TreeError::OutOfBounds {
                start,
                end: NaiveDate::MAX
            }
        );
    }

    #[test]
    fn job_semanal_cerca_de_la_fecha_maxima_no_desborda() {
        let jobs = vec![
            job("x", &[], ScheduleInterval::Weekly),
            job("y", &["x"], ScheduleInterval::Daily),
        ];
        let end = NaiveDate::MAX - chrono::Duration::days(1);
        let start = end - chrono::Duration::days(20);
        let req = request("x", jobs, start, end);

        let tree = prepare_tree(&req).unwrap();
        assert_eq!(tree.node("x").unwrap().runs.len(), 3);
        assert_eq!(tree.node("y").unwrap().runs.len(), 21);
    }

    #[test]
    fn prepare_tree_for_job_inexistente() {
        let map = index_jobs(vec![job("x", &[], ScheduleInterval::Daily)]);
        let err = prepare_tree_for("nope", date(2021, 1, 1), date(2021, 1, 1), &map).unwrap_err();
        assert_eq!(err, TreeError::UnknownJob("nope".to_string()));
    }

    #[test]
    fn arbol_es_funcion_pura_del_pedido() {
        let jobs = vec![
            job("x", &[], ScheduleInterval::Daily),
            job("y", &["x"], ScheduleInterval::Daily),
        ];
        let req = request("x", jobs, date(2021, 1, 1), date(2021, 1, 2));

        assert_eq!(prepare_tree(&req).unwrap(), prepare_tree(&req).unwrap());
    }
}
