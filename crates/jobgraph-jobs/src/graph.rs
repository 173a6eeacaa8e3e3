//! Dependency graph resolution.
//!
//! [`GraphResolver::build`] validates a batch of jobs and derives everything the
//! scheduler needs to release jobs as their dependencies succeed:
//!
//! - the in-degree of every job (number of distinct dependencies)
//! - the reverse adjacency (dependency -> dependents)
//! - the seed set of jobs with no dependencies, in submission order
//! - one topological order, computed with Kahn's algorithm
//!
//! Resolution is pure: building twice from the same input yields equal graphs.

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{JobId, JobSpec};
use std::collections::{HashMap, HashSet, VecDeque};

/// Validated, acyclic dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyGraph {
    /// Jobs in submission order.
    jobs: Vec<JobId>,
    in_degree: HashMap<JobId, usize>,
    dependents: HashMap<JobId, Vec<JobId>>,
    seeds: Vec<JobId>,
    order: Vec<JobId>,
}

impl ReadyGraph {
    /// Number of jobs in the graph.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the graph has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs in submission order.
    pub fn jobs(&self) -> &[JobId] {
        &self.jobs
    }

    /// Initial number of unresolved dependencies of a job.
    pub fn in_degree(&self, id: &JobId) -> Option<usize> {
        self.in_degree.get(id).copied()
    }

    /// Initial in-degree of every job.
    pub fn in_degrees(&self) -> &HashMap<JobId, usize> {
        &self.in_degree
    }

    /// Jobs that depend directly on `id`, in submission order.
    pub fn dependents(&self, id: &JobId) -> &[JobId] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    /// Jobs with no dependencies, in submission order.
    pub fn seeds(&self) -> &[JobId] {
        &self.seeds
    }

    /// A valid execution order: every job follows all of its dependencies.
    pub fn topological_order(&self) -> &[JobId] {
        &self.order
    }
}

/// Builds [`ReadyGraph`]s from submitted jobs.
pub struct GraphResolver;

impl GraphResolver {
    /// Resolve a batch of job specs.
    pub fn build(jobs: &[JobSpec]) -> SchedulerResult<ReadyGraph> {
        Self::build_edges(jobs.iter().map(|job| (&job.id, job.dependencies.as_slice())))
    }

    /// Resolve a batch given as `(job, dependencies)` pairs.
    pub fn build_edges<'a, I>(edges: I) -> SchedulerResult<ReadyGraph>
    where
        I: IntoIterator<Item = (&'a JobId, &'a [JobId])>,
    {
        let edges: Vec<(&JobId, &[JobId])> = edges.into_iter().collect();

        let mut jobs = Vec::with_capacity(edges.len());
        let mut known = HashSet::with_capacity(edges.len());
        for (id, _) in &edges {
            if !known.insert(*id) {
                return Err(SchedulerError::DuplicateJob((*id).clone()));
            }
            jobs.push((*id).clone());
        }

        let mut in_degree: HashMap<JobId, usize> = HashMap::with_capacity(edges.len());
        let mut dependents: HashMap<JobId, Vec<JobId>> = HashMap::new();

        for (id, deps) in &edges {
            let mut seen = HashSet::with_capacity(deps.len());
            for dep in deps.iter() {
                if !known.contains(dep) {
                    return Err(SchedulerError::UnknownDependency {
                        job: (*id).clone(),
                        dependency: dep.clone(),
                    });
                }
                // Repeated entries count once.
                if seen.insert(dep) {
                    dependents.entry(dep.clone()).or_default().push((*id).clone());
                }
            }
            in_degree.insert((*id).clone(), seen.len());
        }

        let seeds: Vec<JobId> = jobs
            .iter()
            .filter(|id| in_degree.get(*id) == Some(&0))
            .cloned()
            .collect();

        let order = kahn_order(&jobs, &in_degree, &dependents, &seeds)?;

        Ok(ReadyGraph {
            jobs,
            in_degree,
            dependents,
            seeds,
            order,
        })
    }
}

/// Kahn's algorithm over a working copy of the in-degrees.
fn kahn_order(
    jobs: &[JobId],
    in_degree: &HashMap<JobId, usize>,
    dependents: &HashMap<JobId, Vec<JobId>>,
    seeds: &[JobId],
) -> SchedulerResult<Vec<JobId>> {
    let mut remaining = in_degree.clone();
    let mut queue: VecDeque<&JobId> = seeds.iter().collect();
    let mut order = Vec::with_capacity(jobs.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = remaining.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() < jobs.len() {
        let stuck: Vec<JobId> = jobs
            .iter()
            .filter(|id| remaining.get(*id).is_some_and(|d| *d > 0))
            .cloned()
            .collect();
        return Err(SchedulerError::Cycle { jobs: stuck });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<JobId> {
        names.iter().map(|n| JobId::from(*n)).collect()
    }

    fn build(spec: &[(&str, &[&str])]) -> SchedulerResult<ReadyGraph> {
        let owned: Vec<(JobId, Vec<JobId>)> = spec
            .iter()
            .map(|(id, deps)| (JobId::from(*id), ids(deps)))
            .collect();
        GraphResolver::build_edges(owned.iter().map(|(id, deps)| (id, deps.as_slice())))
    }

    #[test]
    fn test_in_degrees_and_seeds() {
        let graph = build(&[("a", &[]), ("b", &[]), ("c", &["a", "b"])]).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.in_degree(&"a".into()), Some(0));
        assert_eq!(graph.in_degree(&"c".into()), Some(2));
        assert_eq!(graph.seeds(), ids(&["a", "b"]).as_slice());
        assert_eq!(graph.dependents(&"a".into()), ids(&["c"]).as_slice());
        assert!(graph.dependents(&"c".into()).is_empty());
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let graph = build(&[
            ("deploy", &["test", "package"]),
            ("test", &["build"]),
            ("package", &["build"]),
            ("build", &[]),
        ])
        .unwrap();

        let order = graph.topological_order();
        let pos = |name: &str| order.iter().position(|id| id.as_str() == name).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("build") < pos("test"));
        assert!(pos("build") < pos("package"));
        assert!(pos("test") < pos("deploy"));
        assert!(pos("package") < pos("deploy"));
    }

    #[test]
    fn test_two_node_cycle() {
        let err = build(&[("x", &["y"]), ("y", &["x"])]).unwrap_err();
        assert_eq!(err.cycle_members(), Some(ids(&["x", "y"]).as_slice()));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let err = build(&[("a", &[]), ("loop", &["loop"])]).unwrap_err();
        assert_eq!(err.cycle_members(), Some(ids(&["loop"]).as_slice()));
    }

    #[test]
    fn test_cycle_reports_unprocessed_jobs() {
        // "after" is not on the cycle but can never be released either.
        let err = build(&[
            ("root", &[]),
            ("p", &["root", "q"]),
            ("q", &["p"]),
            ("after", &["q"]),
        ])
        .unwrap_err();
        assert_eq!(err.cycle_members(), Some(ids(&["p", "q", "after"]).as_slice()));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = build(&[("deploy", &["build"])]).unwrap_err();
        match err {
            SchedulerError::UnknownDependency { job, dependency } => {
                assert_eq!(job.as_str(), "deploy");
                assert_eq!(dependency.as_str(), "build");
            }
            other => panic!("Expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_job() {
        let err = build(&[("a", &[]), ("a", &[])]).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob(ref id) if id.as_str() == "a"));
    }

    #[test]
    fn test_repeated_dependency_counts_once() {
        let graph = build(&[("a", &[]), ("b", &["a", "a"])]).unwrap();
        assert_eq!(graph.in_degree(&"b".into()), Some(1));
        assert_eq!(graph.dependents(&"a".into()), ids(&["b"]).as_slice());
    }

    #[test]
    fn test_build_is_idempotent() {
        let spec: &[(&str, &[&str])] = &[("a", &[]), ("b", &["a"]), ("c", &["a", "b"]), ("d", &[])];
        let first = build(spec).unwrap();
        let second = build(spec).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.in_degrees(), second.in_degrees());
        assert_eq!(first.seeds(), second.seeds());
    }

    #[test]
    fn test_empty_graph() {
        let graph = build(&[]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.seeds().is_empty());
        assert!(graph.topological_order().is_empty());
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let names: Vec<String> = (0..50_000).map(|i| format!("job-{i}")).collect();
        let owned: Vec<(JobId, Vec<JobId>)> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let deps = if i == 0 {
                    Vec::new()
                } else {
                    vec![JobId::from(names[i - 1].as_str())]
                };
                (JobId::from(name.as_str()), deps)
            })
            .collect();

        let graph =
            GraphResolver::build_edges(owned.iter().map(|(id, deps)| (id, deps.as_slice()))).unwrap();
        assert_eq!(graph.topological_order().len(), 50_000);
        assert_eq!(graph.seeds().len(), 1);
    }
}
