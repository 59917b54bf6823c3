use std::collections::{HashMap, HashSet};

use crate::error::PlanValidationError;

/// Common task interface for graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// Task dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, T>,

    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl<T: TaskLike> TaskGraph<T> {
    /// Construct task graph from task list
    pub fn from_tasks(tasks: &[T]) -> Result<Self, PlanValidationError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for (position, task) in tasks.iter().enumerate() {
            if task.id().trim().is_empty() {
                return Err(PlanValidationError::EmptyTaskId(position));
            }
            if nodes.contains_key(task.id()) {
                return Err(PlanValidationError::DuplicateTaskId(task.id().to_string()));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    /// Validate dependency relationships: every dependency must name a task in
    /// the same graph and the graph must be acyclic.
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        for task_id in &self.insertion_order {
            for dep in self.dependencies_of(task_id) {
                if dep == task_id {
                    return Err(PlanValidationError::SelfDependency(task_id.clone()));
                }
                if !self.nodes.contains_key(dep) {
                    return Err(PlanValidationError::DependencyNotFound {
                        task_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(PlanValidationError::CircularDependency(cycle));
        }

        Ok(())
    }

    /// Topological sort using Kahn's algorithm.
    ///
    /// Returns stages: every task in a stage depends only on tasks of earlier
    /// stages. Within a stage tasks keep their declaration order.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, PlanValidationError> {
        // edges[A] = [B, C] means A depends on B and C, so A's in-degree = 2
        let mut in_degree: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .map(|id| (id.as_str(), self.dependencies_of(id).len()))
            .collect();

        let mut stages: Vec<Vec<String>> = Vec::new();
        let mut current_stage: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()) == Some(&0))
            .cloned()
            .collect();

        let mut processed = 0;

        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut next_stage = Vec::new();
            for task_id in &current_stage {
                let Some(dependents) = self.reverse_edges.get(task_id) else {
                    continue;
                };
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next_stage.push(dependent.clone());
                        }
                    }
                }
            }

            // Preserve input order
            next_stage.sort_by_key(|id| self.position(id));
            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        if processed != self.nodes.len() {
            return Err(PlanValidationError::CircularDependency(
                "Unable to complete topological sort (cycle detected)".to_string(),
            ));
        }

        Ok(stages)
    }

    pub fn dependencies_of(&self, task_id: &str) -> &[String] {
        self.edges.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, task_id: &str) -> &[String] {
        self.reverse_edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn position(&self, task_id: &str) -> usize {
        self.insertion_order
            .iter()
            .position(|k| k == task_id)
            .unwrap_or(usize::MAX)
    }

    /// Detect circular dependencies using DFS, walking tasks in declaration
    /// order so the reported path is deterministic.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.dependencies_of(node) {
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                stack.push(dep.clone());
                *stack = stack[pos..].to_vec();
                return true;
            }

            if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        id: String,
        deps: Vec<String>,
    }

    impl TaskLike for Node {
        fn id(&self) -> &str {
            &self.id
        }

        fn dependencies(&self) -> &[String] {
            &self.deps
        }
    }

    fn node(id: &str, deps: &[&str]) -> Node {
        Node {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_stages_follow_dependencies() {
        let graph = TaskGraph::from_tasks(&[
            node("a", &[]),
            node("b", &["a"]),
            node("c", &[]),
            node("d", &["b", "c"]),
        ])
        .unwrap();
        graph.validate().unwrap();

        let stages = graph.topological_sort().unwrap();
        assert_eq!(
            stages,
            vec![
                vec!["a".to_string(), "c".to_string()],
                vec!["b".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = TaskGraph::from_tasks(&[node("a", &[]), node("a", &[])]).unwrap_err();
        assert_eq!(err, PlanValidationError::DuplicateTaskId("a".to_string()));
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let graph = TaskGraph::from_tasks(&[node("a", &["ghost"])]).unwrap();
        assert_eq!(
            graph.validate().unwrap_err(),
            PlanValidationError::DependencyNotFound {
                task_id: "a".to_string(),
                missing_dep: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn test_cycle_reports_path() {
        let graph = TaskGraph::from_tasks(&[
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
        ])
        .unwrap();

        match graph.validate() {
            Err(PlanValidationError::CircularDependency(path)) => {
                assert_eq!(path, "a -> c -> b -> a");
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(graph.topological_sort().is_err());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let graph = TaskGraph::from_tasks(&[node("a", &["a"])]).unwrap();
        assert_eq!(
            graph.validate().unwrap_err(),
            PlanValidationError::SelfDependency("a".to_string())
        );
    }
}
