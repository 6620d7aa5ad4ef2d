//! Dependency graph utility.
//!
//! A [`DependencyGraph`] is an edge list of `(dependent, provider)` pairs.  It
//! answers two questions for the plugin container:
//!
//! - Is there a cycle?  ([`topological_order`](DependencyGraph::topological_order)
//!   fails with a [`CycleError`] carrying the offending chain.)
//! - In what order can a sub-graph be torn down?  (The same order, dependents
//!   first, restricted via [`dependents_of`](DependencyGraph::dependents_of).)
//!
//! Node order is first-seen order, which keeps every result deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use thiserror::Error;

/// A dependency cycle was found.
///
/// `path` is closed: its first and last element are the same node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle: {}", display_path(.path))]
pub struct CycleError<N: fmt::Display + fmt::Debug> {
    pub path: Vec<N>,
}

fn display_path<N: fmt::Display>(path: &[N]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Directed graph with edges pointing from a dependent to its provider.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
    nodes: Vec<N>,
    index: HashMap<N, usize>,
    edges: Vec<(usize, usize)>,
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }
}

impl<N> DependencyGraph<N>
where
    N: Clone + Eq + Hash + fmt::Display + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, node: N) -> usize {
        if let Some(&i) = self.index.get(&node) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(node.clone(), i);
        self.nodes.push(node);
        i
    }

    /// Adds a node without edges.  Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: N) {
        self.intern(node);
    }

    /// Adds the edge `dependent → provider`.  Duplicate edges are ignored.
    pub fn add_edge(&mut self, dependent: N, provider: N) {
        let from = self.intern(dependent);
        let to = self.intern(provider);
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over the edges as `(dependent, provider)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&N, &N)> + '_ {
        self.edges
            .iter()
            .map(|&(from, to)| (&self.nodes[from], &self.nodes[to]))
    }

    /// Orders every node so that each dependent comes before its providers.
    ///
    /// Kahn's algorithm: a node is emitted once nothing left in the graph
    /// depends on it.  Ties are broken by first-seen order.
    pub fn topological_order(&self) -> Result<Vec<N>, CycleError<N>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut providers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(from, to) in &self.edges {
            providers[from].push(to);
            in_degree[to] += 1;
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = queue.pop_front() {
            order.push(self.nodes[i].clone());
            for &p in &providers[i] {
                in_degree[p] -= 1;
                if in_degree[p] == 0 {
                    queue.push_back(p);
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }

        let stuck: HashSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
        Err(CycleError {
            path: self.trace_cycle(&providers, &stuck),
        })
    }

    /// Walks provider edges inside the unresolved set until a node repeats.
    ///
    /// Every unresolved node still has an unresolved dependent, so walking
    /// *backwards* is what is guaranteed to loop; the chain is reversed at the
    /// end to read dependent → provider.
    fn trace_cycle(&self, providers: &[Vec<usize>], stuck: &HashSet<usize>) -> Vec<N> {
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (from, tos) in providers.iter().enumerate() {
            for &to in tos {
                dependents[to].push(from);
            }
        }

        let Some(&start) = stuck.iter().min() else {
            return Vec::new();
        };
        let mut walk = vec![start];
        let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let Some(&next) = dependents[current].iter().find(|&&d| stuck.contains(&d)) else {
                return walk.into_iter().map(|i| self.nodes[i].clone()).collect();
            };
            if let Some(&pos) = seen.get(&next) {
                let mut cycle: Vec<N> = walk[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].clone())
                    .collect();
                cycle.push(self.nodes[next].clone());
                cycle.reverse();
                return cycle;
            }
            seen.insert(next, walk.len());
            walk.push(next);
            current = next;
        }
    }

    /// Returns the sub-graph of everything that depends on `target`.
    ///
    /// An edge is kept when its provider is `target` or a node already known to
    /// depend on `target`; this is repeated until no new edge is found.
    pub fn dependents_of(&self, target: &N) -> DependencyGraph<N> {
        let mut closure = DependencyGraph::new();
        let Some(&root) = self.index.get(target) else {
            return closure;
        };
        closure.add_node(target.clone());

        let mut reached: HashSet<usize> = HashSet::from([root]);
        let mut kept: Vec<bool> = vec![false; self.edges.len()];
        loop {
            let mut grew = false;
            for (e, &(from, to)) in self.edges.iter().enumerate() {
                if !kept[e] && reached.contains(&to) {
                    kept[e] = true;
                    grew |= reached.insert(from);
                    closure.add_edge(self.nodes[from].clone(), self.nodes[to].clone());
                }
            }
            if !grew {
                break;
            }
        }
        closure
    }

    /// Teardown order for `target`: its dependents first, `target` last.
    ///
    /// The closure is sorted once and cut right after `target`.
    pub fn teardown_order(&self, target: &N) -> Result<Vec<N>, CycleError<N>> {
        let mut order = self.dependents_of(target).topological_order()?;
        match order.iter().position(|n| n == target) {
            Some(pos) => {
                order.truncate(pos + 1);
                Ok(order)
            }
            None => Ok(vec![target.clone()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &'static str)]) -> DependencyGraph<&'static str> {
        let mut g = DependencyGraph::new();
        for &(from, to) in edges {
            g.add_edge(from, to);
        }
        g
    }

    #[test]
    fn test_chain_order() {
        let g = graph(&[("b", "a"), ("c", "b")]);
        assert_eq!(g.topological_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_order() {
        let g = graph(&[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")]);
        let order = g.topological_order().unwrap();
        let pos = |n| order.iter().position(|x| *x == n).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn test_cycle_reports_closed_path() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("x", "a")]);
        let err = g.topological_order().unwrap_err();

        assert_eq!(err.path.first(), err.path.last());
        assert_eq!(err.path.len(), 4);
        assert!(!err.path.contains(&"x"));
        assert!(err.to_string().starts_with("dependency cycle: "));
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let g = graph(&[("a", "a")]);
        let err = g.topological_order().unwrap_err();
        assert_eq!(err.path, vec!["a", "a"]);
    }

    #[test]
    fn test_dependents_of_skips_unrelated() {
        let g = graph(&[("b", "a"), ("c", "b"), ("x", "y"), ("b", "z")]);
        let closure = g.dependents_of(&"a");

        assert!(closure.contains(&"b"));
        assert!(closure.contains(&"c"));
        assert!(!closure.contains(&"x"));
        assert!(!closure.contains(&"z"));
    }

    #[test]
    fn test_teardown_order_ends_with_target() {
        let g = graph(&[("b", "a"), ("c", "b"), ("c", "a")]);
        assert_eq!(g.teardown_order(&"a").unwrap(), vec!["c", "b", "a"]);
        assert_eq!(g.teardown_order(&"c").unwrap(), vec!["c"]);
    }

    #[test]
    fn test_teardown_order_unknown_node() {
        let g = graph(&[("b", "a")]);
        assert_eq!(g.teardown_order(&"q").unwrap(), vec!["q"]);
    }
}
