//! Dependency utilities over the source-field edges of a graph.
//!
//! The adjacency used here maps every field to the fields it reads from.
//! Sorting yields sources before the fields that depend on them.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use super::error::FieldError;
use super::node::FieldId;

/// Field -> its source fields.
pub type SourceEdges = BTreeMap<FieldId, Vec<FieldId>>;

/// Result of a topological sort: every source precedes its dependents.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Topology {
    pub order: Vec<FieldId>,
}

impl Topology {
    #[must_use]
    pub fn empty() -> Self {
        Self { order: Vec::new() }
    }

    /// Kahn sort of `edges`; fails with [`FieldError::Cycle`] naming one cycle.
    pub fn sort(edges: &SourceEdges) -> Result<Self, FieldError> {
        if edges.is_empty() {
            return Ok(Self::empty());
        }

        let mut indegree: HashMap<FieldId, usize> = HashMap::new();
        let mut dependents: HashMap<FieldId, Vec<FieldId>> = HashMap::new();

        for (field, sources) in edges {
            indegree.entry(*field).or_insert(0);
            dependents.entry(*field).or_default();
            for source in sources {
                indegree.entry(*source).or_insert(0);
                dependents.entry(*source).or_default().push(*field);
                *indegree.entry(*field).or_insert(0) += 1;
            }
        }

        for neighbours in dependents.values_mut() {
            neighbours.sort();
        }

        let mut ready: Vec<FieldId> = indegree
            .iter()
            .filter_map(|(field, &count)| (count == 0).then_some(*field))
            .collect();
        ready.sort();

        let mut queue: VecDeque<FieldId> = ready.into();
        let mut order = Vec::with_capacity(indegree.len());

        while let Some(field) = queue.pop_front() {
            order.push(field);
            if let Some(neighbours) = dependents.get(&field) {
                for neighbour in neighbours {
                    if let Some(count) = indegree.get_mut(neighbour) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(*neighbour);
                        }
                    }
                }
            }
        }

        if order.len() == indegree.len() {
            return Ok(Self { order });
        }

        let cycle = find_cycle(edges).unwrap_or_default();
        Err(FieldError::Cycle { cycle })
    }
}

fn find_cycle(edges: &SourceEdges) -> Option<Vec<FieldId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum VisitState {
        Unvisited,
        Visiting,
        Visited,
    }

    fn dfs(
        field: FieldId,
        edges: &SourceEdges,
        state: &mut HashMap<FieldId, VisitState>,
        stack: &mut Vec<FieldId>,
    ) -> Option<Vec<FieldId>> {
        state.insert(field, VisitState::Visiting);
        stack.push(field);

        if let Some(sources) = edges.get(&field) {
            for source in sources {
                match state.get(source).copied().unwrap_or(VisitState::Unvisited) {
                    VisitState::Unvisited => {
                        if let Some(cycle) = dfs(*source, edges, state, stack) {
                            return Some(cycle);
                        }
                    }
                    VisitState::Visiting => {
                        if let Some(position) = stack.iter().position(|f| f == source) {
                            let mut cycle = stack[position..].to_vec();
                            cycle.push(*source);
                            return Some(cycle);
                        }
                    }
                    VisitState::Visited => {}
                }
            }
        }

        stack.pop();
        state.insert(field, VisitState::Visited);
        None
    }

    let mut state: HashMap<FieldId, VisitState> = HashMap::new();
    for field in edges.keys() {
        if state.get(field).copied().unwrap_or(VisitState::Unvisited) == VisitState::Unvisited {
            let mut stack = Vec::new();
            if let Some(cycle) = dfs(*field, edges, &mut state, &mut stack) {
                return Some(cycle);
            }
        }
    }

    None
}

/// Every field that reads `start`, directly or through other fields.
/// `start` itself is not included.
#[must_use]
pub fn dependents_of(edges: &SourceEdges, start: FieldId) -> BTreeSet<FieldId> {
    let mut readers: HashMap<FieldId, Vec<FieldId>> = HashMap::new();
    for (field, sources) in edges {
        for source in sources {
            readers.entry(*source).or_default().push(*field);
        }
    }
    let mut found = BTreeSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(field) = queue.pop_front() {
        for reader in readers.get(&field).into_iter().flatten() {
            if *reader != start && found.insert(*reader) {
                queue.push_back(*reader);
            }
        }
    }
    found
}

/// `roots` plus every field they read from, transitively.
#[must_use]
pub fn sources_reachable_from(
    edges: &SourceEdges,
    roots: impl IntoIterator<Item = FieldId>,
) -> BTreeSet<FieldId> {
    let mut found = BTreeSet::new();
    let mut queue: VecDeque<FieldId> = roots.into_iter().collect();
    while let Some(field) = queue.pop_front() {
        if found.insert(field) {
            queue.extend(edges.get(&field).into_iter().flatten().copied());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(usize, &[usize])]) -> SourceEdges {
        pairs
            .iter()
            .map(|(field, sources)| {
                (
                    FieldId(*field),
                    sources.iter().copied().map(FieldId).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn sorts_sources_first() {
        // 2 reads 1, 1 reads 0, 3 reads 0 and 2
        let graph = edges(&[(0, &[]), (1, &[0]), (2, &[1]), (3, &[0, 2])]);
        let topology = Topology::sort(&graph).expect("sorted");
        assert_eq!(
            topology.order,
            vec![FieldId(0), FieldId(1), FieldId(2), FieldId(3)]
        );
    }

    #[test]
    fn detects_cycle() {
        let graph = edges(&[(0, &[1]), (1, &[0])]);
        let err = Topology::sort(&graph).expect_err("cycle");
        match err {
            FieldError::Cycle { cycle } => {
                assert!(cycle.contains(&FieldId(0)));
                assert!(cycle.contains(&FieldId(1)));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn collects_transitive_dependents_and_sources() {
        let graph = edges(&[(0, &[]), (1, &[0]), (2, &[1]), (3, &[]), (4, &[3, 0])]);
        assert_eq!(
            dependents_of(&graph, FieldId(0)),
            BTreeSet::from([FieldId(1), FieldId(2), FieldId(4)])
        );
        assert_eq!(
            sources_reachable_from(&graph, [FieldId(2)]),
            BTreeSet::from([FieldId(0), FieldId(1), FieldId(2)])
        );
    }
}
