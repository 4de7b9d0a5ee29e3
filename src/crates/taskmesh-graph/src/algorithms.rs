//! Graph algorithm suite
//!
//! Every function takes a materialized [`Adjacency`] view and leaves it
//! untouched. Traversals use explicit stacks rather than recursion, so graph
//! depth is bounded by heap, not by the native stack.

use crate::adjacency::Adjacency;
use crate::error::GraphError;
use crate::Result;
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Default cap for [`detect_cycles`] back-edge counting
pub const DEFAULT_CYCLE_COUNT_CAP: usize = 100;

/// Maximum DFS depth used by [`sample_cycles`]
pub const SAMPLE_MAX_DEPTH: usize = 20;

/// Maximum number of sampled start vertices used by [`sample_cycles`]
pub const SAMPLE_MAX_STARTS: usize = 100;

/// Kahn's algorithm.
///
/// Vertices with equal precedence are emitted in natural vertex order (the
/// zero-indegree seed is built in ascending order, releases are FIFO).
/// Returns [`GraphError::Cycle`] when fewer vertices can be ordered than the
/// graph contains.
pub fn topological_sort(adj: &Adjacency) -> Result<Vec<i128>> {
    let mut indegree: HashMap<i128, usize> = adj
        .vertices()
        .iter()
        .map(|&v| (v, adj.in_degree(v)))
        .collect();

    let mut queue: VecDeque<i128> = adj
        .vertices()
        .iter()
        .copied()
        .filter(|v| indegree[v] == 0)
        .collect();

    let mut order = Vec::with_capacity(adj.vertex_count());
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for e in adj.outgoing(v) {
            let d = indegree
                .get_mut(&e.vertex)
                .expect("edge endpoint missing from vertex set");
            *d -= 1;
            if *d == 0 {
                queue.push_back(e.vertex);
            }
        }
    }

    if order.len() != adj.vertex_count() {
        return Err(GraphError::Cycle);
    }
    Ok(order)
}

/// True if a topological order exists
pub fn is_dag(adj: &Adjacency) -> bool {
    topological_sort(adj).is_ok()
}

/// Tarjan's strongly connected components, iterative.
///
/// Each component lists its vertices in pop order; components are emitted in
/// completion order.
pub fn strongly_connected_components(adj: &Adjacency) -> Vec<Vec<i128>> {
    let mut next_index = 0usize;
    let mut indices: HashMap<i128, usize> = HashMap::new();
    let mut lowlinks: HashMap<i128, usize> = HashMap::new();
    let mut on_stack: HashSet<i128> = HashSet::new();
    let mut stack: Vec<i128> = Vec::new();
    let mut components: Vec<Vec<i128>> = Vec::new();

    // explicit call frames: (vertex, position in its outgoing list)
    let mut frames: Vec<(i128, usize)> = Vec::new();

    for &root in adj.vertices() {
        if indices.contains_key(&root) {
            continue;
        }
        frames.push((root, 0));

        while let Some(&(v, next)) = frames.last() {
            if next == 0 {
                indices.insert(v, next_index);
                lowlinks.insert(v, next_index);
                next_index += 1;
                stack.push(v);
                on_stack.insert(v);
            }

            let out = adj.outgoing(v);
            let mut pos = next;
            let mut descended = false;
            while pos < out.len() {
                let w = out[pos].vertex;
                pos += 1;
                if !indices.contains_key(&w) {
                    frames.last_mut().expect("frame stack non-empty").1 = pos;
                    frames.push((w, 0));
                    descended = true;
                    break;
                } else if on_stack.contains(&w) {
                    let low = lowlinks[&v].min(indices[&w]);
                    lowlinks.insert(v, low);
                }
            }
            if descended {
                continue;
            }

            frames.pop();
            if lowlinks[&v] == indices[&v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack.remove(&w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
            if let Some(&(parent, _)) = frames.last() {
                let low = lowlinks[&parent].min(lowlinks[&v]);
                lowlinks.insert(parent, low);
            }
        }
    }

    components
}

/// Three-colour DFS cycle detection, iterative.
///
/// Returns `(has_cycle, approximate_count)` where the count tallies back
/// edges and stops once it exceeds `count_cap`
/// ([`DEFAULT_CYCLE_COUNT_CAP`] is the usual choice).
pub fn detect_cycles(adj: &Adjacency, count_cap: usize) -> (bool, usize) {
    // absent = unvisited, 1 = on the current path, 2 = done
    let mut state: HashMap<i128, u8> = HashMap::new();
    let mut count = 0usize;
    let mut has_cycle = false;

    for &root in adj.vertices() {
        if state.contains_key(&root) {
            continue;
        }
        let mut stack: Vec<(i128, usize)> = vec![(root, 0)];
        state.insert(root, 1);

        while let Some(&(v, pos)) = stack.last() {
            let out = adj.outgoing(v);
            if pos < out.len() {
                stack.last_mut().expect("stack non-empty").1 += 1;
                let w = out[pos].vertex;
                match state.get(&w).copied() {
                    Some(1) => {
                        has_cycle = true;
                        count += 1;
                        if count > count_cap {
                            debug!(count_cap, "cycle counting stopped at the cap");
                            return (true, count);
                        }
                    }
                    None => {
                        state.insert(w, 1);
                        stack.push((w, 0));
                    }
                    _ => {}
                }
            } else {
                state.insert(v, 2);
                stack.pop();
            }
        }
    }

    (has_cycle, count)
}

/// Best-effort enumeration of up to `max_cycles` short cycles.
///
/// Bounded DFS from `force_starts` (filtered to known vertices) or from a
/// random sample of at most [`SAMPLE_MAX_STARTS`] vertices; search depth is
/// capped at [`SAMPLE_MAX_DEPTH`]. Cycles that touch the same vertex set as
/// an already-reported cycle are suppressed.
pub fn sample_cycles(
    adj: &Adjacency,
    max_cycles: usize,
    force_starts: Option<&[i128]>,
) -> Vec<Vec<i128>> {
    let vertices = adj.vertices();
    let mut cycles: Vec<Vec<i128>> = Vec::new();
    let mut seen: HashSet<Vec<i128>> = HashSet::new();

    let starts: Vec<i128> = match force_starts {
        Some(forced) => forced
            .iter()
            .copied()
            .filter(|v| vertices.contains(v))
            .collect(),
        None => {
            let mut all: Vec<i128> = vertices.iter().copied().collect();
            let take = all.len().min(SAMPLE_MAX_STARTS);
            let mut rng = rand::thread_rng();
            let (sampled, _) = all.partial_shuffle(&mut rng, take);
            sampled.to_vec()
        }
    };

    for start in starts {
        if cycles.len() >= max_cycles {
            break;
        }
        let mut stack: Vec<(i128, Vec<i128>)> = vec![(start, vec![start])];
        let mut visited: HashSet<i128> = HashSet::new();
        visited.insert(start);

        while let Some((v, path)) = stack.pop() {
            if cycles.len() >= max_cycles {
                break;
            }
            if path.len() > SAMPLE_MAX_DEPTH {
                continue;
            }
            for e in adj.outgoing(v) {
                let w = e.vertex;
                if w == start && path.len() > 1 {
                    let mut key = path.clone();
                    key.sort_unstable();
                    key.dedup();
                    if seen.insert(key) {
                        cycles.push(path.clone());
                    }
                    break;
                }
                if !path.contains(&w) && !visited.contains(&w) {
                    visited.insert(w);
                    let mut extended = path.clone();
                    extended.push(w);
                    stack.push((w, extended));
                }
            }
        }
    }

    cycles.truncate(max_cycles);
    cycles
}

/// Longest path on a DAG by topological relaxation over edge weights.
///
/// Returns the total weight and the vertex sequence from a source to the
/// deepest sink. Fails with [`GraphError::NotADag`] on cyclic input.
pub fn critical_path(adj: &Adjacency) -> Result<(i128, Vec<i128>)> {
    let order = topological_sort(adj).map_err(|_| GraphError::NotADag)?;
    if order.is_empty() {
        return Ok((0, Vec::new()));
    }

    let mut dist: HashMap<i128, i128> = order.iter().map(|&v| (v, 0)).collect();
    let mut pred: HashMap<i128, i128> = HashMap::new();

    for &v in &order {
        let base = dist[&v];
        for e in adj.outgoing(v) {
            let candidate = base + e.weight;
            if candidate > dist[&e.vertex] {
                dist.insert(e.vertex, candidate);
                pred.insert(e.vertex, v);
            }
        }
    }

    let mut end = order[0];
    let mut best = dist[&end];
    for &v in &order {
        if dist[&v] > best {
            best = dist[&v];
            end = v;
        }
    }

    let mut path = vec![end];
    let mut cursor = end;
    while let Some(&p) = pred.get(&cursor) {
        path.push(p);
        cursor = p;
    }
    path.reverse();

    Ok((best, path))
}

/// Shortest path between two vertices.
///
/// Unweighted mode runs BFS over hop counts; weighted mode runs Dijkstra
/// with a binary min-heap over the adjacency weights (which must be
/// non-negative). Returns `(None, [])` when `target` is unreachable.
pub fn shortest_path(
    adj: &Adjacency,
    source: i128,
    target: i128,
    weighted: bool,
) -> (Option<i128>, Vec<i128>) {
    if !adj.vertices().contains(&source) || !adj.vertices().contains(&target) {
        return (None, Vec::new());
    }
    if weighted {
        dijkstra(adj, source, target)
    } else {
        bfs(adj, source, target)
    }
}

fn rebuild_path(prev: &HashMap<i128, i128>, source: i128, target: i128) -> Vec<i128> {
    let mut path = vec![target];
    let mut cursor = target;
    while cursor != source {
        match prev.get(&cursor) {
            Some(&p) => {
                path.push(p);
                cursor = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

fn bfs(adj: &Adjacency, source: i128, target: i128) -> (Option<i128>, Vec<i128>) {
    let mut prev: HashMap<i128, i128> = HashMap::new();
    let mut visited: HashSet<i128> = HashSet::new();
    visited.insert(source);
    let mut queue: VecDeque<(i128, i128)> = VecDeque::new();
    queue.push_back((source, 0));

    while let Some((v, d)) = queue.pop_front() {
        if v == target {
            return (Some(d), rebuild_path(&prev, source, target));
        }
        for e in adj.outgoing(v) {
            if visited.insert(e.vertex) {
                prev.insert(e.vertex, v);
                queue.push_back((e.vertex, d + 1));
            }
        }
    }
    (None, Vec::new())
}

fn dijkstra(adj: &Adjacency, source: i128, target: i128) -> (Option<i128>, Vec<i128>) {
    let mut best: HashMap<i128, i128> = HashMap::new();
    best.insert(source, 0);
    let mut prev: HashMap<i128, i128> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(i128, i128)>> = BinaryHeap::new();
    heap.push(Reverse((0, source)));

    while let Some(Reverse((d, v))) = heap.pop() {
        if d > best.get(&v).copied().unwrap_or(i128::MAX) {
            continue;
        }
        if v == target {
            break;
        }
        for e in adj.outgoing(v) {
            let candidate = d + e.weight;
            if candidate < best.get(&e.vertex).copied().unwrap_or(i128::MAX) {
                best.insert(e.vertex, candidate);
                prev.insert(e.vertex, v);
                heap.push(Reverse((candidate, e.vertex)));
            }
        }
    }

    match best.get(&target) {
        Some(&d) => (Some(d), rebuild_path(&prev, source, target)),
        None => (None, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Adjacency {
        let mut adj = Adjacency::new();
        adj.add_edge(1, 2, 0, 4);
        adj.add_edge(2, 3, 1, 6);
        adj
    }

    fn diamond() -> Adjacency {
        let mut adj = Adjacency::new();
        adj.add_edge(1, 2, 0, 1);
        adj.add_edge(1, 3, 1, 10);
        adj.add_edge(2, 4, 2, 1);
        adj.add_edge(3, 4, 3, 10);
        adj
    }

    fn triangle_cycle() -> Adjacency {
        let mut adj = Adjacency::new();
        adj.add_edge(1, 2, 0, 1);
        adj.add_edge(2, 3, 1, 1);
        adj.add_edge(3, 1, 2, 1);
        adj
    }

    #[test]
    fn topo_sort_empty_graph() {
        let adj = Adjacency::new();
        assert_eq!(topological_sort(&adj).unwrap(), Vec::<i128>::new());
    }

    #[test]
    fn topo_sort_chain() {
        assert_eq!(topological_sort(&chain()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn topo_sort_natural_tiebreak() {
        let mut adj = Adjacency::new();
        adj.add_edge(5, 1, 0, 0);
        adj.add_edge(3, 1, 1, 0);
        adj.add_vertex(2);
        // 2, 3, 5 all have indegree 0; natural order wins
        assert_eq!(topological_sort(&adj).unwrap(), vec![2, 3, 5, 1]);
    }

    #[test]
    fn topo_sort_rejects_cycle() {
        assert_eq!(
            topological_sort(&triangle_cycle()).unwrap_err(),
            GraphError::Cycle
        );
        assert!(!is_dag(&triangle_cycle()));
        assert!(is_dag(&diamond()));
    }

    #[test]
    fn scc_finds_cycle_component() {
        let mut adj = triangle_cycle();
        adj.add_edge(3, 4, 3, 1);
        let mut components = strongly_connected_components(&adj);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        assert_eq!(components.len(), 2);
        let mut big = components[0].clone();
        big.sort_unstable();
        assert_eq!(big, vec![1, 2, 3]);
        assert_eq!(components[1], vec![4]);
    }

    #[test]
    fn scc_on_dag_is_all_singletons() {
        let components = strongly_connected_components(&diamond());
        assert_eq!(components.len(), 4);
        assert!(components.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn detect_cycles_reports_back_edges() {
        let (has, count) = detect_cycles(&triangle_cycle(), DEFAULT_CYCLE_COUNT_CAP);
        assert!(has);
        assert!(count >= 1);

        let (has, count) = detect_cycles(&diamond(), DEFAULT_CYCLE_COUNT_CAP);
        assert!(!has);
        assert_eq!(count, 0);
    }

    #[test]
    fn detect_cycles_respects_cap() {
        // many 2-cycles through a hub
        let mut adj = Adjacency::new();
        for v in 1..=50 {
            adj.add_edge(0, v, (2 * v) as usize, 1);
            adj.add_edge(v, 0, (2 * v + 1) as usize, 1);
        }
        let (has, count) = detect_cycles(&adj, 5);
        assert!(has);
        assert_eq!(count, 6);
    }

    #[test]
    fn sample_cycles_finds_triangle() {
        let cycles = sample_cycles(&triangle_cycle(), 5, Some(&[1]));
        assert!(!cycles.is_empty());
        let found = cycles.iter().any(|c| {
            let mut s = c.clone();
            s.sort_unstable();
            s == vec![1, 2, 3]
        });
        assert!(found, "triangle not found in {:?}", cycles);
    }

    #[test]
    fn sample_cycles_empty_on_dag() {
        assert!(sample_cycles(&diamond(), 5, None).is_empty());
    }

    #[test]
    fn critical_path_picks_heavier_branch() {
        let (weight, path) = critical_path(&diamond()).unwrap();
        assert_eq!(weight, 20);
        assert_eq!(path, vec![1, 3, 4]);
    }

    #[test]
    fn critical_path_rejects_cycle() {
        assert_eq!(
            critical_path(&triangle_cycle()).unwrap_err(),
            GraphError::NotADag
        );
    }

    #[test]
    fn shortest_path_same_vertex() {
        let (dist, path) = shortest_path(&chain(), 1, 1, false);
        assert_eq!(dist, Some(0));
        assert_eq!(path, vec![1]);
    }

    #[test]
    fn shortest_path_unweighted_counts_hops() {
        let (dist, path) = shortest_path(&diamond(), 1, 4, false);
        assert_eq!(dist, Some(2));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn shortest_path_weighted_prefers_light_edges() {
        let (dist, path) = shortest_path(&diamond(), 1, 4, true);
        assert_eq!(dist, Some(2));
        assert_eq!(path, vec![1, 2, 4]);
    }

    #[test]
    fn shortest_path_unreachable() {
        let (dist, path) = shortest_path(&chain(), 3, 1, false);
        assert_eq!(dist, None);
        assert!(path.is_empty());

        let (dist, path) = shortest_path(&chain(), 1, 99, true);
        assert_eq!(dist, None);
        assert!(path.is_empty());
    }
}
