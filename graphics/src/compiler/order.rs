//! Layered topological sort with cycle extraction.

use fixedbitset::FixedBitSet;

/// Result of a successful sort over dense node indices.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Layering {
    /// All nodes, wave by wave.
    pub order: Vec<usize>,
    /// Nodes whose predecessors all sit in earlier waves, ascending within a wave.
    pub waves: Vec<Vec<usize>>,
}

/// Kahn's algorithm, one wave at a time.
///
/// Ties inside a wave are broken by index, which is declaration order for the
/// callers. On failure returns one cycle as a list of indices in edge order.
pub(super) fn layered_sort(n: usize, edges: &[(usize, usize)]) -> Result<Layering, Vec<usize>> {
    let mut successors = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    for &(from, to) in edges {
        successors[from].push(to);
        in_degree[to] += 1;
    }

    let mut result = Layering::default();
    let mut wave: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    while !wave.is_empty() {
        let mut next = Vec::new();
        for &node in &wave {
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        result.order.extend_from_slice(&wave);
        result.waves.push(wave);
        wave = next;
    }

    if result.order.len() != n {
        return Err(find_cycle(n, edges, &in_degree));
    }
    Ok(result)
}

/// Walk predecessors among the unsorted nodes until one repeats.
///
/// Every node left with a positive in-degree has an unsorted predecessor,
/// so the walk always closes a loop.
fn find_cycle(n: usize, edges: &[(usize, usize)], in_degree: &[usize]) -> Vec<usize> {
    let mut remaining = FixedBitSet::with_capacity(n);
    for (i, &degree) in in_degree.iter().enumerate() {
        if degree > 0 {
            remaining.insert(i);
        }
    }

    let mut predecessor = vec![None; n];
    for &(from, to) in edges {
        let smaller = predecessor[to].map_or(true, |existing| from < existing);
        if remaining.contains(from) && remaining.contains(to) && smaller {
            predecessor[to] = Some(from);
        }
    }

    let Some(start) = remaining.ones().next() else {
        return Vec::new();
    };
    let mut on_path = FixedBitSet::with_capacity(n);
    let mut path = Vec::new();
    let mut current = start;
    while !on_path.contains(current) {
        on_path.insert(current);
        path.push(current);
        match predecessor[current] {
            Some(prev) => current = prev,
            None => return path,
        }
    }

    // `path` runs against edge direction; the cycle starts where `current` was first seen.
    let begin = path.iter().position(|&node| node == current).unwrap_or(0);
    let mut cycle = path.split_off(begin);
    cycle.reverse();
    cycle
}
