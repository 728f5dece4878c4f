// src/order/graph.rs

//! Operation graph with hard and soft ordering edges
//!
//! Hard edges must be respected; soft edges only steer the choice among
//! operations that are ready at the same time.

use std::collections::HashSet;

/// Directed graph over operation indices
#[derive(Debug, Default, Clone)]
pub struct OpGraph {
    len: usize,
    /// `hard[a]` lists the nodes that must come after `a`
    hard: Vec<Vec<usize>>,
    soft: Vec<Vec<usize>>,
}

impl OpGraph {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            hard: vec![Vec::new(); len],
            soft: vec![Vec::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `before` must run before `after`
    pub fn add_hard_edge(&mut self, before: usize, after: usize) {
        if before != after && !self.hard[before].contains(&after) {
            self.hard[before].push(after);
        }
    }

    /// `before` should run before `after` when nothing forces otherwise
    pub fn add_soft_edge(&mut self, before: usize, after: usize) {
        if before != after && !self.soft[before].contains(&after) {
            self.soft[before].push(after);
        }
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        &self.hard[node]
    }

    /// Kahn's algorithm over the hard edges.
    ///
    /// Among ready nodes, the one with the fewest unsatisfied soft
    /// predecessors goes first, then the lowest index. On a cycle the
    /// nodes that could not be placed are returned as the error.
    pub fn topological_sort(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = vec![0usize; self.len];
        let mut soft_degree = vec![0usize; self.len];
        for node in 0..self.len {
            for &next in &self.hard[node] {
                in_degree[next] += 1;
            }
            for &next in &self.soft[node] {
                soft_degree[next] += 1;
            }
        }

        let mut ready: Vec<usize> = (0..self.len).filter(|&n| in_degree[n] == 0).collect();
        let mut placed = vec![false; self.len];
        let mut result = Vec::with_capacity(self.len);

        while !ready.is_empty() {
            let pos = (0..ready.len())
                .min_by_key(|&i| (soft_degree[ready[i]], ready[i]))
                .unwrap_or(0);
            let node = ready.swap_remove(pos);
            placed[node] = true;
            result.push(node);

            for &next in &self.soft[node] {
                soft_degree[next] -= 1;
            }
            for &next in &self.hard[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        if result.len() != self.len {
            return Err((0..self.len).filter(|&n| !placed[n]).collect());
        }
        Ok(result)
    }

    /// Find a cycle of hard edges, starting the search from `candidates`.
    ///
    /// Successors are walked in index order so the same graph always
    /// reports the same cycle.
    pub fn detect_cycle(&self, candidates: &[usize]) -> Option<Vec<usize>> {
        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        for &start in candidates {
            if !visited.contains(&start)
                && let Some(cycle) = self.dfs_cycle_detect(start, &mut visited, &mut rec_stack)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle_detect(
        &self,
        node: usize,
        visited: &mut HashSet<usize>,
        rec_stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        visited.insert(node);
        rec_stack.push(node);

        let mut successors = self.hard[node].clone();
        successors.sort_unstable();
        for next in successors {
            if let Some(pos) = rec_stack.iter().position(|&n| n == next) {
                // Found a cycle
                let mut cycle = rec_stack[pos..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            if !visited.contains(&next)
                && let Some(cycle) = self.dfs_cycle_detect(next, visited, rec_stack)
            {
                return Some(cycle);
            }
        }

        rec_stack.pop();
        None
    }
}
