//! A candidate grid with cached conflict counters.

use crate::color_domain::ColorDomain;
use itertools::Itertools;

/// Swap of two cells within one row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    pub row: usize,
    pub col1: usize,
    pub col2: usize,
}

/// An n x n color grid. `total_conflict = row_conflict + col_conflict` counts
/// clashing pairs: a color appearing k times in a line contributes
/// k*(k-1)/2. `domain_conflict` counts cells whose color fell out of their
/// propagated domain; it is the tie-breaking objective.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub grid: Vec<Vec<usize>>,
    pub row_conflict: i32,
    pub col_conflict: i32,
    pub total_conflict: i32,
    pub domain_conflict: i32,
}

impl Solution {
    pub fn new(grid: Vec<Vec<usize>>, domains: &ColorDomain) -> Self {
        let mut s = Solution {
            grid,
            row_conflict: 0,
            col_conflict: 0,
            total_conflict: 0,
            domain_conflict: 0,
        };
        s.recompute_conflicts(domains);
        s
    }

    pub fn size(&self) -> usize {
        self.grid.len()
    }

    pub fn color(&self, row: usize, col: usize) -> usize {
        self.grid[row][col]
    }

    /// Full recount of all four counters. O(n^2); the search keeps the
    /// counters current incrementally and only calls this on construction
    /// and in audits.
    pub fn recompute_conflicts(&mut self, domains: &ColorDomain) {
        let n = self.size();
        self.row_conflict = 0;
        self.col_conflict = 0;
        self.domain_conflict = 0;
        let mut existing = vec![0i32; n];
        for row in &self.grid {
            existing.fill(0);
            for &color in row {
                self.row_conflict += existing[color];
                existing[color] += 1;
            }
        }
        for col in 0..n {
            existing.fill(0);
            for row in 0..n {
                let color = self.grid[row][col];
                self.col_conflict += existing[color];
                existing[color] += 1;
            }
        }
        self.total_conflict = self.row_conflict + self.col_conflict;
        for row in 0..n {
            for col in 0..n {
                if !domains.contains(row, col, self.grid[row][col]) {
                    self.domain_conflict += 1;
                }
            }
        }
    }

    /// Exchanges the two cells. Counters are NOT touched; the caller applies
    /// the evaluator deltas instead of paying for a recount.
    pub fn apply_swap(&mut self, mv: &Move) {
        self.grid[mv.row].swap(mv.col1, mv.col2);
    }

    /// Lexicographic objective used for best-so-far tracking.
    pub fn objective(&self) -> (i32, i32) {
        (self.total_conflict, self.domain_conflict)
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.grid {
            writeln!(f, "{}", row.iter().join(" "))?;
        }
        Ok(())
    }
}
