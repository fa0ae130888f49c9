//! Per-cell candidate colors and the propagation that prunes them.
//!
//! Two reductions run to a fixpoint:
//!
//! 1. commit propagation: a cell whose domain shrank to a single color is
//!    committed, and the color is removed from every row and column mate;
//! 2. the k = n-1 line rule: if the other n-1 cells of a row (column) can
//!    between them only use n-1 colors, the remaining cell takes the missing
//!    color.
//!
//! The column half of both rules is gated by `col_needed`. The randomised
//! initial fill runs with the gate off, so each finished row is a permutation
//! while column clashes are left for the search to repair.

use crate::domain::BitDomain;
use crate::instance::Instance;
use crate::{mat, PROPAGATION_SWEEP_CAP};
use anyhow::{bail, ensure, Result};
use rand::Rng;

/// Marker for a cell with no committed color yet.
pub const UNSET: usize = !0;

#[derive(Clone)]
pub struct ColorDomain {
    n: usize,
    domains: Vec<Vec<BitDomain>>,
    committed: Vec<Vec<usize>>,
    committed_count: usize,
}

impl ColorDomain {
    pub fn new(n: usize) -> Self {
        ColorDomain {
            n,
            domains: mat![BitDomain::full(n); n; n],
            committed: mat![UNSET; n; n],
            committed_count: 0,
        }
    }

    pub fn from_instance(instance: &Instance) -> Self {
        let mut cd = ColorDomain::new(instance.size());
        for a in instance.fixed() {
            cd.set_fixed(a.row, a.col, a.color);
        }
        cd
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Pins a cell to one color. Does not propagate; call `simplify` after
    /// all pre-assignments are in.
    pub fn set_fixed(&mut self, i: usize, j: usize, color: usize) {
        self.domains[i][j].clear();
        self.domains[i][j].insert(color);
    }

    pub fn domain(&self, i: usize, j: usize) -> &BitDomain {
        &self.domains[i][j]
    }

    pub fn is_fixed(&self, i: usize, j: usize) -> bool {
        self.domains[i][j].len() == 1
    }

    pub fn contains(&self, i: usize, j: usize, color: usize) -> bool {
        self.domains[i][j].contains(color)
    }

    /// Number of committed cells.
    pub fn fixed_num(&self) -> usize {
        self.committed_count
    }

    /// Sum of all domain cardinalities; n*n when fully solved.
    pub fn total_domain_size(&self) -> usize {
        self.domains
            .iter()
            .flat_map(|row| row.iter())
            .map(|d| d.len())
            .sum()
    }

    /// Prunes all domains to a fixpoint. Fails if an empty domain proves the
    /// pre-assignments inconsistent.
    pub fn simplify(&mut self) -> Result<()> {
        let mut sweeps = 0;
        let mut changed = true;
        while changed && sweeps < PROPAGATION_SWEEP_CAP {
            changed = false;
            sweeps += 1;
            if self.propagate_committed(true)? {
                changed = true;
            }
            if self.apply_line_rules(true)? {
                changed = true;
            }
        }
        Ok(())
    }

    /// Commits `color` at (i, j) and prunes it from the row (and, with
    /// `col_needed`, column) mates.
    fn commit(&mut self, i: usize, j: usize, color: usize, col_needed: bool) {
        debug_assert_eq!(self.committed[i][j], UNSET);
        self.committed[i][j] = color;
        self.committed_count += 1;
        for col in 0..self.n {
            self.domains[i][col].remove(color);
        }
        if col_needed {
            for row in 0..self.n {
                self.domains[row][j].remove(color);
            }
        }
        self.domains[i][j].clear();
        self.domains[i][j].insert(color);
    }

    /// One sweep of commit propagation. Surfaces empty domains.
    fn propagate_committed(&mut self, col_needed: bool) -> Result<bool> {
        let mut changed = false;
        for row in 0..self.n {
            for col in 0..self.n {
                let d = &self.domains[row][col];
                if d.is_empty() {
                    bail!("empty domain at ({}, {})", row, col);
                }
                if d.len() == 1 && self.committed[row][col] == UNSET {
                    let color = d.first().expect("singleton domain");
                    self.commit(row, col, color, col_needed);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// One sweep of the k = n-1 rule over rows, then (gated) columns.
    fn apply_line_rules(&mut self, col_needed: bool) -> Result<bool> {
        let mut changed = false;
        let mut union_set = BitDomain::empty(self.n);
        for row in 0..self.n {
            for i in 0..self.n {
                if self.is_fixed(row, i) {
                    continue;
                }
                union_set.clear();
                for c in 0..self.n {
                    if c != i {
                        union_set.union_with(&self.domains[row][c]);
                    }
                }
                let missing = union_set.complement();
                if missing.len() == 1 {
                    let color = missing.first().expect("singleton complement");
                    ensure!(
                        self.domains[row][i].contains(color),
                        "empty domain at ({}, {})",
                        row,
                        i
                    );
                    self.commit(row, i, color, col_needed);
                    changed = true;
                }
            }
        }
        if col_needed {
            for col in 0..self.n {
                for i in 0..self.n {
                    if self.is_fixed(i, col) {
                        continue;
                    }
                    union_set.clear();
                    for r in 0..self.n {
                        if r != i {
                            union_set.union_with(&self.domains[r][col]);
                        }
                    }
                    let missing = union_set.complement();
                    if missing.len() == 1 {
                        let color = missing.first().expect("singleton complement");
                        ensure!(
                            self.domains[i][col].contains(color),
                            "empty domain at ({}, {})",
                            i,
                            col
                        );
                        self.commit(i, col, color, true);
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }

    /// Builds a grid in which every row is a permutation of `0..n`, drawing
    /// each undecided cell uniformly from its (row-propagated) domain. Column
    /// clashes are deliberately tolerated. Expects `simplify` to have run.
    /// `self` is left untouched; the fill runs on a scratch copy.
    pub fn initial_solution<R: Rng>(&self, rng: &mut R) -> Result<Vec<Vec<usize>>> {
        let n = self.n;
        let mut work = self.clone();
        let mut row_done = vec![false; n];
        while work.committed_count < n * n {
            let mut progressed = false;
            for row in 0..n {
                if row_done[row] {
                    continue;
                }
                // Undecided cell with the smallest domain, ties to the left.
                let mut best_size = usize::MAX;
                let mut target = UNSET;
                for col in 0..n {
                    let size = work.domains[row][col].len();
                    if size > 1 && size < best_size {
                        best_size = size;
                        target = col;
                    }
                }
                if target == UNSET {
                    for col in 0..n {
                        if work.committed[row][col] == UNSET && work.domains[row][col].is_empty() {
                            bail!("no more values to fix at ({}, {})", row, col);
                        }
                    }
                    row_done[row] = true;
                    continue;
                }
                let dom = &work.domains[row][target];
                let color = dom
                    .nth(rng.random_range(0..dom.len()))
                    .expect("domain with len > 1");
                work.commit(row, target, color, false);
                // Settle the consequences before moving to the next row.
                loop {
                    let mut settled = true;
                    if work.propagate_committed(false)? {
                        settled = false;
                    }
                    if work.apply_line_rules(false)? {
                        settled = false;
                    }
                    if settled {
                        break;
                    }
                }
                progressed = true;
            }
            if !progressed && work.committed_count < n * n {
                // Rows were marked done while still holding uncommitted
                // singletons; commit them in one pass.
                if !work.propagate_committed(false)? {
                    bail!("no more values to fix");
                }
            }
        }

        let mut seen = vec![false; n];
        for row in 0..n {
            seen.fill(false);
            for col in 0..n {
                let color = work.committed[row][col];
                ensure!(color != UNSET, "cell ({}, {}) left unassigned", row, col);
                ensure!(!seen[color], "color {} repeated in row {}", color, row);
                seen[color] = true;
            }
        }
        Ok(work.committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn diagonal_instance(n: usize) -> ColorDomain {
        let mut cd = ColorDomain::new(n);
        for i in 0..n {
            cd.set_fixed(i, i, 0);
        }
        cd
    }

    #[test]
    fn simplify_prunes_committed_color_from_mates() {
        let mut cd = diagonal_instance(3);
        cd.simplify().unwrap();
        // Committed cells keep their color and nothing else.
        for i in 0..3 {
            assert!(cd.is_fixed(i, i));
            assert_eq!(cd.domain(i, i).first(), Some(0));
        }
        // Mates of a committed cell lost color 0.
        let d01: Vec<usize> = cd.domain(0, 1).iter().collect();
        let d02: Vec<usize> = cd.domain(0, 2).iter().collect();
        assert_eq!(d01, vec![1, 2]);
        assert_eq!(d02, vec![1, 2]);
        // No bits at or above n anywhere.
        for i in 0..3 {
            for j in 0..3 {
                assert!(cd.domain(i, j).iter().all(|v| v < 3));
            }
        }
    }

    #[test]
    fn fixed_row_excludes_column_colors() {
        let mut cd = ColorDomain::new(4);
        for j in 0..4 {
            cd.set_fixed(0, j, j);
        }
        cd.simplify().unwrap();
        assert_eq!(cd.fixed_num(), 4);
        for i in 1..4 {
            for j in 0..4 {
                assert!(!cd.contains(i, j, j), "({}, {}) still allows {}", i, j, j);
                assert_eq!(cd.domain(i, j).len(), 3);
            }
        }
        assert_eq!(cd.total_domain_size(), 4 + 12 * 3);
    }

    #[test]
    fn line_rule_forces_last_missing_color() {
        // Row 0: three cells pinned, the k = n-1 rule must fill the fourth.
        let mut cd = ColorDomain::new(4);
        cd.set_fixed(0, 0, 0);
        cd.set_fixed(0, 1, 1);
        cd.set_fixed(0, 2, 2);
        cd.simplify().unwrap();
        assert!(cd.is_fixed(0, 3));
        assert_eq!(cd.domain(0, 3).first(), Some(3));
    }

    #[test]
    fn inconsistent_assignments_surface_as_empty_domain() {
        let mut cd = ColorDomain::new(2);
        cd.set_fixed(0, 0, 0);
        cd.set_fixed(0, 1, 0);
        assert!(cd.simplify().is_err());
    }

    #[test]
    fn initial_solution_rows_are_permutations() {
        for seed in 0..5 {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let mut cd = ColorDomain::new(6);
            cd.simplify().unwrap();
            let grid = cd.initial_solution(&mut rng).unwrap();
            for row in &grid {
                let mut sorted = row.clone();
                sorted.sort_unstable();
                assert_eq!(sorted, (0..6).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn initial_solution_respects_pre_assignments() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut cd = diagonal_instance(5);
        cd.simplify().unwrap();
        let fixed_before = cd.fixed_num();
        let grid = cd.initial_solution(&mut rng).unwrap();
        for i in 0..5 {
            assert_eq!(grid[i][i], 0);
        }
        // The fill ran on a scratch copy; the propagated state is untouched.
        assert_eq!(cd.fixed_num(), fixed_before);
        assert!(!cd.is_fixed(0, 1));
    }
}
