//! Incremental move evaluation.
//!
//! Two tables answer "what does this swap cost" in O(1):
//!
//! - `ColColorCount`: for each (color, column), the set of rows currently
//!   showing that color there. A column has a conflict on a color iff the set
//!   holds two or more rows. The primary delta of a swap is read off four
//!   set sizes.
//! - `DomainFit`: 0/1 per cell, 1 when the current color is outside the
//!   cell's propagated domain. Its delta breaks ties between swaps that
//!   repair the same number of column conflicts.
//!
//! Contract: `apply` must run while the grid still shows the PRE-swap colors;
//! the caller swaps the grid afterwards.

use crate::color_domain::ColorDomain;
use crate::index_set::IndexSet;
use crate::mat;
use crate::solution::{Move, Solution};
use std::sync::Arc;

/// A (color, column) pair whose row set changed under a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AffectedCell {
    pub color: usize,
    pub col: usize,
}

pub struct ColColorCount {
    /// `table[color][col]` = rows with `grid[row][col] == color`.
    table: Vec<Vec<IndexSet>>,
}

impl ColColorCount {
    pub fn new(solution: &Solution) -> Self {
        let n = solution.size();
        let mut t = ColColorCount {
            table: mat![IndexSet::with_universe(n); n; n],
        };
        t.rebuild(solution);
        t
    }

    pub fn rebuild(&mut self, solution: &Solution) {
        let n = solution.size();
        for row in &mut self.table {
            for set in row {
                set.clear();
            }
        }
        for col in 0..n {
            for row in 0..n {
                self.table[solution.color(row, col)][col].insert(row);
            }
        }
    }

    pub fn count(&self, color: usize, col: usize) -> usize {
        self.table[color][col].len()
    }

    /// Rows currently showing `color` in `col`.
    pub fn rows(&self, color: usize, col: usize) -> &IndexSet {
        &self.table[color][col]
    }

    /// Column-colored twice or more: a conflict.
    pub fn is_conflict(&self, color: usize, col: usize) -> bool {
        self.table[color][col].len() >= 2
    }

    /// Exact change in `col_conflict` if the swap were applied. Row conflict
    /// is invariant under a same-row swap.
    pub fn swap_delta(&self, solution: &Solution, mv: &Move) -> i32 {
        let c1 = solution.color(mv.row, mv.col1);
        let c2 = solution.color(mv.row, mv.col2);
        -(self.count(c1, mv.col1) as i32) - self.count(c2, mv.col2) as i32
            + 2
            + self.count(c2, mv.col1) as i32
            + self.count(c1, mv.col2) as i32
    }

    /// Moves `row` between the four affected sets and reports them so that
    /// dependent indices can refresh. The grid must still be pre-swap.
    pub fn apply(&mut self, solution: &Solution, mv: &Move) -> [AffectedCell; 4] {
        let c1 = solution.color(mv.row, mv.col1);
        let c2 = solution.color(mv.row, mv.col2);
        debug_assert_ne!(c1, c2, "row holds distinct colors");
        self.table[c1][mv.col1].remove(mv.row);
        self.table[c2][mv.col2].remove(mv.row);
        self.table[c2][mv.col1].insert(mv.row);
        self.table[c1][mv.col2].insert(mv.row);
        [
            AffectedCell { color: c1, col: mv.col1 },
            AffectedCell { color: c2, col: mv.col2 },
            AffectedCell { color: c2, col: mv.col1 },
            AffectedCell { color: c1, col: mv.col2 },
        ]
    }
}

pub struct DomainFit {
    /// 1 where the cell's color is outside its domain.
    table: Vec<Vec<u8>>,
}

impl DomainFit {
    pub fn new(solution: &Solution, domains: &ColorDomain) -> Self {
        let n = solution.size();
        let mut t = DomainFit {
            table: mat![0u8; n; n],
        };
        t.rebuild(solution, domains);
        t
    }

    pub fn rebuild(&mut self, solution: &Solution, domains: &ColorDomain) {
        let n = solution.size();
        for row in 0..n {
            for col in 0..n {
                self.table[row][col] =
                    u8::from(!domains.contains(row, col, solution.color(row, col)));
            }
        }
    }

    pub fn swap_delta(&self, solution: &Solution, domains: &ColorDomain, mv: &Move) -> i32 {
        let c1 = solution.color(mv.row, mv.col1);
        let c2 = solution.color(mv.row, mv.col2);
        let new1 = i32::from(!domains.contains(mv.row, mv.col1, c2));
        let new2 = i32::from(!domains.contains(mv.row, mv.col2, c1));
        new1 + new2
            - i32::from(self.table[mv.row][mv.col1])
            - i32::from(self.table[mv.row][mv.col2])
    }

    /// Refreshes the two affected entries. The grid must still be pre-swap.
    pub fn apply(&mut self, solution: &Solution, domains: &ColorDomain, mv: &Move) {
        let c1 = solution.color(mv.row, mv.col1);
        let c2 = solution.color(mv.row, mv.col2);
        self.table[mv.row][mv.col1] = u8::from(!domains.contains(mv.row, mv.col1, c2));
        self.table[mv.row][mv.col2] = u8::from(!domains.contains(mv.row, mv.col2, c1));
    }
}

/// The two tables, updated together under the same pre-swap contract.
pub struct Evaluator {
    domains: Arc<ColorDomain>,
    col_counts: ColColorCount,
    fit: DomainFit,
}

impl Evaluator {
    pub fn new(domains: Arc<ColorDomain>, solution: &Solution) -> Self {
        let col_counts = ColColorCount::new(solution);
        let fit = DomainFit::new(solution, &domains);
        Evaluator {
            domains,
            col_counts,
            fit,
        }
    }

    pub fn domains(&self) -> &ColorDomain {
        &self.domains
    }

    pub fn col_counts(&self) -> &ColColorCount {
        &self.col_counts
    }

    pub fn rebuild(&mut self, solution: &Solution) {
        self.col_counts.rebuild(solution);
        self.fit.rebuild(solution, &self.domains);
    }

    /// delta1: change in total conflict.
    pub fn conflict_delta(&self, solution: &Solution, mv: &Move) -> i32 {
        self.col_counts.swap_delta(solution, mv)
    }

    /// delta2: change in domain conflict.
    pub fn domain_delta(&self, solution: &Solution, mv: &Move) -> i32 {
        self.fit.swap_delta(solution, &self.domains, mv)
    }

    pub fn is_conflict(&self, color: usize, col: usize) -> bool {
        self.col_counts.is_conflict(color, col)
    }

    /// Updates both tables for the swap; call before mutating the grid.
    pub fn apply(&mut self, solution: &Solution, mv: &Move) -> [AffectedCell; 4] {
        self.fit.apply(solution, &self.domains, mv);
        self.col_counts.apply(solution, mv)
    }

    /// Recounts both tables from scratch and compares with the incremental
    /// state. Used by audits and tests.
    pub fn check_consistent(&self, solution: &Solution) -> bool {
        let n = solution.size();
        let fresh_counts = ColColorCount::new(solution);
        for color in 0..n {
            for col in 0..n {
                if *fresh_counts.rows(color, col) != self.col_counts.table[color][col] {
                    return false;
                }
            }
        }
        let fresh_fit = DomainFit::new(solution, &self.domains);
        fresh_fit.table == self.fit.table
    }

    /// Column conflicts implied by the count table; must equal the
    /// solution's `col_conflict` counter.
    pub fn column_conflicts(&self) -> i32 {
        let n = self.domains.size();
        let mut total = 0i64;
        for color in 0..n {
            for col in 0..n {
                let k = self.col_counts.count(color, col) as i64;
                total += k * (k - 1) / 2;
            }
        }
        total as i32
    }

    /// Domain conflicts implied by the fit table; must equal the solution's
    /// `domain_conflict` counter.
    pub fn domain_conflicts(&self) -> i32 {
        self.fit
            .table
            .iter()
            .flat_map(|row| row.iter())
            .map(|&b| i32::from(b))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::Move;
    use rand::prelude::*;
    use rand_chacha::ChaCha12Rng;
    use std::sync::Arc;

    fn random_row_permutation_grid(n: usize, rng: &mut ChaCha12Rng) -> Vec<Vec<usize>> {
        (0..n)
            .map(|_| {
                let mut row: Vec<usize> = (0..n).collect();
                row.shuffle(rng);
                row
            })
            .collect()
    }

    fn free_domains(n: usize) -> Arc<ColorDomain> {
        let mut cd = ColorDomain::new(n);
        cd.simplify().unwrap();
        Arc::new(cd)
    }

    fn random_move(n: usize, rng: &mut ChaCha12Rng) -> Move {
        let row = rng.random_range(0..n);
        let col1 = rng.random_range(0..n);
        let mut col2 = rng.random_range(0..n);
        while col2 == col1 {
            col2 = rng.random_range(0..n);
        }
        Move { row, col1, col2 }
    }

    #[test]
    fn table_sizes_sum_to_n_squared() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let cd = free_domains(8);
        let sol = Solution::new(random_row_permutation_grid(8, &mut rng), &cd);
        let ev = Evaluator::new(cd, &sol);
        let total: usize = (0..8)
            .flat_map(|c| (0..8).map(move |j| (c, j)))
            .map(|(c, j)| ev.col_counts().count(c, j))
            .sum();
        assert_eq!(total, 64);
        assert_eq!(ev.column_conflicts(), sol.col_conflict);
        assert_eq!(ev.domain_conflicts(), sol.domain_conflict);
    }

    #[test]
    fn conflict_delta_matches_recount_under_fuzz() {
        let n = 10;
        let mut rng = ChaCha12Rng::seed_from_u64(42);
        let cd = free_domains(n);
        for _ in 0..20 {
            let mut sol = Solution::new(random_row_permutation_grid(n, &mut rng), &cd);
            let mut ev = Evaluator::new(cd.clone(), &sol);
            for step in 0..500 {
                let mv = random_move(n, &mut rng);
                let d1 = ev.conflict_delta(&sol, &mv);
                let d2 = ev.domain_delta(&sol, &mv);
                ev.apply(&sol, &mv);
                let (col_before, dom_before) = (sol.col_conflict, sol.domain_conflict);
                sol.apply_swap(&mv);
                sol.recompute_conflicts(&cd);
                assert_eq!(sol.col_conflict - col_before, d1, "move {:?}", mv);
                assert_eq!(sol.domain_conflict - dom_before, d2, "move {:?}", mv);
                if step % 50 == 0 {
                    assert!(ev.check_consistent(&sol));
                }
            }
        }
    }

    #[test]
    fn applying_a_swap_twice_restores_the_tables() {
        let n = 7;
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let cd = free_domains(n);
        let mut sol = Solution::new(random_row_permutation_grid(n, &mut rng), &cd);
        let baseline = Solution::new(sol.grid.clone(), &cd);
        let mut ev = Evaluator::new(cd.clone(), &sol);
        for _ in 0..200 {
            let mv = random_move(n, &mut rng);
            for _ in 0..2 {
                let d1 = ev.conflict_delta(&sol, &mv);
                let d2 = ev.domain_delta(&sol, &mv);
                ev.apply(&sol, &mv);
                sol.col_conflict += d1;
                sol.total_conflict += d1;
                sol.domain_conflict += d2;
                sol.apply_swap(&mv);
            }
            assert_eq!(sol, baseline);
            assert!(ev.check_consistent(&sol));
        }
    }

    #[test]
    fn apply_reports_the_four_touched_cells() {
        let cd = free_domains(3);
        let mut sol = Solution::new(vec![vec![0, 1, 2], vec![1, 2, 0], vec![2, 0, 1]], &cd);
        let mut ev = Evaluator::new(cd, &sol);
        let mv = Move { row: 0, col1: 0, col2: 2 };
        let affected = ev.apply(&sol, &mv);
        assert_eq!(
            affected,
            [
                AffectedCell { color: 0, col: 0 },
                AffectedCell { color: 2, col: 2 },
                AffectedCell { color: 2, col: 0 },
                AffectedCell { color: 0, col: 2 },
            ]
        );
        sol.apply_swap(&mv);
        assert!(ev.check_consistent(&sol));
    }
}
