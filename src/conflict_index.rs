//! Per-row partition of the movable columns into conflicting and clean.
//!
//! Move selection only proposes swaps whose first column is currently in
//! conflict, so the index is on the hot path. Fixed cells (committed by
//! propagation) belong to neither set; they never move.

use crate::evaluator::{AffectedCell, Evaluator};
use crate::index_set::IndexSet;
use crate::solution::Solution;

pub struct RowConflictIndex {
    conflict: Vec<IndexSet>,
    non_conflict: Vec<IndexSet>,
}

impl RowConflictIndex {
    pub fn new(solution: &Solution, evaluator: &Evaluator) -> Self {
        let n = solution.size();
        let mut idx = RowConflictIndex {
            conflict: (0..n).map(|_| IndexSet::with_universe(n)).collect(),
            non_conflict: (0..n).map(|_| IndexSet::with_universe(n)).collect(),
        };
        idx.rebuild(solution, evaluator);
        idx
    }

    pub fn rebuild(&mut self, solution: &Solution, evaluator: &Evaluator) {
        let n = solution.size();
        for row in 0..n {
            self.conflict[row].clear();
            self.non_conflict[row].clear();
            for col in 0..n {
                if evaluator.domains().is_fixed(row, col) {
                    continue;
                }
                if evaluator.is_conflict(solution.color(row, col), col) {
                    self.conflict[row].insert(col);
                } else {
                    self.non_conflict[row].insert(col);
                }
            }
        }
    }

    pub fn conflict_cols(&self, row: usize) -> &[u32] {
        self.conflict[row].as_slice()
    }

    pub fn non_conflict_cols(&self, row: usize) -> &[u32] {
        self.non_conflict[row].as_slice()
    }

    /// Incremental refresh after a swap: only the columns named in
    /// `affected` can have flipped anyone's conflict status. The grid must
    /// already show the POST-swap colors.
    pub fn refresh(
        &mut self,
        affected: &[AffectedCell; 4],
        solution: &Solution,
        evaluator: &Evaluator,
    ) {
        let n = solution.size();
        let mut cols = [usize::MAX; 4];
        let mut distinct = 0;
        for cell in affected {
            if !cols[..distinct].contains(&cell.col) {
                cols[distinct] = cell.col;
                distinct += 1;
            }
        }
        for &col in &cols[..distinct] {
            for row in 0..n {
                if evaluator.domains().is_fixed(row, col) {
                    continue;
                }
                let now_conflict = evaluator.is_conflict(solution.color(row, col), col);
                let was_conflict = self.conflict[row].contains(col);
                if now_conflict && !was_conflict {
                    self.non_conflict[row].remove(col);
                    self.conflict[row].insert(col);
                } else if !now_conflict && was_conflict {
                    self.conflict[row].remove(col);
                    self.non_conflict[row].insert(col);
                }
            }
        }
    }

    /// Rebuild-and-compare audit.
    pub fn check_consistent(&self, solution: &Solution, evaluator: &Evaluator) -> bool {
        let fresh = RowConflictIndex::new(solution, evaluator);
        fresh.conflict == self.conflict && fresh.non_conflict == self.non_conflict
    }
}
