//! Tabu search over row-preserving swaps.
//!
//! Each iteration scans the neighborhood restricted to currently-conflicting
//! cells, keeps the equally-best moves by lexicographic (delta1, delta2), and picks
//! one uniformly. A tabu move is only eligible through aspiration: it must
//! beat the best solution seen so far. When the current solution drifts more
//! than the restart threshold above the best, the search snaps back to the
//! best and wipes the tabu table; the threshold itself adapts upward every
//! `RT_ACCUM_LIMIT` restarts.

use crate::color_domain::ColorDomain;
use crate::conflict_index::RowConflictIndex;
use crate::evaluator::Evaluator;
use crate::solution::{Move, Solution};
use crate::tabu::TabuTable;
use crate::SetMinMax;
use crate::{RT_ACCUM_LIMIT, RT_CAP, RT_INIT, TABU_JITTER_MAX, TABU_JITTER_MIN, TABU_TENURE_ALPHA};
use anyhow::{bail, Result};
use rand::Rng;
use rand_chacha::ChaCha12Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Equally-best candidate moves for one (delta1, delta2) level.
struct Bucket {
    delta1: i32,
    delta2: i32,
    moves: Vec<Move>,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            delta1: i32::MAX,
            delta2: i32::MAX,
            moves: Vec::with_capacity(256),
        }
    }

    fn reset(&mut self) {
        self.delta1 = i32::MAX;
        self.delta2 = i32::MAX;
        self.moves.clear();
    }

    /// delta2 is only computed when delta1 ties or improves the bucket.
    fn offer(&mut self, mv: Move, delta1: i32, delta2: impl FnOnce() -> i32) {
        if delta1 > self.delta1 {
            return;
        }
        if delta1 < self.delta1 {
            self.delta1 = delta1;
            self.delta2 = delta2();
            self.moves.clear();
            self.moves.push(mv);
            return;
        }
        let d2 = delta2();
        if d2 < self.delta2 {
            self.delta2 = d2;
            self.moves.clear();
            self.moves.push(mv);
        } else if d2 == self.delta2 {
            self.moves.push(mv);
        }
    }
}

pub struct LocalSearch {
    worker_id: usize,
    current: Solution,
    best: Solution,
    evaluator: Evaluator,
    row_index: RowConflictIndex,
    tabu: TabuTable,
    rng: ChaCha12Rng,
    iteration: u64,
    rt: i32,
    accu: i32,
    non_tabu: Bucket,
    aspirant: Bucket,
}

impl LocalSearch {
    pub fn new(
        worker_id: usize,
        domains: Arc<ColorDomain>,
        initial: Solution,
        rng: ChaCha12Rng,
    ) -> Self {
        let n = initial.size();
        let evaluator = Evaluator::new(domains, &initial);
        let row_index = RowConflictIndex::new(&initial, &evaluator);
        LocalSearch {
            worker_id,
            best: initial.clone(),
            current: initial,
            evaluator,
            row_index,
            tabu: TabuTable::new(n),
            rng,
            iteration: 0,
            rt: RT_INIT,
            accu: 0,
            non_tabu: Bucket::new(),
            aspirant: Bucket::new(),
        }
    }

    pub fn best(&self) -> &Solution {
        &self.best
    }

    /// Runs until the conflicts hit zero, the deadline passes, `max_steps`
    /// moves were made, or `stop` is raised by another worker.
    pub fn run(
        &mut self,
        deadline: Instant,
        max_steps: u64,
        stop: &AtomicBool,
    ) -> Result<&Solution> {
        let start = Instant::now();
        let mut steps = 0u64;
        let mut logged = self.best.total_conflict;
        while self.best.total_conflict != 0 {
            if steps >= max_steps || Instant::now() >= deadline {
                break;
            }
            let mv = self.select_move()?;
            self.apply_move(&mv);
            if self.current.objective() <= self.best.objective() {
                self.best = self.current.clone();
                if logged.setmin(self.best.total_conflict) {
                    eprintln!(
                        "{:.3}: worker {}: conflict {}",
                        start.elapsed().as_secs_f64(),
                        self.worker_id,
                        self.best.total_conflict
                    );
                }
            }
            if self.current.total_conflict == 0 {
                break;
            }
            // Restart checkpoint; also the cooperative-exit poll point.
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if self.current.total_conflict - self.best.total_conflict > self.rt {
                self.restart();
            }
            self.iteration += 1;
            steps += 1;
        }
        Ok(&self.best)
    }

    /// Scans conflict-conflict and conflict-clean column pairs per row.
    fn select_move(&mut self) -> Result<Move> {
        let n = self.current.size();
        self.non_tabu.reset();
        self.aspirant.reset();
        for row in 0..n {
            let n_conf = self.row_index.conflict_cols(row).len();
            for i in 0..n_conf {
                let col1 = self.row_index.conflict_cols(row)[i] as usize;
                for j in i + 1..n_conf {
                    let col2 = self.row_index.conflict_cols(row)[j] as usize;
                    self.consider(Move { row, col1, col2 });
                }
                let n_clean = self.row_index.non_conflict_cols(row).len();
                for j in 0..n_clean {
                    let col2 = self.row_index.non_conflict_cols(row)[j] as usize;
                    self.consider(Move { row, col1, col2 });
                }
            }
        }
        // A tabu move may only win when it would beat the all-time best.
        let aspire = !self.aspirant.moves.is_empty()
            && self.aspirant.delta1 < self.non_tabu.delta1
            && self.current.total_conflict + self.aspirant.delta1 < self.best.total_conflict;
        let bucket = if aspire { &self.aspirant } else { &self.non_tabu };
        if bucket.moves.is_empty() {
            bail!(
                "no candidate move at conflict {}",
                self.current.total_conflict
            );
        }
        Ok(bucket.moves[self.rng.random_range(0..bucket.moves.len())])
    }

    fn consider(&mut self, mv: Move) {
        let delta1 = self.evaluator.conflict_delta(&self.current, &mv);
        let tabu = {
            let c1 = self.current.color(mv.row, mv.col1);
            let c2 = self.current.color(mv.row, mv.col2);
            // Forbidden if either color would return to a marked column.
            self.tabu.is_tabu(mv.row, mv.col1, c2, self.iteration)
                || self.tabu.is_tabu(mv.row, mv.col2, c1, self.iteration)
        };
        let evaluator = &self.evaluator;
        let current = &self.current;
        let bucket = if tabu {
            &mut self.aspirant
        } else {
            &mut self.non_tabu
        };
        bucket.offer(mv, delta1, || evaluator.domain_delta(current, &mv));
    }

    /// The update order is a contract: tabu marks and evaluator tables read
    /// the pre-swap grid, the conflict index reads the post-swap grid.
    fn apply_move(&mut self, mv: &Move) {
        let delta1 = self.evaluator.conflict_delta(&self.current, mv);
        let delta2 = self.evaluator.domain_delta(&self.current, mv);
        self.mark_tabu(mv);
        let affected = self.evaluator.apply(&self.current, mv);
        self.current.col_conflict += delta1;
        self.current.total_conflict += delta1;
        self.current.domain_conflict += delta2;
        self.current.apply_swap(mv);
        self.row_index.refresh(&affected, &self.current, &self.evaluator);
        #[cfg(debug_assertions)]
        if self.iteration % 1024 == 0 {
            self.audit();
        }
    }

    /// The departing cell is always locked against reversal; its partner
    /// only when it was itself conflicting.
    fn mark_tabu(&mut self, mv: &Move) {
        let c1 = self.current.color(mv.row, mv.col1);
        let c2 = self.current.color(mv.row, mv.col2);
        let tenure = (TABU_TENURE_ALPHA * self.current.total_conflict as f64) as u64;
        let unlock =
            self.iteration + tenure + self.rng.random_range(TABU_JITTER_MIN..=TABU_JITTER_MAX);
        self.tabu.mark(mv.row, mv.col1, c1, unlock);
        if self.evaluator.is_conflict(c2, mv.col2) {
            let unlock =
                self.iteration + tenure + self.rng.random_range(TABU_JITTER_MIN..=TABU_JITTER_MAX);
            self.tabu.mark(mv.row, mv.col2, c2, unlock);
        }
    }

    /// Snap back to the best solution and adapt the drift threshold.
    fn restart(&mut self) {
        self.tabu.clear();
        self.iteration = 0;
        self.current = self.best.clone();
        self.evaluator.rebuild(&self.current);
        self.row_index.rebuild(&self.current, &self.evaluator);
        if self.rt < RT_CAP {
            self.accu += 1;
            if self.accu == RT_ACCUM_LIMIT {
                self.accu = 0;
                self.rt += 1;
                eprintln!(
                    "worker {}: restart threshold raised to {}",
                    self.worker_id, self.rt
                );
            }
        }
    }

    #[cfg(debug_assertions)]
    fn audit(&self) {
        let mut fresh = self.current.clone();
        fresh.recompute_conflicts(self.evaluator.domains());
        assert_eq!(fresh.row_conflict, self.current.row_conflict);
        assert_eq!(fresh.col_conflict, self.current.col_conflict);
        assert_eq!(fresh.total_conflict, self.current.total_conflict);
        assert_eq!(fresh.domain_conflict, self.current.domain_conflict);
        assert!(self.evaluator.check_consistent(&self.current));
        assert!(self.row_index.check_consistent(&self.current, &self.evaluator));
    }
}
