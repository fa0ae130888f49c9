//! Random completable instances, for testing and benchmarking.

use crate::instance::{Assignment, Instance};
use rand::prelude::*;

/// A random complete Latin square: the cyclic square `(i + j) mod n` with
/// rows, columns and symbols independently permuted. Permuting preserves the
/// Latin property, so every generated grid is valid.
pub fn random_square<R: Rng>(n: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut rows: Vec<usize> = (0..n).collect();
    let mut cols: Vec<usize> = (0..n).collect();
    let mut syms: Vec<usize> = (0..n).collect();
    rows.shuffle(rng);
    cols.shuffle(rng);
    syms.shuffle(rng);
    (0..n)
        .map(|i| (0..n).map(|j| syms[(rows[i] + cols[j]) % n]).collect())
        .collect()
}

/// Keeps each cell of a random square with probability `fill` (in [0, 1]).
/// The hidden square is a witness that the instance is completable.
pub fn generate<R: Rng>(n: usize, fill: f64, rng: &mut R) -> Instance {
    let square = random_square(n, rng);
    let mut fixed = Vec::new();
    for (row, colors) in square.iter().enumerate() {
        for (col, &color) in colors.iter().enumerate() {
            if rng.random_bool(fill) {
                fixed.push(Assignment { row, col, color });
            }
        }
    }
    Instance::new(n, fixed).expect("generated assignments are in range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_domain::ColorDomain;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn random_square_is_latin() {
        let mut rng = ChaCha12Rng::seed_from_u64(99);
        for n in [1, 2, 5, 12] {
            let sq = random_square(n, &mut rng);
            for line in 0..n {
                let mut row_seen = vec![false; n];
                let mut col_seen = vec![false; n];
                for k in 0..n {
                    row_seen[sq[line][k]] = true;
                    col_seen[sq[k][line]] = true;
                }
                assert!(row_seen.iter().all(|&b| b));
                assert!(col_seen.iter().all(|&b| b));
            }
        }
    }

    #[test]
    fn fill_extremes() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        assert!(generate(8, 0.0, &mut rng).fixed().is_empty());
        assert_eq!(generate(8, 1.0, &mut rng).fixed().len(), 64);
    }

    #[test]
    fn generated_instances_propagate_cleanly() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        for _ in 0..10 {
            let instance = generate(10, 0.4, &mut rng);
            let mut cd = ColorDomain::from_instance(&instance);
            cd.simplify().unwrap();
        }
    }
}
