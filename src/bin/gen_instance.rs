use anyhow::{ensure, Result};
use clap::Parser;
use latin_tabu::domain::MAX_BITS;
use latin_tabu::instgen;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// Emit a random completable instance in the solver's input format.
#[derive(Parser)]
struct Cli {
    #[clap(long, short = 'n', default_value_t = 20)]
    size: usize,
    /// Probability that a cell is pre-assigned.
    #[clap(long, short = 'f', default_value_t = 0.3)]
    fill: f64,
    #[clap(long, short = 's')]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    ensure!(
        args.size >= 1 && args.size <= MAX_BITS,
        "size must be within [1, {}]",
        MAX_BITS
    );
    ensure!(
        (0.0..=1.0).contains(&args.fill),
        "fill must be within [0, 1]"
    );
    let mut rng = match args.seed {
        Some(s) => ChaCha12Rng::seed_from_u64(s),
        None => ChaCha12Rng::from_os_rng(),
    };
    let instance = instgen::generate(args.size, args.fill, &mut rng);
    print!("{}", instance);
    Ok(())
}
