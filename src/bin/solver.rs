use anyhow::{ensure, Result};
use clap::Parser;
use latin_tabu::instance::Instance;
use latin_tabu::parallel::{solve, SolveConfig};
use std::time::Instant;

/// Latin square completion: constraint propagation, then parallel tabu
/// search. Instance on stdin, completed grid on stdout, progress on stderr.
#[derive(Parser)]
#[clap(name = "solver")]
struct Cli {
    /// Wall-clock budget in seconds.
    time_limit: u64,
    /// Base random seed; worker i derives seed + 1000*i.
    seed: u64,
    /// Worker threads; omitted or 1 runs in the calling thread.
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let args = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });
    ensure!(args.time_limit > 0, "time limit must be positive");
    let start = Instant::now();
    let instance = Instance::from_reader(std::io::stdin())?;
    eprintln!(
        "n = {}, {} pre-assigned cells, {} workers",
        instance.size(),
        instance.fixed().len(),
        args.threads.unwrap_or(1).max(1)
    );
    let config = SolveConfig::new(args.time_limit, args.seed, args.threads);
    let best = solve(&instance, &config)?;
    eprintln!(
        "{:.3}: finished with conflict {} (domain {})",
        start.elapsed().as_secs_f64(),
        best.total_conflict,
        best.domain_conflict
    );
    print!("{}", best);
    Ok(())
}
