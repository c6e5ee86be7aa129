//! Samples formulas for a noisy three-variable law and reports the best
//! one seen, in the spirit of the classic machine-scientist benchmark
//! `y = 50·sin(x0)/x2 − 4·x1 + 3 + ε`.
//!
//! Run with `cargo run --release --example recover`.

use conjecture::{Chain, Config, DataSet, Frame, random_provider};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conjecture=info".into()),
        )
        .init();

    random_provider::set_seed(7);

    let n = 100;
    let columns: Vec<Vec<f64>> = (0..3)
        .map(|_| (0..n).map(|_| random_provider::range(0.1..10.0)).collect())
        .collect();
    let y: Vec<f64> = (0..n)
        .map(|i| {
            50.0 * columns[0][i].sin() / columns[2][i] - 4.0 * columns[1][i] + 3.0
                + random_provider::gaussian(0.0, 0.5)
        })
        .collect();

    let mut x = Frame::new();
    for (i, column) in columns.into_iter().enumerate() {
        x = x.with_column(format!("x{i}"), column)?;
    }

    let config = Config {
        variables: (0..3).map(|i| format!("x{i}")).collect(),
        parameters: (0..5).map(|i| format!("a{i}")).collect(),
        burnin: 2000,
        samples: 500,
        thin: 10,
        write_files: false,
        verbose: true,
        ..Config::default()
    };

    let burnin = config.burnin;
    let samples = config.samples;
    let thin = config.thin;
    let mut chain = Chain::new(config, DataSet::new(x, y)?)?;

    for _ in 0..burnin {
        chain.step()?;
    }

    let mut best = (chain.bic(), chain.tree().print(), chain.par_values().clone());
    for s in 0..samples {
        for _ in 0..thin {
            chain.step()?;
        }
        if chain.bic() < best.0 {
            best = (chain.bic(), chain.tree().print(), chain.par_values().clone());
        }
        if s % 50 == 0 {
            println!(
                "sample {s:>4}  E = {:>12.3}  bic = {:>12.3}  {}",
                chain.energy(),
                chain.bic(),
                chain.tree().print()
            );
        }
    }

    println!("\nbest formula by BIC ({:.3}):\n  {}", best.0, best.1);
    println!("  with parameters:");
    for (name, value) in &best.2 {
        println!("    {name} = {value:.6}");
    }
    Ok(())
}
