use conjecture::random_provider::scoped_seed;
use conjecture::{Chain, Config, DataSet, EtPattern, Frame, Term};
use std::collections::BTreeMap;

fn quiet_config() -> Config {
    Config {
        write_files: false,
        verbose: false,
        ..Config::default()
    }
}

/// A fresh chain whose initial leaf is the given symbol, found by scanning
/// seeds.
fn chain_with_root(config: &Config, data: &DataSet, symbol: &str) -> Chain {
    for seed in 0..256 {
        let chain = scoped_seed(seed, || {
            Chain::new(config.clone(), data.clone()).unwrap()
        });
        if chain.tree().print() == symbol {
            return chain;
        }
    }
    panic!("no seed below 256 yields root `{symbol}`");
}

#[test]
fn construction_yields_a_single_leaf_chain() {
    let chain = chain_with_root(&quiet_config(), &DataSet::empty(), "x");

    assert_eq!(chain.tree().print(), "x");
    assert_eq!(chain.tree().size(), 1);
    assert_eq!(chain.tree().ets(0).len(), 1);
    assert!(
        chain
            .tree()
            .ops()
            .names()
            .iter()
            .all(|op| chain.tree().nops(op) == 0)
    );
    assert_eq!(chain.sse(), 0.0);
    assert_eq!(chain.bic(), 0.0);
    assert_eq!(chain.energy(), 0.0);
}

fn line_config() -> Config {
    Config {
        variables: vec!["x0".to_string()],
        parameters: vec!["a0".to_string(), "a1".to_string()],
        ..quiet_config()
    }
}

fn line_data() -> DataSet {
    let x = Frame::new()
        .with_column("x0", vec![1.0, 2.0, 3.0, 4.0])
        .unwrap();
    let y: Vec<f64> = [1.0, 2.0, 3.0, 4.0]
        .iter()
        .map(|xi| 2.0 * xi + 1.0)
        .collect();
    DataSet::new(x, y).unwrap()
}

/// Builds `(a0 + (a1 * x0))` in place on a fresh chain.
fn grow_line_formula(chain: &mut Chain) {
    let root = chain.tree().root();
    chain
        .apply_et(
            root,
            &EtPattern {
                value: Term::op("+"),
                leaves: vec![Term::param("a0"), Term::var("x0")],
            },
        )
        .unwrap();
    let second = chain.tree().node(root).offspring()[1];
    chain
        .apply_et(
            second,
            &EtPattern {
                value: Term::op("*"),
                leaves: vec![Term::param("a1"), Term::var("x0")],
            },
        )
        .unwrap();
    assert_eq!(chain.tree().print(), "(a0 + (a1 * x0))");
}

#[test]
fn fitting_a_linear_formula_recovers_its_parameters_and_bic() {
    let mut chain = chain_with_root(&line_config(), &line_data(), "x0");
    grow_line_formula(&mut chain);

    let a0 = chain.par_values()["a0"];
    let a1 = chain.par_values()["a1"];
    assert!((a0 - 1.0).abs() < 1e-6, "a0 = {a0}");
    assert!((a1 - 2.0).abs() < 1e-6, "a1 = {a1}");
    assert!(chain.sse() < 1e-9, "sse = {}", chain.sse());

    // BIC = (k - n)·ln n + n·(ln 2π + ln sse + 1) with k = 1 + 2 params.
    let n = 4.0_f64;
    let expected =
        (3.0 - n) * n.ln() + n * ((2.0 * std::f64::consts::PI).ln() + chain.sse().ln() + 1.0);
    assert!(
        (chain.bic() - expected).abs() < 1e-9,
        "bic = {}, expected {}",
        chain.bic(),
        expected
    );

    let predicted = chain
        .predict(&Frame::new().with_column("x0", vec![10.0]).unwrap())
        .unwrap();
    assert!((predicted[0] - 21.0).abs() < 1e-5);
}

#[test]
fn incremental_energy_matches_recomputation_throughout_a_run() {
    scoped_seed(17, || {
        let mut chain = Chain::new(line_config(), line_data()).unwrap();
        for block in 0..60 {
            for _ in 0..5 {
                chain.step().unwrap();
            }
            chain.tree().validate().unwrap();
            let drift = (chain.energy() - chain.recomputed_energy()).abs();
            assert!(drift < 1e-6, "drift {drift} at block {block}");
        }
    });
}

#[test]
fn trace_records_are_newline_delimited_json_arrays() {
    let dir = std::env::temp_dir().join("conjecture-chain-trace-test");
    std::fs::create_dir_all(&dir).unwrap();

    let config = Config {
        burnin: 20,
        samples: 5,
        thin: 2,
        tracefn: dir.join("trace.dat"),
        progressfn: dir.join("progress.dat"),
        write_files: true,
        verbose: false,
        ..line_config()
    };

    scoped_seed(5, || {
        let mut chain = Chain::new(config.clone(), line_data()).unwrap();
        chain.run().unwrap();
    });

    let trace = std::fs::read_to_string(&config.tracefn).unwrap();
    let lines: Vec<&str> = trace.lines().collect();
    assert_eq!(lines.len(), 5);
    for (s, line) in lines.iter().enumerate() {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(record[0], s);
        assert!(record[4].is_string());
        assert!(record[5].is_object());
        // Incremental and recomputed energy agree in every record.
        let e = record[2].as_f64().unwrap();
        let e_check = record[3].as_f64().unwrap();
        assert!((e - e_check).abs() < 1e-6);
    }

    let progress = std::fs::read_to_string(&config.progressfn).unwrap();
    assert_eq!(progress.lines().count(), 5);
    assert!(progress.lines().next().unwrap().starts_with("0 "));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn chain_recovers_a_linear_law_with_a_restricted_catalog() {
    // Narrowing the catalog to {+, *} keeps the search space small enough
    // for a short seeded run to find y = 2x + 1 (or an equivalent form).
    let ops: BTreeMap<String, usize> = [("+".to_string(), 2), ("*".to_string(), 2)]
        .into_iter()
        .collect();
    let config = Config {
        ops,
        burnin: 500,
        ..line_config()
    };

    scoped_seed(23, || {
        let mut chain = Chain::new(config.clone(), line_data()).unwrap();
        for _ in 0..config.burnin {
            chain.step().unwrap();
        }

        let mut best_sse = chain.sse();
        for _ in 0..200 {
            for _ in 0..5 {
                chain.step().unwrap();
            }
            best_sse = best_sse.min(chain.sse());
        }

        let n = 4.0;
        assert!(
            best_sse / n < 0.5,
            "best sse/n = {} after sampling",
            best_sse / n
        );
    });
}

#[test]
fn trace_predict_returns_one_row_per_sample() {
    let config = Config {
        burnin: 30,
        samples: 4,
        thin: 4,
        ..line_config()
    };
    let held_out = Frame::new().with_column("x0", vec![5.0, 6.0]).unwrap();

    scoped_seed(9, || {
        let mut chain = Chain::new(config, line_data()).unwrap();
        let predictions = chain.trace_predict(&held_out).unwrap();

        assert_eq!(predictions.len(), 4);
        assert!(predictions.iter().all(|row| row.len() == 2));
    });
}

/// The full recovery scenario from the reference experiment: a noisy
/// three-variable law sampled for long enough that the best-BIC formula
/// explains the data down to the noise floor. Slow; run with `--ignored`.
#[test]
#[ignore]
fn chain_recovers_a_noisy_trigonometric_law() {
    use conjecture::random_provider;

    random_provider::set_seed(1);
    let n = 100;
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); 3];
    for column in columns.iter_mut() {
        for _ in 0..n {
            column.push(random_provider::range(0.1..10.0));
        }
    }
    let sigma = 0.5;
    let y: Vec<f64> = (0..n)
        .map(|i| {
            50.0 * columns[0][i].sin() / columns[2][i] - 4.0 * columns[1][i] + 3.0
                + random_provider::gaussian(0.0, sigma)
        })
        .collect();

    let mut x = Frame::new();
    for (i, column) in columns.into_iter().enumerate() {
        x = x.with_column(format!("x{i}"), column).unwrap();
    }

    let config = Config {
        variables: (0..3).map(|i| format!("x{i}")).collect(),
        parameters: (0..5).map(|i| format!("a{i}")).collect(),
        burnin: 2000,
        ..quiet_config()
    };
    let mut chain = Chain::new(config, DataSet::new(x, y).unwrap()).unwrap();

    for _ in 0..2000 {
        chain.step().unwrap();
    }
    let mut best_sse = chain.sse();
    for _ in 0..2000 {
        for _ in 0..10 {
            chain.step().unwrap();
        }
        best_sse = best_sse.min(chain.sse());
    }

    assert!(
        best_sse / n as f64 <= 2.0 * sigma * sigma,
        "best sse/n = {}",
        best_sse / n as f64
    );
}
