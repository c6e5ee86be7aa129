//! Numeric kernels for the default operator catalog.
//!
//! Unlike a typical genetic-programming kernel set, nothing here clamps or
//! repairs its output: overflow and domain errors must surface as infinite
//! or NaN values so the energy model can price the offending formula at
//! infinite SSE and let the chain reject it.

/// Applies the named operator to its arguments. Returns `None` when the
/// symbol has no kernel or the argument count does not match the kernel's
/// arity, which callers surface as an evaluation failure.
pub fn apply(name: &str, args: &[f64]) -> Option<f64> {
    Some(match (name, args) {
        ("sin", [a]) => a.sin(),
        ("cos", [a]) => a.cos(),
        ("tan", [a]) => a.tan(),
        ("exp", [a]) => a.exp(),
        ("log", [a]) => a.ln(),
        ("sinh", [a]) => a.sinh(),
        ("cosh", [a]) => a.cosh(),
        ("tanh", [a]) => a.tanh(),
        ("pow2", [a]) => a * a,
        ("pow3", [a]) => a * a * a,
        ("abs", [a]) => a.abs(),
        ("sqrt", [a]) => a.sqrt(),
        ("fac", [a]) => factorial(*a),
        ("-", [a]) => -a,
        ("+", [a, b]) => a + b,
        ("*", [a, b]) => a * b,
        ("/", [a, b]) => a / b,
        ("**", [a, b]) => a.powf(*b),
        _ => return None,
    })
}

/// Real-argument factorial, x! = Γ(x + 1). Negative arguments are NaN.
fn factorial(x: f64) -> f64 {
    if x < 0.0 {
        return f64::NAN;
    }
    ln_gamma(x + 1.0).exp()
}

/// Lanczos approximation (g = 7) of ln Γ(x), valid for x > 0.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];

    if x <= 0.0 {
        return f64::NAN;
    }

    let x = x - 1.0;
    let mut a = COEFFS[0];
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    let t = x + G + 0.5;

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_basic_kernels() {
        assert!(close(apply("sin", &[0.0]).unwrap(), 0.0, 1e-12));
        assert!(close(apply("pow2", &[3.0]).unwrap(), 9.0, 1e-12));
        assert!(close(apply("pow3", &[2.0]).unwrap(), 8.0, 1e-12));
        assert!(close(apply("+", &[1.5, 2.5]).unwrap(), 4.0, 1e-12));
        assert!(close(apply("**", &[2.0, 10.0]).unwrap(), 1024.0, 1e-9));
        assert!(close(apply("-", &[4.0]).unwrap(), -4.0, 1e-12));
    }

    #[test]
    fn test_domain_errors_surface() {
        assert!(apply("log", &[-1.0]).unwrap().is_nan());
        assert!(apply("sqrt", &[-4.0]).unwrap().is_nan());
        assert!(apply("/", &[0.0, 0.0]).unwrap().is_nan());
        assert!(apply("/", &[1.0, 0.0]).unwrap().is_infinite());
        assert!(apply("exp", &[1e10]).unwrap().is_infinite());
    }

    #[test]
    fn test_factorial() {
        assert!(close(apply("fac", &[4.0]).unwrap(), 24.0, 1e-9));
        assert!(close(apply("fac", &[0.0]).unwrap(), 1.0, 1e-9));
        // Γ(1.5) = sqrt(pi) / 2
        assert!(close(apply("fac", &[0.5]).unwrap(), 0.8862269254527580, 1e-9));
        assert!(apply("fac", &[-1.0]).unwrap().is_nan());
    }

    #[test]
    fn test_unknown_or_mismatched() {
        assert_eq!(apply("fact", &[1.0]), None);
        assert_eq!(apply("sin", &[1.0, 2.0]), None);
        assert_eq!(apply("+", &[1.0]), None);
    }
}
