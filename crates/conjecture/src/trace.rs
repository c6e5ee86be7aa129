//! Trace output: one JSON array per emitted sample
//! (`[index, bic, E, E_recomputed, formula, par_values]`) plus a terse
//! plain-text progress stream, both flushed per record so a run can be
//! watched or resumed mid-flight.

use crate::ParValues;
use conjecture_error::ConjectureResult;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct TraceSink {
    trace: BufWriter<File>,
    progress: BufWriter<File>,
}

impl TraceSink {
    /// Opens (or appends to, when `reset` is false) the trace and progress
    /// files.
    pub fn open(tracefn: &Path, progressfn: &Path, reset: bool) -> ConjectureResult<Self> {
        let open = |path: &Path| -> std::io::Result<File> {
            if reset {
                File::create(path)
            } else {
                OpenOptions::new().create(true).append(true).open(path)
            }
        };

        Ok(TraceSink {
            trace: BufWriter::new(open(tracefn)?),
            progress: BufWriter::new(open(progressfn)?),
        })
    }

    pub fn record(
        &mut self,
        sample: usize,
        bic: f64,
        energy: f64,
        energy_check: f64,
        formula: &str,
        par_values: &ParValues,
    ) -> ConjectureResult<()> {
        serde_json::to_writer(
            &mut self.trace,
            &(sample, bic, energy, energy_check, formula, par_values),
        )?;
        self.trace.write_all(b"\n")?;
        self.trace.flush()?;

        writeln!(self.progress, "{} {:.6} {:.6}", sample, energy, bic)?;
        self.progress.flush()?;
        Ok(())
    }
}

/// The 50-cell `=` bar drawn on stdout during burn-in and sampling.
pub(crate) struct ProgressBar {
    enabled: bool,
    every: usize,
}

impl ProgressBar {
    pub(crate) fn start(enabled: bool, label: &str, total: usize) -> Self {
        if enabled {
            print!("# {}\t[{}]", label, " ".repeat(50));
            print!("{}", "\u{8}".repeat(51));
            let _ = std::io::stdout().flush();
        }
        ProgressBar {
            enabled,
            every: (total / 50).max(1),
        }
    }

    pub(crate) fn tick(&self, step: usize) {
        if self.enabled && step % self.every == 0 {
            print!("=");
            let _ = std::io::stdout().flush();
        }
    }

    pub(crate) fn finish(&self) {
        if self.enabled {
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sink_writes_one_record_per_line() {
        let dir = std::env::temp_dir().join("conjecture-trace-test");
        fs::create_dir_all(&dir).unwrap();
        let tracefn = dir.join("trace.dat");
        let progressfn = dir.join("progress.dat");

        let pars: ParValues = [("a0".into(), 2.5)].into_iter().collect();
        let mut sink = TraceSink::open(&tracefn, &progressfn, true).unwrap();
        sink.record(0, -1.5, 3.0, 3.0, "(x * a0)", &pars).unwrap();
        sink.record(1, -2.5, 2.0, 2.0, "(x * a0)", &pars).unwrap();
        drop(sink);

        let trace = fs::read_to_string(&tracefn).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record[0], 0);
        assert_eq!(record[4], "(x * a0)");
        assert_eq!(record[5]["a0"], 2.5);

        let progress = fs::read_to_string(&progressfn).unwrap();
        assert_eq!(progress.lines().next().unwrap(), "0 3.000000 -1.500000");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_append_mode_keeps_existing_records() {
        let dir = std::env::temp_dir().join("conjecture-trace-append-test");
        fs::create_dir_all(&dir).unwrap();
        let tracefn = dir.join("trace.dat");
        let progressfn = dir.join("progress.dat");
        let pars = ParValues::new();

        let mut sink = TraceSink::open(&tracefn, &progressfn, true).unwrap();
        sink.record(0, 0.0, 0.0, 0.0, "x", &pars).unwrap();
        drop(sink);

        let mut sink = TraceSink::open(&tracefn, &progressfn, false).unwrap();
        sink.record(1, 0.0, 0.0, 0.0, "x", &pars).unwrap();
        drop(sink);

        let trace = fs::read_to_string(&tracefn).unwrap();
        assert_eq!(trace.lines().count(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
