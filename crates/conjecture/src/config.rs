use crate::ops::default_ops;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a [Chain](crate::Chain) needs besides the data: vocabularies,
/// the operator catalog, prior weights, temperatures, move-channel
/// probabilities, loop lengths and trace output controls. Every field has a
/// default, so partial configurations deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Leaf symbols resolved against data columns.
    pub variables: Vec<String>,
    /// Leaf symbols calibrated numerically by the fitter.
    pub parameters: Vec<String>,
    /// Operator catalog, symbol to arity.
    pub ops: BTreeMap<String, usize>,
    /// Prior weights keyed `Nopi_<op>`. Empty means 5.0 for every
    /// operator; operators without an entry contribute nothing to the
    /// prior energy.
    pub prior_par: BTreeMap<String, f64>,
    /// BIC temperature.
    #[serde(rename = "BT")]
    pub bt: f64,
    /// Prior temperature.
    #[serde(rename = "PT")]
    pub pt: f64,
    /// Hard cap on tree size.
    pub max_size: usize,
    /// Probability of the root-move channel.
    pub p_rr: f64,
    /// Probability of the long-range channel. The remainder goes to the
    /// elementary-tree channel.
    pub p_long: f64,
    pub burnin: usize,
    pub thin: usize,
    pub samples: usize,
    pub tracefn: PathBuf,
    pub progressfn: PathBuf,
    pub write_files: bool,
    /// Truncate the trace files instead of appending.
    pub reset_files: bool,
    /// Draw a progress bar on stdout while running.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            variables: vec!["x".to_string()],
            parameters: vec!["a".to_string()],
            ops: default_ops(),
            prior_par: BTreeMap::new(),
            bt: 1.0,
            pt: 1.0,
            max_size: 50,
            p_rr: 0.05,
            p_long: 0.5,
            burnin: 2000,
            thin: 10,
            samples: 10000,
            tracefn: PathBuf::from("trace.dat"),
            progressfn: PathBuf::from("progress.dat"),
            write_files: true,
            reset_files: true,
            verbose: true,
        }
    }
}
