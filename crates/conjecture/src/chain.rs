//! The single-chain RJ-MCMC sampler: energy model (SSE through the fitter,
//! BIC, operator prior) and the Metropolis-Hastings driver over the three
//! move channels.
//!
//! Every ΔE is computed by temporarily applying the proposal, refitting,
//! and undoing it again; the tree, the ET index, the counters and the
//! goodness-of-fit state are restored exactly, so a rejected proposal
//! leaves no trace. Fit and evaluation failures are local: they price the
//! proposal at infinite SSE, the channel rejects, and the chain continues.

use crate::ParValues;
use crate::config::Config;
use crate::data::{DataSet, Frame};
use crate::eval;
use crate::fit::{Fitter, LevenbergMarquardt};
use crate::ops::{OpSet, Term};
use crate::random_provider;
use crate::trace::{ProgressBar, TraceSink};
use crate::tree::{EtPattern, NodeId, RrPattern, Tree};
use compact_str::CompactString;
use conjecture_error::{ConjectureResult, conjecture_bail, ensure};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Iteration cap handed to the fitter on every calibration.
const MAX_FEV: usize = 10_000;

/// One MCMC chain: a [Tree] plus the statistical state around it.
///
/// The energy of a state is `BIC / (2·BT) + Σ prior_weight·count / PT`,
/// the approximate minus log-posterior of the formula given the data. The
/// chain tracks it incrementally: accepted moves add their ΔE, and
/// [recomputed_energy](Self::recomputed_energy) rebuilds it from the
/// current BIC and counters as a consistency check.
pub struct Chain {
    tree: Tree,
    data: DataSet,
    fitter: Box<dyn Fitter>,
    config: Config,
    prior_par: BTreeMap<String, f64>,
    par_values: ParValues,
    bt: f64,
    pt: f64,
    sse: f64,
    bic: f64,
    energy: f64,
}

impl Chain {
    pub fn new(config: Config, data: DataSet) -> ConjectureResult<Self> {
        ensure!(
            config.bt > 0.0 && config.pt > 0.0,
            InvalidConfig: "temperatures must be positive (BT = {}, PT = {})",
            config.bt,
            config.pt
        );
        ensure!(
            config.p_rr >= 0.0 && config.p_long >= 0.0 && config.p_rr + config.p_long <= 1.0,
            InvalidConfig: "move-channel probabilities p_rr = {}, p_long = {} must be non-negative and sum to at most 1",
            config.p_rr,
            config.p_long
        );

        let ops = OpSet::from_map(&config.ops)?;
        let tree = Tree::new(ops, &config.variables, &config.parameters, config.max_size)?;

        if !data.is_empty() {
            for v in &config.variables {
                ensure!(
                    data.x().column(v).is_some(),
                    InvalidConfig: "no data column for variable `{}`",
                    v
                );
            }
        }

        let par_values: ParValues = config
            .parameters
            .iter()
            .map(|p| (CompactString::from(p.as_str()), 1.0))
            .collect();
        let prior_par = if config.prior_par.is_empty() {
            tree.ops()
                .names()
                .iter()
                .map(|op| (format!("Nopi_{}", op), 5.0))
                .collect()
        } else {
            config.prior_par.clone()
        };

        let mut chain = Chain {
            bt: config.bt,
            pt: config.pt,
            tree,
            data,
            fitter: Box::new(LevenbergMarquardt::default()),
            config,
            prior_par,
            par_values,
            sse: 0.0,
            bic: 0.0,
            energy: 0.0,
        };
        chain.update_gof(true);
        chain.energy = chain.recomputed_energy();
        Ok(chain)
    }

    /// Swaps in a different fitter and recalibrates the current state.
    pub fn with_fitter(mut self, fitter: Box<dyn Fitter>) -> Self {
        self.fitter = fitter;
        self.update_gof(true);
        self.energy = self.recomputed_energy();
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn par_values(&self) -> &ParValues {
        &self.par_values
    }

    pub fn sse(&self) -> f64 {
        self.sse
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// The incrementally tracked energy.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// The energy rebuilt from the current BIC and operator counts.
    pub fn recomputed_energy(&self) -> f64 {
        self.bic / (2.0 * self.bt) + self.prior_energy()
    }

    /// `Σ prior_weight · count / PT` over operators with a prior entry.
    pub fn prior_energy(&self) -> f64 {
        let mut e = 0.0;
        for op in self.tree.ops().names() {
            if let Some(weight) = self.prior_par.get(&format!("Nopi_{}", op)) {
                e += weight * self.tree.nops(op) as f64 / self.pt;
            }
        }
        e
    }

    fn prior_weight(&self, term: &Term) -> f64 {
        match term {
            Term::Op(name) => self
                .prior_par
                .get(&format!("Nopi_{}", name))
                .copied()
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Applies an ET replacement outside the MCMC walk and recalibrates,
    /// for seeding a chain with a known structure.
    pub fn apply_et(&mut self, target: NodeId, new: &EtPattern) -> ConjectureResult<NodeId> {
        let id = self.tree.et_replace(target, new)?;
        self.update_gof(true);
        self.energy = self.recomputed_energy();
        Ok(id)
    }

    /// Recomputes `sse` and `bic`, fitting the parameters first when asked.
    fn update_gof(&mut self, fit: bool) {
        let sse = self.compute_sse(fit);
        self.sse = sse;
        self.bic = self.bic_of(sse);
    }

    fn compute_sse(&mut self, fit: bool) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }

        let (_, params) = self.tree.atoms();
        // With no parameter in the tree there is nothing to calibrate and
        // the current values stand.
        if fit && !params.is_empty() {
            let names: Vec<CompactString> = params
                .iter()
                .map(|p| CompactString::from(p.name()))
                .collect();
            let theta0: Vec<f64> = names
                .iter()
                .map(|name| self.par_values.get(name).copied().unwrap_or(1.0))
                .collect();

            let tree = &self.tree;
            let x = self.data.x();
            let model_names = names.clone();
            let model = move |theta: &[f64]| -> ConjectureResult<Vec<f64>> {
                let pars: ParValues = model_names
                    .iter()
                    .cloned()
                    .zip(theta.iter().copied())
                    .collect();
                eval::eval_frame(tree, x, &pars)
            };

            match self.fitter.fit(&model, self.data.y(), &theta0, MAX_FEV) {
                Ok(theta) => {
                    // Parameters absent from the formula reset to 1.0.
                    let mut fitted: ParValues = self
                        .tree
                        .parameters()
                        .iter()
                        .map(|p| (CompactString::from(p.name()), 1.0))
                        .collect();
                    for (name, value) in names.iter().zip(theta) {
                        fitted.insert(name.clone(), value);
                    }
                    self.par_values = fitted;
                }
                Err(error) => {
                    warn!(formula = %self.tree, %error, "cannot fit");
                    return f64::INFINITY;
                }
            }
        }

        match eval::eval_frame(&self.tree, self.data.x(), &self.par_values) {
            Ok(predicted) => {
                let mut sse = 0.0;
                for (yi, fi) in self.data.y().iter().zip(&predicted) {
                    let r = yi - fi;
                    if r.is_nan() {
                        warn!(formula = %self.tree, "evaluation produced NaN");
                        return f64::INFINITY;
                    }
                    sse += r * r;
                }
                sse
            }
            Err(error) => {
                warn!(formula = %self.tree, %error, "cannot evaluate");
                f64::INFINITY
            }
        }
    }

    /// `BIC = (k − n)·ln n + n·(ln 2π + ln sse + 1)` with `k` counting one
    /// noise parameter plus the distinct formula parameters.
    fn bic_of(&self, sse: f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let (_, params) = self.tree.atoms();
        let k = (1 + params.len()) as f64;
        let n = self.data.y().len() as f64;
        (k - n) * n.ln() + n * ((2.0 * std::f64::consts::PI).ln() + sse.ln() + 1.0)
    }

    /// ΔE of swapping the ET at `target` for `new`, plus the parameter
    /// values the swapped state would carry. The tree and the
    /// goodness-of-fit state come back exactly as they were.
    pub fn de_et(
        &mut self,
        target: NodeId,
        new: &EtPattern,
    ) -> ConjectureResult<(f64, ParValues)> {
        let old_value = self.tree.node(target).value().clone();
        let mut de = (self.prior_weight(&new.value) - self.prior_weight(&old_value)) / self.pt;

        let par_new;
        if !self.data.is_empty() {
            let (bic_old, sse_old, par_old) = (self.bic, self.sse, self.par_values.clone());
            let old = self.tree.et_pattern_of(target);

            self.tree.et_replace(target, new)?;
            self.update_gof(true);
            let bic_new = self.bic;
            par_new = self.par_values.clone();

            self.tree.et_replace(target, &old)?;
            self.bic = bic_old;
            self.sse = sse_old;
            self.par_values = par_old;

            de += (bic_new - bic_old) / (2.0 * self.bt);
        } else {
            par_new = self.par_values.clone();
        }

        if !de.is_finite() {
            de = f64::INFINITY;
        }
        Ok((de, par_new))
    }

    /// ΔE of relabeling `target` to `new` (same arity).
    pub fn de_lr(&mut self, target: NodeId, new: &Term) -> ConjectureResult<(f64, ParValues)> {
        let old_value = self.tree.node(target).value().clone();
        let mut de = (self.prior_weight(new) - self.prior_weight(&old_value)) / self.pt;

        let par_new;
        if !self.data.is_empty() {
            let (bic_old, sse_old, par_old) = (self.bic, self.sse, self.par_values.clone());

            let old = self.tree.swap_value(target, new.clone());
            self.update_gof(true);
            let bic_new = self.bic;
            par_new = self.par_values.clone();

            self.tree.swap_value(target, old);
            self.bic = bic_old;
            self.sse = sse_old;
            self.par_values = par_old;

            de += (bic_new - bic_old) / (2.0 * self.bt);
        } else {
            par_new = self.par_values.clone();
        }

        if !de.is_finite() {
            de = f64::INFINITY;
        }
        Ok((de, par_new))
    }

    /// ΔE of a root move: `Some(rr)` prices adding that root replacement,
    /// `None` prices pruning the current root. Infeasible proposals (an
    /// oversize replacement, a non-prunable root) are +∞ so the channel
    /// rejects them without touching the tree.
    pub fn de_rr(&mut self, rr: Option<&RrPattern>) -> ConjectureResult<(f64, ParValues)> {
        let Some(rr) = rr else {
            return self.de_root_prune();
        };

        let Some(arity) = self.tree.ops().arity(rr.op.name()) else {
            conjecture_bail!(InvalidMove: "unknown operator `{}`", rr.op);
        };
        if self.tree.size() + arity > self.tree.max_size() {
            return Ok((f64::INFINITY, self.par_values.clone()));
        }

        let mut de = self.prior_weight(&rr.op) / self.pt;
        let par_new;
        if !self.data.is_empty() {
            let (bic_old, sse_old, par_old) = (self.bic, self.sse, self.par_values.clone());

            if self.tree.replace_root(rr)?.is_none() {
                return Ok((f64::INFINITY, self.par_values.clone()));
            }
            self.update_gof(true);
            let bic_new = self.bic;
            par_new = self.par_values.clone();

            if self.tree.prune_root().is_none() {
                conjecture_bail!(InvalidMove: "failed to undo a temporary root replacement");
            }
            self.bic = bic_old;
            self.sse = sse_old;
            self.par_values = par_old;

            de += (bic_new - bic_old) / (2.0 * self.bt);
        } else {
            par_new = self.par_values.clone();
        }

        if !de.is_finite() {
            de = f64::INFINITY;
        }
        Ok((de, par_new))
    }

    fn de_root_prune(&mut self) -> ConjectureResult<(f64, ParValues)> {
        if !self.tree.is_root_prunable() {
            return Ok((f64::INFINITY, self.par_values.clone()));
        }

        let root_value = self.tree.node(self.tree.root()).value().clone();
        let mut de = -self.prior_weight(&root_value) / self.pt;

        let par_new;
        if !self.data.is_empty() {
            let (bic_old, sse_old, par_old) = (self.bic, self.sse, self.par_values.clone());

            let Some(old_rr) = self.tree.prune_root() else {
                conjecture_bail!(InvalidMove: "root prune failed on a prunable root");
            };
            self.update_gof(true);
            let bic_new = self.bic;
            par_new = self.par_values.clone();

            if self.tree.replace_root(&old_rr)?.is_none() {
                conjecture_bail!(InvalidMove: "failed to undo a temporary root prune");
            }
            self.bic = bic_old;
            self.sse = sse_old;
            self.par_values = par_old;

            de += (bic_new - bic_old) / (2.0 * self.bt);
        } else {
            par_new = self.par_values.clone();
        }

        if !de.is_finite() {
            de = f64::INFINITY;
        }
        Ok((de, par_new))
    }

    /// One MCMC step: pick a move channel, price the proposal, and apply
    /// it if the Metropolis-Hastings test accepts.
    pub fn step(&mut self) -> ConjectureResult<()> {
        let dice: f64 = random_provider::random();
        if dice < self.config.p_rr {
            self.root_move()
        } else if dice < self.config.p_rr + self.config.p_long {
            self.long_range_move()
        } else {
            self.et_move()
        }
    }

    /// Commits an accepted move: the tree mutation has been applied by the
    /// caller, the fitted parameters move in, and BIC is recomputed from
    /// them without another fit.
    fn commit(&mut self, par_new: ParValues, de: f64) {
        self.par_values = par_new;
        self.update_gof(false);
        self.energy += de;
    }

    fn root_move(&mut self) -> ConjectureResult<()> {
        let num_rr = self.tree.num_rr() as f64;
        if random_provider::random::<f64>() < 0.5 {
            let (de, par_new) = self.de_rr(None)?;
            // Hastings correction: the inverse replacement picks this
            // state out of num_rr candidates.
            let p_accept = (-de).exp() / num_rr;
            if random_provider::random::<f64>() < p_accept {
                if self.tree.prune_root().is_none() {
                    conjecture_bail!(InvalidMove: "accepted a root prune on a non-prunable root");
                }
                self.commit(par_new, de);
            }
        } else {
            let rr = random_provider::choose(self.tree.rr_space()).clone();
            let (de, par_new) = self.de_rr(Some(&rr))?;
            let p_accept = num_rr * (-de).exp();
            if random_provider::random::<f64>() < p_accept {
                // A sentinel from the move means the proposal was
                // infeasible; the state is unchanged and the step ends.
                if self.tree.replace_root(&rr)?.is_some() {
                    self.commit(par_new, de);
                }
            }
        }
        Ok(())
    }

    fn long_range_move(&mut self) -> ConjectureResult<()> {
        let target = *random_provider::choose(self.tree.nodes());
        let new = if self.tree.node(target).is_leaf() {
            random_provider::choose(&self.tree.leaf_terms()).clone()
        } else {
            let arity = self.tree.node(target).arity();
            loop {
                let name = random_provider::choose(self.tree.ops().names());
                if self.tree.ops().arity(name) == Some(arity) {
                    break Term::Op(name.clone());
                }
            }
        };

        let (de, par_new) = self.de_lr(target, &new)?;
        if random_provider::random::<f64>() < (-de).exp() {
            self.tree.relabel(target, new);
            self.commit(par_new, de);
        }
        Ok(())
    }

    fn et_move(&mut self) -> ConjectureResult<()> {
        let size = self.tree.size() as isize;
        let max = self.tree.max_size() as isize;

        let feasible: Vec<(usize, usize)> = self
            .tree
            .move_types()
            .iter()
            .copied()
            .filter(|&(o_i, o_f)| {
                !self.tree.ets(o_i).is_empty() && size - o_i as isize + o_f as isize <= max
            })
            .collect();
        if feasible.is_empty() {
            return Ok(());
        }

        let &(o_i, o_f) = random_provider::choose(&feasible);
        let Some(target) = self.tree.ets(o_i).choose() else {
            conjecture_bail!(InvalidMove: "feasible ET bucket {} is empty", o_i);
        };
        let new = random_provider::choose(self.tree.et_space(o_f)).clone();

        let weights = self.tree.et_move_weights(target, o_f);
        let (de, par_new) = self.de_et(target, &new)?;
        if random_provider::random::<f64>() < weights.acceptance(de) {
            self.tree.et_replace(target, &new)?;
            self.commit(par_new, de);
        }
        Ok(())
    }

    /// Burn-in followed by thinned sampling, emitting one trace record per
    /// sample block.
    pub fn run(&mut self) -> ConjectureResult<()> {
        debug!(
            burnin = self.config.burnin,
            samples = self.config.samples,
            thin = self.config.thin,
            "starting mcmc run"
        );

        let bar = ProgressBar::start(self.config.verbose, "Burning in", self.config.burnin);
        for i in 0..self.config.burnin {
            self.step()?;
            bar.tick(i);
        }
        bar.finish();

        let mut sink = self.open_sink()?;
        let bar = ProgressBar::start(self.config.verbose, "Sampling", self.config.samples);
        for s in 0..self.config.samples {
            for _ in 0..self.config.thin {
                self.step()?;
            }
            bar.tick(s);
            self.emit(&mut sink, s)?;
        }
        bar.finish();
        Ok(())
    }

    /// Evaluates the current formula at held-out columns with the current
    /// parameter values.
    pub fn predict(&self, x: &Frame) -> ConjectureResult<Vec<f64>> {
        eval::eval_frame(&self.tree, x, &self.par_values)
    }

    /// Predictive sampling: like [run](Self::run), but before each sample
    /// block the BIC temperature is inflated to 1e100 for `thin / 4` steps
    /// so the prior dominates and the chain escapes deep wells, then reset
    /// to 1 for `thin` normal steps. Each block ends by evaluating the
    /// current formula at `x`; returns one prediction row per sample.
    pub fn trace_predict(&mut self, x: &Frame) -> ConjectureResult<Vec<Vec<f64>>> {
        debug!(
            burnin = self.config.burnin,
            samples = self.config.samples,
            thin = self.config.thin,
            "starting predictive run"
        );

        let bar = ProgressBar::start(self.config.verbose, "Burning in", self.config.burnin);
        for i in 0..self.config.burnin {
            self.step()?;
            bar.tick(i);
        }
        bar.finish();

        let mut sink = self.open_sink()?;
        let mut predictions = Vec::with_capacity(self.config.samples);
        let bar = ProgressBar::start(self.config.verbose, "Sampling", self.config.samples);
        for s in 0..self.config.samples {
            self.bt = 1e100;
            self.update_gof(false);
            self.energy = self.recomputed_energy();
            for _ in 0..self.config.thin / 4 {
                self.step()?;
            }

            self.bt = 1.0;
            self.update_gof(false);
            self.energy = self.recomputed_energy();
            for _ in 0..self.config.thin {
                self.step()?;
            }

            predictions.push(self.predict(x)?);
            bar.tick(s);
            self.emit(&mut sink, s)?;
        }
        bar.finish();
        Ok(predictions)
    }

    fn open_sink(&self) -> ConjectureResult<Option<TraceSink>> {
        if !self.config.write_files {
            return Ok(None);
        }
        TraceSink::open(
            &self.config.tracefn,
            &self.config.progressfn,
            self.config.reset_files,
        )
        .map(Some)
    }

    fn emit(&self, sink: &mut Option<TraceSink>, sample: usize) -> ConjectureResult<()> {
        if let Some(sink) = sink.as_mut() {
            sink.record(
                sample,
                self.bic,
                self.energy,
                self.recomputed_energy(),
                &self.tree.print(),
                &self.par_values,
            )?;
        }
        Ok(())
    }
}
