//! Model parameters: names, defaults, bounds and vary flags.
//!
//! A `ParameterSet` is the unit the fit driver works on. It always carries the
//! full, ordered vector of a model's parameters; locked entries are simply
//! excluded from the free vector the optimizers see.

use serde::{Deserialize, Serialize};

use crate::domain::ModelKind;
use crate::error::AppError;

/// Lower bound of every strictly positive parameter.
pub const PARAM_EPSILON: f64 = 0.001;

pub const CYTON1_NAMES: [&str; 13] = [
    "mu0Div",
    "sig0Div",
    "mu0Death",
    "sig0Death",
    "muSubDiv",
    "sigSubDiv",
    "muSubDeath",
    "sigSubDeath",
    "pF0",
    "pFMu",
    "pFSig",
    "MDProp",
    "MDDecay",
];

const CYTON1_DEFAULTS: [f64; 13] = [40.0, 0.2, 60.0, 0.2, 15.0, 0.5, 13.0, 0.4, 1.0, 10.0, 2.0, 0.0, 0.5];
const CYTON1_UPPERS: [f64; 13] = [100.0, 1.0, 100.0, 1.0, 100.0, 1.0, 100.0, 1.0, 1.0, 50.0, 5.0, 1.0, 1.0];

pub const CYTON15_NAMES: [&str; 10] = [
    "unstimMuDeath",
    "unstimSigDeath",
    "stimMuDiv",
    "stimSigDiv",
    "stimMuDeath",
    "stimSigDeath",
    "stimMuDD",
    "stimSigDD",
    "b",
    "pF",
];

const CYTON15_DEFAULTS: [f64; 10] = [15.0, 0.5, 25.0, 0.2, 75.0, 0.2, 50.0, 0.15, 10.0, 0.7];
const CYTON15_UPPERS: [f64; 10] = [300.0, 1.0, 200.0, 1.0, 300.0, 1.0, 300.0, 1.0, 50.0, 1.0];

/// One named scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub vary: bool,
    pub lower: f64,
    pub upper: f64,
}

impl Parameter {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// The full, ordered parameter vector of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub model: ModelKind,
    pub params: Vec<Parameter>,
}

impl ParameterSet {
    /// Default values and bounds, everything free.
    pub fn defaults(model: ModelKind) -> Self {
        let (values, uppers): (&[f64], &[f64]) = match model {
            ModelKind::Cyton1 => (&CYTON1_DEFAULTS, &CYTON1_UPPERS),
            ModelKind::Cyton15 => (&CYTON15_DEFAULTS, &CYTON15_UPPERS),
        };
        let params = model
            .parameter_names()
            .iter()
            .zip(values.iter().zip(uppers))
            .map(|(name, (&value, &upper))| Parameter {
                name: (*name).to_string(),
                value,
                vary: true,
                lower: default_lower(model, name),
                upper,
            })
            .collect();
        Self { model, params }
    }

    /// Defaults with the given values substituted in declared order.
    pub fn from_values(model: ModelKind, values: &[f64]) -> Result<Self, AppError> {
        let set = Self::defaults(model).with_values(values)?;
        Ok(set)
    }

    /// Copy of `self` with new values (bounds and vary flags are kept).
    pub fn with_values(&self, values: &[f64]) -> Result<Self, AppError> {
        if values.len() != self.params.len() {
            return Err(AppError::invalid(format!(
                "{} expects {} parameters, got {}",
                self.model.display_name(),
                self.params.len(),
                values.len()
            )));
        }
        let mut out = self.clone();
        for (p, &v) in out.params.iter_mut().zip(values) {
            p.value = v;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Parameter, AppError> {
        let model = self.model;
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| AppError::invalid(format!("{} has no parameter '{name}'", model.display_name())))
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), AppError> {
        self.get_mut(name)?.value = value;
        Ok(())
    }

    pub fn set_vary(&mut self, name: &str, vary: bool) -> Result<(), AppError> {
        self.get_mut(name)?.vary = vary;
        Ok(())
    }

    pub fn set_bounds(&mut self, name: &str, lower: f64, upper: f64) -> Result<(), AppError> {
        let p = self.get_mut(name)?;
        p.lower = lower;
        p.upper = upper;
        Ok(())
    }

    /// Lock every parameter except the named ones.
    pub fn vary_only(&mut self, names: &[&str]) -> Result<(), AppError> {
        for n in names {
            self.get_mut(n)?;
        }
        for p in &mut self.params {
            p.vary = names.contains(&p.name.as_str());
        }
        Ok(())
    }

    /// Indices (into the full vector) of the parameters the optimizer may move.
    pub fn free_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.vary)
            .map(|(i, _)| i)
            .collect()
    }

    /// Check names, order, bounds and that every value sits inside its bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        let expected = self.model.parameter_names();
        if self.params.len() != expected.len() {
            return Err(AppError::invalid(format!(
                "{} expects {} parameters, got {}",
                self.model.display_name(),
                expected.len(),
                self.params.len()
            )));
        }
        for (p, name) in self.params.iter().zip(expected) {
            if p.name != *name {
                return Err(AppError::invalid(format!(
                    "Parameter order mismatch: expected '{name}', found '{}'",
                    p.name
                )));
            }
            if !(p.lower.is_finite() && p.upper.is_finite() && p.lower <= p.upper) {
                return Err(AppError::invalid(format!(
                    "Parameter '{}' has invalid bounds [{}, {}]",
                    p.name, p.lower, p.upper
                )));
            }
            if is_fraction(self.model, &p.name) {
                if p.lower < 0.0 || p.upper > 1.0 {
                    return Err(AppError::invalid(format!(
                        "Fraction '{}' needs bounds inside [0, 1], got [{}, {}]",
                        p.name, p.lower, p.upper
                    )));
                }
            } else if p.lower < PARAM_EPSILON {
                return Err(AppError::invalid(format!(
                    "Lower bound of '{}' must be >= {PARAM_EPSILON}, got {}",
                    p.name, p.lower
                )));
            }
            if !p.value.is_finite() || !p.contains(p.value) {
                return Err(AppError::invalid(format!(
                    "Initial value of '{}' ({}) is outside [{}, {}]",
                    p.name, p.value, p.lower, p.upper
                )));
            }
        }
        self.check_domain()
    }

    /// Model-domain check of the current values, independent of the bounds.
    pub fn check_domain(&self) -> Result<(), AppError> {
        let values = self.values();
        match self.model {
            ModelKind::Cyton1 => Cyton1Params::from_values(&values).map(|_| ()),
            ModelKind::Cyton15 => Cyton15Params::from_values(&values).map(|_| ()),
        }
    }
}

/// Parameters that are proportions and may sit anywhere in [0, 1].
pub fn is_fraction(model: ModelKind, name: &str) -> bool {
    matches!(
        (model, name),
        (ModelKind::Cyton15, "pF") | (ModelKind::Cyton1, "MDProp") | (ModelKind::Cyton1, "pF0")
    )
}

fn default_lower(model: ModelKind, name: &str) -> f64 {
    if is_fraction(model, name) { 0.0 } else { PARAM_EPSILON }
}

/// Typed view of a Cyton 1 parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cyton1Params {
    pub mu0_div: f64,
    pub sig0_div: f64,
    pub mu0_death: f64,
    pub sig0_death: f64,
    pub mu_sub_div: f64,
    pub sig_sub_div: f64,
    pub mu_sub_death: f64,
    pub sig_sub_death: f64,
    pub pf0: f64,
    pub pf_mu: f64,
    pub pf_sig: f64,
    pub md_prop: f64,
    pub md_decay: f64,
}

impl Cyton1Params {
    pub fn from_values(v: &[f64]) -> Result<Self, AppError> {
        let [mu0_div, sig0_div, mu0_death, sig0_death, mu_sub_div, sig_sub_div, mu_sub_death, sig_sub_death, pf0, pf_mu, pf_sig, md_prop, md_decay] =
            *v
        else {
            return Err(AppError::invalid(format!("Cyton 1 expects 13 parameters, got {}", v.len())));
        };
        let p = Self {
            mu0_div,
            sig0_div,
            mu0_death,
            sig0_death,
            mu_sub_div,
            sig_sub_div,
            mu_sub_death,
            sig_sub_death,
            pf0,
            pf_mu,
            pf_sig,
            md_prop,
            md_decay,
        };
        p.validate()?;
        Ok(p)
    }

    /// Domain constraints that hold regardless of the user's bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        check_fraction("pF0", self.pf0)?;
        check_fraction("MDProp", self.md_prop)?;
        check_positive("pFSig", self.pf_sig)?;
        check_positive("MDDecay", self.md_decay)?;
        if !self.pf_mu.is_finite() {
            return Err(AppError::invalid(format!("pFMu must be finite, got {}", self.pf_mu)));
        }
        Ok(())
    }
}

/// Typed view of a Cyton 1.5 parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cyton15Params {
    pub unstim_mu_death: f64,
    pub unstim_sig_death: f64,
    pub stim_mu_div: f64,
    pub stim_sig_div: f64,
    pub stim_mu_death: f64,
    pub stim_sig_death: f64,
    pub stim_mu_dd: f64,
    pub stim_sig_dd: f64,
    pub b: f64,
    pub pf: f64,
}

impl Cyton15Params {
    pub fn from_values(v: &[f64]) -> Result<Self, AppError> {
        let [unstim_mu_death, unstim_sig_death, stim_mu_div, stim_sig_div, stim_mu_death, stim_sig_death, stim_mu_dd, stim_sig_dd, b, pf] =
            *v
        else {
            return Err(AppError::invalid(format!("Cyton 1.5 expects 10 parameters, got {}", v.len())));
        };
        let p = Self {
            unstim_mu_death,
            unstim_sig_death,
            stim_mu_div,
            stim_sig_div,
            stim_mu_death,
            stim_sig_death,
            stim_mu_dd,
            stim_sig_dd,
            b,
            pf,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        check_positive("b", self.b)?;
        check_fraction("pF", self.pf)
    }
}

fn check_fraction(name: &str, v: f64) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&v) {
        return Err(AppError::invalid(format!("{name} must be in [0, 1], got {v}")));
    }
    Ok(())
}

fn check_positive(name: &str, v: f64) -> Result<(), AppError> {
    if !(v.is_finite() && v > 0.0) {
        return Err(AppError::invalid(format!("{name} must be finite and > 0, got {v}")));
    }
    Ok(())
}
