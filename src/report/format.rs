//! Reporting utilities: per-generation tables, fit and bootstrap summaries.
//!
//! We keep formatting code in one place so:
//! - the simulation/fitting code stays clean and testable
//! - output changes are localized

use crate::bootstrap::BootstrapResult;
use crate::domain::{Experiment, FitHistory, FitResult, ParameterSet};
use crate::models::GenerationProfile;

/// `HH:MM:SS.ss`
pub fn format_elapsed(secs: f64) -> String {
    let secs = secs.max(0.0);
    let hours = (secs / 3600.0).floor();
    let minutes = ((secs - hours * 3600.0) / 60.0).floor();
    let rest = secs - hours * 3600.0 - minutes * 60.0;
    format!("{:02}:{:02}:{:05.2}", hours as u64, minutes as u64, rest)
}

/// Live cells per generation, one row per time.
pub fn format_profile(profile: &GenerationProfile, title: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {title} ===\n"));

    let ng = profile.n_generations();
    let mut header = format!("{:>8}", "time");
    for g in 0..ng {
        header.push_str(&format!(" {:>10}", format!("gen{g}")));
    }
    header.push_str(&format!(" {:>11}", "total"));
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(header.len()));
    out.push('\n');

    for k in 0..profile.n_times() {
        let mut row = format!("{:>8.2}", profile.times[k]);
        for g in 0..ng {
            row.push_str(&format!(" {:>10.2}", profile.live(k, g)));
        }
        row.push_str(&format!(" {:>11.2}", profile.total_live(k)));
        out.push_str(&row);
        out.push('\n');
    }

    if profile.unstim_live.iter().any(|v| *v > 0.0) {
        out.push_str("\nUnstimulated (included in gen0):\n");
        for k in 0..profile.n_times() {
            out.push_str(&format!(
                "{:>8.2} live={:>10.2} dead={:>10.2}\n",
                profile.times[k], profile.unstim_live[k], profile.unstim_dead[k]
            ));
        }
    }
    out
}

/// Dataset overview printed before a fit.
pub fn format_experiment_summary(experiment: &Experiment) -> String {
    let reps: Vec<String> = (0..experiment.n_timepoints())
        .map(|i| experiment.n_replicates(i).to_string())
        .collect();
    let mut out = format!(
        "Experiment: {} | times={} | replicates=[{}] | generations={} | included={}\n",
        experiment.name,
        fmt_vec_short(&experiment.harvested_times),
        reps.join(", "),
        experiment.n_generations(),
        experiment.mask.count_included(),
    );

    // Replicate means per generation, plus the spread of replicate totals.
    for (i, t) in experiment.harvested_times.iter().enumerate() {
        let totals = experiment.totals(i);
        let lo = totals.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = totals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let means: Vec<String> = experiment
            .mean_per_generation(i)
            .iter()
            .map(|m| format!("{m:.1}"))
            .collect();
        out.push_str(
            format!(
                "{:>8.2} mean=[{}] total=[{:.1}, {:.1}]\n",
                t,
                means.join(", "),
                lo,
                hi
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Parameter table plus fit diagnostics.
pub fn format_fit_summary(result: &FitResult, start: &ParameterSet, history: Option<&FitHistory>) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} fit ===\n", result.model.display_name()));
    out.push_str(&format!("Status: {}\n", result.status.describe()));
    out.push_str(&format!(
        "Residuals: n={} | free={} | SS={:.6} | RMS={:.4}\n",
        result.n_residuals,
        result.n_free,
        result.chi_square,
        result.rms()
    ));
    out.push_str(&format!(
        "Evaluations: {} | iterations: {} | elapsed: {}\n",
        result.nfev,
        result.iterations,
        format_elapsed(result.elapsed_secs)
    ));
    if let Some(h) = history {
        out.push_str(&format!(" > > prev: {:.6} | curr: {:.6}\n", h.previous, h.current));
    }
    if let Some(last) = result.generations.last() {
        out.push_str(&format!(
            "DE generations: {} | best={:.6} | spread={:.6}\n",
            last.generation, last.best_cost, last.energy_spread
        ));
    }

    out.push('\n');
    out.push_str(
        format!(
            "{:<16} {:>12} {:>12} {:>10} {:>10} {:<6}\n",
            "param", "initial", "fitted", "lower", "upper", "vary"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<12} {:-<12} {:-<10} {:-<10} {:-<6}\n", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for (p, fitted) in start.params.iter().zip(&result.values) {
        out.push_str(
            format!(
                "{:<16} {:>12.6} {:>12.6} {:>10.3} {:>10.3} {:<6}\n",
                truncate(&p.name, 16),
                p.value,
                fitted,
                p.lower,
                p.upper,
                if p.vary { "yes" } else { "no" }
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Interval table of a bootstrap run.
pub fn format_bootstrap(result: &BootstrapResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} bootstrap ({:.0}% {} intervals) ===\n",
        result.model.display_name(),
        result.confidence * 100.0,
        result.method.display_name()
    ));
    out.push_str(&format!(
        "Accepted: {} | failed: {} | elapsed: {}\n\n",
        result.samples.len(),
        result.n_failed,
        format_elapsed(result.elapsed_secs)
    ));
    out.push_str(
        format!(
            "{:<16} {:>12} {:>12} {:>12} {:>12} {:>10}\n",
            "param", "estimate", "lower", "upper", "mean", "sd"
        )
        .trim_end(),
    );
    out.push('\n');
    for iv in &result.intervals {
        out.push_str(
            format!(
                "{:<16} {:>12.6} {:>12.6} {:>12.6} {:>12.6} {:>10.6}\n",
                truncate(&iv.name, 16),
                iv.estimate,
                iv.lower,
                iv.upper,
                iv.mean,
                iv.std_dev
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_vec_short(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
