//! Posterior summaries for one chain: R-hat, ESS, MCSE, quantiles.
//!
//! R-hat and ESS treat the two halves of the chain as separate chains and
//! follow the definitions in:
//!   Vehtari et al. (2021) "Rank-normalization, folding, and localization:
//!   An improved R-hat for assessing convergence of MCMC"

use crate::value::AtomicValue;

/// Per-coordinate diagnostic summary.
#[derive(Debug, Clone)]
pub struct ParamDiagnostics {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub q_3: f64,
    pub q_97: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
    pub mcse_mean: f64,
}

/// Diagnostic report for a sample history.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub params: Vec<ParamDiagnostics>,
    pub num_draws: usize,
    pub accept_rate: f64,
}

impl DiagnosticsReport {
    /// Replace the default `latent[i]` names. Extra labels are ignored.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        for (p, label) in self.params.iter_mut().zip(labels) {
            p.name = label;
        }
        self
    }

    /// Render the diagnostics as a formatted table string.
    pub fn to_table(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("{} draws", self.num_draws));
        lines.push(String::new());
        lines.push(format!(
            "{:<12} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>8} {:>10}",
            "Latent", "mean", "std", "q_3%", "q_97%", "ess_bulk", "ess_tail", "r_hat", "mcse_mean"
        ));
        lines.push("─".repeat(96));

        for p in &self.params {
            lines.push(format!(
                "{:<12} {:>8.4} {:>8.4} {:>10.4} {:>10.4} {:>10} {:>10} {:>8.4} {:>10.6}",
                p.name,
                p.mean,
                p.std,
                p.q_3,
                p.q_97,
                fmt_ess(p.ess_bulk),
                fmt_ess(p.ess_tail),
                p.r_hat,
                p.mcse_mean,
            ));
        }

        lines.push("─".repeat(96));
        lines.push(format!("Accept rate: {:.2}", self.accept_rate));

        let any_bad_rhat = self.params.iter().any(|p| p.r_hat > 1.05 || !p.r_hat.is_finite());
        let any_low_ess = self
            .params
            .iter()
            .any(|p| p.ess_bulk < 400.0 || p.ess_tail < 400.0);

        if any_bad_rhat {
            lines.push(
                "⚠  Some R-hat values > 1.05: the chain may not have converged.".to_string(),
            );
        }
        if any_low_ess {
            lines.push(
                "⚠  Some ESS values < 400: consider more samples or a different step size."
                    .to_string(),
            );
        }

        lines.join("\n")
    }
}

fn fmt_ess(ess: f64) -> String {
    if ess.is_finite() {
        format!("{:.0}", ess)
    } else {
        "NaN".to_string()
    }
}

/// Summarise `samples` (one snapshot per draw, latent order). Values are
/// read with `as_double`, so BOOLEAN coordinates count as 0/1.
pub fn summarize(samples: &[Vec<AtomicValue>], accept_rate: f64) -> DiagnosticsReport {
    let n_draws = samples.len();
    let n_params = samples.first().map_or(0, Vec::len);

    let params = (0..n_params)
        .map(|pidx| {
            let trace: Vec<f64> = samples.iter().map(|draw| draw[pidx].as_double()).collect();
            summarize_trace(format!("latent[{}]", pidx), &trace)
        })
        .collect();

    DiagnosticsReport {
        params,
        num_draws: n_draws,
        accept_rate,
    }
}

fn summarize_trace(name: String, trace: &[f64]) -> ParamDiagnostics {
    let mean = mean(trace);
    let std = sample_std(trace, mean);
    let mut sorted = trace.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let q_3 = quantile_sorted(&sorted, 0.03);
    let q_97 = quantile_sorted(&sorted, 0.97);

    let (ess_bulk, ess_tail, r_hat) = if trace.len() >= 4 {
        let bulk = split_ess(&rank_normalize(trace));
        let q05 = quantile_sorted(&sorted, 0.05);
        let q95 = quantile_sorted(&sorted, 0.95);
        let tail = split_ess(&indicator(trace, |x| x <= q05))
            .min(split_ess(&indicator(trace, |x| x >= q95)));
        (bulk, tail, split_r_hat(trace))
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };
    let mcse_mean = if ess_bulk > 0.0 {
        std / ess_bulk.sqrt()
    } else {
        f64::NAN
    };

    ParamDiagnostics {
        name,
        mean,
        std,
        q_3,
        q_97,
        ess_bulk,
        ess_tail,
        r_hat,
        mcse_mean,
    }
}

// ── Internal helpers ────────────────────────────────────────────────

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn variance(data: &[f64], mean: f64) -> f64 {
    data.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

fn sample_std(data: &[f64], mean: f64) -> f64 {
    if data.len() < 2 {
        return f64::NAN;
    }
    variance(data, mean).sqrt()
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return f64::NAN;
    };
    let pos = q * last as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;
    let hi = (lo + 1).min(last);
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn indicator(trace: &[f64], keep: impl Fn(f64) -> bool) -> Vec<f64> {
    trace.iter().map(|&x| if keep(x) { 1.0 } else { 0.0 }).collect()
}

/// The trace's two halves, read as two chains. An odd middle draw is
/// dropped.
struct Halves<'a> {
    first: &'a [f64],
    second: &'a [f64],
    mean_first: f64,
    mean_second: f64,
    /// Mean of the two within-half variances.
    within: f64,
}

impl<'a> Halves<'a> {
    fn of(trace: &'a [f64]) -> Self {
        let half = trace.len() / 2;
        let first = &trace[..half];
        let second = &trace[trace.len() - half..];
        let mean_first = mean(first);
        let mean_second = mean(second);
        let within = 0.5 * (variance(first, mean_first) + variance(second, mean_second));
        Self {
            first,
            second,
            mean_first,
            mean_second,
            within,
        }
    }

    fn len(&self) -> usize {
        self.first.len()
    }

    /// Pooled variance estimate: within-half variance plus the spread of
    /// the two half means.
    fn var_plus(&self) -> f64 {
        let n = self.len() as f64;
        let between = 0.5 * n * (self.mean_first - self.mean_second).powi(2);
        (n - 1.0) / n * self.within + between / n
    }

    /// Autocorrelation at `lag`, pooled over both halves.
    fn rho(&self, lag: usize) -> f64 {
        let n = self.len();
        let acov = |xs: &[f64], m: f64| -> f64 {
            xs[..n - lag]
                .iter()
                .zip(&xs[lag..])
                .map(|(a, b)| (a - m) * (b - m))
                .sum::<f64>()
                / n as f64
        };
        let gamma = 0.5 * (acov(self.first, self.mean_first) + acov(self.second, self.mean_second));
        1.0 - (self.within - gamma) / self.var_plus()
    }

    fn degenerate(&self) -> bool {
        !(self.within > 1e-30)
    }
}

/// Split R-hat over the trace's two halves.
fn split_r_hat(trace: &[f64]) -> f64 {
    let halves = Halves::of(trace);
    if halves.degenerate() {
        return f64::NAN;
    }
    (halves.var_plus() / halves.within).sqrt()
}

/// Effective sample size over the two halves, truncating the
/// autocorrelation sum with Geyer's initial monotone sequence.
fn split_ess(trace: &[f64]) -> f64 {
    let halves = Halves::of(trace);
    if halves.degenerate() {
        return f64::NAN;
    }
    let n = halves.len();
    let total = (2 * n) as f64;

    // Pairs (rho_2k + rho_2k+1) are summed while positive, each clipped to
    // the previous pair so the sequence is non-increasing.
    let mut pair_sum = 0.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = halves.rho(lag) + halves.rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        pair_sum += pair;
        prev_pair = pair;
        lag += 2;
    }

    let tau = (2.0 * pair_sum - 1.0).max(1.0 / total.log10());
    total / tau
}

/// Normal scores of the trace's ranks, ties sharing their average rank.
fn rank_normalize(trace: &[f64]) -> Vec<f64> {
    let n = trace.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| trace[a].total_cmp(&trace[b]));

    let mut scores = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let first = trace[order[start]];
        let tied = order[start..]
            .iter()
            .take_while(|&&i| trace[i] == first)
            .count()
            .max(1);
        let end = start + tied;
        // 1-based average rank, Blom offset
        let rank = (start + end + 1) as f64 / 2.0;
        let score = inv_normal_cdf((rank - 0.375) / (n as f64 + 0.25));
        for &i in &order[start..end] {
            scores[i] = score;
        }
        start = end;
    }
    scores
}

fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Inverse standard normal CDF, Acklam's rational approximation
/// (relative error below 1.2e-9).
fn inv_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 6] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
        1.0,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 5] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
        1.0,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        horner(&C, q) / horner(&D, q)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        horner(&A, r) * q / horner(&B, r)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -horner(&C, q) / horner(&D, q)
    }
}
