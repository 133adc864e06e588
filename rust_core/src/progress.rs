use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for one `infer` run, updated by the sampling loop and read by
/// the render thread.
pub struct ProgressState {
    pub proposer: &'static str,
    pub num_warmup: usize,
    pub num_samples: usize,
    pub completed: AtomicUsize,
    pub accepted: AtomicUsize,
    pub done: AtomicBool,
    pub start_time: Instant,
}

impl ProgressState {
    pub fn new(proposer: &'static str, num_warmup: usize, num_samples: usize) -> Self {
        Self {
            proposer,
            num_warmup,
            num_samples,
            completed: AtomicUsize::new(0),
            accepted: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.num_warmup + self.num_samples
    }

    pub fn increment(&self, accepted: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if accepted {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    /// Acceptance rate over every step so far, warm-up included.
    pub fn acceptance_rate(&self) -> f64 {
        let completed = self.completed.load(Ordering::Relaxed);
        if completed == 0 {
            return 0.0;
        }
        self.accepted.load(Ordering::Relaxed) as f64 / completed as f64
    }
}

fn fmt_count(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 10_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

fn fmt_time(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0) as usize;
        let s = (secs % 60.0) as usize;
        format!("{}:{:02}", mins, s)
    }
}

fn render_line(state: &ProgressState) -> String {
    let completed = state.completed.load(Ordering::Relaxed);
    let total = state.total_steps();
    let elapsed = state.start_time.elapsed().as_secs_f64();

    let pct = if total > 0 {
        (completed * 100 / total).min(100)
    } else {
        100
    };
    let bar_width = 30;
    let filled = if total > 0 {
        (bar_width * completed.min(total)) / total
    } else {
        bar_width
    };
    let bar: String = "━".repeat(filled) + &"╌".repeat(bar_width - filled);
    let phase = if completed < state.num_warmup {
        "warmup"
    } else {
        "sampling"
    };

    format!(
        "{} {} {:>3}% │ {}/{} {} │ accept {:.2} │ {}",
        state.proposer,
        bar,
        pct,
        fmt_count(completed),
        fmt_count(total),
        phase,
        state.acceptance_rate(),
        fmt_time(elapsed),
    )
}

fn render(state: &ProgressState) {
    let line = render_line(state);
    let mut err = std::io::stderr().lock();
    if state.is_done() {
        let _ = write!(err, "\r{}\x1b[K\n", line);
    } else {
        let _ = write!(err, "\r{}\x1b[K", line);
    }
    let _ = err.flush();
}

/// Spawn a background thread that renders the progress bar at ~10 Hz.
/// Call `state.finish()` then join the handle once sampling ends.
pub fn spawn_progress_thread(state: Arc<ProgressState>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !state.is_done() {
            render(&state);
            std::thread::sleep(Duration::from_millis(100));
        }
        render(&state);
    })
}
