/// Performance measurement utilities
/// Each culling stage is timed and logged for optimization analysis
pub mod profiling;

pub use profiling::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};

use std::time::{Duration, Instant};

pub struct PerfTimer {
    name: &'static str,
    start: Instant,
}

impl PerfTimer {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        println!("[PERF] {}: {:.2}μs", self.name, elapsed.as_micros());
    }
}

/// Per-frame stage timings accumulated by the demo driver
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfStats {
    pub render_us: f64,
    pub query_us: f64,
    pub total_us: f64,
    pub frames: u32,
}

impl PerfStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, render: Duration, query: Duration) {
        let render_us = render.as_secs_f64() * 1e6;
        let query_us = query.as_secs_f64() * 1e6;
        self.render_us += render_us;
        self.query_us += query_us;
        self.total_us += render_us + query_us;
        self.frames += 1;
    }

    pub fn print_summary(&self) {
        let share = |v: f64| {
            if self.total_us > 0.0 {
                (v / self.total_us) * 100.0
            } else {
                0.0
            }
        };
        let frames = self.frames.max(1) as f64;

        println!("\n========== PERFORMANCE SUMMARY ==========");
        println!("Frames:          {:8}", self.frames);
        println!(
            "Render:          {:8.2}μs/frame ({:5.1}%)",
            self.render_us / frames,
            share(self.render_us)
        );
        println!(
            "Queries:         {:8.2}μs/frame ({:5.1}%)",
            self.query_us / frames,
            share(self.query_us)
        );
        println!("─────────────────────────────────────────");
        println!("Total:           {:8.2}μs/frame", self.total_us / frames);
        println!("=========================================\n");
    }
}

/// Macro for easy performance measurement
#[macro_export]
macro_rules! perf_scope {
    ($name:expr) => {
        let _timer = $crate::perf::PerfTimer::new($name);
    };
}
