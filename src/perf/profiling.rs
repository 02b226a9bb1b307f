/// Instrumentation for the occlusion pipeline
/// Provides call/work counting and hardware performance counter integration
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by every rasterizer instance in the process
pub struct FunctionCounters {
    // Baking counters
    pub occluders_baked: AtomicU64,
    pub quads_merged: AtomicU64,

    // Rasterization counters
    pub rasterize_calls: AtomicU64,
    pub packets_processed: AtomicU64,
    pub triangles_processed: AtomicU64,
    pub triangles_clipped: AtomicU64,
    pub triangles_culled: AtomicU64,

    // Block counters
    pub blocks_tested: AtomicU64,
    pub blocks_rejected_hiz: AtomicU64,
    pub blocks_written: AtomicU64,

    // Query counters
    pub visibility_queries: AtomicU64,
    pub visibility_queries_culled: AtomicU64,

    pub depth_clear_calls: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            occluders_baked: AtomicU64::new(0),
            quads_merged: AtomicU64::new(0),
            rasterize_calls: AtomicU64::new(0),
            packets_processed: AtomicU64::new(0),
            triangles_processed: AtomicU64::new(0),
            triangles_clipped: AtomicU64::new(0),
            triangles_culled: AtomicU64::new(0),
            blocks_tested: AtomicU64::new(0),
            blocks_rejected_hiz: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
            visibility_queries: AtomicU64::new(0),
            visibility_queries_culled: AtomicU64::new(0),
            depth_clear_calls: AtomicU64::new(0),
        }
    }

    fn all(&self) -> [&AtomicU64; 13] {
        [
            &self.occluders_baked,
            &self.quads_merged,
            &self.rasterize_calls,
            &self.packets_processed,
            &self.triangles_processed,
            &self.triangles_clipped,
            &self.triangles_culled,
            &self.blocks_tested,
            &self.blocks_rejected_hiz,
            &self.blocks_written,
            &self.visibility_queries,
            &self.visibility_queries_culled,
            &self.depth_clear_calls,
        ]
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            occluders_baked: load(&self.occluders_baked),
            quads_merged: load(&self.quads_merged),
            rasterize_calls: load(&self.rasterize_calls),
            packets_processed: load(&self.packets_processed),
            triangles_processed: load(&self.triangles_processed),
            triangles_clipped: load(&self.triangles_clipped),
            triangles_culled: load(&self.triangles_culled),
            blocks_tested: load(&self.blocks_tested),
            blocks_rejected_hiz: load(&self.blocks_rejected_hiz),
            blocks_written: load(&self.blocks_written),
            visibility_queries: load(&self.visibility_queries),
            visibility_queries_culled: load(&self.visibility_queries_culled),
            depth_clear_calls: load(&self.depth_clear_calls),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub occluders_baked: u64,
    pub quads_merged: u64,
    pub rasterize_calls: u64,
    pub packets_processed: u64,
    pub triangles_processed: u64,
    pub triangles_clipped: u64,
    pub triangles_culled: u64,
    pub blocks_tested: u64,
    pub blocks_rejected_hiz: u64,
    pub blocks_written: u64,
    pub visibility_queries: u64,
    pub visibility_queries_culled: u64,
    pub depth_clear_calls: u64,
}

impl CounterSnapshot {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n=== Performance Counters Report ===");
        println!("\nBaking:");
        println!("  occluders baked:            {:12}", self.occluders_baked);
        println!("  triangle pairs merged:      {:12}", self.quads_merged);

        println!("\nRasterization:");
        println!("  rasterize calls:            {:12}", self.rasterize_calls);
        println!("  packets processed:          {:12}", self.packets_processed);
        println!("  triangles processed:        {:12}", self.triangles_processed);
        println!("  triangles clipped:          {:12}", self.triangles_clipped);
        println!("  triangles culled:           {:12}", self.triangles_culled);

        println!("\nBlocks:");
        println!("  blocks tested:              {:12}", self.blocks_tested);
        println!("  rejected by Hi-Z:           {:12}", self.blocks_rejected_hiz);
        println!("  blocks written:             {:12}", self.blocks_written);
        if self.blocks_tested > 0 {
            let reject_rate = (self.blocks_rejected_hiz as f64 / self.blocks_tested as f64) * 100.0;
            println!("  Hi-Z reject rate:           {:11.2}%", reject_rate);
        }

        println!("\nQueries:");
        println!("  visibility queries:         {:12}", self.visibility_queries);
        println!("  queries culled:             {:12}", self.visibility_queries_culled);
        println!("  depth clear calls:          {:12}", self.depth_clear_calls);

        println!();
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Hardware performance counter wrapper for benchmarking
#[cfg(feature = "profiling")]
pub mod hardware {
    use perf_event::events::Hardware;
    use perf_event::{Builder, Counter};

    const EVENTS: [Hardware; 6] = [
        Hardware::CPU_CYCLES,
        Hardware::INSTRUCTIONS,
        Hardware::CACHE_REFERENCES,
        Hardware::CACHE_MISSES,
        Hardware::BRANCH_INSTRUCTIONS,
        Hardware::BRANCH_MISSES,
    ];

    /// Counters that fail to open (no permission, virtualized PMU) read as zero.
    pub struct PerfCounters {
        counters: Vec<Option<Counter>>,
    }

    impl PerfCounters {
        pub fn new() -> Self {
            let counters = EVENTS
                .iter()
                .map(|event| {
                    let counter = Builder::new().kind(event.clone()).build();
                    if let Err(err) = &counter {
                        log::warn!("hardware counter {:?} unavailable: {}", event, err);
                    }
                    counter.ok()
                })
                .collect();
            Self { counters }
        }

        pub fn enable_all(&mut self) {
            for c in self.counters.iter_mut().flatten() {
                let _ = c.enable();
            }
        }

        pub fn disable_all(&mut self) {
            for c in self.counters.iter_mut().flatten() {
                let _ = c.disable();
            }
        }

        pub fn reset_all(&mut self) {
            for c in self.counters.iter_mut().flatten() {
                let _ = c.reset();
            }
        }

        pub fn read_all(&mut self) -> PerfSnapshot {
            let mut values = [0u64; 6];
            for (value, counter) in values.iter_mut().zip(self.counters.iter_mut()) {
                *value = counter.as_mut().and_then(|c| c.read().ok()).unwrap_or(0);
            }
            PerfSnapshot {
                cpu_cycles: values[0],
                instructions: values[1],
                cache_references: values[2],
                cache_misses: values[3],
                branch_instructions: values[4],
                branch_misses: values[5],
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct PerfSnapshot {
        pub cpu_cycles: u64,
        pub instructions: u64,
        pub cache_references: u64,
        pub cache_misses: u64,
        pub branch_instructions: u64,
        pub branch_misses: u64,
    }

    impl PerfSnapshot {
        pub fn print_report(&self) {
            println!("\n=== Hardware Performance Counters ===");
            println!("CPU Cycles:            {:16}", self.cpu_cycles);
            println!("Instructions:          {:16}", self.instructions);
            if self.cpu_cycles > 0 {
                let ipc = self.instructions as f64 / self.cpu_cycles as f64;
                println!("IPC (Instructions/Cycle): {:13.3}", ipc);
            }

            println!("\nCache References:      {:16}", self.cache_references);
            println!("Cache Misses:          {:16}", self.cache_misses);
            if self.cache_references > 0 {
                let miss_rate = (self.cache_misses as f64 / self.cache_references as f64) * 100.0;
                println!("Cache Miss Rate:       {:13.2}%", miss_rate);
            }

            println!("\nBranch Instructions:   {:16}", self.branch_instructions);
            println!("Branch Misses:         {:16}", self.branch_misses);
            if self.branch_instructions > 0 {
                let miss_rate =
                    (self.branch_misses as f64 / self.branch_instructions as f64) * 100.0;
                println!("Branch Miss Rate:      {:13.2}%", miss_rate);
            }
            println!();
        }
    }
}
