//! Headless demo: spin up a disk galaxy and run it for a fixed number of
//! ticks, logging live counters along the way.
//!
//! Control via environment variables:
//! - `GRAVITRON_BODIES`: disk body count (default 100_000)
//! - `GRAVITRON_TICKS`: ticks to run (default 200)
//! - `GRAVITRON_PROFILE`: set to `1` for per-stage timing each report

use gravitron::sim::body_gen::{self, DiskParams};
use gravitron::{GpuContext, GpuSimulation, SimConfig};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::init();

    let num_bodies: usize = env_or("GRAVITRON_BODIES", 100_000);
    let ticks: u64 = env_or("GRAVITRON_TICKS", 200);
    let profile = std::env::var("GRAVITRON_PROFILE").as_deref() == Ok("1");

    let params = DiskParams {
        num_bodies,
        radius_range: (100.0, 50_000.0),
        mass_range: (100.0, 1_200.0),
        center_mass: 1.0e9,
        adherence_to_plane: 0.98,
        ..DiskParams::default()
    };
    let bodies = body_gen::random_disk(42, &params);
    log::info!("generated {} bodies", bodies.len());

    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("failed to initialize GPU: {e}");
            std::process::exit(1);
        }
    };

    let mut sim = match GpuSimulation::new(context, SimConfig::default(), &bodies) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("failed to build simulation: {e}");
            std::process::exit(1);
        }
    };
    sim.set_profiling(profile);

    let start = std::time::Instant::now();
    for tick in 0..ticks {
        sim.step();

        if tick % 50 == 49 {
            match sim.counters() {
                Ok(counters) => log::info!(
                    "tick {}: {} alive, {} merged, {} out of bounds",
                    tick + 1,
                    counters.num_bodies,
                    counters.just_merged,
                    counters.out_of_bounds
                ),
                Err(e) => log::warn!("counter readback failed: {e}"),
            }
            if profile {
                log::info!("stage timing:\n{}", sim.debug_string());
            }
        }
    }

    let elapsed = start.elapsed();
    println!(
        "{} ticks over {} bodies in {:.2}s ({:.1} ms/tick)",
        ticks,
        num_bodies,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1e3 / ticks as f64
    );
}
