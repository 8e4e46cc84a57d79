use std::time::Instant;

use intersection_sim::{Lane, SimConfig, Simulation};

/// Frames between progress reports.
const REPORT_INTERVAL: usize = 600;

fn main() {
    let mut args = std::env::args().skip(1);
    let seed = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(42);
    let num_frames = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(6000);

    let mut sim = match Simulation::new(SimConfig::default(), seed) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };
    sim.populate();

    println!("Simulating {} frames with seed {}...", num_frames, seed);
    let (mut arrived, mut crashed, mut phase_changes) = (0, 0, 0);
    let mut start = Instant::now();
    for frame in 1..=num_frames {
        let events = sim.run_frame();
        arrived += events.arrived.len();
        crashed += events.crashed.len();
        phase_changes += events.phase_change.is_some() as usize;

        if frame % REPORT_INTERVAL == 0 {
            let elapsed = start.elapsed() / REPORT_INTERVAL as u32;
            let ctrl = sim.controller();
            let waits = Lane::ALL.map(|lane| ctrl.lane_stats(lane).wait_time);
            println!(
                "t={:.1}s: {} vehs, {} arrived, {} crashed, phase {:?} ({} changes), waits {:.1?}, avg. frame {:?}",
                sim.time(),
                sim.iter_vehicles().count(),
                arrived,
                crashed,
                ctrl.phase(),
                phase_changes,
                waits,
                elapsed,
            );
            start = Instant::now();
        }
    }
}
