//! Scheduler simulation driver. Grounded in the Python original's
//! `create_demo_processes`/`run_simulation`/`display_final_statistics`,
//! restructured around an explicit `step` loop instead of a `time.sleep`
//! pacing loop.

use clap::Parser;
use log::info;

use osemu::scheduler::process::PriorityType;
use osemu::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "osemu-sim", about = "Multilevel feedback queue scheduler simulation")]
struct Args {
    /// Quantum for queue 0 and queue 1, comma-separated (queue 2 is always infinite FCFS).
    #[arg(long, default_value = "2.0,4.0")]
    quanta: String,

    /// Simulated seconds advanced per step.
    #[arg(long, default_value_t = 1.0)]
    time_slice: f64,

    /// Number of steps to run.
    #[arg(long, default_value_t = 40)]
    steps: u32,
}

fn parse_quanta(spec: &str) -> [f64; 2] {
    let mut parts = spec.split(',');
    let q0: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(2.0);
    let q1: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(4.0);
    [q0, q1]
}

fn seed_demo_processes(scheduler: &mut Scheduler) {
    scheduler.add_process("System", 8.0, 0.0, 1, PriorityType::Relative);
    scheduler.add_process("Editor", 6.0, 0.0, 3, PriorityType::Relative);
    scheduler.add_process("Browser", 10.0, 0.0, 5, PriorityType::Relative);
    scheduler.add_process("Emergency", 2.0, 5.0, 1, PriorityType::Absolute);
    scheduler.add_process("Player", 12.0, 0.0, 4, PriorityType::Dynamic);
    scheduler.add_process("Calc", 3.0, 1.0, 2, PriorityType::Dynamic);
    scheduler.add_process("Download", 15.0, 2.0, 6, PriorityType::Dynamic);
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let quanta = parse_quanta(&args.quanta);

    let mut scheduler = Scheduler::new(quanta);
    seed_demo_processes(&mut scheduler);

    info!("running simulation for {} steps", args.steps);
    for step in 0..args.steps {
        scheduler.step(args.time_slice);
        let snapshot = scheduler.snapshot();
        if let Some(current) = snapshot.current {
            println!(
                "t={:>5.1} step={:>3} running={:<10} queue={} dp={:>2} remaining={:.1}",
                snapshot.current_time, step, current.name, current.current_queue,
                current.dynamic_priority, current.remaining_time
            );
        } else {
            println!("t={:>5.1} step={:>3} idle", snapshot.current_time, step);
        }
        if scheduler.is_idle() {
            break;
        }
    }

    let stats = scheduler.final_stats();
    println!();
    println!("completed processes : {}", stats.completed);
    println!("avg turnaround time  : {:.2}", stats.average_turnaround);
    println!("avg waiting time     : {:.2}", stats.average_waiting);
    println!("context switches     : {}", stats.total_context_switches);
}
