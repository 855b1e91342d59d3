//! Stress check: one producer, many consumers, a known remainder.
//!
//! The main thread pushes `0..N`; `available_parallelism - 1` consumer
//! threads pop random shares that add up to `N - 10`. Because pops leave the
//! queue in FIFO order, the consumers' combined sum must equal the sum of
//! `0..N-10`, and exactly 10 values must be left behind.
//!
//! Run with: `RUST_LOG=ringmpmc_rs=debug cargo run --release --example checksum [N]`

use rand::Rng;
use ringmpmc_rs::{BoundedQueue, DEFAULT_CAPACITY};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const DEFAULT_PUSHES: u64 = 10_000_000;
const UNPOPPED: u64 = 10;

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .init();

    let total_pushes = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .filter(|&n: &u64| n > UNPOPPED)
        .unwrap_or(DEFAULT_PUSHES);

    let threads = thread::available_parallelism().map_or(2, |n| n.get()).max(2);
    let pop_counts = split_pops(total_pushes - UNPOPPED, threads - 1);
    let total_pops: u64 = pop_counts.iter().sum();
    let expected_sum = total_pops * (total_pops - 1) / 2;

    println!("RingMPMC Checksum Example");
    println!("=========================\n");
    println!("Configuration:");
    println!("  Available threads: {}", threads);
    println!("  Queue capacity: {}", DEFAULT_CAPACITY);
    println!("  Pushes (main thread): {}", total_pushes);
    println!("  Pops per consumer: {:?}", pop_counts);
    println!("  Expected: size after processing == {}", UNPOPPED);
    println!("  Expected: sum of popped values == {}\n", expected_sum);

    let queue = match BoundedQueue::<u64>::new(DEFAULT_CAPACITY) {
        Ok(queue) => Arc::new(queue),
        Err(err) => {
            eprintln!("failed to create queue: {err}");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();

    let spawned: Result<Vec<_>, _> = pop_counts
        .iter()
        .enumerate()
        .map(|(id, &count)| {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name(format!("pop-{id}"))
                .spawn(move || {
                    let mut sum = 0u64;
                    for _ in 0..count {
                        match queue.pop() {
                            Ok(v) => sum += v,
                            Err(err) => {
                                tracing::error!(%err, "pop failed");
                                break;
                            }
                        }
                    }
                    println!("Consumer {} finished ({} pops)", id, count);
                    sum
                })
        })
        .collect();
    let consumers = match spawned {
        Ok(handles) => handles,
        Err(err) => {
            eprintln!("failed to spawn consumer: {err}");
            return ExitCode::FAILURE;
        }
    };

    for i in 0..total_pushes {
        if let Err(err) = queue.push(i) {
            eprintln!("push {} failed: {}", i, err);
            return ExitCode::FAILURE;
        }
    }

    let mut popped_sum = 0u64;
    for handle in consumers {
        match handle.join() {
            Ok(sum) => popped_sum += sum,
            Err(_) => {
                eprintln!("consumer thread panicked");
                return ExitCode::FAILURE;
            }
        }
    }
    let elapsed = start.elapsed();

    let remaining = queue.size() as u64;
    let size_ok = remaining == UNPOPPED;
    let sum_ok = popped_sum == expected_sum;

    println!("\nResults:");
    println!(
        "  Size after processing: {} => {}",
        remaining,
        if size_ok { "as expected" } else { "FAILED" }
    );
    println!(
        "  Sum of popped values: {} => {}",
        popped_sum,
        if sum_ok { "as expected" } else { "FAILED" }
    );

    if size_ok && sum_ok {
        println!("  Elapsed: {:.3}s", elapsed.as_secs_f64());
        println!(
            "  Throughput: {:.2} M ops/sec",
            (total_pushes + total_pops) as f64 / elapsed.as_secs_f64() / 1_000_000.0
        );
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Split `total` pops into `consumers` random shares that add up exactly.
fn split_pops(total: u64, consumers: usize) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    let weights: Vec<u64> = (0..consumers).map(|_| rng.gen_range(1..=100)).collect();
    let weight_sum: u64 = weights.iter().sum();

    let mut counts: Vec<u64> = weights.iter().map(|w| total * w / weight_sum).collect();
    let assigned: u64 = counts.iter().sum();
    if let Some(last) = counts.last_mut() {
        *last += total - assigned;
    }
    counts
}
