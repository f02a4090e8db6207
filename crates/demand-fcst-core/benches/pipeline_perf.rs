//! Performance benchmark for full pipeline runs over many items
//!
//! Run with: cargo bench --bench pipeline_perf

use std::time::{Duration, Instant};

use demand_fcst_core::{ModelKind, Pipeline, PipelineConfig, RawBatch, RunRequest};

/// Synthetic daily movement rows: `items` items over `months` months,
/// spread across 20 groups, with trend and yearly seasonality.
fn generate_batch(items: usize, months: usize) -> RawBatch {
    let headers = ["Dt_Movimento", "Quantidade", "Cd_Material", "Descricao_Material", "Descricao_Subgrupo"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut records = Vec::with_capacity(items * months * 3);
    for item in 0..items {
        let base = 20.0 + (item % 17) as f64;
        for m in 0..months {
            let year = 2020 + m / 12;
            let month = m % 12 + 1;
            let seasonal = 5.0 * (2.0 * std::f64::consts::PI * month as f64 / 12.0).sin();
            let monthly = base + 0.2 * m as f64 + seasonal;
            // three movements per month, merged by period downstream
            for day in [3, 14, 25] {
                records.push(vec![
                    format!("{:04}-{:02}-{:02}", year, month, day),
                    format!("{:.2}", monthly / 3.0 + (item * day) as f64 % 7.0 * 0.1),
                    format!("MAT{:05}", item),
                    format!("Material {}", item),
                    format!("SUB{:02}", item % 20),
                ]);
            }
        }
    }
    RawBatch::new(headers, records)
}

fn benchmark_fn<F, R>(name: &str, iterations: usize, mut f: F) -> Duration
where
    F: FnMut() -> R,
{
    // Warmup
    let _ = f();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = std::hint::black_box(f());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "{}: total={:?}, per_iter={:?}, iters={}",
        name, elapsed, per_iter, iterations
    );
    elapsed
}

fn main() {
    println!("=== Pipeline Performance Benchmark ===\n");

    let item_counts = [100, 1_000, 5_000];
    let months = 36;
    let request = RunRequest::new(6);

    println!("--- 1. Decomposition, worker scaling ---\n");

    for &items in &item_counts {
        let batch = generate_batch(items, months);
        let iters = if items <= 1_000 { 10 } else { 3 };

        for workers in [1, 0] {
            let config = PipelineConfig {
                workers,
                ..Default::default()
            };
            let Ok(pipeline) = Pipeline::new(config) else {
                eprintln!("failed to build pipeline");
                return;
            };
            let label = if workers == 0 { "all cores" } else { "1 worker" };
            benchmark_fn(
                &format!("run(items={}, months={}, {})", items, months, label),
                iters,
                || pipeline.run(&batch, &request),
            );
        }
    }

    println!();
    println!("--- 2. ETS capability ---\n");

    let batch = generate_batch(1_000, months);
    let config = PipelineConfig {
        model: ModelKind::Ets,
        ets_spec: Some("AAN".to_string()),
        ..Default::default()
    };
    match Pipeline::new(config) {
        Ok(pipeline) => {
            benchmark_fn("run(items=1000, months=36, ets AAN)", 3, || {
                pipeline.run(&batch, &request)
            });
        }
        Err(e) => eprintln!("failed to build ETS pipeline: {}", e),
    }

    println!("\n=== Benchmark Complete ===");
}
