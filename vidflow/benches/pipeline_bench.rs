//! Benchmarks for job submission and pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vidflow::pipeline::PipelineCatalog;
use vidflow::registry::JobRegistry;
use vidflow::testing::{sample_request, static_executors};

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    let catalog = PipelineCatalog::new(&static_executors()).expect("catalog");

    c.bench_function("video_generation_job", |b| {
        let registry = JobRegistry::builder(catalog.clone()).max_concurrent_jobs(8).build();
        b.iter(|| {
            runtime.block_on(async {
                let job_id = registry.submit(sample_request()).await.expect("submit");
                black_box(registry.wait_for(job_id).await.expect("wait"))
            })
        });
        runtime.block_on(registry.evict_terminal_older_than(std::time::Duration::ZERO));
    });

    c.bench_function("context_merge", |b| {
        let record = sample_request().initial_context();
        b.iter(|| {
            black_box(
                record
                    .merged(
                        "analyze",
                        vidflow::core::StageOutput::value("concepts", serde_json::json!(["a", "b"])),
                    )
                    .expect("merge"),
            )
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
