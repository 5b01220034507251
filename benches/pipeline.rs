use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dist_fft2d::{
    cluster::run_local,
    geometry::PartitionGeometry,
    parameters::FftConfig,
    reference::transform_2d,
    workload::{Input, global_rows, partition_rows},
};

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    for (dim_x, dim_y_real) in [(256, 510), (512, 1022)] {
        group.throughput(Throughput::Elements((dim_x * dim_y_real) as u64));

        for nodes in [1, 2, 4] {
            let geometry = PartitionGeometry::new(dim_x, dim_y_real, nodes).unwrap();
            let rows = global_rows(&geometry, Input::Random, 1);

            for strategy in ["scatter", "all_to_all"] {
                let config = FftConfig::new(dim_x, dim_y_real, strategy);
                let id = BenchmarkId::new(format!("{strategy}/{nodes}"), format!("{dim_x}x{dim_y_real}"));

                group.bench_with_input(id, &rows, |b, rows| {
                    b.iter_batched(
                        || partition_rows(&geometry, rows.clone()),
                        |inputs| run_local(&config, inputs).unwrap(),
                        criterion::BatchSize::LargeInput,
                    );
                });
            }
        }

        // Single node, no exchange at all
        let geometry = PartitionGeometry::new(dim_x, dim_y_real, 1).unwrap();
        let rows = global_rows(&geometry, Input::Random, 1);
        group.bench_with_input(
            BenchmarkId::new("reference", format!("{dim_x}x{dim_y_real}")),
            &rows,
            |b, rows| {
                b.iter_batched(
                    || rows.clone(),
                    |rows| transform_2d(&geometry, rows),
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
