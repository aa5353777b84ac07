use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hala_meshlet_renderer::config::HalaMeshletCapacity;
use hala_meshlet_renderer::dispatch::HalaDispatchBatcher;
use hala_meshlet_renderer::instance::regenerate_instances;
use hala_meshlet_renderer::scene::{HalaMeshlet, HalaSubset};

fn bench_compute_dispatches(c: &mut Criterion) {
  let batcher = HalaDispatchBatcher::new(HalaMeshletCapacity::default());
  let subset = HalaSubset::new(0, 5);
  let trailing = HalaMeshlet::new(64, 0, 32, 0);

  let mut group = c.benchmark_group("compute_dispatches");
  for instance_count in [1_000u32, 20_000, 1_000_000] {
    group.bench_with_input(BenchmarkId::from_parameter(instance_count), &instance_count, |b, &count| {
      b.iter(|| batcher.compute_dispatches(black_box(&subset), black_box(&trailing), black_box(count)));
    });
  }
  group.finish();
}

fn bench_regenerate_instances(c: &mut Criterion) {
  let mut group = c.benchmark_group("regenerate_instances");
  for level in [1u32, 5, 13] {
    group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
      b.iter(|| regenerate_instances(black_box(level), black_box(1.5)));
    });
  }
  group.finish();
}

criterion_group!(benches, bench_compute_dispatches, bench_regenerate_instances);
criterion_main!(benches);
