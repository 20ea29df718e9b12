use std::sync::Arc;

use criterion::{black_box,
                criterion_group,
                criterion_main,
                Criterion};

use drs4_dataclasses::constants::NCELLS;
use drs4_dataclasses::{CalibrationTable,
                       Capture,
                       Decoder,
                       VoltageRange,
                       reconstruct};

fn bench_reconstruct(c : &mut Criterion) {
  let widths : Vec<f32> = (0..NCELLS).map(|k| 0.2 + 0.0001*(k as f32)).collect();
  c.bench_function("reconstruct", |b| b.iter(|| reconstruct(black_box(&widths), black_box(512))));
}

fn bench_decode(c : &mut Criterion) {
  let mut table = CalibrationTable::new(1);
  let mut cap   = Capture::new();
  cap.trigger_cell = 100;
  for ch in 1..=4 {
    table.set_widths(ch, &[0.2;NCELLS]).unwrap();
    cap.add_channel(ch, vec![32768;NCELLS]);
  }
  let decoder = Decoder::new(Arc::new(table), VoltageRange::new());
  c.bench_function("decode 4 channels", |b| b.iter(|| decoder.decode(black_box(&cap))));
}

criterion_group!(benches, bench_reconstruct, bench_decode);
criterion_main!(benches);
