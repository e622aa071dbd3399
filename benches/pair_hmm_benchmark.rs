use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use somavar::model::pair_hmm::{log_viterbi, FlankModel, PairHmmParams};

fn synthetic_sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            b"ACGT"[(state % 4) as usize]
        })
        .collect()
}

/// Benchmark the alignment core over typical read lengths
fn bench_log_viterbi(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_hmm_log_viterbi");
    let params = PairHmmParams::default();
    let flank = FlankModel {
        lhs_end: 0.99,
        rhs_end: 0.99,
        match_end: params.max_match_end(),
    };

    for read_len in [100usize, 150, 250] {
        let target = synthetic_sequence(read_len + 64, 7);
        let query = target[32..32 + read_len].to_vec();
        let qualities = vec![30u8; read_len];
        group.throughput(Throughput::Elements((read_len * (read_len + 64)) as u64));
        group.bench_with_input(
            BenchmarkId::new("read_len", read_len),
            &read_len,
            |b, _| {
                b.iter(|| {
                    log_viterbi(
                        black_box(&target),
                        black_box(&query),
                        black_box(&qualities),
                        black_box(&params),
                        black_box(&flank),
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_log_viterbi);
criterion_main!(benches);
