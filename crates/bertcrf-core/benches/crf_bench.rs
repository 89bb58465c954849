use bertcrf_core::crf::{
    ConfidenceKind, TransitionInit, TransitionModel, ViterbiDecoder, log_partition,
};
use bertcrf_core::labels::LabelAlphabet;
use candle_core::{Device, Tensor};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_crf(c: &mut Criterion) {
    let alphabet = LabelAlphabet::ner();
    let device = Device::Cpu;
    let transitions = TransitionModel::new(&alphabet, TransitionInit::default(), &device).unwrap();
    let emissions = Tensor::randn(0f32, 1f32, (32, 128, alphabet.len()), &device).unwrap();
    let start = alphabet.start_id();

    c.bench_function("forward_32x128", |b| {
        b.iter(|| log_partition(black_box(&emissions), transitions.matrix(), start).unwrap());
    });

    let margin = ViterbiDecoder::new(start, ConfidenceKind::Margin);
    c.bench_function("viterbi_32x128", |b| {
        b.iter(|| margin.decode(black_box(&emissions), transitions.matrix()).unwrap());
    });

    let posterior = ViterbiDecoder::new(start, ConfidenceKind::PathPosterior);
    c.bench_function("viterbi_posterior_32x128", |b| {
        b.iter(|| posterior.decode(black_box(&emissions), transitions.matrix()).unwrap());
    });
}

criterion_group!(benches, bench_crf);
criterion_main!(benches);
