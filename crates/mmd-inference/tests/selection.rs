use mmd_compute::{CustomKernel, GaussianKernel};
use mmd_core::{
    DataSource, DenseFeatures, Error, GramMatrix, Kernel, KernelSelectionMethod, StatisticType,
};
use mmd_inference::{BlockStream, MmdConfig, StreamingMmd};
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

const WIDTHS: [f64; 3] = [0.001, 2.0, 1000.0];

fn gaussian_samples(n: usize, shift: f64, seed: u64) -> DenseFeatures {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut m = DMatrix::from_fn(n, 2, |_, _| normal.sample(&mut rng));
    for i in 0..n {
        m[(i, 0)] += shift;
    }
    DenseFeatures::new(m)
}

fn estimator(bpb: usize) -> StreamingMmd<BlockStream> {
    let source =
        BlockStream::new(gaussian_samples(200, 0.0, 11), gaussian_samples(200, 1.5, 12), 20, 20, bpb)
            .unwrap();
    let config = MmdConfig { seed: Some(3), num_null_samples: 50, ..MmdConfig::default() };
    let mut mmd = StreamingMmd::new(source, config).unwrap();
    for w in WIDTHS {
        mmd.add_kernel(Arc::new(GaussianKernel::new(w).unwrap()));
    }
    mmd
}

fn chosen_width(kernel: &Arc<dyn Kernel>) -> f64 {
    kernel.width().expect("expected a Gaussian kernel")
}

#[test]
fn median_heuristic_picks_width_near_median_distance() {
    let mut mmd = estimator(2);
    let kernel = mmd.select_kernel(KernelSelectionMethod::MedianHeuristic, false, 1.0, 1, 0.05).unwrap();
    assert_eq!(chosen_width(&kernel), 2.0);
    assert_eq!(chosen_width(&mmd.kernel().unwrap()), 2.0);

    let source = mmd.data_source();
    assert_eq!(source.train_test_ratio(), 0.0);
    assert!(!source.is_train_mode());
    assert!(source.is_blockwise());
}

#[test]
fn weighted_median_heuristic_is_rejected_without_touching_split() {
    let mut mmd = estimator(2);
    mmd.data_source_mut().set_train_test_ratio(0.25);
    let err = mmd.select_kernel(KernelSelectionMethod::MedianHeuristic, true, 3.0, 1, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
    assert_eq!(mmd.data_source().train_test_ratio(), 0.25);
    assert!(!mmd.data_source().is_train_mode());
    assert!(mmd.kernel().is_none());

    let err = mmd.select_kernel(KernelSelectionMethod::MaximizeXValidation, true, 1.0, 1, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
}

#[test]
fn selection_without_candidates_is_rejected() {
    let source =
        BlockStream::new(gaussian_samples(40, 0.0, 1), gaussian_samples(40, 0.0, 2), 10, 10, 2).unwrap();
    let mut mmd = StreamingMmd::new(source, MmdConfig::default()).unwrap();
    let err = mmd.select_kernel(KernelSelectionMethod::MaximizeMmd, false, 1.0, 1, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
}

#[test]
fn max_mmd_prefers_moderate_width_and_restores_split() {
    let mut mmd = estimator(2);
    mmd.data_source_mut().set_train_test_ratio(0.5);
    let kernel = mmd.select_kernel(KernelSelectionMethod::MaximizeMmd, false, 1.0, 1, 0.05).unwrap();
    assert_eq!(chosen_width(&kernel), 2.0);
    assert_eq!(mmd.data_source().train_test_ratio(), 0.5);
    assert!(!mmd.data_source().is_train_mode());
}

#[test]
fn max_power_never_picks_degenerate_width() {
    let mut mmd = estimator(2);
    let kernel = mmd.select_kernel(KernelSelectionMethod::MaximizePower, false, 1.0, 1, 0.05).unwrap();
    assert_ne!(chosen_width(&kernel), 0.001);
}

#[test]
fn weighted_selection_returns_normalized_combination() {
    for method in [KernelSelectionMethod::MaximizeMmd, KernelSelectionMethod::MaximizePower] {
        let mut mmd = estimator(2);
        // 160 training samples give 8 blocks, i.e. even bursts of 2.
        let kernel = mmd.select_kernel(method, true, 4.0, 1, 0.05).unwrap();
        assert!(kernel.name().starts_with("combined["), "{}", kernel.name());
        assert!(kernel.width().is_none());

        // The learned kernel is usable right away.
        let stat = mmd.compute_statistic().unwrap();
        assert!(stat > 0.0);
    }
}

#[test]
fn xvalidation_prefers_kernel_that_rejects() {
    let source =
        BlockStream::new(gaussian_samples(200, 0.0, 21), gaussian_samples(200, 1.5, 22), 20, 20, 5)
            .unwrap();
    let config = MmdConfig { seed: Some(8), num_null_samples: 50, ..MmdConfig::default() };
    let mut mmd = StreamingMmd::new(source, config).unwrap();
    mmd.add_kernel(Arc::new(GaussianKernel::new(2.0).unwrap()));
    mmd.add_kernel(Arc::new(GaussianKernel::new(0.001).unwrap()));

    let kernel =
        mmd.select_kernel(KernelSelectionMethod::MaximizeXValidation, false, 1.0, 3, 0.05).unwrap();
    assert_eq!(chosen_width(&kernel), 2.0);
    assert_eq!(mmd.data_source().train_test_ratio(), 0.0);
    assert!(!mmd.data_source().is_train_mode());
}

#[test]
fn failed_selection_keeps_previous_kernel() {
    let mut mmd = estimator(3);
    mmd.set_kernel(Arc::new(GaussianKernel::new(5.0).unwrap()));
    // Odd burst size makes the weighted estimator fail mid-stream.
    let err = mmd.select_kernel(KernelSelectionMethod::MaximizeMmd, true, 0.0, 1, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
    assert_eq!(chosen_width(&mmd.kernel().unwrap()), 5.0);
    assert!(!mmd.data_source().is_train_mode());
}

fn xvalidation_estimator() -> StreamingMmd<BlockStream> {
    let source =
        BlockStream::new(gaussian_samples(200, 0.0, 21), gaussian_samples(200, 1.5, 22), 20, 20, 5)
            .unwrap();
    let config = MmdConfig { seed: Some(8), num_null_samples: 50, ..MmdConfig::default() };
    let mut mmd = StreamingMmd::new(source, config).unwrap();
    mmd.set_statistic_type(StatisticType::BiasedFull);
    mmd.set_kernel(Arc::new(GaussianKernel::new(2.0).unwrap()));
    mmd
}

#[test]
fn xvalidation_restores_sample_order() {
    let mut mmd = xvalidation_estimator();
    let before = mmd.compute_statistic().unwrap();
    mmd.add_kernel(Arc::new(GaussianKernel::new(2.0).unwrap()));
    mmd.add_kernel(Arc::new(GaussianKernel::new(0.001).unwrap()));

    mmd.select_kernel(KernelSelectionMethod::MaximizeXValidation, false, 1.0, 3, 0.05).unwrap();
    mmd.set_kernel(Arc::new(GaussianKernel::new(2.0).unwrap()));
    assert_eq!(mmd.compute_statistic().unwrap(), before);
}

#[test]
fn failed_xvalidation_restores_sample_order() {
    let mut mmd = xvalidation_estimator();
    let before = mmd.compute_statistic().unwrap();
    mmd.add_kernel(Arc::new(GaussianKernel::new(2.0).unwrap()));
    mmd.add_kernel(Arc::new(CustomKernel::new(GramMatrix::identity(40, 40)).unwrap()));

    let err = mmd.select_kernel(KernelSelectionMethod::MaximizeXValidation, false, 1.0, 2, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
    assert_eq!(mmd.data_source().train_test_ratio(), 0.0);
    assert!(!mmd.data_source().is_train_mode());
    assert_eq!(mmd.compute_statistic().unwrap(), before);
}

#[test]
fn failed_median_heuristic_restores_previous_split() {
    let mut mmd = estimator(2);
    mmd.set_kernel(Arc::new(GaussianKernel::new(5.0).unwrap()));
    mmd.add_kernel(Arc::new(CustomKernel::new(GramMatrix::identity(40, 40)).unwrap()));
    mmd.data_source_mut().set_train_test_ratio(0.25);

    let err = mmd.select_kernel(KernelSelectionMethod::MedianHeuristic, false, 1.0, 1, 0.05);
    assert!(matches!(err, Err(Error::Config(_))));
    assert_eq!(mmd.data_source().train_test_ratio(), 0.25);
    assert!(!mmd.data_source().is_train_mode());
    assert!(mmd.data_source().is_blockwise());
    assert_eq!(chosen_width(&mmd.kernel().unwrap()), 5.0);
}
