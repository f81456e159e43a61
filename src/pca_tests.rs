use crate::config::{EigenSolverConfig, PcaConfig};
use crate::covariance::{CovarianceEstimator, CovarianceMatrix};
use crate::data::DataMatrix;
use crate::error::PcaError;
use crate::pca::{PcaEngine, PcaModel};
use crate::standardize::Standardizer;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::error::Error;

const COMPARISON_TOLERANCE: f64 = 1e-9;

// 5 samples x 4 features, worked through by hand in the project notes.
fn worked_example() -> DataMatrix {
    DataMatrix::from_rows(&[
        [1.0, 2.0, 3.0, 4.0],
        [5.0, 5.0, 6.0, 7.0],
        [1.0, 4.0, 2.0, 3.0],
        [5.0, 3.0, 2.0, 1.0],
        [8.0, 1.0, 2.0, 2.0],
    ])
    .unwrap()
}

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-10.0..10.0))
}

fn covariance_of(data: &DataMatrix, config: &PcaConfig) -> CovarianceMatrix {
    let standardized = Standardizer::new(config.standardization_ddof)
        .standardize(data)
        .unwrap();
    CovarianceEstimator::new(config.covariance_ddof).estimate(&standardized)
}

fn assert_array2_close(expected: ArrayView2<'_, f64>, actual: ArrayView2<'_, f64>, tolerance: f64, label: &str) {
    assert_eq!(expected.dim(), actual.dim(), "Dimension mismatch for {}", label);
    for ((idx, e), a) in expected.indexed_iter().zip(actual.iter()) {
        assert!(
            (e - a).abs() <= tolerance,
            "Mismatch in {} at {:?}: expected {}, got {}",
            label,
            idx,
            e,
            a
        );
    }
}

fn assert_array1_close(expected: ArrayView1<'_, f64>, actual: ArrayView1<'_, f64>, tolerance: f64, label: &str) {
    assert_eq!(expected.len(), actual.len(), "Length mismatch for {}", label);
    for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        assert!(
            (e - a).abs() <= tolerance,
            "Mismatch in {} at {}: expected {}, got {}",
            label,
            i,
            e,
            a
        );
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    #[test]
    fn test_worked_example_scores() -> Result<(), Box<dyn Error>> {
        println!("--- Test: Worked Example Scores ---");
        let transformed = PcaEngine::default().compute(&worked_example(), 2)?;
        let expected = array![
            [-0.014003, -0.755975],
            [2.556534, 0.780432],
            [0.051480, -1.253135],
            [-1.014150, -0.000239],
            [-1.579861, 1.228917],
        ];
        assert_eq!(transformed.n_samples(), 5);
        assert_eq!(transformed.n_components(), 2);
        assert_array2_close(expected.view(), transformed.view(), 1e-5, "worked example scores");
        Ok(())
    }

    #[test]
    fn test_worked_example_eigenvalues_per_convention() -> Result<(), Box<dyn Error>> {
        println!("--- Test: Worked Example Eigenvalues ---");
        let data = worked_example();

        let default_output = PcaEngine::default().compute_with_decomposition(&data, 4)?;
        assert_array1_close(
            array![2.012635, 0.852231, 0.315110, 0.020025].view(),
            default_output.projection.eigenvalues(),
            1e-5,
            "default eigenvalues",
        );
        assert_abs_diff_eq!(default_output.projection.total_variance(), 3.2, epsilon = 1e-9);

        let quoted = array![2.51579, 1.06529, 0.39389, 0.02503];
        for config in [PcaConfig::population(), PcaConfig::sample()] {
            let output = PcaEngine::new(config).compute_with_decomposition(&data, 4)?;
            assert_array1_close(quoted.view(), output.projection.eigenvalues(), 1e-5, "unit-diagonal eigenvalues");
            assert_abs_diff_eq!(output.projection.total_variance(), 4.0, epsilon = 1e-9);
        }

        let population = PcaEngine::new(PcaConfig::population()).compute(&data, 2)?;
        assert_array1_close(
            array![-0.015656, -0.845205].view(),
            population.view().row(0),
            1e-5,
            "population first row",
        );
        Ok(())
    }

    #[test]
    fn test_divisor_choice_only_rescales_eigenvalues() -> Result<(), Box<dyn Error>> {
        let data = worked_example();
        let default_output = PcaEngine::default().compute_with_decomposition(&data, 4)?;
        let sample_output = PcaEngine::new(PcaConfig::sample()).compute_with_decomposition(&data, 4)?;

        // Same standardization, so the scores agree; the covariance differs by n / (n - 1).
        assert_array2_close(
            default_output.transformed.view(),
            sample_output.transformed.view(),
            COMPARISON_TOLERANCE,
            "scores under default vs sample",
        );
        let rescaled = default_output.projection.eigenvalues().mapv(|v| v * 5.0 / 4.0);
        assert_array1_close(rescaled.view(), sample_output.projection.eigenvalues(), COMPARISON_TOLERANCE, "rescaled eigenvalues");
        assert_array1_close(
            default_output.projection.explained_variance_ratio().view(),
            sample_output.projection.explained_variance_ratio().view(),
            COMPARISON_TOLERANCE,
            "explained variance ratio",
        );
        Ok(())
    }

    #[test]
    fn test_random_data_decomposition_properties() -> Result<(), Box<dyn Error>> {
        println!("--- Test: Random Data Decomposition Properties ---");
        let config = PcaConfig::default();
        let data = DataMatrix::from_array(generate_random_data(60, 7, 1926))?;
        let engine = PcaEngine::new(config.clone());

        let decomposition = engine.decompose(&data)?;
        let covariance = covariance_of(&data, &config);
        assert_eq!(decomposition.len(), 7);

        // A v = lambda v
        for pair in decomposition.pairs() {
            let av = covariance.view().dot(&pair.eigenvector);
            let lv = &pair.eigenvector * pair.eigenvalue;
            assert_array1_close(lv.view(), av.view(), 1e-6, "A v = lambda v");
        }

        // V^T V = I
        let vectors = decomposition.eigenvectors();
        let gram = vectors.t().dot(&vectors);
        assert_array2_close(Array2::eye(7).view(), gram.view(), 1e-9, "eigenvector Gram matrix");

        // sum of eigenvalues = trace; default config gives trace (n - 1) / n * m
        assert_abs_diff_eq!(decomposition.total_variance(), covariance.trace(), epsilon = 1e-6);
        assert_abs_diff_eq!(covariance.trace(), 7.0 * 59.0 / 60.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_selection_is_sorted_and_spans_all_eigenvectors() -> Result<(), Box<dyn Error>> {
        let data = DataMatrix::from_array(generate_random_data(40, 5, 7))?;
        let output = PcaEngine::default().compute_with_decomposition(&data, 5)?;

        let eigenvalues = output.projection.eigenvalues();
        for window in eigenvalues.to_vec().windows(2) {
            assert!(window[0] >= window[1], "eigenvalues not descending: {:?}", eigenvalues);
        }

        // Every eigenvector of the decomposition appears exactly once as a component.
        let components = output.projection.components();
        for pair in output.decomposition.pairs() {
            let matches = components
                .columns()
                .into_iter()
                .filter(|column| {
                    column
                        .iter()
                        .zip(pair.eigenvector.iter())
                        .all(|(a, b)| (a - b).abs() < COMPARISON_TOLERANCE)
                })
                .count();
            assert_eq!(matches, 1);
        }
        Ok(())
    }

    #[test]
    fn test_full_rank_preserves_total_variance() -> Result<(), Box<dyn Error>> {
        let data = DataMatrix::from_array(generate_random_data(50, 6, 99))?;
        let output = PcaEngine::default().compute_with_decomposition(&data, 6)?;

        let kept: f64 = output.projection.eigenvalues().sum();
        assert_abs_diff_eq!(kept, output.projection.total_variance(), epsilon = 1e-9);
        assert_abs_diff_eq!(output.projection.explained_variance_ratio().sum(), 1.0, epsilon = 1e-9);

        // Default covariance divides by n, so score variances over n are the eigenvalues.
        let n = output.transformed.n_samples() as f64;
        let score_variance: f64 = output
            .transformed
            .view()
            .columns()
            .into_iter()
            .map(|column| column.dot(&column) / n)
            .sum();
        assert_abs_diff_eq!(score_variance, kept, epsilon = 1e-8);
        Ok(())
    }

    #[test]
    fn test_component_count_bounds() {
        let data = worked_example();
        let engine = PcaEngine::default();
        assert!(engine.compute(&data, 4).is_ok());
        assert!(matches!(
            engine.compute(&data, 0),
            Err(PcaError::InvalidComponentCount { requested: 0, max: 4 })
        ));
        assert!(matches!(
            engine.compute(&data, 5),
            Err(PcaError::InvalidComponentCount { requested: 5, max: 4 })
        ));
    }

    #[test]
    fn test_constant_column_is_rejected() {
        let data = DataMatrix::from_array(array![
            [1.0, 2.0, 7.0],
            [2.0, 1.0, 7.0],
            [3.0, 5.0, 7.0],
            [4.0, 3.0, 7.0],
        ])
        .unwrap();
        match PcaEngine::default().compute(&data, 2) {
            Err(PcaError::DegenerateColumn { column, value }) => {
                assert_eq!(column, 2);
                assert_abs_diff_eq!(value, 7.0, epsilon = 1e-12);
            }
            other => panic!("expected DegenerateColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_cap_surfaces_convergence_error() {
        let data = DataMatrix::from_array(generate_random_data(30, 6, 3)).unwrap();
        let config = PcaConfig::default().with_solver(EigenSolverConfig {
            max_sweeps: Some(1),
            ..EigenSolverConfig::default()
        });
        assert!(matches!(
            PcaEngine::new(config).compute(&data, 2),
            Err(PcaError::Convergence { sweeps: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_solver_config_is_rejected_before_running() {
        let config = PcaConfig::default().with_solver(EigenSolverConfig {
            tolerance: f64::NAN,
            max_sweeps: None,
        });
        let engine = PcaEngine::new(config);
        assert!(matches!(engine.compute(&worked_example(), 2), Err(PcaError::InvalidConfig(_))));
        assert!(matches!(engine.decompose(&worked_example()), Err(PcaError::InvalidConfig(_))));
    }

    #[test]
    fn test_engine_is_shareable_across_threads() -> Result<(), Box<dyn Error>> {
        let engine = PcaEngine::default();
        let data = DataMatrix::from_array(generate_random_data(80, 8, 42))?;
        let reference = engine.compute(&data, 3)?;

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| engine.compute(&data, 3))).collect();
            for handle in handles {
                let result = handle.join().expect("worker thread panicked").expect("compute failed");
                assert_eq!(result, reference);
            }
        });
        Ok(())
    }

    #[test]
    fn test_extreme_magnitudes_give_finite_scores() -> Result<(), Box<dyn Error>> {
        println!("--- Test: Extreme Magnitudes ---");
        let engine = PcaEngine::default();

        // Squaring these overflows; both features must keep their variance.
        let huge = DataMatrix::from_rows(&[[1e200, 1.0], [-1e200, 3.0], [3e200, 2.0], [0.0, 5.0]])?;
        let output = engine.compute_with_decomposition(&huge, 2)?;
        assert_abs_diff_eq!(output.projection.total_variance(), 2.0 * 3.0 / 4.0, epsilon = 1e-9);
        for column in output.transformed.view().columns() {
            assert!(column.iter().all(|x| x.is_finite()));
            assert!(column.dot(&column) > 1e-6, "component lost its variance: {}", column);
        }

        // The plain mean of this column already overflows.
        let near_max = DataMatrix::from_rows(&[[1e308, 1.0], [1.7e308, 3.0], [-1e308, 2.0]])?;
        let output = engine.compute_with_decomposition(&near_max, 1)?;
        assert!(output.transformed.view().iter().all(|x| x.is_finite()));
        assert!(output.decomposition.eigenvalues().iter().all(|x| x.is_finite()));

        // Squaring these underflows to zero; the column is not constant.
        let tiny = DataMatrix::from_rows(&[[1e-200, 1.0], [2e-200, 3.0], [4e-200, 2.0]])?;
        let transformed = engine.compute(&tiny, 2)?;
        assert!(transformed.view().iter().all(|x| x.is_finite()));
        Ok(())
    }

    #[test]
    fn test_unrepresentable_spread_is_an_error() {
        let data = DataMatrix::from_rows(&[[f64::MAX, 1.0], [-f64::MAX, 2.0], [0.0, 4.0]]).unwrap();
        assert!(matches!(
            PcaEngine::default().compute(&data, 1),
            Err(PcaError::NumericOverflow { column: 0, .. })
        ));
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;
    use serde::Serialize;
    use tempfile::NamedTempFile;

    /// Mirrors the serialized field layout of `PcaModel`, so tests can write models that
    /// `with_model` would refuse to build.
    #[derive(Serialize)]
    struct RawModel {
        rotation: Array2<f64>,
        mean: Array1<f64>,
        scale: Array1<f64>,
        explained_variance: Array1<f64>,
        total_variance: f64,
        config: PcaConfig,
    }

    impl RawModel {
        fn valid(n_features: usize, k_components: usize) -> Self {
            RawModel {
                rotation: Array2::zeros((n_features, k_components)),
                mean: Array1::zeros(n_features),
                scale: Array1::ones(n_features),
                explained_variance: Array1::ones(k_components),
                total_variance: n_features as f64,
                config: PcaConfig::default(),
            }
        }

        fn write(&self) -> Result<NamedTempFile, Box<dyn Error>> {
            let mut file = NamedTempFile::new()?;
            bincode::serde::encode_into_std_write(self, file.as_file_mut(), bincode::config::standard())?;
            Ok(file)
        }
    }

    #[test]
    fn test_fit_transform_matches_compute() -> Result<(), Box<dyn Error>> {
        let data = worked_example();
        let engine = PcaEngine::default();
        let model = engine.fit(&data, 2)?;
        let computed = engine.compute(&data, 2)?;

        assert_eq!(model.n_features(), 4);
        assert_eq!(model.n_components(), 2);
        assert_array1_close(array![4.0, 3.0, 3.0, 3.4].view(), model.mean().view(), COMPARISON_TOLERANCE, "means");
        assert_abs_diff_eq!(model.scale()[0], 3.0, epsilon = COMPARISON_TOLERANCE);

        let transformed = model.transform(data.view())?;
        assert_array2_close(computed.view(), transformed.view(), COMPARISON_TOLERANCE, "fit/transform vs compute");
        Ok(())
    }

    #[test]
    fn test_inverse_transform_round_trip_at_full_rank() -> Result<(), Box<dyn Error>> {
        let raw = generate_random_data(25, 5, 11);
        let data = DataMatrix::from_array(raw.clone())?;
        let model = PcaEngine::new(PcaConfig::population()).fit(&data, 5)?;

        let scores = model.transform(raw.view())?;
        let restored = model.inverse_transform(&scores)?;
        assert_array2_close(raw.view(), restored.view(), 1e-8, "inverse transform");
        Ok(())
    }

    #[test]
    fn test_transform_input_validation() -> Result<(), Box<dyn Error>> {
        let model = PcaEngine::default().fit(&worked_example(), 2)?;

        let empty = model.transform(Array2::<f64>::zeros((0, 4)).view())?;
        assert_eq!(empty.n_samples(), 0);
        assert_eq!(empty.n_components(), 2);

        assert!(matches!(
            model.transform(Array2::<f64>::zeros((3, 5)).view()),
            Err(PcaError::DimensionMismatch { expected: 4, found: 5, .. })
        ));
        let with_nan = array![[1.0, 2.0, f64::NAN, 4.0]];
        assert!(matches!(
            model.transform(with_nan.view()),
            Err(PcaError::NonFiniteValue { row: 0, column: 2, .. })
        ));

        let wide_scores = PcaEngine::default().compute(&worked_example(), 3)?;
        assert!(matches!(
            model.inverse_transform(&wide_scores),
            Err(PcaError::DimensionMismatch { expected: 2, found: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_save_load_round_trip() -> Result<(), Box<dyn Error>> {
        println!("--- Test: Save/Load Round Trip ---");
        let data = DataMatrix::from_array(generate_random_data(30, 6, 2024))?;
        let original = PcaEngine::new(PcaConfig::sample()).fit(&data, 3)?;

        let temp_file = NamedTempFile::new()?;
        original.save_model(temp_file.path())?;
        let loaded = PcaModel::load_model(temp_file.path())?;

        assert_eq!(original, loaded);
        assert_eq!(loaded.config(), &PcaConfig::sample());

        let new_samples = generate_random_data(4, 6, 77);
        let transformed_original = original.transform(new_samples.view())?;
        let transformed_loaded = loaded.transform(new_samples.view())?;
        assert_eq!(transformed_original, transformed_loaded);
        Ok(())
    }

    #[test]
    fn test_load_model_error_conditions() -> Result<(), Box<dyn Error>> {
        println!("--- Test: `load_model` Error Conditions ---");
        assert!(matches!(
            PcaModel::load_model("a_surely_non_existent_file.pca_model"),
            Err(PcaError::Io(_))
        ));

        let empty_temp_file = NamedTempFile::new()?;
        assert!(matches!(PcaModel::load_model(empty_temp_file.path()), Err(PcaError::Decode(_))));

        let valid = RawModel::valid(3, 2).write()?;
        let loaded = PcaModel::load_model(valid.path())?;
        assert_eq!(loaded.n_features(), 3);

        let mut bad_dim = RawModel::valid(3, 2);
        bad_dim.rotation = Array2::zeros((4, 2));
        assert!(matches!(PcaModel::load_model(bad_dim.write()?.path()), Err(PcaError::InvalidModel(_))));

        let mut zero_scale = RawModel::valid(3, 2);
        zero_scale.scale = array![1.0, 0.0, 2.0];
        assert!(matches!(PcaModel::load_model(zero_scale.write()?.path()), Err(PcaError::InvalidModel(_))));

        let mut negative_eigenvalue = RawModel::valid(3, 2);
        negative_eigenvalue.explained_variance = array![1.0, -0.5];
        assert!(matches!(
            PcaModel::load_model(negative_eigenvalue.write()?.path()),
            Err(PcaError::InvalidModel(_))
        ));

        let mut short_variance = RawModel::valid(3, 2);
        short_variance.explained_variance = array![1.0];
        assert!(matches!(
            PcaModel::load_model(short_variance.write()?.path()),
            Err(PcaError::InvalidModel(_))
        ));
        Ok(())
    }

    #[test]
    fn test_with_model_constructor() -> Result<(), Box<dyn Error>> {
        let rotation = array![[0.5, 0.5], [-0.5, 0.5], [0.5, -0.5], [-0.5, -0.5]];
        let mean = array![10.0, 20.0, 30.0, 40.0];
        let scale = array![1.0, 1.0, 2.0, 1.0];
        let model = PcaModel::with_model(
            rotation.clone(),
            mean.clone(),
            scale.clone(),
            array![2.0, 1.0],
            4.0,
            PcaConfig::default(),
        )?;

        // Centered and scaled rows are [1, 0, 1, 0] and [0, 1, 0, 1].
        let transformed = model.transform(array![[11.0, 20.0, 32.0, 40.0], [10.0, 21.0, 30.0, 41.0]].view())?;
        assert_array2_close(array![[1.0, 0.0], [-1.0, 0.0]].view(), transformed.view(), COMPARISON_TOLERANCE, "with_model transform");
        assert_array1_close(array![0.5, 0.25].view(), model.explained_variance_ratio().view(), COMPARISON_TOLERANCE, "ratio");

        assert!(matches!(
            PcaModel::with_model(rotation, mean, array![1.0, f64::NAN, 2.0, 1.0], array![2.0, 1.0], 4.0, PcaConfig::default()),
            Err(PcaError::InvalidModel(_))
        ));
        Ok(())
    }
}
