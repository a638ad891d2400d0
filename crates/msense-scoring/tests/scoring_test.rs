use msense_core::{FeatureVector, Scorer, ScoreVector};
use msense_scoring::{ArtifactError, ArtifactPaths, ScorerHandle, ScoringPipeline};
use msense_test_utils::{golden_features, write_golden_artifacts, GOLDEN_SCORES};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::OnceLock;

fn golden_handle() -> &'static ScorerHandle {
    static HANDLE: OnceLock<ScorerHandle> = OnceLock::new();
    HANDLE.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        write_golden_artifacts(dir.path()).unwrap();
        ScorerHandle::load(&ArtifactPaths::in_dir(dir.path())).unwrap()
    })
}

#[test]
fn golden_scores_through_fixture_artifacts() {
    let handle = golden_handle();
    assert!(handle.is_ready());

    let scores = handle.score(&golden_features()).unwrap();
    assert_eq!(scores.values(), GOLDEN_SCORES);
}

#[test]
fn scoring_is_deterministic() {
    let handle = golden_handle();
    let first = handle.score(&golden_features()).unwrap();
    for _ in 0..10 {
        assert_eq!(handle.score(&golden_features()).unwrap(), first);
    }
}

#[test]
fn malformed_model_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_golden_artifacts(dir.path()).unwrap();
    std::fs::write(dir.path().join("fatigue_model.json"), "{not json").unwrap();

    let err = ScoringPipeline::load(&ArtifactPaths::in_dir(dir.path())).unwrap_err();
    assert!(matches!(err, ArtifactError::Json { .. }));

    let handle = ScorerHandle::load_or_unavailable(&ArtifactPaths::in_dir(dir.path()));
    assert!(handle.score(&golden_features()).is_err());
}

#[test]
fn missing_scaler_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    write_golden_artifacts(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join("feature_scaler.json")).unwrap();

    let err = ScorerHandle::load(&ArtifactPaths::in_dir(dir.path())).unwrap_err();
    assert!(matches!(err, ArtifactError::Io { .. }));
}

proptest! {
    #[test]
    fn prop_scores_within_range_and_one_decimal(
        heart_rate in 30.0f64..220.0,
        rmssd in 0.0f64..300.0,
        temperature in 30.0f64..45.0,
        steps in 0.0f64..50_000.0,
        sleep in 0.0f64..24.0,
    ) {
        let handle = golden_handle();
        let fv = FeatureVector::new(heart_rate, rmssd, temperature, steps, sleep);
        let scores = handle.score(&fv).unwrap();
        for v in scores.values() {
            prop_assert!((ScoreVector::MIN..=ScoreVector::MAX).contains(&v));
            prop_assert_eq!((v * 10.0).round() / 10.0, v);
        }
    }
}
