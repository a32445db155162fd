use std::fs;

use bandsaw_config::load_model;
use tempfile::tempdir;

#[test]
fn loads_artifact_with_default_scaler() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.toml");
    fs::write(&path, "intercept = 0.1\ncoefficients = [-0.2, -1.5, 0.0, -0.01]\n").unwrap();
    let m = load_model(&path).expect("load");
    assert_eq!(m.coefficients[1], -1.5);
    assert_eq!(m.means, [0.0; 4]);
    assert_eq!(m.scales, [1.0; 4]);
}

#[test]
fn zero_scale_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.toml");
    fs::write(
        &path,
        "intercept = 0.0\ncoefficients = [1.0, 1.0, 1.0, 1.0]\nscales = [1.0, 0.0, 1.0, 1.0]\n",
    )
    .unwrap();
    let err = load_model(&path).expect_err("zero scale");
    assert!(format!("{err}").contains("non-zero"));
}

#[test]
fn missing_file_reports_path() {
    let err = load_model(std::path::Path::new("/nonexistent/model.toml")).expect_err("missing");
    assert!(format!("{err}").contains("model.toml"));
}

#[test]
fn wrong_coefficient_count_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.toml");
    fs::write(&path, "intercept = 0.0\ncoefficients = [1.0, 2.0]\n").unwrap();
    assert!(load_model(&path).is_err());
}
