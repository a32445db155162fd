use std::fs;
use std::io::Write;

use bandsaw_config::{SpeedRow, load_speed_table_csv, validate_speed_table};
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("table.csv");
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn loads_well_formed_table() {
    let (_dir, path) = write_csv(
        "height_mm,cutting_speed,descent_speed\n300,80,30\n150, 90, 45\n0,95,50\n",
    );
    let rows = load_speed_table_csv(&path).expect("load");
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        SpeedRow {
            height_mm: 150.0,
            cutting_speed: 90.0,
            descent_speed: 45.0
        }
    );
}

#[rstest]
#[case("height,cut,descent\n1,2,3\n", "must have headers")]
#[case("height_mm,cutting_speed,descent_speed\n", "at least one row")]
#[case("height_mm,cutting_speed,descent_speed\n100,80,30\n200,80,30\n", "strictly descending")]
#[case("height_mm,cutting_speed,descent_speed\n100,abc,30\n", "invalid CSV row 2")]
fn rejects_malformed_tables(#[case] body: &str, #[case] needle: &str) {
    let (_dir, path) = write_csv(body);
    let err = load_speed_table_csv(&path).expect_err("should reject");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[test]
fn duplicate_heights_are_rejected() {
    let rows = [
        SpeedRow {
            height_mm: 10.0,
            cutting_speed: 1.0,
            descent_speed: 1.0,
        },
        SpeedRow {
            height_mm: 10.0,
            cutting_speed: 2.0,
            descent_speed: 2.0,
        },
    ];
    assert!(validate_speed_table(&rows).is_err());
}
