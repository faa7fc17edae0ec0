// File: agent/tests/sensor_tests.rs
use tempfile::TempDir;

use agent::sensors::{SampleOutcome, SensorAggregator, SensorColumns, YEARLY_HEADER};

// Builds one export row wide enough for the default column layout.
fn export_row(date: &str, time: &str, metrics: &[(usize, &str)]) -> String {
    let cols = SensorColumns::default();
    let width = cols.gpu_temp + 1;
    let mut fields = vec![String::new(); width];
    fields[cols.date] = date.to_string();
    fields[cols.time] = time.to_string();
    for &(idx, value) in metrics {
        fields[idx] = value.to_string();
    }
    fields.join(",")
}

fn full_row(date: &str, time: &str) -> String {
    let cols = SensorColumns::default();
    export_row(
        date,
        time,
        &[
            (cols.cpu_usage, "12.5"),
            (cols.cpu_temp, "48.0"),
            (cols.pch_temp, "55.0"),
            (cols.memory_temp, "41.0"),
            (cols.ssd_temp, "39.0"),
            (cols.gpu_temp, "52.0"),
        ],
    )
}

fn aggregator(dir: &TempDir) -> (SensorAggregator, std::path::PathBuf) {
    let input = dir.path().join("hwinfo_export.csv");
    let agg = SensorAggregator::new(
        input.clone(),
        dir.path().join("yearly"),
        dir.path(),
        30,
    );
    (agg, input)
}

#[test]
fn first_sample_creates_yearly_file_with_header() {
    let dir = TempDir::new().unwrap();
    let (agg, input) = aggregator(&dir);
    std::fs::write(&input, full_row("2026/03/14", "09:47:12.381")).unwrap();

    let outcome = agg.sample_once(Some((460.0, 120.0))).unwrap();
    assert_eq!(
        outcome,
        SampleOutcome::Appended("2026/03/14 09:30".to_string())
    );

    let yearly = std::fs::read_to_string(agg.yearly_path(2026)).unwrap();
    let mut lines = yearly.lines();
    assert_eq!(lines.next(), Some(YEARLY_HEADER));
    let row = lines.next().unwrap();
    assert!(row.starts_with("2026/03/14 09:30,12.5,48.0"));
    assert!(row.ends_with("460.0,120.0"));
}

#[test]
fn same_slot_is_written_only_once() {
    let dir = TempDir::new().unwrap();
    let (agg, input) = aggregator(&dir);

    std::fs::write(&input, full_row("2026/03/14", "09:32:00")).unwrap();
    assert!(matches!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Appended(_)
    ));

    // A later export row in the same 30-minute slot.
    std::fs::write(&input, full_row("2026/03/14", "09:58:59")).unwrap();
    assert_eq!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Skipped("slot already written")
    );

    // Next slot writes again.
    std::fs::write(&input, full_row("2026/03/14", "10:01:00")).unwrap();
    assert!(matches!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Appended(_)
    ));

    let yearly = std::fs::read_to_string(agg.yearly_path(2026)).unwrap();
    assert_eq!(yearly.lines().count(), 3); // header + two rows
}

#[test]
fn incomplete_rows_are_dropped() {
    let dir = TempDir::new().unwrap();
    let (agg, input) = aggregator(&dir);
    let cols = SensorColumns::default();

    // gpu_temp left empty
    let row = export_row(
        "2026/03/14",
        "09:32:00",
        &[(cols.cpu_usage, "12.5"), (cols.cpu_temp, "48.0")],
    );
    std::fs::write(&input, row).unwrap();
    assert_eq!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Skipped("missing values")
    );

    std::fs::write(&input, "a,b,c").unwrap();
    assert_eq!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Skipped("row too short")
    );

    assert!(!agg.yearly_path(2026).exists());
}

#[test]
fn missing_export_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let (agg, _input) = aggregator(&dir);
    assert_eq!(
        agg.sample_once(None).unwrap(),
        SampleOutcome::Skipped("input missing")
    );
}

#[test]
fn oversized_export_is_truncated() {
    let dir = TempDir::new().unwrap();
    let (agg, input) = aggregator(&dir);

    std::fs::write(&input, vec![b'x'; 1_100_000]).unwrap();
    assert!(agg.truncate_input_if_oversized());
    assert_eq!(std::fs::metadata(&input).unwrap().len(), 0);

    // Small files are left alone.
    std::fs::write(&input, "small").unwrap();
    assert!(!agg.truncate_input_if_oversized());
}
