//! Array-file extraction through generated and (optionally) real files.

use chrono::{TimeZone, Utc};

use ingestion::extract::{extract_array_file, ArrayExtractor};
use ingestion::{ExtractContext, Extractor, IngestConfig, QualityFilter, TimeNormalizer};
use netcdf_parser::AttrValue;
use obs_common::{QualityFlag, RawValue};
use test_utils::{profile_array, require_test_file, time_series_array};

fn ctx() -> ExtractContext {
    ExtractContext::new(TimeNormalizer::from_config(&IngestConfig::default()).unwrap())
}

#[test]
fn test_months_since_epoch_adds_calendar_months() {
    let file = time_series_array("SST", "months since 1900-01-01", vec![1454.0, 1455.0], vec![7.0, 8.0]);
    let ex = extract_array_file(&file, &ctx()).unwrap();
    let times: Vec<_> = ex.observations.iter().map(|o| o.timestamp).collect();
    assert_eq!(
        times,
        vec![
            Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap(),
        ]
    );
}

#[test]
fn test_profile_flags_feed_quality_filter() {
    let mut file = profile_array(
        "TEMP",
        "days since 1900-01-01",
        vec![44250.0, 44251.0],
        vec![0.0, 10.0],
        vec![12.0, 11.5, 12.2, 11.0],
    );
    file.variables
        .push(netcdf_parser::Variable::new("TEMP_QC", &["time", "depth"], vec![1.0, 4.0, 2.0, 0.0]));
    file.variables[1] = file.variables[1]
        .clone()
        .with_attr("units", AttrValue::Text("degree_Celsius".into()));

    let ex = extract_array_file(&file, &ctx()).unwrap();
    assert_eq!(ex.observations.len(), 4);
    assert_eq!(ex.observations[0].declared_unit.as_deref(), Some("degree_Celsius"));

    let (kept, counts) = QualityFilter::default().apply(ex.observations, |o| o.quality_flag);
    assert_eq!((counts.kept, counts.dropped), (3, 1));
    let flags: Vec<_> = kept.iter().map(|(_, f)| *f).collect();
    assert_eq!(flags, vec![QualityFlag::GOOD, QualityFlag::PROBABLY_GOOD, QualityFlag::NEUTRAL]);
    assert_eq!(kept[2].0.value, RawValue::Number(11.0));
}

#[test]
fn test_real_netcdf_sample() {
    let path = require_test_file!("sample_timeseries.nc");
    let ex = ArrayExtractor.extract(&path, &ctx()).unwrap();
    assert!(ex.rows_read > 0);
    assert!(!ex.observations.is_empty());
}
