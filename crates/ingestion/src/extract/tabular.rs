//! Delimited text files (CSV, TSV, semicolon- or pipe-separated).

use std::path::Path;
use tracing::debug;

use obs_common::{LocationRef, QualityFlag, RawValue};

use super::{read_non_empty, ExtractContext, ExtractionPath, Extractor, FileExtraction, Observation};
use crate::aliases::{find_column, find_date_and_time, find_quality_column, header_unit, Field};
use crate::decode::decode;
use crate::issue::FileIssue;
use crate::time::{parse_datetime_text, DeclaredOffset};

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const COMMENT: u8 = b'#';

/// Extractor for delimited text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularExtractor;

impl Extractor for TabularExtractor {
    fn path(&self) -> ExtractionPath {
        ExtractionPath::Tabular
    }

    fn extract(&self, file: &Path, ctx: &ExtractContext) -> Result<FileExtraction, FileIssue> {
        let bytes = read_non_empty(file)?;
        let decoded = decode(&bytes, &ctx.fallback_encodings)?;
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut extraction = extract_text(&decoded.text, &stem, ctx)?;
        extraction.encoding = Some(decoded.encoding);
        Ok(extraction)
    }
}

/// Pick the delimiter occurring most often outside quotes in the header line.
/// Ties go to the earlier candidate; no candidate at all means a comma.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut in_quotes = false;
    for byte in header_line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = DELIMITERS.iter().position(|d| *d == byte) {
                counts[i] += 1;
            }
        }
    }
    let (best, count) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |acc, (i, c)| if *c > acc.1 { (i, *c) } else { acc });
    if count == 0 {
        b','
    } else {
        DELIMITERS[best]
    }
}

/// First line that is neither blank nor a comment.
pub(crate) fn header_line(text: &str) -> Option<&str> {
    text.lines()
        .map(|l| l.trim_start_matches('\u{feff}'))
        .find(|l| !l.trim().is_empty() && !l.starts_with(COMMENT as char))
}

/// Split a header line the way the extractor would.
pub(crate) fn split_header(line: &str) -> Vec<String> {
    let delimiter = sniff_delimiter(line);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    reader
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|r| r.iter().map(String::from).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeColumns {
    Single(usize),
    /// A calendar date column plus a time-of-day column.
    DateAndTime {
        date: usize,
        time: usize,
    },
    Compound {
        year: usize,
        month: usize,
        day: usize,
        hour: Option<usize>,
    },
}

/// Resolved column layout of a tabular file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Columns {
    time: TimeColumns,
    value: usize,
    parameter: Option<usize>,
    unit: Option<usize>,
    flag: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    depth: Option<usize>,
    /// Unit from a `value (unit)` header.
    value_unit: Option<String>,
    /// Offset declared in the time header, e.g. `time (days since 1900-01-01)`.
    declared: Option<DeclaredOffset>,
}

impl Columns {
    pub(crate) fn resolve(headers: &[String]) -> Result<Self, FileIssue> {
        let time = find_date_and_time(headers)
            .map(|(date, time)| TimeColumns::DateAndTime { date, time })
            .or_else(|| find_column(headers, Field::Time).map(TimeColumns::Single))
            .or_else(|| {
                Some(TimeColumns::Compound {
                    year: find_column(headers, Field::Year)?,
                    month: find_column(headers, Field::Month)?,
                    day: find_column(headers, Field::Day)?,
                    hour: find_column(headers, Field::Hour),
                })
            });
        let value = find_column(headers, Field::Value);

        let (time, value) = match (time, value) {
            (Some(t), Some(v)) => (t, v),
            (t, v) => {
                let mut missing = Vec::new();
                if t.is_none() {
                    missing.push(Field::Time.name().to_string());
                }
                if v.is_none() {
                    missing.push(Field::Value.name().to_string());
                }
                return Err(FileIssue::MissingRequiredColumns(missing));
            }
        };

        let declared = match time {
            TimeColumns::Single(i) | TimeColumns::DateAndTime { time: i, .. } => {
                DeclaredOffset::parse(&headers[i])
            }
            TimeColumns::Compound { .. } => None,
        };

        Ok(Self {
            time,
            value,
            parameter: find_column(headers, Field::Parameter),
            unit: find_column(headers, Field::Unit),
            flag: find_column(headers, Field::Flag)
                .or_else(|| find_quality_column(headers, &headers[value])),
            latitude: find_column(headers, Field::Latitude),
            longitude: find_column(headers, Field::Longitude),
            depth: find_column(headers, Field::Depth),
            value_unit: header_unit(&headers[value]),
            declared,
        })
    }
}

/// Extract observations from decoded text. `default_name` is the raw
/// parameter name used when neither a parameter column nor a dataset
/// default is available (the file stem).
pub(crate) fn extract_text(
    text: &str,
    default_name: &str,
    ctx: &ExtractContext,
) -> Result<FileExtraction, FileIssue> {
    let first_line = header_line(text).ok_or(FileIssue::EmptyFile)?;
    let delimiter = sniff_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(COMMENT))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FileIssue::Unreadable(e.to_string()))?
        .iter()
        .map(String::from)
        .collect();
    let columns = Columns::resolve(&headers)?;

    let decimal_comma = delimiter != b',';
    let default_parameter = ctx
        .default_parameter
        .clone()
        .unwrap_or_else(|| default_name.to_string());

    let mut extraction = FileExtraction::default();
    for (line, record) in reader.records().enumerate() {
        if extraction.at_limit(ctx.row_limit) {
            extraction.truncated = true;
            break;
        }

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                extraction.rows_read += 1;
                extraction.row_errors += 1;
                debug!(line = line + 2, error = %e, "Unparseable row");
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }
        extraction.rows_read += 1;

        if record.len() != headers.len() {
            extraction.row_errors += 1;
            debug!(
                line = line + 2,
                expected = headers.len(),
                found = record.len(),
                "Row has wrong number of fields"
            );
            continue;
        }

        let cell = |i: usize| record.get(i).unwrap_or("");
        let text_cell = |i: usize| RawValue::Text(cell(i).to_string());

        let timestamp = match columns.time {
            TimeColumns::Single(i) => {
                ctx.time
                    .normalize(&headers[i], &text_cell(i), columns.declared.as_ref())
            }
            TimeColumns::DateAndTime { date, time } => {
                let (d, t) = (cell(date), cell(time));
                if t.is_empty() {
                    ctx.time.normalize(&headers[date], &text_cell(date), None)
                } else if let Some(ts) = parse_datetime_text(&format!("{} {}", d, t)) {
                    Ok(ts)
                } else {
                    // The time column may carry a full timestamp of its own.
                    ctx.time
                        .normalize(&headers[time], &text_cell(time), columns.declared.as_ref())
                }
            }
            TimeColumns::Compound {
                year,
                month,
                day,
                hour,
            } => ctx.time.normalize_compound(
                &text_cell(year),
                &text_cell(month),
                &text_cell(day),
                hour.map(text_cell).as_ref(),
            ),
        };
        let timestamp = match timestamp {
            Ok(ts) => ts,
            Err(issue) => {
                extraction.time_rejections += 1;
                debug!(line = line + 2, %issue, "Rejected row time");
                continue;
            }
        };

        let raw_value = cell(columns.value);
        if raw_value.is_empty() {
            extraction.missing_values += 1;
            continue;
        }
        let value = match parse_number(raw_value, decimal_comma) {
            Some(n) => RawValue::Number(n),
            None => RawValue::Text(raw_value.to_string()),
        };

        let raw_parameter = columns
            .parameter
            .map(cell)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .unwrap_or_else(|| default_parameter.clone());
        let declared_unit = columns
            .unit
            .map(cell)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .or_else(|| columns.value_unit.clone());
        let quality_flag = columns.flag.and_then(|i| QualityFlag::parse(cell(i)));

        let coord = |i: Option<usize>| i.and_then(|i| parse_number(cell(i), decimal_comma));
        let location = LocationRef {
            latitude: coord(columns.latitude),
            longitude: coord(columns.longitude),
            depth: coord(columns.depth),
        };

        extraction.observations.push(Observation {
            raw_parameter,
            declared_unit,
            timestamp,
            value,
            quality_flag,
            location: (!location.is_empty()).then_some(location),
        });
    }

    if extraction.rows_read == 0 {
        return Err(FileIssue::EmptyFile);
    }
    Ok(extraction)
}

/// Parse a numeric cell, accepting a decimal comma when the delimiter
/// is not a comma.
fn parse_number(cell: &str, decimal_comma: bool) -> Option<f64> {
    let cell = cell.trim();
    if let Ok(n) = cell.parse::<f64>() {
        return Some(n);
    }
    if decimal_comma && cell.matches(',').count() == 1 && !cell.contains('.') {
        return cell.replace(',', ".").parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::time::TimeNormalizer;
    use chrono::{TimeZone, Utc};

    fn ctx() -> ExtractContext {
        ExtractContext::new(TimeNormalizer::from_config(&IngestConfig::default()).unwrap())
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("date,value"), b',');
        assert_eq!(sniff_delimiter("date;value;flag"), b';');
        assert_eq!(sniff_delimiter("date\tvalue"), b'\t');
        assert_eq!(sniff_delimiter("date|value"), b'|');
        assert_eq!(sniff_delimiter("\"a;b\",c"), b',');
        assert_eq!(sniff_delimiter("value"), b',');
    }

    #[test]
    fn test_date_value_uses_default_name() {
        let text = "date,value\n2021-03-19,12.5\n2021-03-20,13.0\n";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(ex.rows_read, 2);
        assert_eq!(ex.observations.len(), 2);
        let first = &ex.observations[0];
        assert_eq!(first.raw_parameter, "TEMP");
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2021, 3, 19, 0, 0, 0).unwrap());
        assert_eq!(first.value, RawValue::Number(12.5));
        assert_eq!(first.quality_flag, None);
        assert_eq!(first.location, None);
    }

    #[test]
    fn test_dataset_default_parameter_beats_file_stem() {
        let mut ctx = ctx();
        ctx.default_parameter = Some("PSAL".into());
        let ex = extract_text("date,value\n2021-03-19,35.1\n", "station_1", &ctx).unwrap();
        assert_eq!(ex.observations[0].raw_parameter, "PSAL");
    }

    #[test]
    fn test_long_format_with_units_and_flags() {
        let text = "\
timestamp;parameter;value;unit;qc
2021-03-19T00:00:00Z;Temperature;12,5;degC;good
2021-03-19T00:00:00Z;Salinity;35,1;PSU;4
2021-03-19T00:00:00Z;Oxygen;n/a;ml/l;
";
        let ex = extract_text(text, "file", &ctx()).unwrap();
        assert_eq!(ex.observations.len(), 3);

        let temp = &ex.observations[0];
        assert_eq!(temp.raw_parameter, "Temperature");
        assert_eq!(temp.value, RawValue::Number(12.5));
        assert_eq!(temp.declared_unit.as_deref(), Some("degC"));
        assert_eq!(temp.quality_flag, Some(QualityFlag::GOOD));

        assert_eq!(ex.observations[1].quality_flag, Some(QualityFlag::BAD));
        // Non-numeric values pass through for the loader to reject.
        assert_eq!(ex.observations[2].value, RawValue::Text("n/a".into()));
        assert_eq!(ex.observations[2].quality_flag, None);
    }

    #[test]
    fn test_header_unit_and_quality_suffix() {
        let text = "time,value (mg/l),value_qc\n2021-03-19,1.5,1\n2021-03-20,2.5,3\n";
        let ex = extract_text(text, "NO3", &ctx()).unwrap();
        assert_eq!(ex.observations[0].declared_unit.as_deref(), Some("mg/l"));
        assert_eq!(ex.observations[0].quality_flag, Some(QualityFlag::GOOD));
        assert_eq!(ex.observations[1].quality_flag, Some(QualityFlag::PROBABLY_BAD));
    }

    #[test]
    fn test_missing_required_columns() {
        let err = extract_text("date,reading_comment\n2021-03-19,ok\n", "x", &ctx()).unwrap_err();
        assert_eq!(err, FileIssue::MissingRequiredColumns(vec!["value".into()]));

        let err = extract_text("station,depth\nA,10\n", "x", &ctx()).unwrap_err();
        assert_eq!(
            err,
            FileIssue::MissingRequiredColumns(vec!["time".into(), "value".into()])
        );
    }

    #[test]
    fn test_row_level_problems_are_counted() {
        let text = "\
date,value
2021-03-19,1.0
not a date,2.0
2021-03-21
2021-03-22,
2021-03-23,5.0
";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(ex.rows_read, 5);
        assert_eq!(ex.time_rejections, 1);
        assert_eq!(ex.row_errors, 1);
        assert_eq!(ex.missing_values, 1);
        assert_eq!(ex.observations.len(), 2);
    }

    #[test]
    fn test_compound_time_and_location() {
        let text = "\
year,month,day,hour,lat,lon,depth,value
2021,3,19,6,54.5,7.25,10,8.1
2021,3,19,,54.5,7.25,20,7.9
";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(ex.observations.len(), 2);
        assert_eq!(
            ex.observations[0].timestamp,
            Utc.with_ymd_and_hms(2021, 3, 19, 6, 0, 0).unwrap()
        );
        assert_eq!(
            ex.observations[1].timestamp,
            Utc.with_ymd_and_hms(2021, 3, 19, 0, 0, 0).unwrap()
        );
        let loc = ex.observations[1].location.clone().unwrap();
        assert_eq!(loc.latitude, Some(54.5));
        assert_eq!(loc.longitude, Some(7.25));
        assert_eq!(loc.depth, Some(20.0));
    }

    #[test]
    fn test_split_date_and_time_columns() {
        let text = "\
date,time,value
2021-03-19,12:30:00,1.0
2021-03-19,13:30,2.0
2021-03-20,,3.0
2021-03-20,2021-03-20T06:00:00Z,4.0
2021-03-21,noon,5.0
";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(ex.rows_read, 5);
        assert_eq!(ex.time_rejections, 1);
        let times: Vec<_> = ex.observations.iter().map(|o| o.timestamp).collect();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2021, 3, 19, 12, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 19, 13, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 20, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 20, 6, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_time_then_date_column_order() {
        let text = "Time;Sample Date;Value
08:15:00;2021-03-19;1,5
";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(
            ex.observations[0].timestamp,
            Utc.with_ymd_and_hms(2021, 3, 19, 8, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_declared_offset_in_header() {
        let text = "time (days since 1900-01-01),value\n44250,3.2\n";
        let ex = extract_text(text, "TEMP", &ctx()).unwrap();
        assert_eq!(
            ex.observations[0].timestamp,
            Utc.with_ymd_and_hms(2021, 2, 25, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_comments_and_row_limit() {
        let mut ctx = ctx();
        ctx.row_limit = Some(2);
        let text = "# exported by logger\ndate,value\n2021-03-19,1\n2021-03-20,2\n2021-03-21,3\n";
        let ex = extract_text(text, "TEMP", &ctx).unwrap();
        assert_eq!(ex.observations.len(), 2);
        assert!(ex.truncated);
    }

    #[test]
    fn test_header_only_is_empty() {
        assert_eq!(
            extract_text("date,value\n", "TEMP", &ctx()).unwrap_err(),
            FileIssue::EmptyFile
        );
        assert_eq!(extract_text("", "TEMP", &ctx()).unwrap_err(), FileIssue::EmptyFile);
    }

    #[test]
    fn test_extract_file_with_fallback_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Temp\u{e9}rature.csv");
        std::fs::write(&path, b"date;value;remarque\n2021-03-19;12,5;d\xE9rive\n").unwrap();

        let mut ctx = ctx();
        assert!(matches!(
            TabularExtractor.extract(&path, &ctx),
            Err(FileIssue::EncodingError(_))
        ));

        ctx.fallback_encodings = vec![encoding_rs::WINDOWS_1252];
        let ex = TabularExtractor.extract(&path, &ctx).unwrap();
        assert_eq!(ex.encoding, Some("windows-1252"));
        assert_eq!(ex.observations[0].raw_parameter, "Température");
        assert_eq!(ex.observations[0].value, RawValue::Number(12.5));
    }

    #[test]
    fn test_resolve_columns_is_reusable() {
        let headers: Vec<String> = ["Date", "Result", "Lat", "Lon"].iter().map(|s| s.to_string()).collect();
        let columns = Columns::resolve(&headers).unwrap();
        assert_eq!(columns.value, 1);
        assert_eq!(columns.latitude, Some(2));
        assert_eq!(split_header("a;b;c"), vec!["a", "b", "c"]);
        assert_eq!(header_line("\n# note\nx,y\n"), Some("x,y"));
    }
}
