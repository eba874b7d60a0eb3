//! Declarative alias table for locating fields in loosely-typed sources.
//!
//! Column headers and variable names are matched against the table after
//! canonicalization: lower-cased, trimmed, a trailing `(unit)` or `[unit]`
//! removed, and spaces/dashes turned into underscores.

/// Canonical fields an extractor looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Time,
    Value,
    Parameter,
    Unit,
    Flag,
    Latitude,
    Longitude,
    Depth,
    Year,
    Month,
    Day,
    Hour,
}

/// Canonical field to acceptable raw names, most specific first.
pub const ALIASES: &[(Field, &[&str])] = &[
    (
        Field::Time,
        &[
            "datetime",
            "date_time",
            "timestamp",
            "time",
            "date",
            "time_utc",
            "date_utc",
            "sample_date",
            "sampling_date",
            "observation_time",
            "obs_time",
            "days",
            "julian_day",
            "jday",
            "decimal_year",
        ],
    ),
    (
        Field::Value,
        &[
            "value",
            "concentration",
            "measurement",
            "result",
            "obs_value",
            "observation",
            "reading",
        ],
    ),
    (
        Field::Parameter,
        &["parameter", "variable", "param", "parameter_name", "determinand", "analyte"],
    ),
    (Field::Unit, &["unit", "units", "uom", "unit_of_measure"]),
    (
        Field::Flag,
        &["flag", "qc", "quality", "quality_flag", "qc_flag", "qf"],
    ),
    (Field::Latitude, &["lat", "latitude", "lat_dd"]),
    (Field::Longitude, &["lon", "long", "longitude", "lng", "lon_dd"]),
    (Field::Depth, &["depth", "pres", "pressure", "depth_m", "z"]),
    (Field::Year, &["year", "yr", "yyyy"]),
    (Field::Month, &["month", "mon", "mm"]),
    (Field::Day, &["day", "dd", "dy"]),
    (Field::Hour, &["hour", "hr", "hh"]),
];

/// Headers holding a calendar date only, when split from the time of day.
pub const DATE_ONLY_ALIASES: &[&str] = &["date", "date_utc", "sample_date", "sampling_date"];

/// Headers holding the time of day next to a separate date column.
pub const TIME_OF_DAY_ALIASES: &[&str] = &["time", "time_utc", "time_of_day", "sample_time", "sampling_time"];

/// Suffixes marking a quality column that belongs to another column.
pub const QUALITY_SUFFIXES: &[&str] = &["_qc", "_q", "_flag", "_quality"];

impl Field {
    pub fn aliases(self) -> &'static [&'static str] {
        ALIASES
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Time => "time",
            Field::Value => "value",
            Field::Parameter => "parameter",
            Field::Unit => "unit",
            Field::Flag => "flag",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::Depth => "depth",
            Field::Year => "year",
            Field::Month => "month",
            Field::Day => "day",
            Field::Hour => "hour",
        }
    }

    /// Whether a raw name matches one of this field's aliases exactly.
    pub fn matches(self, raw: &str) -> bool {
        let canonical = canonical_name(raw);
        self.aliases().iter().any(|alias| *alias == canonical)
    }
}

/// Canonical form of a header or variable name.
pub fn canonical_name(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"');
    let without_unit = match trimmed.find(['(', '[']) {
        Some(idx) if idx > 0 => &trimmed[..idx],
        _ => trimmed,
    };
    without_unit
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Unit embedded in a header as `name (unit)` or `name [unit]`.
pub fn header_unit(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (open, close) = match trimmed.chars().last()? {
        ')' => ('(', ')'),
        ']' => ('[', ']'),
        _ => return None,
    };
    let start = trimmed.rfind(open)?;
    let unit = trimmed[start + 1..trimmed.len() - close.len_utf8()].trim();
    (!unit.is_empty()).then(|| unit.to_string())
}

/// Whether a name is a quality column for some other column.
pub fn is_quality_name(raw: &str) -> bool {
    let canonical = canonical_name(raw);
    Field::Flag.aliases().contains(&canonical.as_str())
        || QUALITY_SUFFIXES.iter().any(|s| canonical.ends_with(s))
}

/// Index of the first header matching `field`.
///
/// Aliases are tried in table order so `time` beats `days` when both are
/// present. Quality columns never match anything but [`Field::Flag`].
pub fn find_column(headers: &[String], field: Field) -> Option<usize> {
    let canonical: Vec<String> = headers.iter().map(|h| canonical_name(h)).collect();
    field.aliases().iter().find_map(|alias| {
        canonical.iter().position(|h| {
            h == alias && (field == Field::Flag || !QUALITY_SUFFIXES.iter().any(|s| h.ends_with(s)))
        })
    })
}

/// A separate date column and time-of-day column, as `(date, time)`.
pub fn find_date_and_time(headers: &[String]) -> Option<(usize, usize)> {
    let canonical: Vec<String> = headers.iter().map(|h| canonical_name(h)).collect();
    let first = |aliases: &[&str]| {
        aliases
            .iter()
            .find_map(|alias| canonical.iter().position(|h| h == alias))
    };
    let date = first(DATE_ONLY_ALIASES)?;
    let time = first(TIME_OF_DAY_ALIASES)?;
    (date != time).then_some((date, time))
}

/// Quality column attached to `column` via a suffix (`value_qc`, `temp_flag`).
pub fn find_quality_column(headers: &[String], column: &str) -> Option<usize> {
    let base = canonical_name(column);
    QUALITY_SUFFIXES.iter().find_map(|suffix| {
        let wanted = format!("{}{}", base, suffix);
        headers.iter().position(|h| canonical_name(h) == wanted)
    })
}

/// Whether a header matches any entry of the table.
pub fn is_known(raw: &str) -> bool {
    let canonical = canonical_name(raw);
    ALIASES.iter().any(|(field, _)| field.matches(raw))
        || TIME_OF_DAY_ALIASES.contains(&canonical.as_str())
        || is_quality_name(raw)
}
