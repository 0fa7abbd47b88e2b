//! Feature preparation
//!
//! Turns a merged table into a numeric feature matrix and a 0/1 label
//! vector. Derived columns are computed before label filtering, and the
//! blanket null fill runs only after rows without a label are gone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info, instrument};

use crate::errors::{PipelineError, Result};
use crate::features::{
    default_feature_columns, AUTHOR, CREATED_AT, DAYS_SINCE_SUBSCRIBED, DERIVED_COLUMNS,
    HAS_AUTHOR, IS_FEED, IS_NEWSLETTER, IS_SUBSCRIPTION, REQUIRED_COLUMNS, SUBSCRIPTION,
    SUBSCRIPTION_START_DATE, SUBSCRIPTION_TYPE, USER_CLICKED,
};
use crate::table::{Table, Value};

const FEED_TYPE: &str = "RSS";
const NEWSLETTER_TYPE: &str = "NEWSLETTER";

/// Timestamp layouts with an explicit offset
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Timestamp layouts without an offset, read as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Ordered numeric feature rows
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

/// 0/1 training labels, aligned with [`FeatureMatrix`] rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVector {
    pub name: String,
    pub values: Vec<u8>,
}

impl LabelVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.values.iter().filter(|&&v| v == 1).count()
    }
}

/// Parse a timestamp cell. Text holding RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`
/// (with or without offset) or a bare date is accepted.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(text, f).ok())
    {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(Utc.from_utc_datetime(&naive));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Whole days from `start` to `created`; negative or missing deltas are 0
pub fn days_since(created: DateTime<Utc>, start: Option<DateTime<Utc>>) -> i64 {
    start
        .map(|start| created.signed_duration_since(start).num_days())
        .filter(|days| *days > 0)
        .unwrap_or(0)
}

/// Non-empty text. Any other cell, including the zero filled into an
/// all-null column, counts as absent.
fn has_text(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn flag(set: bool) -> Value {
    Value::Int(i64::from(set))
}

fn label_of(row: usize, value: &Value) -> Result<u8> {
    match value {
        Value::Bool(b) => Ok(u8::from(*b)),
        Value::Int(v) => Ok(u8::from(*v != 0)),
        Value::Float(v) if !v.is_nan() => Ok(u8::from(*v != 0.0)),
        other => Err(PipelineError::Schema(format!(
            "row {row}: label `{USER_CLICKED}` holds non-boolean value `{other}`"
        ))),
    }
}

/// Derives engineered columns and splits a merged table into (X, Y)
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    feature_columns: Vec<String>,
}

impl Default for FeaturePreparer {
    fn default() -> Self {
        Self::new(default_feature_columns())
    }
}

impl FeaturePreparer {
    pub fn new(feature_columns: Vec<String>) -> Self {
        Self { feature_columns }
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn check_schema(&self, table: &Table) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .chain(
                self.feature_columns
                    .iter()
                    .map(String::as_str)
                    .filter(|c| !DERIVED_COLUMNS.contains(c)),
            )
            .filter(|c| !table.has_column(c))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Schema(format!(
                "missing columns: {}",
                missing.join(", ")
            )))
        }
    }

    /// Add the derived feature columns to `table`
    pub fn derive(&self, table: &mut Table) -> Result<()> {
        let created_at = table
            .column(CREATED_AT)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                parse_timestamp(v).ok_or_else(|| {
                    PipelineError::Parse(format!("row {row}: cannot parse `{CREATED_AT}` value `{v}`"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let started: Vec<Option<DateTime<Utc>>> = table
            .column(SUBSCRIPTION_START_DATE)?
            .into_iter()
            .map(parse_timestamp)
            .collect();

        let is_subscription: Vec<Value> = table
            .column(SUBSCRIPTION)?
            .into_iter()
            .map(|v| flag(has_text(v)))
            .collect();
        let has_author: Vec<Value> = table
            .column(AUTHOR)?
            .into_iter()
            .map(|v| flag(has_text(v)))
            .collect();
        let days: Vec<Value> = created_at
            .iter()
            .zip(&started)
            .map(|(&created, &start)| Value::Int(days_since(created, start)))
            .collect();
        let subscription_type = table.column(SUBSCRIPTION_TYPE)?;
        let is_feed: Vec<Value> = subscription_type
            .iter()
            .map(|v| flag(v.as_str() == Some(FEED_TYPE)))
            .collect();
        let is_newsletter: Vec<Value> = subscription_type
            .iter()
            .map(|v| flag(v.as_str() == Some(NEWSLETTER_TYPE)))
            .collect();

        table.set_column(IS_SUBSCRIPTION, is_subscription)?;
        table.set_column(HAS_AUTHOR, has_author)?;
        table.set_column(DAYS_SINCE_SUBSCRIBED, days)?;
        table.set_column(IS_FEED, is_feed)?;
        table.set_column(IS_NEWSLETTER, is_newsletter)?;
        Ok(())
    }

    /// Split a merged table into a feature matrix and label vector
    #[instrument(skip_all, fields(rows = table.row_count()))]
    pub fn prepare(&self, mut table: Table) -> Result<(FeatureMatrix, LabelVector)> {
        self.check_schema(&table)?;
        self.derive(&mut table)?;

        let label_idx = table.require_column(USER_CLICKED)?;
        let before = table.row_count();
        table.retain_rows(|row| !row[label_idx].is_null());
        let dropped = before - table.row_count();

        let filled = table.fill_nulls(&[]);
        debug!(dropped, filled, "Filtered unlabelled rows and filled nulls");

        let names: Vec<&str> = self.feature_columns.iter().map(String::as_str).collect();
        let selected = table.select(&names)?;
        let rows = selected
            .rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                row.iter()
                    .zip(&selected.columns)
                    .map(|(v, name)| {
                        v.as_f64().ok_or_else(|| {
                            PipelineError::Schema(format!(
                                "row {row_idx}: feature `{name}` holds non-numeric value `{v}`"
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let labels = table
            .rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| label_of(row_idx, &row[label_idx]))
            .collect::<Result<Vec<u8>>>()?;

        let x = FeatureMatrix {
            columns: self.feature_columns.clone(),
            rows,
        };
        let y = LabelVector {
            name: USER_CLICKED.to_string(),
            values: labels,
        };

        info!(
            rows = x.len(),
            features = x.columns.len(),
            dropped_unlabelled = dropped,
            positives = y.positives(),
            "Prepared training data"
        );
        Ok((x, y))
    }
}

/// Prepare with the built-in feature set
pub fn prepare(table: Table) -> Result<(FeatureMatrix, LabelVector)> {
    FeaturePreparer::default().prepare(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged() -> Table {
        Table::from_rows(
            vec![
                "created_at".into(),
                "subscription_start_date".into(),
                "subscription".into(),
                "author".into(),
                "subscription_type".into(),
                "user_clicked".into(),
                "word_count".into(),
            ],
            vec![
                vec![
                    "2024-03-10T12:00:00Z".into(),
                    "2024-03-01 00:00:00".into(),
                    "Daily Digest".into(),
                    "ann".into(),
                    "NEWSLETTER".into(),
                    Value::Bool(true),
                    Value::Int(900),
                ],
                vec![
                    "2024-03-10 08:30:00".into(),
                    "not a date".into(),
                    "".into(),
                    Value::Null,
                    "RSS".into(),
                    Value::Bool(false),
                    Value::Null,
                ],
                vec![
                    "2024-03-01".into(),
                    "2024-03-05".into(),
                    "Some Feed".into(),
                    "".into(),
                    Value::Null,
                    Value::Null,
                    Value::Int(300),
                ],
            ],
        )
        .unwrap()
    }

    fn preparer() -> FeaturePreparer {
        FeaturePreparer::new(
            [
                IS_SUBSCRIPTION,
                HAS_AUTHOR,
                DAYS_SINCE_SUBSCRIBED,
                IS_FEED,
                IS_NEWSLETTER,
                "word_count",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        )
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for text in [
            "2024-03-01T12:00:00Z",
            "2024-03-01T14:00:00+02:00",
            "2024-03-01 12:00:00",
            "2024-03-01 12:00:00.000",
            "2024-03-01T12:00:00",
            "2024-03-01 12:00:00+00:00",
        ] {
            assert_eq!(parse_timestamp(&Value::from(text)), Some(expected), "{text}");
        }
        assert_eq!(
            parse_timestamp(&Value::from("2024-03-01")),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&Value::from("yesterday")), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
        assert_eq!(parse_timestamp(&Value::from("")), None);
    }

    #[test]
    fn test_days_since_clamps() {
        let created = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();

        assert_eq!(days_since(created, Some(earlier)), 8);
        assert_eq!(days_since(created, Some(later)), 0);
        assert_eq!(days_since(created, None), 0);
    }

    #[test]
    fn test_prepare_derives_and_filters() {
        let (x, y) = preparer().prepare(merged()).unwrap();

        assert_eq!(x.len(), 2);
        assert_eq!(y.values, vec![1, 0]);
        assert_eq!(x.column(IS_SUBSCRIPTION).unwrap(), vec![1.0, 0.0]);
        assert_eq!(x.column(HAS_AUTHOR).unwrap(), vec![1.0, 0.0]);
        assert_eq!(x.column(DAYS_SINCE_SUBSCRIBED).unwrap(), vec![9.0, 0.0]);
        assert_eq!(x.column(IS_FEED).unwrap(), vec![0.0, 1.0]);
        assert_eq!(x.column(IS_NEWSLETTER).unwrap(), vec![1.0, 0.0]);
        assert_eq!(x.column("word_count").unwrap(), vec![900.0, 0.0]);
    }

    #[test]
    fn test_filled_all_null_columns_count_as_absent() {
        let mut table = merged();
        table.set_column(SUBSCRIPTION, vec![Value::Int(0); 3]).unwrap();
        let (x, _) = preparer().prepare(table).unwrap();
        assert_eq!(x.column(IS_SUBSCRIPTION).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_unparseable_created_at_is_parse_error() {
        let mut table = merged();
        table.rows[1][0] = "last tuesday".into();
        assert!(matches!(preparer().prepare(table), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_missing_columns_are_schema_errors() {
        let table = merged().select(&["created_at", "author"]).unwrap();
        let err = preparer().prepare(table).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
        assert!(err.to_string().contains("subscription_start_date"));

        let err = FeaturePreparer::new(vec!["user_author_save_count".into()])
            .prepare(merged())
            .unwrap_err();
        assert!(err.to_string().contains("user_author_save_count"));
    }

    #[test]
    fn test_text_feature_is_schema_error() {
        let err = FeaturePreparer::new(vec!["author".into()])
            .prepare(merged())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
