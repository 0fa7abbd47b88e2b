//! Preference-table merging
//!
//! Each named preference table is left-joined onto the interaction table on
//! `user_id` plus one inferred key column. Tables are folded in name order and
//! nulls are zero-filled after every join, so later joins see filled keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::errors::{PipelineError, Result};
use crate::features::{AUTHOR, ORIGINAL_URL_HOST, SITE, SUBSCRIPTION, USER_CLICKED, USER_ID};
use crate::loader::NamedTables;
use crate::table::{JoinValue, Table, Value};

/// Suffixes appended to overlapping non-key columns (left, right)
const SUFFIXES: (&str, &str) = ("_x", "_y");

/// Secondary join key shared by the interaction table and a preference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    Author,
    Site,
    Subscription,
    OriginalUrlHost,
}

impl JoinKey {
    /// Inference order; the first key whose column name occurs in the table
    /// name wins
    pub const PRIORITY: [JoinKey; 4] = [
        JoinKey::Author,
        JoinKey::Site,
        JoinKey::Subscription,
        JoinKey::OriginalUrlHost,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            JoinKey::Author => AUTHOR,
            JoinKey::Site => SITE,
            JoinKey::Subscription => SUBSCRIPTION,
            JoinKey::OriginalUrlHost => ORIGINAL_URL_HOST,
        }
    }

    /// Key named by a substring of the table name
    pub fn infer(table_name: &str) -> Option<JoinKey> {
        Self::PRIORITY
            .into_iter()
            .find(|key| table_name.contains(key.column()))
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Maps preference table names to join keys.
///
/// Explicit entries take precedence over name inference. In strict mode a
/// table with no key is an error instead of being skipped.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    explicit: BTreeMap<String, JoinKey>,
    strict: bool,
}

impl KeyResolver {
    pub fn new(explicit: BTreeMap<String, JoinKey>, strict: bool) -> Self {
        Self { explicit, strict }
    }

    pub fn resolve(&self, table_name: &str) -> Result<Option<JoinKey>> {
        if let Some(key) = self.explicit.get(table_name) {
            return Ok(Some(*key));
        }

        match JoinKey::infer(table_name) {
            Some(key) => Ok(Some(key)),
            None if self.strict => Err(PipelineError::Schema(format!(
                "no join key for preference table `{table_name}`"
            ))),
            None => Ok(None),
        }
    }
}

/// Folds preference tables onto an interaction table
#[derive(Debug, Clone)]
pub struct FeatureMerger {
    resolver: KeyResolver,
}

impl Default for FeatureMerger {
    fn default() -> Self {
        Self::new(KeyResolver::default())
    }
}

impl FeatureMerger {
    pub fn new(resolver: KeyResolver) -> Self {
        Self { resolver }
    }

    /// Left-join every resolvable preference table onto `base`.
    ///
    /// Row count never drops below the base table's; duplicate keys on the
    /// preference side fan out rows. The label column is never null-filled.
    #[instrument(skip_all, fields(base_rows = base.row_count(), tables = preferences.len()))]
    pub fn merge(&self, base: Table, preferences: &NamedTables) -> Result<Table> {
        let merged = preferences
            .iter()
            .try_fold(base, |acc, (name, table)| self.merge_one(acc, name, table))?;

        info!(
            rows = merged.row_count(),
            columns = merged.column_count(),
            "Merged preference tables"
        );
        Ok(merged)
    }

    fn merge_one(&self, acc: Table, name: &str, table: &Table) -> Result<Table> {
        let Some(key) = self.resolver.resolve(name)? else {
            warn!(table = name, "Skipping preference table without a join key");
            return Ok(acc);
        };

        if !table.has_column(key.column()) {
            return Err(PipelineError::Schema(format!(
                "preference table `{}` lacks join column `{}`",
                name,
                key.column()
            )));
        }

        let before = acc.row_count();
        let mut joined = left_join(&acc, table, &[USER_ID, key.column()])?;
        let filled = joined.fill_nulls(&[USER_CLICKED]);

        if joined.row_count() > before {
            debug!(
                table = name,
                key = %key,
                before,
                after = joined.row_count(),
                "Join fanned out rows"
            );
        }
        debug!(table = name, key = %key, filled, "Joined preference table");
        Ok(joined)
    }
}

/// Merge with name inference only and no strict mode
pub fn merge(base: Table, preferences: &NamedTables) -> Result<Table> {
    FeatureMerger::default().merge(base, preferences)
}

fn key_of(row: &[Value], indices: &[usize]) -> Option<Vec<JoinValue>> {
    indices.iter().map(|&i| row[i].join_key()).collect()
}

/// Left equality join on `keys`.
///
/// Left row order is kept; each left row is followed by one output row per
/// matching right row, in right order. Rows with a null key never match.
/// Non-key columns present on both sides get the `_x`/`_y` suffixes.
pub fn left_join(left: &Table, right: &Table, keys: &[&str]) -> Result<Table> {
    let left_keys = keys
        .iter()
        .map(|k| left.require_column(k))
        .collect::<Result<Vec<_>>>()?;
    let right_keys = keys
        .iter()
        .map(|k| right.require_column(k))
        .collect::<Result<Vec<_>>>()?;

    let right_values: Vec<usize> = (0..right.column_count())
        .filter(|i| !right_keys.contains(i))
        .collect();

    let overlaps = |name: &str| !keys.contains(&name) && left.has_column(name) && right.has_column(name);

    let mut columns: Vec<String> = left
        .columns
        .iter()
        .map(|c| {
            if overlaps(c) {
                format!("{}{}", c, SUFFIXES.0)
            } else {
                c.clone()
            }
        })
        .collect();
    columns.extend(right_values.iter().map(|&i| {
        let c = &right.columns[i];
        if overlaps(c) {
            format!("{}{}", c, SUFFIXES.1)
        } else {
            c.clone()
        }
    }));

    let mut index: HashMap<Vec<JoinValue>, Vec<usize>> = HashMap::new();
    for (row_idx, row) in right.rows.iter().enumerate() {
        if let Some(key) = key_of(row, &right_keys) {
            index.entry(key).or_default().push(row_idx);
        }
    }

    let mut rows = Vec::with_capacity(left.row_count());
    for row in &left.rows {
        let matches = key_of(row, &left_keys).and_then(|key| index.get(&key));
        match matches {
            Some(matches) => {
                for &m in matches {
                    let mut out = row.clone();
                    out.extend(right_values.iter().map(|&i| right.rows[m][i].clone()));
                    rows.push(out);
                }
            }
            None => {
                let mut out = row.clone();
                out.extend(std::iter::repeat(Value::Null).take(right_values.len()));
                rows.push(out);
            }
        }
    }

    Ok(Table { columns, rows })
}
