// Filters and updates, rendered to SQL over the JSON `body` column
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{StoreError, StoreResult};

/// Predicate selecting documents within one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Id(String),
    IdIn(Vec<String>),
    /// Matches only the given revision; used for compare-and-swap writes.
    Revision(i64),
    Eq {
        field: &'static str,
        value: String,
    },
    /// Unanchored substring match with Unicode case folding.
    ContainsIgnoreCase {
        field: &'static str,
        fragment: String,
    },
    /// The array at `field` shares at least one element with `values`.
    ArrayContainsAny {
        field: &'static str,
        values: Vec<String>,
    },
    And(Vec<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn eq(field: &'static str, value: impl Into<String>) -> Self {
        Self::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn contains_ignore_case(field: &'static str, fragment: impl Into<String>) -> Self {
        Self::ContainsIgnoreCase {
            field,
            fragment: fragment.into(),
        }
    }

    pub fn array_contains_any<I, S>(field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ArrayContainsAny {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            filter => Self::And(vec![filter, other]),
        }
    }

    /// Render as a boolean SQL expression, appending positional parameters
    /// in the order their placeholders appear.
    pub(crate) fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            Self::All => "1".to_string(),
            Self::Id(id) => {
                params.push(SqlValue::Text(id.clone()));
                "id = ?".to_string()
            }
            Self::IdIn(ids) if ids.is_empty() => "0".to_string(),
            Self::IdIn(ids) => {
                params.extend(ids.iter().cloned().map(SqlValue::Text));
                format!("id IN ({})", placeholders(ids.len()))
            }
            Self::Revision(revision) => {
                params.push(SqlValue::Integer(*revision));
                "version = ?".to_string()
            }
            Self::Eq { field, value } => {
                params.push(SqlValue::Text(json_path(field)));
                params.push(SqlValue::Text(value.clone()));
                "json_extract(body, ?) = ?".to_string()
            }
            Self::ContainsIgnoreCase { field, fragment } => {
                params.push(SqlValue::Text(json_path(field)));
                params.push(SqlValue::Text(fragment.clone()));
                "instr(casefold(json_extract(body, ?)), casefold(?)) > 0".to_string()
            }
            Self::ArrayContainsAny { values, .. } if values.is_empty() => "0".to_string(),
            Self::ArrayContainsAny { field, values } => {
                params.push(SqlValue::Text(json_path(field)));
                params.extend(values.iter().cloned().map(SqlValue::Text));
                format!(
                    "EXISTS (SELECT 1 FROM json_each(documents.body, ?) AS el WHERE el.value IN ({}))",
                    placeholders(values.len())
                )
            }
            Self::And(filters) if filters.is_empty() => "1".to_string(),
            Self::And(filters) => filters
                .iter()
                .map(|f| format!("({})", f.to_sql(params)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

/// Single-document modification. Every applied update bumps the revision.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Overwrite the given top-level fields; other fields are kept. A `null`
    /// value removes the field.
    Set(Map<String, Value>),
    Inc { field: &'static str, by: i64 },
    /// Append to the array at `field`, creating it when absent.
    Push { field: &'static str, value: Value },
    /// Remove every element of the array at `field` equal to `value`.
    Pull { field: &'static str, value: String },
}

impl Update {
    pub fn set<T: Serialize>(fields: &T) -> StoreResult<Self> {
        match serde_json::to_value(fields)? {
            Value::Object(map) => Ok(Self::Set(map)),
            _ => Err(StoreError::NotAnObject),
        }
    }

    pub fn set_field<T: Serialize>(field: &str, value: &T) -> StoreResult<Self> {
        let mut map = Map::new();
        map.insert(field.to_string(), serde_json::to_value(value)?);
        Ok(Self::Set(map))
    }

    pub fn inc(field: &'static str, by: i64) -> Self {
        Self::Inc { field, by }
    }

    pub fn push<T: Serialize>(field: &'static str, value: &T) -> StoreResult<Self> {
        Ok(Self::Push {
            field,
            value: serde_json::to_value(value)?,
        })
    }

    pub fn pull(field: &'static str, value: impl Into<String>) -> Self {
        Self::Pull {
            field,
            value: value.into(),
        }
    }

    /// Whether applying this update can change `field`.
    pub(crate) fn touches(&self, field: &str) -> bool {
        match self {
            Self::Set(map) => map.contains_key(field),
            Self::Inc { field: f, .. } | Self::Push { field: f, .. } | Self::Pull { field: f, .. } => {
                *f == field
            }
        }
    }

    /// Render the new value of `body`.
    pub(crate) fn to_sql(&self, params: &mut Vec<SqlValue>) -> StoreResult<String> {
        let sql = match self {
            Self::Set(map) => {
                params.push(SqlValue::Text(serde_json::to_string(map)?));
                "json_patch(body, ?)"
            }
            Self::Inc { field, by } => {
                let path = json_path(field);
                params.push(SqlValue::Text(path.clone()));
                params.push(SqlValue::Text(path));
                params.push(SqlValue::Integer(*by));
                "json_set(body, ?, COALESCE(json_extract(body, ?), 0) + ?)"
            }
            Self::Push { field, value } => {
                let path = json_path(field);
                params.push(SqlValue::Text(path.clone()));
                params.push(SqlValue::Text(path));
                params.push(SqlValue::Text(serde_json::to_string(value)?));
                "json_set(body, ?, json(json_insert(COALESCE(json_extract(body, ?), '[]'), '$[#]', json(?))))"
            }
            Self::Pull { field, value } => {
                let path = json_path(field);
                params.push(SqlValue::Text(path.clone()));
                params.push(SqlValue::Text(path));
                params.push(SqlValue::Text(value.clone()));
                "json_set(body, ?, json((SELECT json_group_array(el.value) FROM json_each(documents.body, ?) AS el WHERE el.value != ?)))"
            }
        };
        Ok(sql.to_string())
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
