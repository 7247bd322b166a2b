//! Persisted entities: users, generated test sets, and submissions.
//!
//! Each entity has a fixed field set. Older store documents wrote ids as
//! numbers and timestamps without an offset, so deserialization accepts both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::types::{normalize_id, parse_parity};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            created_at: now,
            updated_at: now,
            organization: String::new(),
            name: String::new(),
            email: email.into(),
        }
    }
}

/// A sampled test set handed to a participant, with our reference yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generate {
    pub id: String,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub download_url: String,
    /// Aligned with `test_obj_ids`; empty when the dataset had no parity column.
    #[serde(default, deserialize_with = "lenient_parities")]
    pub parity: Vec<Option<i64>>,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub test_obj_ids: Vec<String>,
    #[serde(default)]
    pub calculated_milk_yields: Vec<f64>,
}

impl Generate {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            created_at: now,
            updated_at: now,
            user_id: user_id.into(),
            download_url: String::new(),
            parity: Vec::new(),
            test_obj_ids: Vec::new(),
            calculated_milk_yields: Vec::new(),
        }
    }

    /// Parity for the i-th test id, if the set carries parities.
    pub fn parity_at(&self, i: usize) -> Option<i64> {
        self.parity.get(i).copied().flatten()
    }
}

/// A participant's calculated yields for one generated test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub generate_id: String,
    #[serde(default)]
    pub calculation_method: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub test_obj_ids: Vec<String>,
    #[serde(default)]
    pub calculated_milk_yields: Vec<f64>,
}

impl Submission {
    pub fn new(generate_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            created_at: now,
            updated_at: now,
            generate_id: generate_id.into(),
            calculation_method: String::new(),
            organization: String::new(),
            country: String::new(),
            notes: String::new(),
            download_url: String::new(),
            test_obj_ids: Vec::new(),
            calculated_milk_yields: Vec::new(),
        }
    }

    /// `(id, yield)` pairs in upload order.
    pub fn yields(&self) -> Vec<(String, f64)> {
        self.test_obj_ids
            .iter()
            .cloned()
            .zip(self.calculated_milk_yields.iter().copied())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|v| match v {
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => normalize_id(&format!("{f:?}")),
            Scalar::Text(s) => normalize_id(&s),
        })
        .collect())
}

fn lenient_parities<'de, D>(deserializer: D) -> Result<Vec<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Option<Scalar>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|v| match v {
            Some(Scalar::Int(i)) => Some(i),
            Some(Scalar::Float(f)) if f.is_finite() => Some(f.trunc() as i64),
            Some(Scalar::Text(s)) => parse_parity(&s),
            _ => None,
        })
        .collect())
}

pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    /// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|t| t.and_utc())
            })
    }
}
