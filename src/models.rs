use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlotStatus {
    Available,
    Reserved,
    Sold,
}

impl PlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotStatus::Available => "Available",
            PlotStatus::Reserved => "Reserved",
            PlotStatus::Sold => "Sold",
        }
    }
}

impl fmt::Display for PlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlotStatus {
    type Err = Error;

    /// Exact, case-sensitive match on the stored spelling.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Available" => Ok(PlotStatus::Available),
            "Reserved" => Ok(PlotStatus::Reserved),
            "Sold" => Ok(PlotStatus::Sold),
            other => Err(Error::Validation(format!(
                "status: unknown plot status `{other}`, expected Available, Reserved or Sold"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "utc_or_naive")]
    pub date: DateTime<Utc>,
    pub amount: String,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub status: PaymentStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    pub phone: String,
    pub govt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
}

/// One plot inside a project. `plot_number` is the key within its project
/// and is compared byte-for-byte.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub plot_number: String,
    pub size: String,
    pub price: String,
    pub facing: String,
    pub status: PlotStatus,
    #[serde(default)]
    pub has_garden: bool,
    #[serde(default)]
    pub is_corner: bool,
    #[serde(default)]
    pub is_hot: bool,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotCounters {
    pub available: u32,
    pub sold: u32,
    pub reserved: u32,
}

impl PlotCounters {
    pub fn total(&self) -> u32 {
        self.available + self.sold + self.reserved
    }
}

/// Builder project aggregate. Stored and replaced as a single document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub name: String,
    pub area: String,
    /// Declared capacity. Only creation, detail updates and bulk insert write it.
    pub total_plots: u32,
    pub available_plots: u32,
    pub sold_plots: u32,
    pub reserved_plots: u32,
    pub price_range: String,
    pub layout_approval: String,
    pub completion_date: DateTime<Utc>,
    #[serde(default)]
    pub plots: Vec<Plot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied project fields, used for creation and detail updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub area: String,
    pub total_plots: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_plots: Option<u32>,
    pub price_range: String,
    pub layout_approval: String,
    #[serde(deserialize_with = "utc_or_naive")]
    pub completion_date: DateTime<Utc>,
}

/// Timestamps with an offset are converted to UTC; timestamps without one
/// are taken as UTC already.
fn utc_or_naive<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(at) = raw.parse::<DateTime<Utc>>() {
        return Ok(at);
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp `{raw}`: {e}")))
}

impl Project {
    pub fn new(owner_id: impl Into<String>, details: NewProject, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: details.name,
            area: details.area,
            total_plots: details.total_plots,
            available_plots: details.available_plots.unwrap_or(details.total_plots),
            sold_plots: 0,
            reserved_plots: 0,
            price_range: details.price_range,
            layout_approval: details.layout_approval,
            completion_date: details.completion_date,
            plots: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite descriptive fields and declared figures; plots and the
    /// sold/reserved counters stay as they are.
    pub fn apply_details(&mut self, details: NewProject) {
        self.name = details.name;
        self.area = details.area;
        self.total_plots = details.total_plots;
        self.available_plots = details.available_plots.unwrap_or(details.total_plots);
        self.price_range = details.price_range;
        self.layout_approval = details.layout_approval;
        self.completion_date = details.completion_date;
    }

    pub fn counters(&self) -> PlotCounters {
        PlotCounters {
            available: self.available_plots,
            sold: self.sold_plots,
            reserved: self.reserved_plots,
        }
    }

    pub(crate) fn set_counters(&mut self, counters: PlotCounters) {
        self.available_plots = counters.available;
        self.sold_plots = counters.sold;
        self.reserved_plots = counters.reserved;
    }

    pub fn plot(&self, plot_number: &str) -> Option<&Plot> {
        self.plots.iter().find(|p| p.plot_number == plot_number)
    }
}

/// Filter for listing an owner's projects.
#[derive(Clone, Debug, Default)]
pub struct ProjectFilter {
    /// Exact area match.
    pub area: Option<String>,
    /// Case-insensitive substring of name or area.
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(area) = &self.area {
            if &project.area != area {
                return false;
            }
        }
        match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                project.name.to_lowercase().contains(&needle)
                    || project.area.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Deserialize a payload, reporting failures as validation errors prefixed
/// with `what`.
pub fn parse<T: DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Validation(format!("{what}: {e}")))
}

pub fn parse_str<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Validation(format!("{what}: {e}")))
}

/// Parse a bulk payload item by item so errors carry the batch index.
pub fn parse_plots(value: Value) -> Result<Vec<Plot>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| parse(&format!("plots[{i}]"), item))
            .collect(),
        other => Err(Error::Validation(format!(
            "plots: expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
