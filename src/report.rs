//! The read-only data snapshot templates and expressions are rendered
//! against.
//!
//! Only the parts the evaluator reads are typed; everything else the host
//! sends along is kept as JSON so templates can still reach it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    #[serde(default)]
    pub series: IndexMap<String, TimeSeries>,
    #[serde(default)]
    pub variables: IndexMap<String, VariableData>,
    #[serde(rename = "userData", default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Json>,
    /// Top-level fields besides the ones above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl ReportData {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// The object handed to the template engine.
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default, skip_serializing_if = "SeriesStats::is_empty")]
    pub stats: SeriesStats,
    /// Alias, label, datapoints and whatever else the host attaches.
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

impl TimeSeries {
    pub fn with_stats(stats: SeriesStats) -> Self {
        TimeSeries {
            stats,
            fields: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
}

impl SeriesStats {
    pub const NAMES: [&'static str; 6] = ["max", "min", "avg", "val", "first", "current"];

    pub fn get(&self, stat: &str) -> Option<f64> {
        match stat {
            "max" => self.max,
            "min" => self.min,
            "avg" => self.avg,
            "val" => self.val,
            "first" => self.first,
            "current" => self.current,
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        Self::NAMES.iter().all(|name| self.get(name).is_none())
    }
}

/// A dashboard template variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VariableData {
    pub name: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub query: Option<String>,
    pub options: Vec<VariableOption>,
    pub current: Option<VariableOption>,
    pub selected_values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableOption {
    pub text: String,
    pub value: String,
    pub selected: bool,
}
