//! Shared API Types for the Intent Router
//!
//! Every type that crosses the boundary between the routing engine and the
//! HTTP layer lives here, so both sides agree on one JSON shape.
//!
//! ## Rules
//!
//! 1. Field names are camelCase on the wire (`queryText`, `tableData`, ...)
//! 2. Optional response members are omitted, never sent as `null`
//! 3. Display rows keep the column order of the rule's display schema

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record as exchanged with the staging dataset (column order preserved).
pub type Record = Map<String, Value>;

// ============================================================================
// REQUEST
// ============================================================================

/// Inbound routing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    /// Free-text question
    pub query_text: String,

    /// Optional scenario tag used to pre-filter rule categories
    #[serde(default)]
    pub scenario_hint: Option<String>,
}

impl RouteRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            scenario_hint: None,
        }
    }

    pub fn with_scenario(mut self, hint: impl Into<String>) -> Self {
        self.scenario_hint = Some(hint.into());
        self
    }
}

// ============================================================================
// DISPLAY ROWS & CARDS
// ============================================================================

/// One display-ready row, keyed by canonical display field name.
///
/// Built by the field mapper; always contains every field of the rule's
/// display schema, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayRow(Map<String, Value>);

impl DisplayRow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field value rendered as text (`""` when absent or null).
    pub fn text(&self, field: &str) -> String {
        match self.0.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for DisplayRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Visual tone of a summary card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardTone {
    Info,
    Success,
    Warning,
    Danger,
}

/// Aggregate statistic shown above a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub value: Value,
    pub tone: CardTone,
}

impl Card {
    pub fn new(title: impl Into<String>, value: impl Into<Value>, tone: CardTone) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            tone,
        }
    }
}

// ============================================================================
// CHARTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

/// Series payload for the chart renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

// ============================================================================
// RESPONSE
// ============================================================================

/// Payload of a successful structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    #[serde(rename_all = "camelCase")]
    Table {
        table_data: Vec<DisplayRow>,
        cards: Vec<Card>,
    },
    #[serde(rename_all = "camelCase")]
    Chart {
        chart_type: ChartType,
        chart_data: ChartData,
    },
}

/// Error classification exposed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NoMatch,
    MissingParameter,
    ExecutionError,
    Canceled,
}

/// Sub-classification of `ErrorKind::ExecutionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionCause {
    Timeout,
    StoreUnavailable,
    MalformedQuery,
}

/// Outbound response - one of table, chart, textual reply or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<ExecutionCause>,
}

impl RouteResponse {
    fn ok() -> Self {
        Self {
            success: true,
            data: None,
            reply: None,
            matched_rule: None,
            error: None,
            message: None,
            cause: None,
        }
    }

    pub fn table(rule: impl Into<String>, rows: Vec<DisplayRow>, cards: Vec<Card>) -> Self {
        Self {
            data: Some(ResponseData::Table {
                table_data: rows,
                cards,
            }),
            matched_rule: Some(rule.into()),
            ..Self::ok()
        }
    }

    pub fn chart(rule: impl Into<String>, chart_type: ChartType, chart_data: ChartData) -> Self {
        Self {
            data: Some(ResponseData::Chart {
                chart_type,
                chart_data,
            }),
            matched_rule: Some(rule.into()),
            ..Self::ok()
        }
    }

    pub fn reply(text: impl Into<String>, rule: Option<String>) -> Self {
        Self {
            reply: Some(text.into()),
            matched_rule: rule,
            ..Self::ok()
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            reply: None,
            matched_rule: None,
            error: Some(kind),
            message: Some(message.into()),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ExecutionCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Table rows, if this is a tabular response.
    pub fn table_data(&self) -> Option<&[DisplayRow]> {
        match &self.data {
            Some(ResponseData::Table { table_data, .. }) => Some(table_data),
            _ => None,
        }
    }

    pub fn cards(&self) -> Option<&[Card]> {
        match &self.data {
            Some(ResponseData::Table { cards, .. }) => Some(cards),
            _ => None,
        }
    }
}

// ============================================================================
// DATASET SYNC
// ============================================================================

/// Bulk replacement payload for the staging dataset. Always a full replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetUpdate {
    #[serde(default)]
    pub inventory: Vec<Record>,
    #[serde(default)]
    pub inspection: Vec<Record>,
    #[serde(default)]
    pub production: Vec<Record>,
}
