use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const UNKNOWN_BATTERY_ID: &str = "unknown";

pub const FIELD_BATTERY_ID: &str = "battery_id";
pub const FIELD_VOLTAGE_V: &str = "voltage_V";
pub const FIELD_CURRENT_A: &str = "current_A";
pub const FIELD_SOC_PERCENT: &str = "soc_percent";
pub const FIELD_SOH_PERCENT: &str = "soh_percent";
pub const FIELD_TEMPERATURE_C: &str = "temperature_C";
pub const FIELD_SERVER_TIMESTAMP: &str = "server_timestamp";

const DEFAULT_VOLTAGE_V: f64 = 48.0;
const DEFAULT_CURRENT_A: f64 = 0.0;
const DEFAULT_SOC_PERCENT: f64 = 50.0;
const DEFAULT_SOH_PERCENT: f64 = 100.0;
const DEFAULT_TEMPERATURE_C: f64 = 25.0;

// Keys owned by the server; a device cannot smuggle them in through the pass-through map.
const RESERVED_FIELDS: &[&str] = &[
    FIELD_BATTERY_ID,
    FIELD_VOLTAGE_V,
    FIELD_CURRENT_A,
    FIELD_SOC_PERCENT,
    FIELD_SOH_PERCENT,
    FIELD_TEMPERATURE_C,
    FIELD_SERVER_TIMESTAMP,
    "remaining_energy_kwh",
    "dte_km",
    "soh_refined",
    "health_estimate",
    "estimation_source",
];

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// The five raw measurements a device reports each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(rename = "voltage_V")]
    pub voltage_v: f64,
    #[serde(rename = "current_A")]
    pub current_a: f64,
    pub soc_percent: f64,
    pub soh_percent: f64,
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            voltage_v: DEFAULT_VOLTAGE_V,
            current_a: DEFAULT_CURRENT_A,
            soc_percent: DEFAULT_SOC_PERCENT,
            soh_percent: DEFAULT_SOH_PERCENT,
            temperature_c: DEFAULT_TEMPERATURE_C,
        }
    }
}

impl Measurements {
    /// Reads each measurement leniently. A missing or unusable value takes its default
    /// instead of failing the whole record.
    pub fn from_record(record: &Map<String, JsonValue>) -> Self {
        Self {
            voltage_v: numeric_field(record, FIELD_VOLTAGE_V, DEFAULT_VOLTAGE_V),
            current_a: numeric_field(record, FIELD_CURRENT_A, DEFAULT_CURRENT_A),
            soc_percent: numeric_field(record, FIELD_SOC_PERCENT, DEFAULT_SOC_PERCENT),
            soh_percent: numeric_field(record, FIELD_SOH_PERCENT, DEFAULT_SOH_PERCENT),
            temperature_c: numeric_field(record, FIELD_TEMPERATURE_C, DEFAULT_TEMPERATURE_C),
        }
    }
}

fn numeric_field(record: &Map<String, JsonValue>, key: &str, default: f64) -> f64 {
    record.get(key).and_then(coerce_f64).unwrap_or(default)
}

fn coerce_f64(value: &JsonValue) -> Option<f64> {
    let parsed = match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn battery_id_from_record(record: &Map<String, JsonValue>) -> String {
    match record.get(FIELD_BATTERY_ID) {
        Some(JsonValue::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(JsonValue::Number(number)) => number.to_string(),
        _ => UNKNOWN_BATTERY_ID.to_string(),
    }
}

/// A telemetry record after input normalization and before estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingTelemetry {
    pub battery_id: String,
    pub measurements: Measurements,
    pub extra: Map<String, JsonValue>,
}

impl IncomingTelemetry {
    pub fn parse(mut record: Map<String, JsonValue>) -> Self {
        let battery_id = battery_id_from_record(&record);
        let measurements = Measurements::from_record(&record);
        for key in RESERVED_FIELDS {
            record.remove(*key);
        }
        Self {
            battery_id,
            measurements,
            extra: record,
        }
    }
}

/// Derived fields produced by either estimation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub remaining_energy_kwh: f64,
    pub dte_km: f64,
    pub soh_refined: f64,
    pub health_estimate: String,
    pub estimation_source: String,
}

/// The latest processed state of one device. Only constructible with an [`Estimate`],
/// so every stored sample carries all derived fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub battery_id: String,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub server_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub estimate: Estimate,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl TelemetrySample {
    pub fn enrich(
        incoming: IncomingTelemetry,
        server_timestamp: DateTime<Utc>,
        estimate: Estimate,
    ) -> Self {
        Self {
            battery_id: incoming.battery_id,
            measurements: incoming.measurements,
            server_timestamp,
            estimate,
            extra: incoming.extra,
        }
    }
}
