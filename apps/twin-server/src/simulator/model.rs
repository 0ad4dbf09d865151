use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

use crate::mode::OperatingMode;
use crate::telemetry::round_to;

const CHARGE_SOC_PER_AMP: f64 = 0.02;
const DRIVE_SOC_PER_AMP: f64 = 0.005;
const SOH_DECREMENT_PER_TICK: f64 = 0.0005;
const SOH_FLOOR: f64 = 70.0;
const EMPTY_VOLTAGE_V: f64 = 42.0;
const VOLTAGE_SPAN_V: f64 = 10.0;

/// Synthetic pack state carried between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryModel {
    pub voltage: f64,
    pub current: f64,
    pub soc: f64,
    pub temperature: f64,
    pub soh: f64,
    pub speed: f64,
    pub distance: f64,
}

impl Default for BatteryModel {
    fn default() -> Self {
        Self {
            voltage: 52.0,
            current: 0.0,
            soc: 20.0,
            temperature: 30.0,
            soh: 100.0,
            speed: 0.0,
            distance: 0.0,
        }
    }
}

impl BatteryModel {
    /// Advances the pack by one tick of `elapsed` wall time.
    pub fn step<R: Rng + ?Sized>(&mut self, mode: OperatingMode, rng: &mut R, elapsed: Duration) {
        match mode {
            OperatingMode::Charging => {
                self.current = -rng.gen_range(10.0..20.0);
                self.soc = (self.soc + self.current.abs() * CHARGE_SOC_PER_AMP).min(100.0);
                self.speed = 0.0;
            }
            OperatingMode::Driving => {
                self.current = rng.gen_range(5.0..25.0);
                self.soc = (self.soc - self.current * DRIVE_SOC_PER_AMP).max(0.0);
                // Demo loop: an empty pack reappears full instead of stalling at zero.
                if self.soc <= 0.0 {
                    self.soc = 100.0;
                }
                self.speed = rng.gen_range(0.0..120.0);
            }
        }

        self.voltage = EMPTY_VOLTAGE_V + (self.soc / 100.0) * VOLTAGE_SPAN_V;
        self.soh = (self.soh - SOH_DECREMENT_PER_TICK).max(SOH_FLOOR);
        self.temperature += rng.gen_range(-0.05..0.2);

        if mode == OperatingMode::Driving {
            self.distance += self.speed * elapsed.as_secs_f64() / 3600.0;
        }
    }

    pub fn payload(
        &self,
        battery_id: &str,
        position: (f64, f64),
        timestamp: DateTime<Utc>,
    ) -> SimPayload {
        SimPayload {
            timestamp,
            battery_id: battery_id.to_string(),
            voltage_v: round_to(self.voltage, 2),
            current_a: round_to(self.current, 2),
            temperature_c: round_to(self.temperature, 2),
            soc_percent: round_to(self.soc, 2),
            soh_percent: round_to(self.soh, 2),
            speed_kmph: round_to(self.speed, 2),
            distance_travelled_km: round_to(self.distance, 2),
            latitude: round_to(position.0, 6),
            longitude: round_to(position.1, 6),
        }
    }
}

/// Wire body posted to the ingestion endpoint each tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimPayload {
    pub timestamp: DateTime<Utc>,
    pub battery_id: String,
    #[serde(rename = "voltage_V")]
    pub voltage_v: f64,
    #[serde(rename = "current_A")]
    pub current_a: f64,
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
    pub soc_percent: f64,
    pub soh_percent: f64,
    pub speed_kmph: f64,
    pub distance_travelled_km: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TICK: Duration = Duration::from_secs(2);

    #[test]
    fn driving_drain_wraps_to_full_instead_of_going_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut model = BatteryModel {
            soc: 0.01,
            ..BatteryModel::default()
        };
        model.step(OperatingMode::Driving, &mut rng, TICK);
        assert_eq!(model.soc, 100.0);
        assert_eq!(model.voltage, 52.0);

        let mut empty = BatteryModel {
            soc: 0.0,
            ..BatteryModel::default()
        };
        empty.step(OperatingMode::Driving, &mut rng, TICK);
        assert_eq!(empty.soc, 100.0);
    }

    #[test]
    fn driving_draws_positive_current_and_accrues_distance() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = BatteryModel::default();
        for _ in 0..50 {
            let before = model.clone();
            model.step(OperatingMode::Driving, &mut rng, TICK);
            assert!((5.0..25.0).contains(&model.current));
            assert!((0.0..120.0).contains(&model.speed));
            assert!(model.soc < before.soc);
            let expected = before.distance + model.speed * 2.0 / 3600.0;
            assert!((model.distance - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn charging_clamps_at_full_and_parks_the_vehicle() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = BatteryModel {
            soc: 99.9,
            speed: 80.0,
            distance: 12.5,
            ..BatteryModel::default()
        };
        model.step(OperatingMode::Charging, &mut rng, TICK);
        assert!(model.current <= -10.0 && model.current > -20.0);
        assert_eq!(model.soc, 100.0);
        assert_eq!(model.speed, 0.0);
        assert_eq!(model.distance, 12.5);
    }

    #[test]
    fn voltage_tracks_soc_linearly() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut model = BatteryModel {
            soc: 40.0,
            ..BatteryModel::default()
        };
        model.step(OperatingMode::Charging, &mut rng, TICK);
        let expected = 42.0 + model.soc / 10.0;
        assert!((model.voltage - expected).abs() < 1e-9);
    }

    #[test]
    fn soh_degrades_and_stops_at_floor() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = BatteryModel::default();
        model.step(OperatingMode::Charging, &mut rng, TICK);
        assert!((model.soh - 99.9995).abs() < 1e-9);

        let mut worn = BatteryModel {
            soh: 70.0002,
            ..BatteryModel::default()
        };
        worn.step(OperatingMode::Driving, &mut rng, TICK);
        worn.step(OperatingMode::Driving, &mut rng, TICK);
        assert_eq!(worn.soh, 70.0);
    }

    #[test]
    fn temperature_drifts_within_band() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut model = BatteryModel::default();
        let before = model.temperature;
        model.step(OperatingMode::Driving, &mut rng, TICK);
        let delta = model.temperature - before;
        assert!((-0.05..0.2).contains(&delta));
    }

    #[test]
    fn payload_rounds_and_uses_wire_names() {
        let model = BatteryModel {
            voltage: 47.123_456,
            current: 12.345_678,
            soc: 51.999,
            ..BatteryModel::default()
        };
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let payload = model.payload("EV48V_SIM_01", (37.774_912_34, -122.419_412_34), ts);
        assert_eq!(payload.voltage_v, 47.12);
        assert_eq!(payload.current_a, 12.35);
        assert_eq!(payload.soc_percent, 52.0);
        assert_eq!(payload.latitude, 37.774912);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["voltage_V"], 47.12);
        assert_eq!(json["battery_id"], "EV48V_SIM_01");
        assert!(json.get("voltage_v").is_none());
    }
}
