use crate::telemetry::{round_to, Estimate};

pub const NOMINAL_PACK_VOLTAGE_V: f64 = 48.0;
pub const NOMINAL_CAPACITY_AH: f64 = 100.0;
pub const WH_PER_KM: f64 = 150.0;

pub const FALLBACK_SOURCE: &str = "fallback";
const FALLBACK_HEALTH_ESTIMATE: &str = "Standard";

/// Range and energy from SoC/SoH against a fixed 48 V / 100 Ah pack at 150 Wh/km.
///
/// Pure and total: out-of-range inputs are not rejected, they just produce
/// numbers that stop meaning anything physical.
pub fn estimate(soc_percent: f64, soh_percent: f64) -> Estimate {
    let effective_capacity_ah = NOMINAL_CAPACITY_AH * (soh_percent / 100.0);
    let remaining_energy_wh = NOMINAL_PACK_VOLTAGE_V * effective_capacity_ah * (soc_percent / 100.0);
    let dte_km = distance_for_energy(remaining_energy_wh, WH_PER_KM);

    Estimate {
        remaining_energy_kwh: round_to(remaining_energy_wh / 1000.0, 2),
        dte_km: round_to(dte_km, 1),
        soh_refined: round_to(soh_percent, 1),
        health_estimate: FALLBACK_HEALTH_ESTIMATE.to_string(),
        estimation_source: FALLBACK_SOURCE.to_string(),
    }
}

fn distance_for_energy(energy_wh: f64, wh_per_km: f64) -> f64 {
    if wh_per_km > 0.0 {
        energy_wh / wh_per_km
    } else {
        0.0
    }
}
