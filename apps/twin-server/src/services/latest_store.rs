use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::telemetry::TelemetrySample;

/// Latest processed sample per device. One slot per id, last write wins, no eviction.
///
/// Samples are stored behind `Arc` and replaced wholesale, so a reader always gets a
/// complete sample that some writer finished building.
#[derive(Debug, Default)]
pub struct LatestStateStore {
    entries: RwLock<HashMap<String, Arc<TelemetrySample>>>,
}

impl LatestStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, battery_id: impl Into<String>, sample: TelemetrySample) {
        let sample = Arc::new(sample);
        let mut entries = self.entries.write().await;
        entries.insert(battery_id.into(), sample);
    }

    pub async fn get(&self, battery_id: &str) -> Option<Arc<TelemetrySample>> {
        let entries = self.entries.read().await;
        entries.get(battery_id).cloned()
    }

    /// Samples for the ids that have reported; ids with no data are left out.
    pub async fn get_all<S: AsRef<str>>(&self, ids: &[S]) -> BTreeMap<String, Arc<TelemetrySample>> {
        let entries = self.entries.read().await;
        ids.iter()
            .filter_map(|id| {
                let id = id.as_ref();
                entries
                    .get(id)
                    .map(|sample| (id.to_string(), sample.clone()))
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Estimate, IncomingTelemetry};
    use chrono::Utc;
    use serde_json::{json, Map, Value as JsonValue};

    fn sample(battery_id: &str, soc: f64, extra: JsonValue) -> TelemetrySample {
        let mut record = match extra {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        record.insert("battery_id".to_string(), json!(battery_id));
        record.insert("soc_percent".to_string(), json!(soc));
        TelemetrySample::enrich(
            IncomingTelemetry::parse(record),
            Utc::now(),
            Estimate {
                remaining_energy_kwh: 0.0,
                dte_km: 0.0,
                soh_refined: 100.0,
                health_estimate: "Standard".to_string(),
                estimation_source: "fallback".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn put_overwrites_without_merging() {
        let store = LatestStateStore::new();
        let a = sample("B1", 10.0, json!({"speed_kmph": 42.0}));
        let b = sample("B1", 20.0, json!({}));
        store.put("B1", a).await;
        store.put("B1", b.clone()).await;

        let got = store.get("B1").await.expect("present");
        assert_eq!(*got, b);
        assert!(!got.extra.contains_key("speed_kmph"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn absent_key_reads_as_none() {
        let store = LatestStateStore::new();
        assert!(store.get("nobody").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn get_all_skips_ids_without_data() {
        let store = LatestStateStore::new();
        store.put("B1", sample("B1", 10.0, json!({}))).await;
        store.put("B3", sample("B3", 30.0, json!({}))).await;

        let all = store.get_all(&["B1", "B2", "B3"]).await;
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("B1"));
        assert!(all.contains_key("B3"));
        assert!(!all.contains_key("B2"));

        let none = store.get_all::<&str>(&[]).await;
        assert!(none.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_keep_last_value_per_key() {
        let store = Arc::new(LatestStateStore::new());
        let devices = 32;
        let rounds = 25;

        let mut handles = Vec::new();
        for device in 0..devices {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("B{device}");
                for round in 0..rounds {
                    store
                        .put(id.clone(), sample(&id, round as f64, json!({})))
                        .await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("writer task");
        }

        assert_eq!(store.len().await, devices);
        for device in 0..devices {
            let id = format!("B{device}");
            let got = store.get(&id).await.expect("present");
            assert_eq!(got.battery_id, id);
            assert_eq!(got.measurements.soc_percent, (rounds - 1) as f64);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_observe_complete_samples_during_writes() {
        let store = Arc::new(LatestStateStore::new());
        store.put("B1", sample("B1", 0.0, json!({"round": 0}))).await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 1..200 {
                    store
                        .put("B1", sample("B1", round as f64, json!({"round": round})))
                        .await;
                }
            })
        };
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let got = store.get("B1").await.expect("present");
                    // soc and the pass-through round were written together.
                    assert_eq!(
                        got.extra.get("round").and_then(JsonValue::as_f64),
                        Some(got.measurements.soc_percent)
                    );
                    tokio::task::yield_now().await;
                }
            })
        };
        writer.await.expect("writer");
        reader.await.expect("reader");
    }
}
