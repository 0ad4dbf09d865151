//! Digital-twin estimation: a pluggable primary estimator with a deterministic fallback.
//!
//! The strategy is chosen once when the engine is built. Ingestion never sees an
//! estimation error: a failing, slow or absent primary degrades to [`fallback::estimate`].

pub mod fallback;
pub mod primary;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TwinConfig;
use crate::telemetry::{Estimate, IncomingTelemetry, Measurements, TelemetrySample};

pub use primary::{EstimatorError, HttpPrimaryEstimator, PrimaryEstimate, PrimaryEstimator};

#[derive(Clone)]
pub enum EstimatorStrategy {
    Primary(Arc<dyn PrimaryEstimator>),
    FallbackOnly,
}

impl std::fmt::Debug for EstimatorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary(primary) => f.debug_tuple("Primary").field(&primary.name()).finish(),
            Self::FallbackOnly => f.write_str("FallbackOnly"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EstimationEngine {
    strategy: EstimatorStrategy,
    call_timeout: Duration,
}

impl EstimationEngine {
    pub fn new(strategy: EstimatorStrategy, call_timeout: Duration) -> Self {
        Self {
            strategy,
            call_timeout,
        }
    }

    pub fn fallback_only() -> Self {
        Self::new(EstimatorStrategy::FallbackOnly, Duration::ZERO)
    }

    /// Probes the configured primary estimator once. Whatever the outcome, it is kept
    /// for the lifetime of the engine.
    pub async fn detect(config: &TwinConfig, http: reqwest::Client) -> Self {
        let Some(url) = config.primary_estimator_url.as_deref() else {
            tracing::info!("no primary estimator configured; using fallback digital twin");
            return Self::fallback_only();
        };
        let call_timeout = Duration::from_millis(config.primary_estimator_timeout_ms);
        let estimator = HttpPrimaryEstimator::new(http, url);

        let probe = match tokio::time::timeout(call_timeout, estimator.probe()).await {
            Ok(result) => result,
            Err(_) => Err(EstimatorError::Timeout(call_timeout)),
        };
        match probe {
            Ok(()) => {
                tracing::info!(url = %estimator.url(), "primary estimator reachable");
                Self::new(
                    EstimatorStrategy::Primary(Arc::new(estimator)),
                    call_timeout,
                )
            }
            Err(err) => {
                tracing::warn!(
                    url = %estimator.url(),
                    error = %err,
                    "primary estimator unavailable; using fallback digital twin"
                );
                Self::fallback_only()
            }
        }
    }

    pub fn strategy(&self) -> &EstimatorStrategy {
        &self.strategy
    }

    pub fn uses_primary(&self) -> bool {
        matches!(self.strategy, EstimatorStrategy::Primary(_))
    }

    /// Normalizes a raw record, estimates, and returns the fully enriched sample.
    pub async fn estimate(
        &self,
        record: Map<String, JsonValue>,
        server_timestamp: DateTime<Utc>,
    ) -> TelemetrySample {
        let incoming = IncomingTelemetry::parse(record);
        let estimate = self.estimate_measurements(&incoming.measurements).await;
        TelemetrySample::enrich(incoming, server_timestamp, estimate)
    }

    pub async fn estimate_measurements(&self, measurements: &Measurements) -> Estimate {
        if let EstimatorStrategy::Primary(primary) = &self.strategy {
            let attempt =
                match tokio::time::timeout(self.call_timeout, primary.estimate(measurements)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(EstimatorError::Timeout(self.call_timeout)),
                };
            match attempt {
                Ok(result) => {
                    let estimate = result.into_estimate(measurements.soh_percent);
                    tracing::info!(
                        dte_km = estimate.dte_km,
                        soh_refined = estimate.soh_refined,
                        health = %estimate.health_estimate,
                        source = %estimate.estimation_source,
                        "digital twin primary estimate"
                    );
                    return estimate;
                }
                Err(err) => {
                    tracing::warn!(
                        estimator = primary.name(),
                        error = %err,
                        "primary estimator failed; falling back"
                    );
                }
            }
        }

        let estimate = fallback::estimate(measurements.soc_percent, measurements.soh_percent);
        tracing::debug!(
            dte_km = estimate.dte_km,
            soh_refined = estimate.soh_refined,
            "digital twin fallback estimate"
        );
        estimate
    }
}
