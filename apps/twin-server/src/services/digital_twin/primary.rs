use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::telemetry::{round_to, Estimate, Measurements};

pub const DEFAULT_PRIMARY_SOURCE: &str = "primary_engine";
const DEFAULT_PRIMARY_HEALTH_ESTIMATE: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("primary estimator did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("primary estimator transport error: {0}")]
    Transport(String),
    #[error("primary estimator returned HTTP {0}")]
    Status(u16),
    #[error("primary estimator response could not be decoded: {0}")]
    Decode(String),
    #[error("primary estimator rejected the input: {0}")]
    Rejected(String),
}

/// Output mapping of a high-fidelity estimator. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryEstimate {
    #[serde(default)]
    pub dte_km: Option<f64>,
    #[serde(default)]
    pub soh_refined: Option<f64>,
    #[serde(default)]
    pub health_estimate: Option<String>,
    #[serde(default)]
    pub remaining_energy_wh: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl PrimaryEstimate {
    /// Adopts the primary outputs verbatim apart from rounding.
    pub fn into_estimate(self, input_soh_percent: f64) -> Estimate {
        Estimate {
            remaining_energy_kwh: round_to(self.remaining_energy_wh.unwrap_or(0.0) / 1000.0, 2),
            dte_km: round_to(self.dte_km.unwrap_or(0.0), 1),
            soh_refined: round_to(self.soh_refined.unwrap_or(input_soh_percent), 1),
            health_estimate: self
                .health_estimate
                .unwrap_or_else(|| DEFAULT_PRIMARY_HEALTH_ESTIMATE.to_string()),
            estimation_source: self
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PRIMARY_SOURCE.to_string()),
        }
    }
}

/// A richer estimator that may fail on any call. Failures are call-scoped.
pub trait PrimaryEstimator: Send + Sync {
    fn name(&self) -> &str;

    fn estimate<'a>(
        &'a self,
        measurements: &'a Measurements,
    ) -> BoxFuture<'a, Result<PrimaryEstimate, EstimatorError>>;
}

/// Talks to an external twin engine over HTTP: the measurements are POSTed as JSON
/// and a [`PrimaryEstimate`] is expected back.
#[derive(Debug, Clone)]
pub struct HttpPrimaryEstimator {
    client: reqwest::Client,
    url: String,
}

impl HttpPrimaryEstimator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Any HTTP answer at all counts as reachable.
    pub async fn probe(&self) -> Result<(), EstimatorError> {
        self.client
            .get(&self.url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(())
    }
}

impl PrimaryEstimator for HttpPrimaryEstimator {
    fn name(&self) -> &str {
        "http"
    }

    fn estimate<'a>(
        &'a self,
        measurements: &'a Measurements,
    ) -> BoxFuture<'a, Result<PrimaryEstimate, EstimatorError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(measurements)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(EstimatorError::Status(status.as_u16()));
            }
            response
                .json::<PrimaryEstimate>()
                .await
                .map_err(|err| EstimatorError::Decode(err.to_string()))
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> EstimatorError {
    if err.is_decode() {
        EstimatorError::Decode(err.to_string())
    } else {
        EstimatorError::Transport(err.to_string())
    }
}
