//! Synthetic battery device that posts telemetry to the ingestion endpoint on a timer.
//!
//! The operating mode is re-read from the shared [`ModeSignal`] every tick, so an
//! operator (or `POST /api/mode`) can flip it without restarting the generator.

mod model;

pub use model::{BatteryModel, SimPayload};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::mode::{ModeSignal, OperatingMode};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub server_url: String,
    pub battery_id: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub latitude: f64,
    pub longitude: f64,
    pub seed: Option<u64>,
}

pub struct Simulator {
    config: SimulatorConfig,
    model: BatteryModel,
    rng: StdRng,
    http: reqwest::Client,
    mode: ModeSignal,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, mode: ModeSignal) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build simulator http client")?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            model: BatteryModel::default(),
            rng,
            http,
            mode,
        })
    }

    pub fn model(&self) -> &BatteryModel {
        &self.model
    }

    /// Steps the model once and returns the sample to send.
    pub async fn tick(&mut self) -> SimPayload {
        let mode = self.mode.read().await;
        self.model.step(mode, &mut self.rng, self.config.interval);
        self.model.payload(
            &self.config.battery_id,
            (self.config.latitude, self.config.longitude),
            Utc::now(),
        )
    }

    /// Delivery is at most once per tick; failures are logged and the next tick proceeds.
    pub async fn send(&self, payload: &SimPayload) {
        match self
            .http
            .post(&self.config.server_url)
            .json(payload)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    tracing::info!(
                        battery_id = %payload.battery_id,
                        soc = payload.soc_percent,
                        current = payload.current_a,
                        speed = payload.speed_kmph,
                        status = status.as_u16(),
                        "sample sent"
                    );
                } else {
                    tracing::warn!(status = status.as_u16(), "ingestion rejected sample");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, url = %self.config.server_url, "failed to send sample");
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            battery_id = %self.config.battery_id,
            mode = %self.mode.read().await,
            mode_file = %self.mode.path().display(),
            url = %self.config.server_url,
            "device simulator started"
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let payload = self.tick().await;
                    self.send(&payload).await;
                }
            }
        }
        tracing::info!("device simulator stopped");
    }
}

/// Maps a console line to a mode: `c` charges, `d` drives.
pub fn parse_console_command(line: &str) -> Option<OperatingMode> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" => Some(OperatingMode::Charging),
        "d" => Some(OperatingMode::Driving),
        _ => None,
    }
}

/// Reads operator commands from stdin until EOF or cancellation.
pub async fn run_console(mode: ModeSignal, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "console read failed");
                break;
            }
        };
        let Some(next) = parse_console_command(&line) else {
            if !line.trim().is_empty() {
                tracing::info!("unknown command {:?}; use c (charging) or d (driving)", line.trim());
            }
            continue;
        };
        match mode.write(next).await {
            Ok(()) => tracing::info!(mode = %next, "mode switched"),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to switch mode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            // Nothing listens on port 1.
            server_url: "http://127.0.0.1:1/api/battery-data".to_string(),
            battery_id: "EV48V_SIM_01".to_string(),
            interval: Duration::from_secs(2),
            request_timeout: Duration::from_millis(200),
            latitude: 37.7749,
            longitude: -122.4194,
            seed: Some(seed),
        }
    }

    #[test]
    fn console_commands() {
        assert_eq!(parse_console_command("c"), Some(OperatingMode::Charging));
        assert_eq!(parse_console_command(" D \n"), Some(OperatingMode::Driving));
        assert_eq!(parse_console_command("x"), None);
        assert_eq!(parse_console_command(""), None);
    }

    #[tokio::test]
    async fn tick_follows_the_mode_signal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let signal = ModeSignal::new(dir.path().join("mode.txt"));
        let mut sim = Simulator::new(config(1), signal.clone())?;

        let first = sim.tick().await;
        assert!(first.current_a > 0.0);
        assert_eq!(first.battery_id, "EV48V_SIM_01");
        assert_eq!(first.latitude, 37.7749);

        signal.write(OperatingMode::Charging).await?;
        let second = sim.tick().await;
        assert!(second.current_a < 0.0);
        assert_eq!(second.speed_kmph, 0.0);
        assert!(second.soc_percent > first.soc_percent);
        Ok(())
    }

    #[tokio::test]
    async fn seeded_simulators_are_reproducible() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let signal = ModeSignal::new(dir.path().join("mode.txt"));
        let mut a = Simulator::new(config(42), signal.clone())?;
        let mut b = Simulator::new(config(42), signal)?;
        for _ in 0..5 {
            a.tick().await;
            b.tick().await;
        }
        assert_eq!(a.model(), b.model());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_does_not_stop_the_loop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let signal = ModeSignal::new(dir.path().join("mode.txt"));
        let mut sim = Simulator::new(config(2), signal)?;
        let payload = sim.tick().await;
        sim.send(&payload).await;
        let next = sim.tick().await;
        assert!(next.distance_travelled_km >= payload.distance_travelled_km);
        Ok(())
    }
}
