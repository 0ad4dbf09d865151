use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthManager;

/// Periodically drops expired bearer sessions so abandoned logins do not pile up.
pub struct SessionSweeperService {
    auth: Arc<AuthManager>,
    interval: Duration,
}

impl SessionSweeperService {
    pub fn new(auth: Arc<AuthManager>, interval: Duration) -> Self {
        Self { auth, interval }
    }

    pub fn start(self, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = self.auth.prune_expired().await;
                        if pruned > 0 {
                            tracing::debug!(pruned, "expired sessions pruned");
                        }
                    }
                }
            }
        });
    }
}
