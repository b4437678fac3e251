use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use url::Url;

use crate::client::CelebrationClient;
use crate::error::ClientError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(14 * 60);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingStats {
    pub pings: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
}

impl PingStats {
    pub fn success_rate(&self) -> f64 {
        if self.pings == 0 {
            return 0.0;
        }
        self.successes as f64 / self.pings as f64 * 100.0
    }
}

/// Body POSTed to the alert webhook once the failure threshold is reached.
#[derive(Debug, Clone, Serialize)]
pub struct CriticalAlert {
    pub level: &'static str,
    pub message: String,
    pub timestamp: String,
    pub backend_url: String,
    pub failure_count: u32,
    pub last_health: Option<String>,
}

/// Periodically probes the health endpoint so a sleeping backend stays warm.
///
/// A failed ping is recorded and the monitor waits for the next tick; it never
/// retries on its own.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    interval: Duration,
    failure_threshold: u32,
    ping_timeout: Duration,
    webhook_url: Option<Url>,
    last_health: Option<String>,
    stats: PingStats,
}

impl KeepAlive {
    pub fn new(interval: Duration, failure_threshold: u32) -> Self {
        Self {
            interval,
            failure_threshold: failure_threshold.max(1),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            webhook_url: None,
            last_health: None,
            stats: PingStats::default(),
        }
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn with_webhook(mut self, webhook_url: Option<Url>) -> Self {
        self.webhook_url = webhook_url;
        self
    }

    pub fn stats(&self) -> PingStats {
        self.stats
    }

    pub async fn ping(&mut self, client: &CelebrationClient) -> bool {
        self.stats.pings += 1;

        let result = match tokio::time::timeout(self.ping_timeout, client.health()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                after: self.ping_timeout,
            }),
        };

        match result {
            Ok(health) => {
                self.stats.successes += 1;
                if self.stats.consecutive_failures > 0 {
                    info!(
                        after = self.stats.consecutive_failures,
                        "backend recovered"
                    );
                }
                self.stats.consecutive_failures = 0;
                info!(status = %health.status, "keep-alive ping succeeded");
                self.last_health = Some(health.status);
                true
            }
            Err(e) => {
                self.stats.failures += 1;
                self.stats.consecutive_failures += 1;
                warn!(
                    error = %e,
                    consecutive = self.stats.consecutive_failures,
                    "keep-alive ping failed"
                );
                if self.stats.consecutive_failures == self.failure_threshold {
                    self.raise_alert(client).await;
                }
                false
            }
        }
    }

    async fn raise_alert(&self, client: &CelebrationClient) {
        let message = format!(
            "CRITICAL: Backend has failed {} consecutive ping attempts",
            self.stats.consecutive_failures
        );
        error!(
            threshold = self.failure_threshold,
            base_url = %client.base_url(),
            "{message}"
        );

        let Some(webhook) = &self.webhook_url else {
            return;
        };

        let alert = CriticalAlert {
            level: "critical",
            message,
            timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            backend_url: client.base_url().to_string(),
            failure_count: self.stats.consecutive_failures,
            last_health: self.last_health.clone(),
        };

        match client.send_alert(webhook, &alert, WEBHOOK_TIMEOUT).await {
            Ok(()) => info!(%webhook, "sent critical alert to webhook"),
            Err(e) => error!(%webhook, error = %e, "failed to send webhook alert"),
        }
    }

    /// Pings immediately and then on every interval tick, stopping after
    /// `max_pings` when given.
    pub async fn run(&mut self, client: &CelebrationClient, max_pings: Option<u64>) -> PingStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = %humantime::format_duration(self.interval),
            base_url = %client.base_url(),
            "keep-alive started"
        );

        loop {
            if max_pings.is_some_and(|max| self.stats.pings >= max) {
                break;
            }
            ticker.tick().await;
            self.ping(client).await;
        }

        let stats = self.stats();
        info!(
            pings = stats.pings,
            success_rate = stats.success_rate(),
            "keep-alive stopped"
        );
        stats
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_FAILURE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::serve;
    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::json;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use url::Url;

    #[tokio::test]
    async fn counts_successful_pings() {
        let router = Router::new().route(
            "/api/health",
            get(|| async { Json(json!({"status": "healthy", "timestamp": "2024-05-01T12:00:00"})) }),
        );
        let client = CelebrationClient::new(serve(router).await);

        let mut keep_alive = KeepAlive::new(Duration::from_millis(10), 3);
        let stats = keep_alive.run(&client, Some(3)).await;

        assert_eq!(stats.pings, 3);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn tracks_consecutive_failures_and_recovery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new().route(
            "/api/health",
            get({
                let calls = calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        // first two pings fail, the rest succeed
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "sleeping"})))
                        } else {
                            (StatusCode::OK, Json(json!({"status": "healthy"})))
                        }
                    }
                }
            }),
        );
        let client = CelebrationClient::new(serve(router).await);
        let mut keep_alive = KeepAlive::new(Duration::from_millis(10), 2);

        assert!(!keep_alive.ping(&client).await);
        assert!(!keep_alive.ping(&client).await);
        assert_eq!(keep_alive.stats().consecutive_failures, 2);

        assert!(keep_alive.ping(&client).await);
        let stats = keep_alive.stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.successes, 1);
    }

    fn alert_recorder(
        health_status: StatusCode,
    ) -> (Router, Arc<Mutex<Vec<serde_json::Value>>>) {
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/api/health",
                get(move || async move { (health_status, Json(json!({"status": "sleeping"}))) }),
            )
            .route(
                "/hooks/alert",
                post({
                    let alerts = alerts.clone();
                    move |Json(body): Json<serde_json::Value>| {
                        let alerts = alerts.clone();
                        async move {
                            alerts.lock().unwrap().push(body);
                            StatusCode::NO_CONTENT
                        }
                    }
                }),
            );
        (router, alerts)
    }

    #[tokio::test]
    async fn threshold_posts_one_webhook_alert() {
        let (router, alerts) = alert_recorder(StatusCode::SERVICE_UNAVAILABLE);
        let base = serve(router).await;
        let client = CelebrationClient::new(base.clone());

        let mut keep_alive = KeepAlive::new(Duration::from_millis(5), 2)
            .with_webhook(Some(base.join("/hooks/alert").unwrap()));
        let stats = keep_alive.run(&client, Some(4)).await;
        assert_eq!(stats.consecutive_failures, 4);

        let alerts = alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["level"], "critical");
        assert_eq!(alerts[0]["failure_count"], 2);
        assert_eq!(alerts[0]["backend_url"], base.as_str());
        assert!(alerts[0]["message"].as_str().unwrap().contains("2 consecutive"));
    }

    #[tokio::test]
    async fn no_webhook_means_no_alert_request() {
        let (router, alerts) = alert_recorder(StatusCode::SERVICE_UNAVAILABLE);
        let client = CelebrationClient::new(serve(router).await);

        let mut keep_alive = KeepAlive::new(Duration::from_millis(5), 1);
        keep_alive.run(&client, Some(2)).await;

        assert!(alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_ping_fails_after_ping_timeout() {
        let router = Router::new().route(
            "/api/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"status": "healthy"}))
            }),
        );
        // the client's own request timeout is far longer than the ping timeout
        let client = CelebrationClient::new(serve(router).await);
        let mut keep_alive =
            KeepAlive::new(Duration::from_millis(5), 3).with_ping_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert!(!keep_alive.ping(&client).await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(keep_alive.stats().failures, 1);
    }

    #[tokio::test]
    async fn unreachable_backend_counts_as_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CelebrationClient::new(Url::parse(&format!("http://{addr}/api/")).unwrap());
        let mut keep_alive = KeepAlive::new(Duration::from_millis(5), 1);
        let stats = keep_alive.run(&client, Some(2)).await;

        assert_eq!(stats.failures, 2);
        assert_eq!(stats.success_rate(), 0.0);
    }
}
