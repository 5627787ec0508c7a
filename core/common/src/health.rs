// core/common/src/health.rs
// Health check system for services

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::{Duration, Instant, SystemTime};

const DATABASE_DEGRADED_MS: u64 = 1000;
const EXTERNAL_API_DEGRADED_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Degraded still serves traffic; only unhealthy dependencies block readiness.
    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub features: Vec<String>,
    pub dependencies: Vec<DependencyHealth>,
}

impl HealthResponse {
    pub fn new(service: &str, version: &str, start_time: SystemTime) -> Self {
        let uptime = SystemTime::now()
            .duration_since(start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();

        Self {
            status: HealthStatus::Healthy,
            service: service.to_string(),
            version: version.to_string(),
            uptime_seconds: uptime,
            features: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn add_dependency(&mut self, dependency: DependencyHealth) {
        self.dependencies.push(dependency);

        // Worst dependency wins
        self.status = if self.dependencies.iter().any(|d| d.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if self.dependencies.iter().any(|d| d.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            latency_ms: None,
            message: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }
}

pub async fn check_database_health(pool: &PgPool) -> DependencyHealth {
    let start = Instant::now();

    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => {
            let latency = start.elapsed().as_millis() as u64;
            let status = if latency > DATABASE_DEGRADED_MS {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };

            DependencyHealth::new("database", status).with_latency(latency)
        }
        Err(e) => DependencyHealth::new("database", HealthStatus::Unhealthy)
            .with_message(format!("Database error: {}", e)),
    }
}

/// Probe a third-party base URL. Any HTTP answer below 500 counts as reachable;
/// payment and SMS APIs answer unauthenticated GETs with 401/404.
pub async fn check_external_api_health(
    client: &reqwest::Client,
    name: &str,
    url: &str,
) -> DependencyHealth {
    let start = Instant::now();

    match client.get(url).timeout(Duration::from_secs(5)).send().await {
        Ok(response) => {
            let latency = start.elapsed().as_millis() as u64;

            let status = if response.status().is_server_error() {
                HealthStatus::Unhealthy
            } else if latency > EXTERNAL_API_DEGRADED_MS {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };

            DependencyHealth::new(name, status)
                .with_latency(latency)
                .with_message(format!("HTTP {}", response.status()))
        }
        Err(e) => DependencyHealth::new(name, HealthStatus::Unhealthy)
            .with_message(format!("API error: {}", e)),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessProbe {
    pub alive: bool,
}

impl LivenessProbe {
    pub fn healthy() -> Self {
        Self { alive: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessProbe {
    pub ready: bool,
    pub dependencies: Vec<DependencyHealth>,
}

impl ReadinessProbe {
    pub fn from_dependencies(dependencies: Vec<DependencyHealth>) -> Self {
        let ready = dependencies.iter().all(|d| d.status.is_available());
        Self { ready, dependencies }
    }
}
