use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::future::join_all;
use rand::seq::SliceRandom;

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Generate demo traffic against the monitoring demo service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Concurrent requests per batch
    #[arg(short, long, default_value_t = 5)]
    users: usize,

    #[arg(short, long, default_value_t = 300)]
    duration_secs: u64,

    /// Endpoint to hit; repeat to pick randomly among several
    #[arg(short, long = "endpoint", default_values = ["/", "/api/data", "/sleep/250"])]
    endpoints: Vec<String>,

    #[arg(short, long, default_value_t = 10)]
    timeout_secs: u64,
}

/// Result of a single request. `status` is `None` on transport failure.
#[derive(Debug, Clone, Copy)]
struct Sample {
    status: Option<u16>,
    duration: Duration,
}

impl Sample {
    fn succeeded(&self) -> bool {
        matches!(self.status, Some(status) if status < 400)
    }
}

#[derive(Debug, Default)]
struct LoadSummary {
    total: u64,
    successful: u64,
    failed: u64,
    timed: u64,
    total_duration: Duration,
    min_duration: Option<Duration>,
    max_duration: Duration,
}

impl LoadSummary {
    fn add(&mut self, sample: Sample) {
        self.total += 1;
        if sample.succeeded() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        // Transport failures have no meaningful duration.
        if sample.status.is_some() {
            self.timed += 1;
            self.total_duration += sample.duration;
            self.min_duration = Some(match self.min_duration {
                Some(min) => min.min(sample.duration),
                None => sample.duration,
            });
            self.max_duration = self.max_duration.max(sample.duration);
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total as f64 * 100.0
    }

    fn average_duration(&self) -> Duration {
        if self.timed == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.timed as f64)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadgen=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.endpoints.is_empty() || cli.users == 0 {
        return Err("at least one endpoint and one user are required".into());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;
    let base_url = cli.base_url.trim_end_matches('/');

    tracing::info!(
        users = cli.users,
        duration_secs = cli.duration_secs,
        base_url,
        "Starting load test"
    );

    let mut summary = LoadSummary::default();
    let deadline = Instant::now() + Duration::from_secs(cli.duration_secs);

    while Instant::now() < deadline {
        let batch = (0..cli.users).map(|_| {
            let endpoint = cli
                .endpoints
                .choose(&mut rand::thread_rng())
                .map(String::as_str)
                .unwrap_or("/");
            request(&client, base_url, endpoint)
        });

        for sample in join_all(batch).await {
            summary.add(sample);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tracing::info!(
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        success_rate = %format!("{:.2}%", summary.success_rate()),
        avg_secs = summary.average_duration().as_secs_f64(),
        min_secs = summary.min_duration.unwrap_or_default().as_secs_f64(),
        max_secs = summary.max_duration.as_secs_f64(),
        "Load test summary"
    );

    Ok(())
}

async fn request(client: &reqwest::Client, base_url: &str, endpoint: &str) -> Sample {
    let start = Instant::now();
    match client.get(format!("{base_url}{endpoint}")).send().await {
        Ok(response) => {
            let duration = start.elapsed();
            let status = response.status().as_u16();
            tracing::info!(
                endpoint,
                status,
                duration_secs = duration.as_secs_f64(),
                "Request finished"
            );
            Sample {
                status: Some(status),
                duration,
            }
        }
        Err(e) => {
            tracing::error!(endpoint, error = %e, "Request failed");
            Sample {
                status: None,
                duration: start.elapsed(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: Option<u16>, millis: u64) -> Sample {
        Sample {
            status,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn empty_summary_reports_zeroes() {
        let summary = LoadSummary::default();
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.average_duration(), Duration::ZERO);
        assert_eq!(summary.min_duration, None);
    }

    #[test]
    fn client_and_server_errors_count_as_failures() {
        let mut summary = LoadSummary::default();
        summary.add(sample(Some(200), 10));
        summary.add(sample(Some(404), 20));
        summary.add(sample(Some(500), 30));
        summary.add(sample(Some(302), 40));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.success_rate(), 50.0);
    }

    #[test]
    fn transport_failures_do_not_skew_durations() {
        let mut summary = LoadSummary::default();
        summary.add(sample(Some(200), 100));
        summary.add(sample(None, 0));
        summary.add(sample(Some(200), 300));

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.min_duration, Some(Duration::from_millis(100)));
        assert_eq!(summary.max_duration, Duration::from_millis(300));
        assert_eq!(summary.average_duration(), Duration::from_millis(200));
    }

    #[test]
    fn average_survives_counts_beyond_u32() {
        let timed = u64::from(u32::MAX) + 2;
        let summary = LoadSummary {
            total: timed,
            successful: timed,
            timed,
            total_duration: Duration::from_secs(timed),
            ..LoadSummary::default()
        };

        assert_eq!(summary.average_duration(), Duration::from_secs(1));
    }
}
