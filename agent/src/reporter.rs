use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thermo_common::round_1dp;
use tracing::debug;

pub trait Report {
    async fn report(&self, device_id: &str, temperature: f64) -> bool;
}

pub struct HttpReporter {
    client: reqwest::Client,
    collector_url: String,
}

impl HttpReporter {
    pub fn new(collector_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build collector http client")?;

        Ok(Self {
            client,
            collector_url: collector_url.into(),
        })
    }
}

impl Report for HttpReporter {
    async fn report(&self, device_id: &str, temperature: f64) -> bool {
        let temperature = format!("{:.1}", round_1dp(temperature));
        let request = self
            .client
            .get(&self.collector_url)
            .query(&[("id", device_id), ("temperature", temperature.as_str())]);

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                debug!("collector answered HTTP {}", response.status());
                false
            }
            Err(err) => {
                debug!("collector request failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{extract::Query, http::StatusCode as AxumStatus, routing::get, Router};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testutil::{bind_local, serve};

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn collector(status: AxumStatus, delay: Duration) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorded = seen.clone();
        let app = Router::new().route(
            "/Thermo/Thermo",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                recorded.lock().unwrap().push(params);
                tokio::time::sleep(delay).await;
                status
            }),
        );

        let (listener, addr) = bind_local().await;
        serve(listener, app);
        (format!("http://{addr}/Thermo/Thermo"), seen)
    }

    #[tokio::test]
    async fn ok_response_is_success() {
        let (url, seen) = collector(AxumStatus::OK, Duration::ZERO).await;
        let reporter = HttpReporter::new(url, Duration::from_secs(5)).unwrap();

        assert!(reporter.report("Thermometer_ATP_6", 18.8).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["id"], "Thermometer_ATP_6");
        assert_eq!(seen[0]["temperature"], "18.8");
    }

    #[tokio::test]
    async fn temperature_is_sent_with_one_decimal() {
        let (url, seen) = collector(AxumStatus::OK, Duration::ZERO).await;
        let reporter = HttpReporter::new(url, Duration::from_secs(5)).unwrap();

        assert!(reporter.report("Thermometer_SP_1", 21.0).await);
        assert!(reporter.report("Thermometer_SP_1", 19.96).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["temperature"], "21.0");
        assert_eq!(seen[1]["temperature"], "20.0");
    }

    #[tokio::test]
    async fn server_error_is_failure() {
        let (url, _) = collector(AxumStatus::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let reporter = HttpReporter::new(url, Duration::from_secs(5)).unwrap();

        assert!(!reporter.report("Thermometer_ATP_6", 18.8).await);
    }

    #[tokio::test]
    async fn non_200_success_code_is_failure() {
        let (url, _) = collector(AxumStatus::NO_CONTENT, Duration::ZERO).await;
        let reporter = HttpReporter::new(url, Duration::from_secs(5)).unwrap();

        assert!(!reporter.report("Thermometer_ATP_6", 18.8).await);
    }

    #[tokio::test]
    async fn timeout_is_failure() {
        let (url, _) = collector(AxumStatus::OK, Duration::from_secs(5)).await;
        let reporter = HttpReporter::new(url, Duration::from_millis(100)).unwrap();

        assert!(!reporter.report("Thermometer_ATP_6", 18.8).await);
    }

    #[tokio::test]
    async fn connection_refused_is_failure() {
        let (listener, addr) = bind_local().await;
        drop(listener);
        let reporter =
            HttpReporter::new(format!("http://{addr}/Thermo/Thermo"), Duration::from_secs(5))
                .unwrap();

        assert!(!reporter.report("Thermometer_ATP_6", 18.8).await);
    }
}
