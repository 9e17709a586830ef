use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::PredictionSnapshot;
use crate::ports::PredictionProvider;

/// Prediction service over HTTP: `GET {base}/predict?lat=..&lon=..` returning
/// a JSON prediction snapshot.
///
/// Only connecting is bounded. A slow response delays that location's next
/// tick and nothing else.
pub struct HttpPredictionProvider {
    client: reqwest::Client,
    predict_url: String,
}

impl HttpPredictionProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            predict_url: predict_url(base_url),
        })
    }
}

fn predict_url(base_url: &str) -> String {
    format!("{}/predict", base_url.trim_end_matches('/'))
}

#[async_trait]
impl PredictionProvider for HttpPredictionProvider {
    #[instrument(skip(self))]
    async fn get_prediction(&self, latitude: f64, longitude: f64) -> anyhow::Result<PredictionSnapshot> {
        let snapshot = self
            .client
            .get(&self.predict_url)
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .await
            .context("prediction request failed")?
            .error_for_status()?
            .json::<PredictionSnapshot>()
            .await
            .context("invalid prediction payload")?;

        debug!(
            probability = snapshot.probability,
            timeframe_hours = snapshot.timeframe_hours,
            model = %snapshot.model_version,
            "Prediction received"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_url_joins_base() {
        assert_eq!(predict_url("http://localhost:8000"), "http://localhost:8000/predict");
        assert_eq!(predict_url("http://localhost:8000/api/"), "http://localhost:8000/api/predict");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let provider = HttpPredictionProvider::new("http://127.0.0.1:9").unwrap();
        assert!(provider.get_prediction(40.69, -89.59).await.is_err());
    }
}
