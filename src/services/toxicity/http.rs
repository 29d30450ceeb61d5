use serde::Serialize;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use super::{RawPrediction, ToxicityClassifier};
use crate::core::config::ClassifierConfig;
use crate::core::errors::ClassifierError;

#[derive(Serialize)]
struct PredictRequest<'a> {
    texts: &'a [String],
}

/// Client for a Detoxify-style inference server.
///
/// `POST {"texts": [...]}` returns `{"toxicity": [...], "insult": [...], ...}`.
/// The request runs on the async client; `predict` blocks on the runtime
/// handle, so it must only be called from a blocking thread.
pub struct HttpToxicityClassifier {
    url: String,
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpToxicityClassifier {
    pub fn new(config: &ClassifierConfig, runtime: Handle) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            url: config.model_url.clone(),
            client,
            runtime,
        })
    }

    async fn predict_async(&self, texts: &[String]) -> Result<RawPrediction, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let prediction: RawPrediction = response.json().await?;
        debug!("Classifier returned {} signals for {} texts", prediction.len(), texts.len());
        Ok(prediction)
    }
}

impl ToxicityClassifier for HttpToxicityClassifier {
    fn predict(&self, texts: &[String]) -> Result<RawPrediction, ClassifierError> {
        self.runtime.block_on(self.predict_async(texts))
    }
}
