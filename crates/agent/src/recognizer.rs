//! Intent recognition collaborator.
//!
//! The recognizer only ever pre-fills slots. It never decides anything the dialog
//! flows would not ask the user to confirm.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

use scoop_core::config::NluConfig;
use scoop_core::domain::order::{ItemKind, RecognizedOrder, Size};
use scoop_core::errors::ApplicationError;

pub const ORDER_INTENT: &str = "Book_Ice_cream";
const COMPOSITE_ENTITY: &str = "Icecream";
const KIND_ENTITY: &str = "IcecreamType";
const SIZE_ENTITY: &str = "IcecreamSize";

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("intent recognition is not configured")]
    NotConfigured,
    #[error("prediction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("prediction endpoint answered with status {0}")]
    Status(u16),
    #[error("prediction payload is malformed: {0}")]
    Malformed(String),
}

impl From<RecognizerError> for ApplicationError {
    fn from(error: RecognizerError) -> Self {
        match error {
            RecognizerError::NotConfigured => Self::Configuration(error.to_string()),
            RecognizerError::Transport(_)
            | RecognizerError::Status(_)
            | RecognizerError::Malformed(_) => Self::Integration(error.to_string()),
        }
    }
}

#[async_trait]
pub trait IntentRecognizer: Send + Sync {
    /// Whether calling `recognize` can produce anything at all.
    fn is_configured(&self) -> bool;

    async fn recognize(&self, text: &str) -> Result<RecognizedOrder, RecognizerError>;
}

/// Recognizer used when no endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecognizer;

#[async_trait]
impl IntentRecognizer for NoopRecognizer {
    fn is_configured(&self) -> bool {
        false
    }

    async fn recognize(&self, _text: &str) -> Result<RecognizedOrder, RecognizerError> {
        Ok(RecognizedOrder::default())
    }
}

/// Calls a LUIS v3 prediction endpoint.
pub struct LuisRecognizer {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl LuisRecognizer {
    pub fn from_config(config: &NluConfig) -> Result<Self, RecognizerError> {
        let (Some(app_id), Some(api_key), Some(host_name)) =
            (config.app_id.as_deref(), config.api_key.as_ref(), config.host_name.as_deref())
        else {
            return Err(RecognizerError::NotConfigured);
        };
        if !config.is_configured() {
            return Err(RecognizerError::NotConfigured);
        }

        let client =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            endpoint: prediction_endpoint(host_name, app_id),
            api_key: api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// No-op recognizer unless all endpoint settings are present.
pub fn build_recognizer(
    config: &NluConfig,
) -> Result<Arc<dyn IntentRecognizer>, ApplicationError> {
    if !config.is_configured() {
        return Ok(Arc::new(NoopRecognizer));
    }
    Ok(Arc::new(LuisRecognizer::from_config(config)?))
}

pub fn prediction_endpoint(host_name: &str, app_id: &str) -> String {
    format!(
        "https://{}/luis/prediction/v3.0/apps/{}/slots/production/predict",
        host_name.trim(),
        app_id.trim()
    )
}

#[async_trait]
impl IntentRecognizer for LuisRecognizer {
    fn is_configured(&self) -> bool {
        true
    }

    async fn recognize(&self, text: &str) -> Result<RecognizedOrder, RecognizerError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", self.api_key.expose_secret())
            .query(&[("query", text), ("verbose", "false"), ("show-all-intents", "false")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RecognizerError::Status(response.status().as_u16()));
        }

        let payload: Value = response.json().await?;
        parse_prediction(&payload)
    }
}

/// Extracts order slots from a prediction payload. Only the order intent yields entities.
pub fn parse_prediction(payload: &Value) -> Result<RecognizedOrder, RecognizerError> {
    let prediction = payload
        .get("prediction")
        .ok_or_else(|| RecognizerError::Malformed("missing `prediction` object".to_string()))?;
    let top_intent = prediction
        .get("topIntent")
        .and_then(Value::as_str)
        .ok_or_else(|| RecognizerError::Malformed("missing `prediction.topIntent`".to_string()))?;

    if top_intent != ORDER_INTENT {
        return Ok(RecognizedOrder::default());
    }

    let entities = prediction.get("entities");
    let kind =
        composite_value(entities, KIND_ENTITY).and_then(|value| value.parse::<ItemKind>().ok());
    let size =
        composite_value(entities, SIZE_ENTITY).and_then(|value| value.parse::<Size>().ok());

    Ok(RecognizedOrder { kind, size })
}

/// First value of the first list of a child entity inside the first composite match.
fn composite_value<'a>(entities: Option<&'a Value>, child: &str) -> Option<&'a str> {
    entities?
        .get(COMPOSITE_ENTITY)?
        .get(0)?
        .get(child)?
        .get(0)?
        .get(0)?
        .as_str()
}
