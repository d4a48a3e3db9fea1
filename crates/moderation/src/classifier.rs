use std::time::Duration;

use {async_trait::async_trait, tracing::debug};

use safechat_protocol::{ClassifyRequest, ClassifyResponse};

use crate::ModerationError;

/// Result of one classification call.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub flagged: bool,
    /// Probability of the bullying class, in `[0, 1]`.
    pub confidence: f64,
}

/// The external classification capability.
///
/// Treated as a remote synchronous call that may fail with an availability
/// error; the gate decides what a failure means.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ModerationError>;
}

// ── HTTP-backed classifier ───────────────────────────────────────────────────

/// Client for the classifier service's `/predict` endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, ModerationError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ModerationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ModerationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| ModerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModerationError::Unavailable(format!(
                "classifier returned {status}"
            )));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::Unavailable(format!("bad classifier response: {e}")))?;

        debug!(
            flagged = body.is_bullying,
            confidence = body.confidence,
            "classifier response"
        );
        Ok(Classification {
            flagged: body.is_bullying,
            confidence: body.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_for(server: &mockito::ServerGuard) -> HttpClassifier {
        HttpClassifier::new(
            &format!("{}/predict", server.url()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn parses_predict_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"is_bullying": true, "confidence": 0.93, "message": "x"}"#)
            .create_async()
            .await;

        let result = classifier_for(&server).classify("some text").await.unwrap();
        assert!(result.flagged);
        assert!((result.confidence - 0.93).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(500)
            .with_body(r#"{"error": "boom"}"#)
            .create_async()
            .await;

        let err = classifier_for(&server).classify("text").await.unwrap_err();
        assert!(matches!(err, ModerationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = classifier_for(&server).classify("text").await.unwrap_err();
        assert!(matches!(err, ModerationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn connection_refused_maps_to_unavailable() {
        // Port 1 is essentially never listening.
        let classifier =
            HttpClassifier::new("http://127.0.0.1:1/predict", Duration::from_millis(500)).unwrap();
        let err = classifier.classify("text").await.unwrap_err();
        assert!(matches!(err, ModerationError::Unavailable(_)));
    }
}
