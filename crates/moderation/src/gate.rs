use std::sync::Arc;

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

use crate::{classifier::Classifier, normalize::normalize};

/// Confidence above which a message is blocked.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// What to do when the classifier is unreachable.
///
/// Default is `Open`: chat availability should not be held hostage by a
/// moderation outage. The degradation is surfaced in logs and in the
/// decision, never silent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Open,
    Closed,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub confidence: f64,
    pub reason: String,
    /// True when the decision was made under a classifier outage.
    pub degraded: bool,
}

impl Decision {
    fn allow(confidence: f64, reason: &str) -> Self {
        Self {
            allowed: true,
            confidence,
            reason: reason.to_string(),
            degraded: false,
        }
    }
}

// ── Gate ─────────────────────────────────────────────────────────────────────

/// Pre-send moderation gate: normalization + thresholding + failure policy
/// around the external classifier.
pub struct ModerationGate {
    classifier: Arc<dyn Classifier>,
    threshold: f64,
    policy: FailurePolicy,
}

impl ModerationGate {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            threshold: DEFAULT_THRESHOLD,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Decide whether `raw` may be admitted to the relay.
    ///
    /// Never returns an error: classifier failures are translated through
    /// the failure policy.
    pub async fn evaluate(&self, raw: &str) -> Decision {
        let text = normalize(raw);
        if text.is_empty() {
            return Decision::allow(0.0, "empty after normalization");
        }

        match self.classifier.classify(&text).await {
            Ok(result) => {
                if result.confidence <= self.threshold {
                    Decision::allow(result.confidence, "below threshold")
                } else {
                    Decision {
                        allowed: false,
                        confidence: result.confidence,
                        reason: "flagged as cyberbullying".to_string(),
                        degraded: false,
                    }
                }
            },
            Err(e) => {
                let allowed = self.policy == FailurePolicy::Open;
                warn!(error = %e, policy = ?self.policy, "classifier unavailable, applying failure policy");
                Decision {
                    allowed,
                    confidence: 0.0,
                    reason: format!("classifier unavailable ({})", policy_name(self.policy)),
                    degraded: true,
                }
            },
        }
    }
}

fn policy_name(policy: FailurePolicy) -> &'static str {
    match policy {
        FailurePolicy::Open => "fail-open",
        FailurePolicy::Closed => "fail-closed",
    }
}

#[cfg(test)]
mod tests {
    use {async_trait::async_trait, std::sync::atomic::{AtomicUsize, Ordering}};

    use super::*;
    use crate::{Classification, ModerationError};

    struct FixedClassifier {
        confidence: f64,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(confidence: f64) -> Self {
            Self {
                confidence,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ModerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Classification {
                flagged: self.confidence > DEFAULT_THRESHOLD,
                confidence: self.confidence,
            })
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ModerationError> {
            Err(ModerationError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn low_confidence_passes() {
        let gate = ModerationGate::new(Arc::new(FixedClassifier::new(0.1)));
        let decision = gate.evaluate("hello there").await;
        assert!(decision.allowed);
        assert!(!decision.degraded);
    }

    #[tokio::test]
    async fn high_confidence_blocks() {
        let gate = ModerationGate::new(Arc::new(FixedClassifier::new(0.95)));
        let decision = gate.evaluate("something nasty").await;
        assert!(!decision.allowed);
        assert!((decision.confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        // allowed = confidence <= threshold, so exactly 0.7 passes.
        let gate = ModerationGate::new(Arc::new(FixedClassifier::new(DEFAULT_THRESHOLD)));
        assert!(gate.evaluate("borderline").await.allowed);
    }

    #[tokio::test]
    async fn custom_threshold_applies() {
        let gate = ModerationGate::new(Arc::new(FixedClassifier::new(0.5))).with_threshold(0.4);
        assert!(!gate.evaluate("text").await.allowed);
    }

    #[tokio::test]
    async fn empty_input_skips_classifier() {
        let classifier = Arc::new(FixedClassifier::new(0.99));
        let gate = ModerationGate::new(Arc::clone(&classifier) as Arc<dyn Classifier>);
        let decision = gate.evaluate("   @#$ 123  ").await;
        assert!(decision.allowed);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn outage_fails_open_by_default() {
        let gate = ModerationGate::new(Arc::new(FailingClassifier));
        let decision = gate.evaluate("hello").await;
        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    #[tokio::test]
    async fn outage_fails_closed_when_configured() {
        let gate =
            ModerationGate::new(Arc::new(FailingClassifier)).with_policy(FailurePolicy::Closed);
        let decision = gate.evaluate("hello").await;
        assert!(!decision.allowed);
        assert!(decision.degraded);
    }
}
