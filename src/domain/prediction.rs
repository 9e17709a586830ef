use serde::{Deserialize, Serialize};

/// Model confidence as reported by the provider: either a score or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Score(f64),
    Level(ConfidenceLevel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Level(ConfidenceLevel::Medium)
    }
}

/// One evaluation from the external prediction provider.
///
/// The pipeline treats this as opaque data; values outside their nominal
/// range are clamped by [`PredictionSnapshot::normalized`] and not rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub probability: f64,
    pub timeframe_hours: f64,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub rainfall_24h: f64,
    #[serde(default)]
    pub current_temp: f64,
    #[serde(default)]
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_hours: Option<f64>,
}

impl PredictionSnapshot {
    pub fn normalized(mut self) -> Self {
        self.probability = if self.probability.is_finite() {
            self.probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.timeframe_hours = if self.timeframe_hours.is_finite() {
            self.timeframe_hours.max(0.0)
        } else {
            0.0
        };
        if !self.rainfall_24h.is_finite() || self.rainfall_24h < 0.0 {
            self.rainfall_24h = 0.0;
        }
        if let Confidence::Score(score) = self.confidence {
            self.confidence = Confidence::Score(if score.is_finite() {
                score.clamp(0.0, 1.0)
            } else {
                0.0
            });
        }
        self.expected_duration_hours = self
            .expected_duration_hours
            .filter(|h| h.is_finite() && *h > 0.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_minimal_provider_payload() {
        let json = r#"{"probability":0.72,"timeframe_hours":8}"#;
        let snapshot: PredictionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.probability, 0.72);
        assert_eq!(snapshot.timeframe_hours, 8.0);
        assert_eq!(snapshot.confidence, Confidence::Level(ConfidenceLevel::Medium));
        assert_eq!(snapshot.humidity, None);
    }

    #[test]
    fn test_confidence_accepts_score_or_label() {
        let scored: PredictionSnapshot =
            serde_json::from_str(r#"{"probability":0.5,"timeframe_hours":1,"confidence":0.9}"#).unwrap();
        assert_eq!(scored.confidence, Confidence::Score(0.9));

        let labelled: PredictionSnapshot =
            serde_json::from_str(r#"{"probability":0.5,"timeframe_hours":1,"confidence":"high"}"#).unwrap();
        assert_eq!(labelled.confidence, Confidence::Level(ConfidenceLevel::High));
    }

    #[test]
    fn test_normalized_clamps_out_of_range_values() {
        let snapshot = PredictionSnapshot {
            probability: 1.4,
            timeframe_hours: -3.0,
            confidence: Confidence::Score(f64::NAN),
            rainfall_24h: -1.0,
            current_temp: 12.0,
            model_version: "v2".into(),
            humidity: None,
            expected_duration_hours: Some(0.0),
        }
        .normalized();

        assert_eq!(snapshot.probability, 1.0);
        assert_eq!(snapshot.timeframe_hours, 0.0);
        assert_eq!(snapshot.confidence, Confidence::Score(0.0));
        assert_eq!(snapshot.rainfall_24h, 0.0);
        assert_eq!(snapshot.expected_duration_hours, None);
    }
}
