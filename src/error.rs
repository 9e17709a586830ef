/// Rejections surfaced to callers of the control surface.
///
/// None of these are fatal: the caller's request is dropped and the previous
/// configuration or store state stays in effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("alert trigger threshold {value} outside allowed range {min}..={max}")]
    ThresholdOutOfRange { value: f64, min: f64, max: f64 },

    #[error("invalid severity boundaries: {reason}")]
    InvalidSeverityBoundaries { reason: String },

    #[error("invalid risk thresholds: {reason}")]
    InvalidRiskThresholds { reason: String },

    #[error("probability {0} outside 0..=1")]
    InvalidProbability(f64),

    #[error("lead time {0}h must be finite and non-negative")]
    InvalidLeadTime(f64),
}
