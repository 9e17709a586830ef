use std::time::Duration;

use crate::domain::{GuidancePriority, PreparationGuidance, Severity};
use crate::service::classifier::SeverityBoundaries;

/// Guidance for a countdown, bucketed with the same boundaries as severity.
pub fn resolve_guidance(countdown: Duration, boundaries: &SeverityBoundaries) -> PreparationGuidance {
    guidance_for(boundaries.severity_for(countdown))
}

pub fn guidance_for(severity: Severity) -> PreparationGuidance {
    match severity {
        Severity::Immediate => record(
            GuidancePriority::Critical,
            "Flooding is imminent or under way. Move to higher ground now.",
            &[
                "Move to higher ground immediately",
                "Do not walk or drive through flood water",
                "Take your emergency kit, medication and documents",
                "Follow instructions from local emergency services",
            ],
            "Act now",
        ),
        Severity::Urgent => record(
            GuidancePriority::High,
            "Flooding is expected within hours. Prepare to leave.",
            &[
                "Pack an emergency kit with water, food and medication",
                "Move valuables and electrical items upstairs",
                "Charge phones and power banks",
                "Plan your evacuation route to higher ground",
                "Check on neighbours who may need help",
            ],
            "30-60 minutes",
        ),
        Severity::Warning => record(
            GuidancePriority::Medium,
            "Flooding is possible later today. Start preparing.",
            &[
                "Clear gutters and drains around your property",
                "Move vehicles away from low-lying areas",
                "Prepare sandbags or flood barriers",
                "Keep monitoring local forecasts",
            ],
            "1-2 hours",
        ),
        Severity::Advisory => record(
            GuidancePriority::Low,
            "Elevated flood risk in the coming days. Stay informed.",
            &[
                "Review your household flood plan",
                "Check your emergency kit is stocked",
                "Sign up for local flood warnings",
            ],
            "Several hours",
        ),
    }
}

fn record(priority: GuidancePriority, message: &str, actions: &[&str], time_estimate: &str) -> PreparationGuidance {
    PreparationGuidance {
        priority,
        message: message.to_string(),
        actions: actions.iter().map(|a| a.to_string()).collect(),
        time_estimate: time_estimate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bucket_same_guidance() {
        let b = SeverityBoundaries::default();
        let a = resolve_guidance(Duration::from_secs(3 * 3600), &b);
        let c = resolve_guidance(Duration::from_secs(5 * 3600 + 59 * 60), &b);
        assert_eq!(a, c);
        assert_eq!(a.priority, GuidancePriority::High);
    }

    #[test]
    fn test_zero_countdown_is_critical() {
        let g = resolve_guidance(Duration::ZERO, &SeverityBoundaries::default());
        assert_eq!(g.priority, GuidancePriority::Critical);
        assert_eq!(g.actions[0], "Move to higher ground immediately");
    }

    #[test]
    fn test_priority_tracks_severity_order() {
        let order = [Severity::Advisory, Severity::Warning, Severity::Urgent, Severity::Immediate];
        let priorities: Vec<_> = order.iter().map(|s| guidance_for(*s).priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] < w[1]));
        assert!(order.iter().all(|s| !guidance_for(*s).actions.is_empty()));
    }
}
