use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinates are quantized to microdegrees (~0.11 m) before keying, so two
/// requests for the same spot always land on the same key regardless of how
/// the float was produced.
const MICRODEGREES: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Caller-supplied stable id. When present it takes precedence over the
    /// coordinates for identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(&self) -> LocationKey {
        match &self.id {
            Some(id) => LocationKey::Named(id.clone()),
            None => LocationKey::from_coordinates(self.latitude, self.longitude),
        }
    }
}

/// Identity of a monitored location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKey {
    Named(String),
    Coordinates { lat_e6: i64, lng_e6: i64 },
}

impl LocationKey {
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        LocationKey::Coordinates {
            lat_e6: (latitude * MICRODEGREES).round() as i64,
            lng_e6: (longitude * MICRODEGREES).round() as i64,
        }
    }
}

// Rendered form doubles as an MQTT topic segment. It must not contain '/',
// '+' or '#', and distinct keys must render distinctly: named ids escape the
// reserved characters (plus '%' and '@'), coordinates start with '@'.
impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Named(id) => {
                for c in id.chars() {
                    match c {
                        '%' => f.write_str("%25")?,
                        '/' => f.write_str("%2F")?,
                        '+' => f.write_str("%2B")?,
                        '#' => f.write_str("%23")?,
                        '@' => f.write_str("%40")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                Ok(())
            }
            LocationKey::Coordinates { lat_e6, lng_e6 } => write!(f, "@{}_{}", lat_e6, lng_e6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_coordinates_resolve_to_same_key() {
        let a = Location::new("Peoria", 40.693_6, -89.589_0);
        let b = Location::new("Peoria riverfront", 40.6936, -89.5890);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_float_noise_below_quantum_is_ignored() {
        let a = LocationKey::from_coordinates(0.1 + 0.2, 10.0);
        let b = LocationKey::from_coordinates(0.3, 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nearby_but_distinct_coordinates_differ() {
        let a = LocationKey::from_coordinates(40.6936, -89.5890);
        let b = LocationKey::from_coordinates(40.6937, -89.5890);
        assert_ne!(a, b);
    }

    #[test]
    fn test_explicit_id_wins_over_coordinates() {
        let a = Location::new("Home", 1.0, 2.0).with_id("home");
        let b = Location::new("Home", 3.0, 4.0).with_id("home");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), LocationKey::Named("home".into()));
    }

    #[test]
    fn test_display_is_topic_safe() {
        let key = LocationKey::Named("users/1/#".into());
        assert_eq!(key.to_string(), "users%2F1%2F%23");
        let key = LocationKey::from_coordinates(-1.5, 2.25);
        assert_eq!(key.to_string(), "@-1500000_2250000");
    }

    #[test]
    fn test_distinct_keys_render_distinct_topics() {
        let keys = [
            LocationKey::Named("users/1".into()),
            LocationKey::Named("users_1".into()),
            LocationKey::Named("users%2F1".into()),
            LocationKey::Named("1_2".into()),
            LocationKey::Named("@1_2".into()),
            LocationKey::Coordinates { lat_e6: 1, lng_e6: 2 },
        ];
        let rendered: std::collections::HashSet<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered.len(), keys.len());
        assert!(rendered.iter().all(|r| !r.contains(['/', '+', '#'])));
    }
}
