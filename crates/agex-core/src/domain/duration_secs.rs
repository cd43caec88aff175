//! Serde adapter: `Duration` as fractional seconds rounded to 4 decimals.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn round(d: Duration) -> f64 {
    (d.as_secs_f64() * 10_000.0).round() / 10_000.0
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_four_decimals() {
        assert_eq!(round(Duration::from_micros(1_234_567)), 1.2346);
        assert_eq!(round(Duration::ZERO), 0.0);
    }
}
