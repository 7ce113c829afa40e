use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One traffic camera as published by the feed, plus the detection result.
///
/// Field names are part of the store contract and must round-trip exactly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CameraRecord {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    /// Unset until a detection pass has completed for this camera.
    #[serde(default, deserialize_with = "deserialize_car_count")]
    pub car_count: Option<u32>,
}

impl CameraRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            image_url: image_url.into(),
            car_count: None,
        }
    }

    pub fn with_car_count(mut self, car_count: u32) -> Self {
        self.car_count = Some(car_count);
        self
    }
}

/// Coerce a stored count to a vehicle count.
///
/// Anything that is not a finite, non-negative whole number is treated as
/// unknown rather than zero, so an unreadable value never looks like an
/// empty road.
pub fn parse_car_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(count) = trimmed.parse::<u32>() {
        return Some(count);
    }
    let value: f64 = trimmed.parse().ok()?;
    count_from_f64(value)
}

pub(crate) fn count_from_f64(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

/// Camera ids end up in file names, so only a conservative alphabet is allowed.
pub fn validate_camera_id(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(anyhow!("camera id cannot be empty"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "camera id '{}' must contain only [A-Za-z0-9_-]",
            id
        ));
    }
    Ok(id)
}

fn deserialize_car_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| n.as_f64().and_then(count_from_f64)),
        Some(serde_json::Value::String(s)) => parse_car_count(&s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_and_whole_float_counts() {
        assert_eq!(parse_car_count("12"), Some(12));
        assert_eq!(parse_car_count(" 7.0 "), Some(7));
        assert_eq!(parse_car_count("0"), Some(0));
    }

    #[test]
    fn rejects_unparsable_counts_instead_of_zeroing() {
        assert_eq!(parse_car_count(""), None);
        assert_eq!(parse_car_count("NaN"), None);
        assert_eq!(parse_car_count("-3"), None);
        assert_eq!(parse_car_count("2.5"), None);
        assert_eq!(parse_car_count("lots"), None);
    }

    #[test]
    fn json_round_trip_keeps_field_names() -> Result<()> {
        let record = CameraRecord::new("42", "5 Ave @ 42 St", 40.75, -73.98, "https://cam/42.jpg")
            .with_car_count(30);
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["imageUrl"], "https://cam/42.jpg");
        assert_eq!(json["car_count"], 30);
        assert!(json.get("image_url").is_none());

        let back: CameraRecord = serde_json::from_value(json)?;
        assert_eq!(back, record);
        Ok(())
    }

    #[test]
    fn feed_json_without_count_deserializes_as_unset() -> Result<()> {
        let json = r#"{
            "id": "a1b2",
            "name": "BQE @ Atlantic Ave",
            "latitude": 40.69,
            "longitude": -73.99,
            "imageUrl": "https://cam/a1b2.jpg",
            "area": "Brooklyn",
            "isOnline": "true"
        }"#;
        let record: CameraRecord = serde_json::from_str(json)?;
        assert_eq!(record.car_count, None);

        let garbled: CameraRecord = serde_json::from_str(
            r#"{"id":"x","name":"n","latitude":0,"longitude":0,"imageUrl":"u","car_count":"n/a"}"#,
        )?;
        assert_eq!(garbled.car_count, None);
        Ok(())
    }

    #[test]
    fn camera_ids_are_restricted() {
        assert!(validate_camera_id("0bcfbc92-d455-4f62-846a-32afbefa3b4b").is_ok());
        assert!(validate_camera_id("").is_err());
        assert!(validate_camera_id("../etc").is_err());
        assert!(validate_camera_id("a/b").is_err());
    }
}
