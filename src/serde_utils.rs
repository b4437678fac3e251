use serde::{Deserialize, Deserializer};
use std::time::SystemTime;

/// Accepts SQLite-style (`2024-05-01 12:30:00`) and RFC 3339 timestamps.
/// Anything else, including `null`, becomes `None`.
pub fn deserialize_timestamp_lenient<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| humantime::parse_rfc3339_weak(s.trim()).ok()))
}

/// Server-side integer ids arrive as numbers or strings depending on the source.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Int(i) => i.to_string(),
        RawId::Str(s) => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::{Duration, UNIX_EPOCH};

    #[derive(Deserialize)]
    struct TestStruct {
        #[serde(default, deserialize_with = "deserialize_timestamp_lenient")]
        timestamp: Option<SystemTime>,
        #[serde(default, deserialize_with = "deserialize_id")]
        id: Option<String>,
    }

    #[test]
    fn test_deserialize_sqlite_timestamp() {
        let json = r#"{"timestamp": "2022-01-01 00:00:00"}"#;
        let result: TestStruct = serde_json::from_str(json).unwrap();

        let expected_time = UNIX_EPOCH + Duration::from_secs(1640995200);

        assert_eq!(result.timestamp, Some(expected_time));
    }

    #[test]
    fn test_garbage_timestamp_is_none() {
        let result: TestStruct = serde_json::from_str(r#"{"timestamp": "yesterday"}"#).unwrap();
        assert_eq!(result.timestamp, None);

        let result: TestStruct = serde_json::from_str(r#"{"timestamp": null}"#).unwrap();
        assert_eq!(result.timestamp, None);

        let result: TestStruct = serde_json::from_str(r#"{"timestamp": 1640995200}"#).unwrap();
        assert_eq!(result.timestamp, None);

        let result: TestStruct = serde_json::from_str("{}").unwrap();
        assert_eq!(result.timestamp, None);
    }

    #[test]
    fn test_numeric_and_string_ids() {
        let result: TestStruct = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(result.id.as_deref(), Some("42"));

        let result: TestStruct = serde_json::from_str(r#"{"id": "1AbC"}"#).unwrap();
        assert_eq!(result.id.as_deref(), Some("1AbC"));
    }
}
