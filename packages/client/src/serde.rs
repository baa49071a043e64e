use std::fmt;

use serde::{de, Deserializer};

/// Accepts either `"a, b"` (as env vars arrive) or `["a", "b"]` (as toml arrays arrive)
pub fn deserialize_vec_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a comma-separated string or a sequence of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Vec<String>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                vec.push(elem.trim().to_string());
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Levels {
        #[serde(deserialize_with = "deserialize_vec_string")]
        log_level: Vec<String>,
    }

    #[test]
    fn string_or_sequence() {
        let levels: Levels =
            serde_json::from_str(r#"{"log_level": "info, buddy_client=debug,"}"#).unwrap();
        assert_eq!(levels.log_level, ["info", "buddy_client=debug"]);

        let levels: Levels =
            serde_json::from_str(r#"{"log_level": ["warn", " alloy=trace "]}"#).unwrap();
        assert_eq!(levels.log_level, ["warn", "alloy=trace"]);
    }
}
