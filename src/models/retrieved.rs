use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Bibliographic metadata attached to a retrieved excerpt.
///
/// Every field is optional. Index backends are loose about types, so string
/// fields also accept numbers (a `publication_year` of `2021` or `2021.0`
/// both become `"2021"`). Blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publication_year: Option<String>,
    /// Raw excerpt text. Matches without it still produce a citation.
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
}

impl MatchMetadata {
    /// Returns the excerpt text if it is present and non-empty.
    pub fn usable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

/// One scored excerpt returned by the similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "score", alias = "similarity_score", default)]
    pub similarity_score: f32,
    #[serde(default)]
    pub metadata: Option<MatchMetadata>,
}

impl Match {
    /// Creates a match with metadata and no backend id.
    pub fn new(similarity_score: f32, metadata: MatchMetadata) -> Self {
        Self {
            id: None,
            similarity_score,
            metadata: Some(metadata),
        }
    }

    /// Returns the excerpt text usable as model context, if any.
    pub fn text(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(MatchMetadata::usable_text)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(number_to_string(&n)),
        other => Some(other.to_string()),
    }))
}

fn number_to_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}
