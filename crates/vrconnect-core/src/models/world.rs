use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};

/// Largest page size the platform accepts for world searches.
pub const MAX_PAGE_SIZE: u32 = 100;

/// World search filter. Every field is optional; unset fields are left out
/// of the downstream query because the platform treats an explicit empty
/// value differently from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldQuery {
    pub search: Option<String>,
    pub sort: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub n: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub offset: Option<u32>,
    pub platform: Option<String>,
    pub tag: Option<String>,
    pub notag: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub featured: Option<bool>,
    #[serde(rename = "releaseStatus")]
    pub release_status: Option<String>,
    pub order: Option<String>,
}

/// Query strings carry every value as text, JSON bodies carry typed values.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar<T> {
    Typed(T),
    Text(String),
}

/// An empty or whitespace-only value counts as absent.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<Scalar<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Typed(value)) => Ok(Some(value)),
        Some(Scalar::Text(text)) => match text.trim() {
            "" => Ok(None),
            text => text.parse().map(Some).map_err(de::Error::custom),
        },
    }
}

impl WorldQuery {
    pub fn validate(&self) -> Result<(), String> {
        match self.n {
            Some(0) => Err("n must be at least 1".to_string()),
            Some(n) if n > MAX_PAGE_SIZE => {
                Err(format!("n must be at most {}", MAX_PAGE_SIZE))
            }
            _ => Ok(()),
        }
    }

    /// Query-string pairs for the platform's `/worlds` endpoint.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let text = [
            ("search", &self.search),
            ("sort", &self.sort),
            ("platform", &self.platform),
            ("tag", &self.tag),
            ("notag", &self.notag),
            ("releaseStatus", &self.release_status),
            ("order", &self.order),
        ];

        let mut pairs: Vec<(&'static str, String)> = text
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_string()))
            })
            .collect();

        if let Some(n) = self.n {
            pairs.push(("n", n.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(featured) = self.featured {
            pairs.push(("featured", featured.to_string()));
        }
        pairs
    }
}
