use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::PromptShapeError;

/// Prefix marking prompts that only exist locally (unauthenticated trial mode).
pub const TEMP_ID_PREFIX: &str = "temp-";

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

key_newtype!(PromptId);
key_newtype!(VersionKey);

impl PromptId {
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }
}

impl VersionKey {
    pub fn first() -> Self {
        Self("v1".to_string())
    }

    /// Integer suffix of a conventional `v<N>` key.
    pub fn ordinal(&self) -> Option<i64> {
        self.0.get(1..)?.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TagColor {
    Marketing,
    Ai,
    #[default]
    New,
    Success,
    Info,
    Warning,
    Purple,
    Mint,
    Orange,
}

impl TagColor {
    pub const ALL: [TagColor; 9] = [
        TagColor::Marketing,
        TagColor::Ai,
        TagColor::New,
        TagColor::Success,
        TagColor::Info,
        TagColor::Warning,
        TagColor::Purple,
        TagColor::Mint,
        TagColor::Orange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TagColor::Marketing => "marketing",
            TagColor::Ai => "ai",
            TagColor::New => "new",
            TagColor::Success => "success",
            TagColor::Info => "info",
            TagColor::Warning => "warning",
            TagColor::Purple => "purple",
            TagColor::Mint => "mint",
            TagColor::Orange => "orange",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(value))
    }
}

impl From<String> for TagColor {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_default()
    }
}

impl From<TagColor> for String {
    fn from(value: TagColor) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TagColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub color: TagColor,
}

impl Tag {
    pub fn new(name: impl Into<String>, color: TagColor) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Filled from the enclosing map key when a prompt is normalized.
    #[serde(default, alias = "version_id")]
    pub key: VersionKey,
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(deserialize_with = "version_date")]
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub versions: BTreeMap<VersionKey, Version>,
    pub latest_version: VersionKey,
}

impl Prompt {
    /// Checks the latest-version invariant and stamps every version with its map key.
    pub fn normalized(mut self) -> Result<Self, PromptShapeError> {
        if !self.versions.contains_key(&self.latest_version) {
            return Err(PromptShapeError::MissingLatestVersion {
                prompt_id: self.id.to_string(),
                latest_version: self.latest_version.to_string(),
            });
        }
        for (key, version) in self.versions.iter_mut() {
            version.key = key.clone();
        }
        Ok(self)
    }

    pub fn version(&self, key: &VersionKey) -> Option<&Version> {
        self.versions.get(key)
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions.get(&self.latest_version)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }

    pub fn has_tag_ignore_case(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.matches_name(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub has_seen_paywall_modal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub llm_provider: String,
    pub masked_api_key: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn version_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_version_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized version date '{raw}'")))
}

/// Accepts `2025-05-12`, RFC 3339 timestamps, offset-less ISO datetimes
/// (`2025-05-12T10:11:12.345678`, `T` or space separated) and `May 12, 2025`.
pub fn parse_version_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|ts| ts.date_naive())
        })
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .into_iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|ts| ts.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%B %d, %Y").ok())
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
