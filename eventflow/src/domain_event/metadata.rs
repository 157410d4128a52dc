use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const USER_ID: &str = "user_id";
const CORRELATION_ID: &str = "correlation_id";
const CAUSATION_ID: &str = "causation_id";

/// 事件元数据：开放的字符串键值表，本层不对键做命名空间约束
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_user_id(self, user_id: impl Into<String>) -> Self {
        self.with(USER_ID, user_id)
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with(CORRELATION_ID, correlation_id)
    }

    pub fn with_causation_id(self, causation_id: impl Into<String>) -> Self {
        self.with(CAUSATION_ID, causation_id)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(USER_ID)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.get(CORRELATION_ID)
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.get(CAUSATION_ID)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_map() {
        let md = Metadata::new().with_user_id("u-1").with("tenant", "acme");
        let json = serde_json::to_value(&md).unwrap();
        assert_eq!(json, serde_json::json!({"user_id": "u-1", "tenant": "acme"}));

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.user_id(), Some("u-1"));
        assert_eq!(back.get("tenant"), Some("acme"));
        assert_eq!(back.correlation_id(), None);
    }
}
