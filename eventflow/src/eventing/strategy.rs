//! 分区策略（PartitionStrategy）
//!
//! 将一批消息切分为处理单元：同一单元内严格按到达顺序处理，不同单元之间并发。
//! 单元按其首个键出现的先后排列。
//!
use crate::domain_event::Envelope;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type KeyFn = dyn Fn(&Envelope) -> String + Send + Sync;

/// 分区键：默认取实体 id
#[derive(Clone, Default)]
pub enum PartitionKey {
    #[default]
    EntityId,
    Custom(Arc<KeyFn>),
}

impl PartitionKey {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Envelope) -> String + Send + Sync + 'static,
    {
        PartitionKey::Custom(Arc::new(f))
    }

    pub fn key_of(&self, envelope: &Envelope) -> String {
        match self {
            PartitionKey::EntityId => envelope.entity_id().to_string(),
            PartitionKey::Custom(f) => f(envelope),
        }
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::EntityId => f.write_str("EntityId"),
            PartitionKey::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub trait PartitionStrategy: Send + Sync {
    /// 策略名称（日志用）
    fn name(&self) -> &str;
    /// 切分消息；不返回空单元
    fn split(&self, messages: Vec<Envelope>) -> Vec<Vec<Envelope>>;
}

/// 每个不同的键一个处理单元
#[derive(Clone, Debug, Default)]
pub struct PartitionByKey {
    key: PartitionKey,
}

impl PartitionByKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: PartitionKey) -> Self {
        Self { key }
    }
}

impl PartitionStrategy for PartitionByKey {
    fn name(&self) -> &str {
        "partition"
    }

    fn split(&self, messages: Vec<Envelope>) -> Vec<Vec<Envelope>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut units: Vec<Vec<Envelope>> = Vec::new();

        for msg in messages {
            let key = self.key.key_of(&msg);
            match index.get(&key) {
                Some(&i) => units[i].push(msg),
                None => {
                    index.insert(key, units.len());
                    units.push(vec![msg]);
                }
            }
        }

        units
    }
}

/// 固定分片数：第 i 个首次出现的键落入分片 `i % shards`
#[derive(Clone, Debug)]
pub struct ShardByKey {
    shards: usize,
    key: PartitionKey,
}

impl ShardByKey {
    /// `shards == 0` 按 1 处理
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
            key: PartitionKey::default(),
        }
    }

    pub fn with_key(mut self, key: PartitionKey) -> Self {
        self.key = key;
        self
    }

    pub fn shards(&self) -> usize {
        self.shards
    }
}

impl PartitionStrategy for ShardByKey {
    fn name(&self) -> &str {
        "shard"
    }

    fn split(&self, messages: Vec<Envelope>) -> Vec<Vec<Envelope>> {
        let mut assigned: HashMap<String, usize> = HashMap::new();
        let mut units: Vec<Vec<Envelope>> = vec![Vec::new(); self.shards];

        for msg in messages {
            let key = self.key.key_of(&msg);
            let next = assigned.len() % self.shards;
            let shard = *assigned.entry(key).or_insert(next);
            units[shard].push(msg);
        }

        units.retain(|u| !u.is_empty());
        units
    }
}

/// 整批作为一个处理单元
#[derive(Clone, Copy, Debug, Default)]
pub struct Simple;

impl PartitionStrategy for Simple {
    fn name(&self) -> &str {
        "simple"
    }

    fn split(&self, messages: Vec<Envelope>) -> Vec<Vec<Envelope>> {
        if messages.is_empty() {
            Vec::new()
        } else {
            vec![messages]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: &str, entity: &str) -> Envelope {
        Envelope::builder()
            .id(id)
            .event_type("Test")
            .entity_id(entity)
            .seq(1)
            .payload(json!({}))
            .time(0)
            .build()
    }

    fn ids(units: &[Vec<Envelope>]) -> Vec<Vec<&str>> {
        units
            .iter()
            .map(|u| u.iter().map(Envelope::id).collect())
            .collect()
    }

    fn batch() -> Vec<Envelope> {
        vec![
            msg("a", "k1"),
            msg("b", "k1"),
            msg("c", "k2"),
            msg("d", "k1"),
            msg("e", "k3"),
        ]
    }

    #[test]
    fn partition_groups_by_key_in_arrival_order() {
        let units = PartitionByKey::new().split(batch());
        assert_eq!(ids(&units), vec![vec!["a", "b", "d"], vec!["c"], vec!["e"]]);
    }

    #[test]
    fn shard_round_robins_first_seen_keys() {
        let units = ShardByKey::new(2).split(batch());
        assert_eq!(ids(&units), vec![vec!["a", "b", "d", "e"], vec!["c"]]);

        let units = ShardByKey::new(8).split(batch());
        assert_eq!(units.len(), 3);

        let units = ShardByKey::new(0).split(batch());
        assert_eq!(ids(&units), vec![vec!["a", "b", "c", "d", "e"]]);
    }

    #[test]
    fn custom_key() {
        let strategy = PartitionByKey::with_key(PartitionKey::custom(|e: &Envelope| {
            if e.id() < "c" { "low".into() } else { "high".into() }
        }));
        let units = strategy.split(batch());
        assert_eq!(ids(&units), vec![vec!["a", "b"], vec!["c", "d", "e"]]);
    }

    #[test]
    fn simple_keeps_whole_batch() {
        assert_eq!(Simple.split(batch()).len(), 1);
        assert!(Simple.split(Vec::new()).is_empty());
    }
}
