use super::metadata::Metadata;
use crate::error::DomainResult;
use bon::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件信封：持久化后不可变的一条事件记录
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Envelope {
    /// 事件唯一标识符（聚合事件由实体 ID 与序号派生）
    #[builder(into)]
    id: String,
    /// 事件类型，用于区分与过滤
    #[builder(into)]
    event_type: String,
    /// 实体（聚合）ID
    #[builder(into)]
    entity_id: String,
    /// 实体内单调递增的序号，从 1 开始
    seq: u64,
    /// 事件负载（已编码的类型化事件体）
    payload: Value,
    /// 事件发生时间（unix 秒）
    time: i64,
    /// 元数据（用户 ID、关联 ID 等）
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
    /// 过期时间（unix 秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expired_at: Option<i64>,
}

impl Envelope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn expired_at(&self) -> Option<i64> {
        self.expired_at
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expired_at.is_some_and(|at| at <= now)
    }

    /// 解码事件负载为类型化事件
    pub fn payload_as<E>(&self) -> DomainResult<E>
    where
        E: DeserializeOwned,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// 完整信封的紧凑编码（用于传输/存储）
    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> DomainResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 编码类型化事件负载
pub fn encode_payload<E>(event: &E) -> DomainResult<Value>
where
    E: Serialize,
{
    Ok(serde_json::to_value(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::event_id;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Renamed {
        name: String,
    }

    fn sample() -> Envelope {
        Envelope::builder()
            .id(event_id("a1", 2))
            .event_type("UserEvent.Renamed")
            .entity_id("a1")
            .seq(2)
            .payload(
                encode_payload(&Renamed {
                    name: "bob".into(),
                })
                .unwrap(),
            )
            .time(1_700_000_000)
            .metadata(Metadata::new().with_user_id("u-1"))
            .build()
    }

    #[test]
    fn envelope_encoding_keeps_every_field() {
        let env = sample();
        let bytes = env.encode().unwrap();
        assert!(!bytes.contains(&b'\n'));

        let back = Envelope::decode(&bytes).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.metadata().user_id(), Some("u-1"));
        assert_eq!(
            back.payload_as::<Renamed>().unwrap(),
            Renamed {
                name: "bob".into()
            }
        );
    }

    #[test]
    fn expiry_is_inclusive() {
        let env = sample();
        assert!(!env.is_expired(i64::MAX));

        let expiring = Envelope::builder()
            .id("x")
            .event_type("Ping")
            .entity_id("p")
            .seq(1)
            .payload(Value::Null)
            .time(10)
            .expired_at(20)
            .build();
        assert!(!expiring.is_expired(19));
        assert!(expiring.is_expired(20));
    }

    #[test]
    fn payload_decode_mismatch_is_serde_error() {
        let env = sample();
        let err = env.payload_as::<u64>().unwrap_err();
        assert!(matches!(err, crate::error::DomainError::Serde { .. }));
    }
}
