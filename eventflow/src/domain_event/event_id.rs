use uuid::Uuid;

// 固定命名空间，保证同一 (entity_id, seq) 在任何进程中派生出相同的事件 ID
const EVENT_NAMESPACE: Uuid = Uuid::from_u128(0x6b7e_2f0a_91c4_4d5e_8a3b_0f1e_2d3c_4b5a);

/// 由实体 ID 与序号派生确定性的事件 ID
pub fn event_id(entity_id: &str, seq: u64) -> String {
    Uuid::new_v5(&EVENT_NAMESPACE, format!("{entity_id}:{seq}").as_bytes()).to_string()
}

/// 独立事件（无聚合序列链）使用全局唯一 ID
pub fn standalone_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_deterministic() {
        assert_eq!(event_id("a1", 1), event_id("a1", 1));
        assert_ne!(event_id("a1", 1), event_id("a1", 2));
        assert_ne!(event_id("a1", 12), event_id("a11", 2));
    }

    #[test]
    fn standalone_ids_are_unique() {
        assert_ne!(standalone_event_id(), standalone_event_id());
    }
}
