use anyhow::Context as _;
use async_trait::async_trait;
use eventflow::context::Context;
use eventflow::deadletter::{
    DeadLetterConfig, DeadLetterQueue, DeadLetterRecord, DeadLetterStorage, HandlerInput,
    InMemoryDeadLetterStorage,
};
use eventflow::domain_event::Envelope;
use eventflow::error::{DomainError, DomainResult};
use eventflow::eventing::{Dispatcher, EventHandler, Operation, Record, Simple};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn record(id: &str) -> Record {
    Record::insert(
        Envelope::builder()
            .id(id)
            .event_type("OrderPlaced")
            .entity_id("order-1")
            .seq(1)
            .payload(json!({"id": id}))
            .time(0)
            .build(),
    )
}

/// 前 `fail_times` 次调用失败，之后成功
struct Flaky {
    calls: AtomicUsize,
    fail_times: usize,
}

impl Flaky {
    fn always() -> Self {
        Self::failing(usize::MAX)
    }

    fn failing(fail_times: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_times,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for Flaky {
    fn handler_name(&self) -> &str {
        "billing"
    }

    async fn handle(&self, _ctx: &Context, events: &[Envelope]) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            return Err(anyhow::anyhow!("payment gateway timeout"))
                .context(HandlerInput::new(json!({"events": events.len()})));
        }
        Ok(())
    }
}

fn queue(storage: &InMemoryDeadLetterStorage, max_retry: u32) -> DeadLetterQueue {
    DeadLetterQueue::new(
        Arc::new(storage.clone()),
        DeadLetterConfig::builder()
            .service("orders")
            .function("billing-consumer")
            .version("1.4.0")
            .max_retry(max_retry)
            .build(),
    )
}

#[tokio::test]
async fn exhausted_retries_dead_letter_the_batch() -> anyhow::Result<()> {
    let storage = InMemoryDeadLetterStorage::new();
    let handler = Arc::new(Flaky::always());
    let dispatcher = Dispatcher::new(Simple)
        .with_handler(handler.clone())
        .with_dead_letter(queue(&storage, 3));

    let batch = vec![
        record("1"),
        Record::new(Operation::Modify, record("2").envelope),
    ];
    dispatcher.process(&Context::new(), &batch).await?;

    assert_eq!(handler.calls(), 3);

    let records = storage.records();
    assert_eq!(records.len(), 1);
    let dead = &records[0];
    assert_eq!(dead.service, "orders");
    assert_eq!(dead.function, "billing-consumer");
    assert_eq!(dead.version, "1.4.0");
    assert_eq!(dead.errors.len(), 3);
    assert_eq!(dead.batch, serde_json::to_value(&batch)?);
    assert_eq!(dead.batch[1]["operation"], "MODIFY");

    let first = &dead.errors[0];
    assert!(first.message.contains("handler=billing"));
    assert_eq!(first.cause.as_deref(), Some("payment gateway timeout"));
    assert_eq!(first.input, Some(json!({"events": 1})));
    Ok(())
}

#[tokio::test]
async fn recovery_within_budget_resets_queue() -> anyhow::Result<()> {
    let storage = InMemoryDeadLetterStorage::new();
    let handler = Arc::new(Flaky::failing(1));
    let dispatcher = Dispatcher::new(Simple)
        .with_handler(handler.clone())
        .with_dead_letter(queue(&storage, 3));

    dispatcher.process(&Context::new(), &[record("1")]).await?;
    assert_eq!(handler.calls(), 2);
    assert!(storage.records().is_empty());

    // 预算已复位：下一批仍有完整的 3 次尝试
    let always = Arc::new(Flaky::always());
    let dispatcher = Dispatcher::new(Simple)
        .with_handler(always.clone())
        .with_dead_letter(queue(&storage, 3));
    dispatcher.process(&Context::new(), &[record("2")]).await?;
    dispatcher.process(&Context::new(), &[record("3")]).await?;
    assert_eq!(always.calls(), 6);
    assert_eq!(storage.records().len(), 2);
    assert!(storage.records().iter().all(|r| r.errors.len() == 3));
    Ok(())
}

#[tokio::test]
async fn zero_budget_dead_letters_after_single_attempt() -> anyhow::Result<()> {
    let storage = InMemoryDeadLetterStorage::new();
    let handler = Arc::new(Flaky::always());
    let dispatcher = Dispatcher::new(Simple)
        .with_handler(handler.clone())
        .with_dead_letter(queue(&storage, 0));

    dispatcher.process(&Context::new(), &[record("1")]).await?;
    assert_eq!(handler.calls(), 1);
    assert_eq!(storage.records()[0].errors.len(), 1);
    Ok(())
}

#[tokio::test]
async fn without_dead_letter_error_is_returned() {
    let handler = Arc::new(Flaky::always());
    let dispatcher = Dispatcher::new(Simple).with_handler(handler.clone());

    let err = dispatcher
        .process(&Context::new(), &[record("1")])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Handler { ref handler, .. } if handler == "billing"));
    assert_eq!(handler.calls(), 1);
}

struct UnavailableStorage;

#[async_trait]
impl DeadLetterStorage for UnavailableStorage {
    async fn save(&self, _ctx: &Context, _record: &DeadLetterRecord) -> DomainResult<()> {
        Err(DomainError::DeadLetter {
            reason: "bucket unavailable".into(),
        })
    }
}

#[tokio::test]
async fn failed_dead_letter_save_surfaces_error() {
    let handler = Arc::new(Flaky::always());
    let dispatcher = Dispatcher::new(Simple)
        .with_handler(handler.clone())
        .with_dead_letter(DeadLetterQueue::new(
            Arc::new(UnavailableStorage),
            DeadLetterConfig::builder().max_retry(2).build(),
        ));

    let err = dispatcher
        .process(&Context::new(), &[record("1")])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DeadLetter { .. }));
    assert_eq!(handler.calls(), 2);
}
