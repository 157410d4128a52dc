use anyhow::Context as _;
use async_trait::async_trait;
use eventflow::aggregate::{Aggregate, AggregateRoot};
use eventflow::context::Context;
use eventflow::deadletter::{
    DeadLetterConfig, DeadLetterQueue, HandlerInput, InMemoryDeadLetterStorage,
};
use eventflow::domain_event::{Envelope, Metadata};
use eventflow::error::{DomainError, DomainResult};
use eventflow::eventing::{
    Dispatcher, ErrorHandler, EventHandler, HandledEventType, PartitionByKey, Record,
    install_panic_hook,
};
use eventflow::persist::{EventStore, EventStoreConfig, InMemoryEventStorage};
use eventflow_macros::{aggregate_root, domain_event};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[aggregate_root(event = AccountEvent)]
#[derive(Clone)]
struct Account {
    opened: bool,
    balance: i64,
}

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("account already opened")]
    AlreadyOpened,
    #[error("account not opened")]
    NotOpened,
    #[error("insufficient funds")]
    InsufficientFunds,
}

#[domain_event]
enum AccountEvent {
    #[event(event_type = "account.opened")]
    Opened { initial_balance: i64 },
    #[event(event_type = "account.deposited")]
    Deposited { amount: i64 },
    #[event(event_type = "account.withdrawn")]
    Withdrawn { amount: i64 },
}

impl Account {
    fn open(&mut self, initial_balance: i64) -> Result<(), AccountError> {
        if self.opened {
            return Err(AccountError::AlreadyOpened);
        }
        self.opened = true;
        self.balance = initial_balance;
        self.publish(AccountEvent::Opened { initial_balance });
        Ok(())
    }

    fn deposit(&mut self, amount: i64) -> Result<(), AccountError> {
        if !self.opened {
            return Err(AccountError::NotOpened);
        }
        self.balance += amount;
        self.publish(AccountEvent::Deposited { amount });
        Ok(())
    }

    fn withdraw(&mut self, amount: i64) -> Result<(), AccountError> {
        if !self.opened {
            return Err(AccountError::NotOpened);
        }
        if self.balance < amount {
            return Err(AccountError::InsufficientFunds);
        }
        self.balance -= amount;
        self.publish(AccountEvent::Withdrawn { amount });
        Ok(())
    }
}

impl Aggregate for Account {
    fn apply(&mut self, envelope: &Envelope) -> DomainResult<()> {
        match envelope.payload_as::<AccountEvent>()? {
            AccountEvent::Opened { initial_balance } => {
                self.opened = true;
                self.balance = initial_balance;
            }
            AccountEvent::Deposited { amount } => self.balance += amount,
            AccountEvent::Withdrawn { amount } => self.balance -= amount,
        }
        Ok(())
    }
}

/// 余额投影：按账户累计资金流水，按序号去重（重试时会收到重复消息）
#[derive(Default)]
struct BalanceProjection {
    balances: Mutex<HashMap<String, (u64, i64)>>,
}

#[async_trait]
impl EventHandler for BalanceProjection {
    fn handler_name(&self) -> &str {
        "balance-projection"
    }

    async fn handle(&self, _ctx: &Context, events: &[Envelope]) -> anyhow::Result<()> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|e| anyhow::anyhow!("projection poisoned: {e}"))?;
        for env in events {
            let delta = match env.payload_as::<AccountEvent>()? {
                AccountEvent::Opened { initial_balance } => initial_balance,
                AccountEvent::Deposited { amount } => amount,
                AccountEvent::Withdrawn { amount } => -amount,
            };
            let (seen, balance) = balances.entry(env.entity_id().to_string()).or_default();
            if env.seq() > *seen {
                *seen = env.seq();
                *balance += delta;
            }
        }
        Ok(())
    }
}

/// 大额取款通知：下游网关不可用时失败
struct LargeWithdrawalNotifier {
    threshold: i64,
}

#[async_trait]
impl EventHandler for LargeWithdrawalNotifier {
    fn handler_name(&self) -> &str {
        "large-withdrawal-notifier"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("account.withdrawn".into())
    }

    async fn handle(&self, _ctx: &Context, events: &[Envelope]) -> anyhow::Result<()> {
        for env in events {
            if let AccountEvent::Withdrawn { amount } = env.payload_as::<AccountEvent>()? {
                if amount >= self.threshold {
                    return Err(anyhow::anyhow!("notification gateway unavailable")).context(
                        HandlerInput::new(serde_json::json!({
                            "account": env.entity_id(),
                            "amount": amount,
                        })),
                    );
                }
            }
        }
        Ok(())
    }
}

struct LogOnError;

#[async_trait]
impl ErrorHandler for LogOnError {
    async fn on_error(
        &self,
        _ctx: &Context,
        events: &[Envelope],
        error: &DomainError,
    ) -> anyhow::Result<()> {
        tracing::warn!(messages = events.len(), %error, "unit failed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
    install_panic_hook();

    let storage = Arc::new(InMemoryEventStorage::new());
    let store = EventStore::new(storage.clone())
        .with_config(EventStoreConfig::builder().snapshot_version(1).build());
    let ctx = Context::new().with_metadata(
        Metadata::default()
            .with_user_id("teller-7")
            .with_correlation_id("demo-run"),
    );

    // 开户、存取款
    for (id, ops) in [("acc-1", [1000, 500, -200]), ("acc-2", [300, 50, -5000])] {
        let mut account = Account::default();
        store.get_aggregate(&ctx, id, &mut account).await?;
        account.open(ops[0])?;
        account.deposit(ops[1])?;
        store.save(&ctx, &mut account).await?;

        match account.withdraw(-ops[2]) {
            Ok(()) => store.save(&ctx, &mut account).await?,
            Err(e) => tracing::info!(account = id, error = %e, "withdrawal rejected"),
        }
    }

    // 重新加载并打印状态
    let mut loaded = Account::default();
    store.get_aggregate(&ctx, "acc-1", &mut loaded).await?;
    tracing::info!(
        id = loaded.id(),
        balance = loaded.balance,
        sequence = loaded.sequence(),
        "reloaded"
    );

    // 将已持久化的事件作为变更日志批次分发
    let mut records = Vec::new();
    for id in ["acc-1", "acc-2"] {
        records.extend(store.get_events(&ctx, id, 0).await?.into_iter().map(Record::insert));
    }

    let projection = Arc::new(BalanceProjection::default());
    let dead_letters = InMemoryDeadLetterStorage::new();
    let dispatcher = Dispatcher::new(PartitionByKey::new())
        .with_handler(projection.clone())
        .with_handler(Arc::new(LargeWithdrawalNotifier { threshold: 100 }))
        .with_error_handler(Arc::new(LogOnError))
        .with_dead_letter(DeadLetterQueue::new(
            Arc::new(dead_letters.clone()),
            DeadLetterConfig::builder()
                .service("accounts")
                .function("account-stream")
                .version(env!("CARGO_PKG_VERSION"))
                .max_retry(2)
                .build(),
        ));

    dispatcher.process(&ctx, &records).await?;

    let balances = projection
        .balances
        .lock()
        .map_err(|e| anyhow::anyhow!("projection poisoned: {e}"))?
        .clone();
    tracing::info!(?balances, "projection");

    for record in dead_letters.records() {
        tracing::info!(
            id = %record.id,
            errors = record.errors.len(),
            first_error = record.errors.first().map(|e| e.message.as_str()),
            "dead letter"
        );
    }

    Ok(())
}
