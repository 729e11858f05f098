//! # Bank Journal Demo
//!
//! Runs a bank-account journal end to end on the in-memory backend:
//! 1. Commands go through the [`ShardedJournal`](persistent_actors::journal::ShardedJournal)
//!    to per-account persistent entities.
//! 2. Each account's read side projects its log into a `balance:<account>` row.
//! 3. The demo waits for the projections to catch up and logs them.
//!
//! Pass a TOML file as the first argument to override the runtime settings.

use async_trait::async_trait;
use persistent_actors::framework::{ActorError, Message};
use persistent_actors::journal::{spawn_journal, JournalDomain};
use persistent_actors::persistence::{
    InMemoryPersistenceProvider, MemoryMutation, MemorySequenceTracker, MemoryStore,
    PersistentEvent, StorageError,
};
use persistent_actors::persistent_actor::{PersistentBehavior, PersistentContext};
use persistent_actors::runtime::{setup_tracing, RuntimeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
enum AccountCommand {
    Deposit { account: String, amount: u64 },
    Withdraw { account: String, amount: u64 },
    Balance { account: String },
}

impl AccountCommand {
    fn account(&self) -> &str {
        match self {
            AccountCommand::Deposit { account, .. }
            | AccountCommand::Withdraw { account, .. }
            | AccountCommand::Balance { account } => account,
        }
    }
}

/// Events carry the resulting balance so the projection is a plain overwrite.
#[derive(Debug, Clone)]
enum AccountEvent {
    Deposited { amount: u64, balance: u64 },
    Withdrawn { amount: u64, balance: u64 },
}

#[derive(Debug, Clone, thiserror::Error)]
enum BankError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },
}

struct Account {
    balance: u64,
}

#[async_trait]
impl PersistentBehavior for Account {
    type Event = AccountEvent;

    // Replaced by the journal with the account ID.
    fn persistence_id(&self) -> String {
        String::new()
    }

    async fn receive(
        &mut self,
        ctx: &mut PersistentContext<'_, AccountEvent>,
        message: Message,
    ) -> Result<(), ActorError> {
        let command = message
            .downcast::<AccountCommand>()
            .map_err(|m| ActorError::UnexpectedMessage(m.type_name()))?;

        let reply: Result<u64, BankError> = match command {
            AccountCommand::Deposit { amount, .. } => {
                let balance = self.balance + amount;
                ctx.persist(AccountEvent::Deposited { amount, balance }).await?;
                Ok(balance)
            }
            AccountCommand::Withdraw { amount, .. } if amount > self.balance => {
                Err(BankError::InsufficientFunds {
                    balance: self.balance,
                    requested: amount,
                })
            }
            AccountCommand::Withdraw { amount, .. } => {
                let balance = self.balance - amount;
                ctx.persist(AccountEvent::Withdrawn { amount, balance }).await?;
                Ok(balance)
            }
            AccountCommand::Balance { .. } => Ok(self.balance),
        };
        ctx.reply(reply).await
    }

    fn handle_event(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Deposited { balance, .. } | AccountEvent::Withdrawn { balance, .. } => {
                self.balance = *balance;
            }
        }
    }
}

struct Bank {
    shard_count: usize,
    store: MemoryStore,
}

#[async_trait]
impl JournalDomain for Bank {
    type Event = AccountEvent;
    type Entity = Account;
    type Mutation = MemoryMutation;

    fn name(&self) -> &str {
        "bank"
    }

    fn shard_of(&self, message: &Message) -> usize {
        let account = message
            .downcast_ref::<AccountCommand>()
            .map_or("", AccountCommand::account);
        let hash = account
            .bytes()
            .fold(0usize, |h, b| h.wrapping_mul(31).wrapping_add(usize::from(b)));
        hash % self.shard_count.max(1)
    }

    fn entity_id_of(&self, message: &Message) -> String {
        message
            .downcast_ref::<AccountCommand>()
            .map_or_else(String::new, |c| c.account().to_string())
    }

    fn create_entity(&self, _entity_id: &str) -> Account {
        Account { balance: 0 }
    }

    async fn read_event(
        &self,
        entity_id: &str,
        event: &PersistentEvent<AccountEvent>,
    ) -> Result<MemoryMutation, StorageError> {
        let (AccountEvent::Deposited { balance, .. } | AccountEvent::Withdrawn { balance, .. }) =
            &event.event;
        Ok(self
            .store
            .set_row(format!("balance:{entity_id}"), balance.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(path)?,
        None => {
            let mut config = RuntimeConfig::default();
            config.timeouts.event_poll_interval_ms = 50;
            config
        }
    };
    info!(?config, "Starting bank journal");

    let store = MemoryStore::new();
    let provider = Arc::new(InMemoryPersistenceProvider::<AccountEvent>::new());
    let tracker = Arc::new(MemorySequenceTracker::new(store.clone()));
    let bank = Bank {
        shard_count: config.sharding.shard_count,
        store: store.clone(),
    };
    let ask_timeout = config.ask_timeout();
    let journal = spawn_journal(bank, provider, tracker, config);

    let commands = [
        AccountCommand::Deposit {
            account: "alice".into(),
            amount: 100,
        },
        AccountCommand::Deposit {
            account: "bob".into(),
            amount: 40,
        },
        AccountCommand::Withdraw {
            account: "alice".into(),
            amount: 30,
        },
        AccountCommand::Withdraw {
            account: "bob".into(),
            amount: 75,
        },
        AccountCommand::Balance {
            account: "bob".into(),
        },
    ];
    for command in commands {
        let reply = journal
            .ask_with_timeout(command.clone(), ask_timeout)
            .await?
            .downcast::<Result<u64, BankError>>()
            .map_err(|m| ActorError::UnexpectedMessage(m.type_name()))?;
        match reply {
            Ok(balance) => info!(account = command.account(), balance, ?command, "Command accepted"),
            Err(e) => warn!(account = command.account(), error = %e, "Command rejected"),
        }
    }

    let expected = [("alice", "70"), ("bob", "40")];
    let caught_up = tokio::time::timeout(Duration::from_secs(5), async {
        while expected.iter().any(|(account, balance)| {
            store.row(&format!("balance:{account}")).as_deref() != Some(*balance)
        }) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if caught_up.is_err() {
        warn!("Projections did not catch up in time");
    }
    for (account, _) in expected {
        let offset = store.offset(&format!("bank:{account}"));
        info!(
            account,
            balance = ?store.row(&format!("balance:{account}")),
            ?offset,
            "Projected balance"
        );
    }

    journal.stop();
    journal.stopped().await;
    info!("Bank journal stopped");
    Ok(())
}
