//! Bot runner
//!
//! Wires the gateway, custody store and session engine together, then pumps
//! events from the transport into one actor task per user. An actor handles its
//! user's events strictly in arrival order; actors of different users run in
//! parallel. An actor with nothing to do for a while exits; its replacement
//! starts only after it has finished.

use crate::chain::{ChainGateway, RpcGateway};
use crate::config::{Config, RpcConfig};
use crate::custody::{FileKeyStore, UserId};
use crate::execution::TradeJournal;
use crate::market::{ExplorerHolderLookup, HolderLookup, NoHolderLookup};
use crate::session::SessionEngine;
use crate::transport::{ChatTransport, InboundEvent};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How long an actor waits for its user's next event before exiting
const ACTOR_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Live actor of one user
struct ActorHandle {
    events: mpsc::UnboundedSender<InboundEvent>,
    /// Resolves (closed) once the actor task has returned
    finished: oneshot::Receiver<()>,
}

/// Dispatches transport events to per-user actors
pub struct BotRunner {
    engine: Arc<SessionEngine>,
    transport: Arc<dyn ChatTransport>,
    idle_timeout: Duration,
}

impl BotRunner {
    pub fn new(engine: Arc<SessionEngine>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            engine,
            transport,
            idle_timeout: ACTOR_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Connect to the chain and open the store described by `config`
    pub async fn from_config(
        config: &Config,
        rpc: &RpcConfig,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let poll = Duration::from_millis(config.trading.approval_poll_ms);
        let rpc_gateway = RpcGateway::connect(rpc, &config.chain, poll).await?;
        let chain_id = rpc_gateway.chain_id();
        let gateway: Arc<dyn ChainGateway> = Arc::new(rpc_gateway);
        let store = Arc::new(FileKeyStore::open(&config.storage.data_dir).await?);

        let holders: Arc<dyn HolderLookup> = if config.holders.enabled {
            Arc::new(ExplorerHolderLookup::new(&config.holders)?)
        } else {
            Arc::new(NoHolderLookup)
        };
        let journal = config.journal_path.as_ref().map(TradeJournal::new);
        if let Some(path) = &config.journal_path {
            info!(path = %path, "Trade journal enabled");
        }

        let engine = SessionEngine::new(config, gateway, store, holders, journal)?;
        info!(
            chain_id,
            data_dir = %config.storage.data_dir,
            executor = %config.chain.executor(),
            "Swap desk ready"
        );
        Ok(Self::new(Arc::new(engine), transport))
    }

    /// Run until the transport closes, then let every actor drain its queue
    pub async fn run(&self) -> Result<()> {
        let mut actors: HashMap<UserId, ActorHandle> = HashMap::new();
        let mut tasks = JoinSet::new();

        while let Some(event) = self.transport.next_event().await {
            let user_id = event.user_id;
            let event = match actors.get(&user_id) {
                Some(actor) => match actor.events.send(event) {
                    Ok(()) => continue,
                    // Actor went idle, start a fresh one with the same event
                    Err(mpsc::error::SendError(event)) => event,
                },
                None => event,
            };

            let previous = actors.remove(&user_id).map(|actor| actor.finished);
            let (tx, rx) = mpsc::unbounded_channel();
            let (done, finished) = oneshot::channel();
            tasks.spawn(actor(
                user_id,
                rx,
                previous,
                done,
                self.engine.clone(),
                self.transport.clone(),
                self.idle_timeout,
            ));
            debug!(user_id, "Started session actor");
            if tx.send(event).is_err() {
                warn!(user_id, "Session actor exited before its first event");
            }
            actors.insert(user_id, ActorHandle { events: tx, finished });

            if reap(&mut tasks) > 0 {
                actors.retain(|_, actor| {
                    !matches!(actor.finished.try_recv(), Err(oneshot::error::TryRecvError::Closed))
                });
            }
        }

        info!(actors = actors.len(), "Transport closed, draining sessions");
        drop(actors);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Session actor panicked");
            }
        }
        Ok(())
    }
}

/// Collect finished actor tasks without waiting
fn reap(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            warn!(error = %e, "Session actor panicked");
        }
        reaped += 1;
    }
    reaped
}

async fn actor(
    user_id: UserId,
    mut events: mpsc::UnboundedReceiver<InboundEvent>,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
    engine: Arc<SessionEngine>,
    transport: Arc<dyn ChatTransport>,
    idle_timeout: Duration,
) {
    // Events the previous actor already accepted come first
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        match tokio::time::timeout(idle_timeout, events.recv()).await {
            Ok(Some(event)) => deliver(&engine, transport.as_ref(), event).await,
            Ok(None) => break,
            Err(_) => {
                // Refuse new events, then finish the ones that raced the timeout
                events.close();
                while let Some(event) = events.recv().await {
                    deliver(&engine, transport.as_ref(), event).await;
                }
                break;
            }
        }
    }
    debug!(user_id, "Session actor stopped");
}

async fn deliver(engine: &SessionEngine, transport: &dyn ChatTransport, event: InboundEvent) {
    let reply = engine.handle_event(event.user_id, &event.payload).await;
    if let Err(e) = transport.send(event.chat_id, &reply).await {
        warn!(
            user_id = event.user_id,
            chat_id = event.chat_id,
            error = %e,
            "Reply not delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{KeyStore, MemoryKeyStore};
    use crate::session::Reply;
    use crate::testing::{MockGateway, TEST_KEY};
    use crate::transport::{ChatId, Payload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script and records every reply
    struct ScriptedTransport {
        inbound: Mutex<VecDeque<InboundEvent>>,
        sent: Mutex<Vec<(ChatId, String)>>,
        /// Pause before each inbound event
        pace: Duration,
    }

    impl ScriptedTransport {
        fn new(events: Vec<InboundEvent>) -> Self {
            Self {
                inbound: Mutex::new(events.into()),
                sent: Mutex::new(Vec::new()),
                pace: Duration::ZERO,
            }
        }

        fn paced(events: Vec<InboundEvent>, pace: Duration) -> Self {
            Self {
                pace,
                ..Self::new(events)
            }
        }

        fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat_id)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn next_event(&self) -> Option<InboundEvent> {
            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            self.inbound.lock().unwrap().pop_front()
        }

        async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, reply.text.clone()));
            Ok(())
        }
    }

    fn event(user_id: UserId, payload: Payload) -> InboundEvent {
        InboundEvent {
            user_id,
            chat_id: user_id * 10,
            payload,
        }
    }

    #[tokio::test]
    async fn test_events_of_each_user_are_handled_in_order() {
        let store = Arc::new(MemoryKeyStore::new());
        let engine = SessionEngine::new(
            &Config::default(),
            Arc::new(MockGateway::new()),
            store.clone(),
            Arc::new(NoHolderLookup),
            None,
        )
        .unwrap();

        let script = vec![
            event(1, Payload::Action("connect_wallet".into())),
            event(2, Payload::Text("/start".into())),
            event(1, Payload::Text(TEST_KEY.into())),
            event(2, Payload::Action("connect_wallet".into())),
            event(1, Payload::Action("cancel_trade".into())),
            event(2, Payload::Action("cancel_trade".into())),
        ];
        let transport = Arc::new(ScriptedTransport::new(script));
        let runner = BotRunner::new(Arc::new(engine), transport.clone());

        tokio_test::assert_ok!(runner.run().await);

        let first = transport.sent_to(10);
        assert_eq!(first.len(), 3);
        assert!(first[0].contains("PRIVATE KEY"));
        assert!(first[1].starts_with("Wallet connected!"));
        assert_eq!(first[2], "Trade cancelled.");

        let second = transport.sent_to(20);
        assert_eq!(second.len(), 3);
        assert!(second[0].starts_with("Welcome"));
        assert!(second[1].contains("PRIVATE KEY"));
        assert_eq!(second[2], "Trade cancelled.");

        assert!(store.load(1).await.unwrap().is_some());
        assert!(store.load(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_actors_exit_and_respawn_in_order() {
        let store = Arc::new(MemoryKeyStore::new());
        let engine = SessionEngine::new(
            &Config::default(),
            Arc::new(MockGateway::new()),
            store.clone(),
            Arc::new(NoHolderLookup),
            None,
        )
        .unwrap();

        let script = vec![
            event(1, Payload::Action("connect_wallet".into())),
            event(1, Payload::Text(TEST_KEY.into())),
            event(2, Payload::Text("/start".into())),
            event(1, Payload::Action("cancel_trade".into())),
        ];
        let transport = Arc::new(ScriptedTransport::paced(script, Duration::from_millis(25)));
        let runner = BotRunner::new(Arc::new(engine), transport.clone())
            .with_idle_timeout(Duration::from_millis(1));

        tokio_test::assert_ok!(runner.run().await);

        let first = transport.sent_to(10);
        assert_eq!(first.len(), 3);
        assert!(first[0].contains("PRIVATE KEY"));
        assert!(first[1].starts_with("Wallet connected!"));
        assert_eq!(first[2], "Trade cancelled.");
        assert_eq!(transport.sent_to(20).len(), 1);
        assert!(store.load(1).await.unwrap().is_some());
    }
}
