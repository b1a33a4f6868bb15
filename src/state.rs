//! State Store. A single mutable `RuntimeState` behind a mutual-exclusion
//! primitive, with a change-feed for observers. Grounded in
//! `core/state.py`'s `StateManager` (lock-guarded state, subscriber list,
//! per-subscriber error isolation), translated to `tokio::sync::Mutex` the
//! way `execution.rs` wraps engine state in `Arc<Mutex<_>>`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
    SimRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub bot_state: BotState,
    pub active_levels: Vec<usize>,
    pub pnl_realized: f64,
    pub pnl_unrealized: f64,
    pub inventory: HashMap<String, f64>,
    pub last_error: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            bot_state: BotState::Stopped,
            active_levels: Vec::new(),
            pnl_realized: 0.0,
            pnl_unrealized: 0.0,
            inventory: HashMap::new(),
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StateEvent {
    StateChange { old: BotState, new: BotState },
    PnlUpdate { realized: f64, unrealized: f64 },
    InventoryUpdate { inventory: HashMap<String, f64> },
    LevelsUpdate { levels: Vec<usize> },
    Error { message: String },
    Reset,
}

type Subscriber = Box<dyn Fn(&StateEvent) + Send + Sync>;

pub struct StateStore {
    state: Mutex<RuntimeState>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RuntimeState::default()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub async fn snapshot(&self) -> RuntimeState {
        self.state.lock().await.clone()
    }

    pub async fn set_bot_state(&self, new: BotState) {
        let old = {
            let mut guard = self.state.lock().await;
            let old = guard.bot_state;
            guard.bot_state = new;
            old
        };
        log::info!("state transition: {:?} -> {:?}", old, new);
        self.notify(StateEvent::StateChange { old, new }).await;
    }

    pub async fn update_pnl(&self, realized: Option<f64>, unrealized: Option<f64>) {
        let (realized, unrealized) = {
            let mut guard = self.state.lock().await;
            if let Some(r) = realized {
                guard.pnl_realized = r;
            }
            if let Some(u) = unrealized {
                guard.pnl_unrealized = u;
            }
            (guard.pnl_realized, guard.pnl_unrealized)
        };
        self.notify(StateEvent::PnlUpdate { realized, unrealized }).await;
    }

    pub async fn update_inventory(&self, inventory: HashMap<String, f64>) {
        {
            let mut guard = self.state.lock().await;
            guard.inventory = inventory.clone();
        }
        self.notify(StateEvent::InventoryUpdate { inventory }).await;
    }

    pub async fn set_active_levels(&self, levels: Vec<usize>) {
        {
            let mut guard = self.state.lock().await;
            guard.active_levels = levels.clone();
        }
        self.notify(StateEvent::LevelsUpdate { levels }).await;
    }

    pub async fn set_error(&self, message: String) {
        {
            let mut guard = self.state.lock().await;
            guard.bot_state = BotState::Error;
            guard.last_error = Some(message.clone());
        }
        log::error!("engine error: {}", message);
        self.notify(StateEvent::Error { message }).await;
    }

    pub async fn clear_error(&self) {
        let mut guard = self.state.lock().await;
        guard.last_error = None;
    }

    pub async fn reset(&self) {
        {
            let mut guard = self.state.lock().await;
            *guard = RuntimeState::default();
        }
        self.notify(StateEvent::Reset).await;
    }

    pub async fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&StateEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().await.push(Box::new(callback));
    }

    /// Subscribers are invoked on the writer's context and must be
    /// non-blocking; a subscriber that panics is caught and logged rather
    /// than allowed to break the publish loop for the remaining
    /// subscribers (mirrors `StateManager._notify_subscribers`'s
    /// per-callback try/except in `core/state.py`).
    async fn notify(&self, event: StateEvent) {
        let subscribers = self.subscribers.lock().await;
        for sub in subscribers.iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sub(&event)));
            if let Err(_) = result {
                log::error!("state store subscriber panicked; continuing");
            }
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(RuntimeState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn state_transitions_notify_subscribers() {
        let store = StateStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        store
            .subscribe(move |_event| {
                count2.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        store.set_bot_state(BotState::Running).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().await.bot_state, BotState::Running);
    }

    #[tokio::test]
    async fn reset_clears_active_levels_and_error() {
        let store = StateStore::new();
        store.set_active_levels(vec![0, 1, 2]).await;
        store.set_error("boom".to_string()).await;
        store.reset().await;
        let snap = store.snapshot().await;
        assert!(snap.active_levels.is_empty());
        assert!(snap.last_error.is_none());
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_break_others() {
        let store = StateStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        store.subscribe(|_event| panic!("misbehaving observer")).await;
        store
            .subscribe(move |_event| {
                count2.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        store.set_bot_state(BotState::Running).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
