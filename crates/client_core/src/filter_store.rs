//! Session-wide facet selection with synchronous change notification.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError, RwLock,
};

use shared::filters::{FilterField, FilterState, FilterUpdate};
use tracing::debug;

pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&FilterChange) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSnapshot {
    /// Bumped once per mutation that changed at least one field.
    pub revision: u64,
    pub state: FilterState,
}

/// Delivered to every subscriber after a `set` or `reset` has fully settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChange {
    pub revision: u64,
    pub previous: FilterState,
    pub state: FilterState,
    pub fields: Vec<FilterField>,
}

impl FilterChange {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn touches(&self, field: FilterField) -> bool {
        self.fields.contains(&field)
    }

    /// True when the set of matching results may differ.
    pub fn affects_results(&self) -> bool {
        self.fields.iter().any(|field| !field.is_presentation())
    }

    pub fn affects_query_scope(&self) -> bool {
        self.fields.iter().any(|field| field.is_query_scope())
    }
}

/// Single source of truth for the active [`FilterState`].
///
/// Writers are UI events, one at a time. Every `set`/`reset` notifies all subscribers in
/// subscription order before returning, and each subscriber sees the fully-settled state.
pub struct FilterStore {
    current: RwLock<FilterSnapshot>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStore {
    pub fn new() -> Self {
        Self::with_initial(FilterState::default())
    }

    /// Starts the session from a seeded state (e.g. URL parameters) without notifying anyone.
    pub fn with_initial(state: FilterState) -> Self {
        Self {
            current: RwLock::new(FilterSnapshot { revision: 0, state }),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> FilterState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, update: FilterUpdate) -> FilterChange {
        debug!(?update, "filter update");
        self.mutate(|state| state.apply(update))
    }

    pub fn reset(&self) -> FilterChange {
        self.mutate(|state| {
            let defaults = FilterState::default();
            let fields = state.diff(&defaults);
            *state = defaults;
            fields
        })
    }

    pub fn subscribe(
        &self,
        subscriber: impl Fn(&FilterChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    fn mutate(&self, apply: impl FnOnce(&mut FilterState) -> Vec<FilterField>) -> FilterChange {
        let change = {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let previous = current.state.clone();
            let fields = apply(&mut current.state);
            if !fields.is_empty() {
                current.revision += 1;
            }
            FilterChange {
                revision: current.revision,
                previous,
                state: current.state.clone(),
                fields,
            }
        };

        // Subscribers run without any store lock held so they may read or write the store.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&change);
        }
        change
    }
}

#[cfg(test)]
#[path = "tests/filter_store_tests.rs"]
mod tests;
