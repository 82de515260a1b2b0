//! In-process change notifications.
//!
//! Subscribers register a callback per [`EventName`] with [`EventBus::on`].
//! [`EventBus::emit`] calls every callback registered for the event's name, in
//! registration order, before it returns. A failing callback is logged and does
//! not prevent the remaining callbacks from running.
//!
//! Asynchronous observers can instead [`EventBus::watch`] a set of names and
//! receive the events on a subscription channel, after the callbacks ran.

use std::{
    collections::BTreeMap,
    fmt::Display,
    sync::{Arc, Mutex},
};

use pubsub_rs::{Pubsub, Subscriber};
use tally_core::{CurrencyType, Id, SettingType};

use crate::{currencies::Currency, settings::Setting};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventName {
    SettingUpdated,
    CurrencyCreated,
    CurrencyUpdated,
    CurrencyRemoved,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SettingUpdated => "settingUpdated",
            EventName::CurrencyCreated => "currencyCreated",
            EventName::CurrencyUpdated => "currencyUpdated",
            EventName::CurrencyRemoved => "currencyRemoved",
        }
    }
}
impl Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed change, as announced to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    SettingUpdated {
        id: Id<SettingType>,
        setting: Setting,
    },
    CurrencyCreated(Currency),
    CurrencyUpdated(Currency),
    CurrencyRemoved(Id<CurrencyType>),
}

impl StoreEvent {
    pub fn name(&self) -> EventName {
        match self {
            StoreEvent::SettingUpdated { .. } => EventName::SettingUpdated,
            StoreEvent::CurrencyCreated(_) => EventName::CurrencyCreated,
            StoreEvent::CurrencyUpdated(_) => EventName::CurrencyUpdated,
            StoreEvent::CurrencyRemoved(_) => EventName::CurrencyRemoved,
        }
    }
}

type Callback = Arc<dyn Fn(&StoreEvent) -> anyhow::Result<()> + Send + Sync>;

pub struct EventBus {
    callbacks: Mutex<BTreeMap<EventName, Vec<Callback>>>,
    watchers: Pubsub<EventName, StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            callbacks: Mutex::new(BTreeMap::new()),
            watchers: Pubsub::new(),
        }
    }

    /// Register `callback` for `name`. Registrations last as long as the bus.
    pub fn on(
        &self,
        name: EventName,
        callback: impl Fn(&StoreEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.callbacks
            .lock()
            .expect("mutex poisoned")
            .entry(name)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Subscribe to events with any of the given names.
    pub async fn watch(&self, names: Vec<EventName>) -> Subscriber<EventName, StoreEvent> {
        self.watchers.subscribe(names).await
    }

    /// Deliver `event` to the callbacks registered for its name, then to the
    /// watchers. Emitting a name nobody listens to does nothing.
    pub async fn emit(&self, event: StoreEvent) {
        let name = event.name();
        // Callbacks run without the lock, so they may register more callbacks
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .expect("mutex poisoned")
            .get(&name)
            .cloned()
            .unwrap_or_default();
        tracing::debug!(event = %name, subscribers = callbacks.len(), "emitting");
        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(e) = callback(&event) {
                tracing::warn!(
                    event = %name,
                    subscriber = index,
                    "subscriber failed: {:#}",
                    e
                );
            }
        }
        self.watchers.publish(name, event).await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
