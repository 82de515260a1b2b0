//! The currencies an economy can pay out and trade in.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::{CurrencyType, Failure, Id, Outcome};
use tokio::sync::{Mutex, RwLock};
use tracing::{info_span, Instrument as _};

use crate::{
    events::{EventBus, StoreEvent},
    merge::{self, ChangeSet, Handlers},
    store::{Schema, Store},
};

pub const CURRENCIES_FILE: &str = "currencies.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Currency {
    pub id: Id<CurrencyType>,
    pub name: String,
    pub emoji: String,
    pub tradeable: bool,
}

/// A sparse update of a [`Currency`]. `None` fields are left alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CurrencyChanges {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub tradeable: Option<bool>,
}

pub struct CurrencySchema;

impl Schema for CurrencySchema {
    type Kind = CurrencyType;
    type Record = Currency;
    const NAME: &'static str = "currency";

    fn id(record: &Currency) -> &Id<CurrencyType> {
        &record.id
    }

    fn check(record: &Currency) -> Result<(), String> {
        if record.name.trim().is_empty() {
            Err("name is empty".to_owned())
        } else {
            Ok(())
        }
    }
}

fn normalize_name(id: &Id<CurrencyType>, name: &str) -> Outcome<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Failure::InvalidValue {
            id: id.to_string(),
            detail: "currency name must not be empty".to_owned(),
        });
    }
    Ok(name.to_owned())
}

pub struct CurrencyStore {
    store: RwLock<Store<CurrencySchema>>,
    writer: Mutex<()>,
    events: Arc<EventBus>,
}

impl CurrencyStore {
    pub fn new(store: Store<CurrencySchema>, events: Arc<EventBus>) -> Self {
        CurrencyStore {
            store: RwLock::new(store),
            writer: Mutex::new(()),
            events,
        }
    }

    pub async fn open(location: impl Into<PathBuf>, events: Arc<EventBus>) -> Outcome<Self> {
        let store = Store::open(location).await?;
        Ok(Self::new(store, events))
    }

    pub async fn get(&self, id: &Id<CurrencyType>) -> Option<Currency> {
        self.store.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Currency> {
        self.store.read().await.get_all().cloned().collect()
    }

    pub async fn to_serializable(&self) -> Value {
        self.store.read().await.to_serializable()
    }

    /// Add a new currency. Fails with [`Failure::AlreadyExists`] if the id is
    /// taken.
    pub async fn create(&self, currency: Currency) -> Outcome<Currency> {
        let span = info_span!("create_currency", id = %currency.id);
        self.create_impl(currency).instrument(span).await
    }

    /// Apply `changes` to an existing currency.
    pub async fn update(
        &self,
        id: &Id<CurrencyType>,
        changes: &CurrencyChanges,
    ) -> Outcome<Currency> {
        self.update_impl(id, changes)
            .instrument(info_span!("update_currency", id = %id))
            .await
    }

    /// Delete a currency. Returns the removed record.
    pub async fn remove(&self, id: &Id<CurrencyType>) -> Outcome<Currency> {
        self.remove_impl(id)
            .instrument(info_span!("remove_currency", id = %id))
            .await
    }

    async fn create_impl(&self, mut currency: Currency) -> Outcome<Currency> {
        let _writer = self.writer.lock().await;
        currency.name = normalize_name(&currency.id, &currency.name)?;
        {
            let mut store = self.store.write().await;
            if store.contains(&currency.id) {
                return Err(Failure::AlreadyExists {
                    store: CurrencySchema::NAME,
                    id: currency.id.to_string(),
                });
            }
            store.insert(currency.clone());
            store.persist().await?;
        }
        tracing::info!(name = currency.name.as_str(), "currency created");
        self.events
            .emit(StoreEvent::CurrencyCreated(currency.clone()))
            .await;
        Ok(currency)
    }

    async fn update_impl(
        &self,
        id: &Id<CurrencyType>,
        changes: &CurrencyChanges,
    ) -> Outcome<Currency> {
        let _writer = self.writer.lock().await;
        let mut currency = self.get(id).await.ok_or_else(|| Failure::NotFound {
            store: CurrencySchema::NAME,
            id: id.to_string(),
        })?;

        let changes = ChangeSet::from_serialize(changes).map_err(|e| Failure::InvalidValue {
            id: id.to_string(),
            detail: e.to_string(),
        })?;
        {
            let mut handlers = Handlers::new().on("name", |c: &mut Currency, v: Value| {
                let name = v.as_str().ok_or_else(|| Failure::InvalidValue {
                    id: id.to_string(),
                    detail: "currency name must be a string".to_owned(),
                })?;
                c.name = normalize_name(id, name)?;
                Ok(())
            });
            merge::update(&mut currency, &changes, &mut handlers)?;
        }

        {
            let mut store = self.store.write().await;
            store.insert(currency.clone());
            store.persist().await?;
        }
        tracing::info!("currency updated");
        self.events
            .emit(StoreEvent::CurrencyUpdated(currency.clone()))
            .await;
        Ok(currency)
    }

    async fn remove_impl(&self, id: &Id<CurrencyType>) -> Outcome<Currency> {
        let _writer = self.writer.lock().await;
        let removed = {
            let mut store = self.store.write().await;
            let removed = store.remove(id).ok_or_else(|| Failure::NotFound {
                store: CurrencySchema::NAME,
                id: id.to_string(),
            })?;
            store.persist().await?;
            removed
        };
        tracing::info!("currency removed");
        self.events
            .emit(StoreEvent::CurrencyRemoved(id.clone()))
            .await;
        Ok(removed)
    }

    /// Write the current currencies to the backing file, e.g. to retry after a
    /// failed persist. Nothing is emitted.
    pub async fn persist(&self) -> Outcome<()> {
        let _writer = self.writer.lock().await;
        self.store.read().await.persist().await
    }

    pub fn destroy(self) {
        self.store.into_inner().destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventName;
    use serde_json::json;
    use std::{path::Path, sync::Mutex as SyncMutex};

    fn id(s: &str) -> Id<CurrencyType> {
        Id::parse(s).unwrap()
    }

    fn gold() -> Currency {
        Currency {
            id: id("gold"),
            name: "Gold".to_owned(),
            emoji: "🪙".to_owned(),
            tradeable: true,
        }
    }

    async fn empty_store(dir: &Path) -> (CurrencyStore, Arc<SyncMutex<Vec<EventName>>>) {
        let path = dir.join(CURRENCIES_FILE);
        let events = Arc::new(EventBus::new());
        let log = Arc::new(SyncMutex::new(Vec::new()));
        for name in [
            EventName::CurrencyCreated,
            EventName::CurrencyUpdated,
            EventName::CurrencyRemoved,
        ] {
            let log = log.clone();
            events.on(name, move |e| {
                log.lock().unwrap().push(e.name());
                Ok(())
            });
        }
        let store = CurrencyStore::new(Store::construct(json!({}), path).unwrap(), events);
        (store, log)
    }

    fn on_disk(dir: &Path) -> Value {
        let text = std::fs::read_to_string(dir.join(CURRENCIES_FILE)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn create_update_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = empty_store(dir.path()).await;

        store.create(gold()).await.unwrap();
        assert_eq!(on_disk(dir.path())["gold"]["name"], json!("Gold"));

        let updated = store
            .update(
                &id("gold"),
                &CurrencyChanges {
                    name: Some("  Shiny Gold ".to_owned()),
                    tradeable: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Shiny Gold");
        assert!(!updated.tradeable);
        assert_eq!(updated.emoji, "🪙");
        assert_eq!(on_disk(dir.path())["gold"], serde_json::to_value(&updated).unwrap());

        let removed = store.remove(&id("gold")).await.unwrap();
        assert_eq!(removed, updated);
        assert_eq!(on_disk(dir.path()), json!({}));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                EventName::CurrencyCreated,
                EventName::CurrencyUpdated,
                EventName::CurrencyRemoved
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = empty_store(dir.path()).await;
        store.create(gold()).await.unwrap();
        let r = store.create(gold()).await;
        assert_eq!(r.unwrap_err().reason(), "already-exists");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = empty_store(dir.path()).await;
        store.create(gold()).await.unwrap();

        let r = store
            .update(
                &id("gold"),
                &CurrencyChanges {
                    name: Some("   ".to_owned()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(r.unwrap_err().reason(), "invalid-value");
        assert_eq!(store.get(&id("gold")).await.unwrap().name, "Gold");
        assert_eq!(log.lock().unwrap().len(), 1);

        let mut blank = gold();
        blank.id = id("silver");
        blank.name = String::new();
        assert_eq!(
            store.create(blank).await.unwrap_err().reason(),
            "invalid-value"
        );
    }

    #[tokio::test]
    async fn missing_currency() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = empty_store(dir.path()).await;
        let r = store
            .update(&id("gems"), &CurrencyChanges::default())
            .await;
        assert_eq!(r.unwrap_err().reason(), "not-found");
        let r = store.remove(&id("gems")).await;
        assert_eq!(r.unwrap_err().reason(), "not-found");
        assert!(log.lock().unwrap().is_empty());
        assert!(!dir.path().join(CURRENCIES_FILE).exists());
    }

    #[tokio::test]
    async fn open_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CURRENCIES_FILE);
        let doc = json!({
            "gold": { "id": "gold", "name": "Gold", "emoji": "🪙", "tradeable": true },
            "gems": { "id": "gems", "name": "Gems", "emoji": "💎", "tradeable": false },
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let store = CurrencyStore::open(&path, Arc::new(EventBus::new()))
            .await
            .unwrap();

        assert_eq!(store.to_serializable().await, doc);
        let names: Vec<String> = store.list().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Gems", "Gold"]);
        store.destroy();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_creates_both_land() {
        let dir = tempfile::tempdir().unwrap();
        let (store, log) = empty_store(dir.path()).await;
        let store = Arc::new(store);
        let mut gems = gold();
        gems.id = id("gems");
        gems.name = "Gems".to_owned();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.create(gold()).await })
        };
        let b = {
            let store = store.clone();
            let gems = gems.clone();
            tokio::spawn(async move { store.create(gems).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.get(&id("gems")).await, Some(gems));
        assert_eq!(store.get(&id("gold")).await, Some(gold()));
        let disk = on_disk(dir.path());
        assert_eq!(disk["gold"]["name"], json!("Gold"));
        assert_eq!(disk["gems"]["name"], json!("Gems"));
        assert_eq!(
            *log.lock().unwrap(),
            vec![EventName::CurrencyCreated, EventName::CurrencyCreated]
        );
    }

    #[tokio::test]
    async fn persist_retries_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later").join(CURRENCIES_FILE);
        let store = CurrencyStore::new(
            Store::construct(json!({}), &path).unwrap(),
            Arc::new(EventBus::new()),
        );

        assert_eq!(store.create(gold()).await.unwrap_err().reason(), "io");
        assert!(store.get(&id("gold")).await.is_some());

        std::fs::create_dir(dir.path().join("later")).unwrap();
        store.persist().await.unwrap();
        let disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(disk["gold"]["name"], json!("Gold"));
    }
}
