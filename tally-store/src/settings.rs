//! Named configuration values.
//!
//! [`SettingsStore`] keeps a [`Store`] of [`Setting`]s backed by the
//! `settings.json` file. Settings are never created implicitly: only ids present
//! in the document can be set. A successful [`SettingsStore::set_setting`]
//! persists the whole document, runs the side effect registered for the
//! setting (if any), and emits [`StoreEvent::SettingUpdated`].
//!
//! All mutations of one store are serialized, so concurrent calls can not lose
//! each other's updates or interleave their persists.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, RwLock as SyncRwLock},
};

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::{assert_never_reached, Failure, Id, Outcome, SettingType};
use tokio::sync::{Mutex, RwLock};
use tracing::{info_span, Instrument as _};

use crate::{
    events::{EventBus, StoreEvent},
    merge::{self, ChangeSet, Handlers},
    store::{Schema, Store},
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Setting {
    pub id: Id<SettingType>,
    pub value: Value,
}

impl Setting {
    /// The kind of value this setting holds.
    pub fn kind(&self) -> SettingKind {
        // Validation only admits scalar values
        SettingKind::of(&self.value).unwrap_or_else(|| assert_never_reached(&self.value))
    }
}

/// The type of a setting, derived from its current (initially: default) value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Number,
    Flag,
}

impl SettingKind {
    pub fn of(value: &Value) -> Option<SettingKind> {
        match value {
            Value::String(_) => Some(SettingKind::Text),
            Value::Number(_) => Some(SettingKind::Number),
            Value::Bool(_) => Some(SettingKind::Flag),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::Text => "text",
            SettingKind::Number => "number",
            SettingKind::Flag => "flag",
        }
    }
}

pub struct SettingsSchema;

impl Schema for SettingsSchema {
    type Kind = SettingType;
    type Record = Setting;
    const NAME: &'static str = "setting";

    fn id(record: &Setting) -> &Id<SettingType> {
        &record.id
    }

    fn check(record: &Setting) -> Result<(), String> {
        match SettingKind::of(&record.value) {
            Some(_) => Ok(()),
            None => Err("value must be a string, number or boolean".to_owned()),
        }
    }
}

/// The settings a fresh installation starts with.
pub fn default_document() -> Value {
    json!({
        "language": { "id": "language", "value": "en" },
        "currency": { "id": "currency", "value": "coins" },
        "dailyReward": { "id": "dailyReward", "value": 100 },
        "allowTransfers": { "id": "allowTransfers", "value": true },
    })
}

/// Work to do after a setting has changed and been persisted.
#[async_trait::async_trait]
pub trait SideEffect: Send + Sync {
    async fn apply(&self, setting: &Setting) -> anyhow::Result<()>;
}

/// The side effect table, keyed by setting id. Settings without an entry have
/// no side effect.
#[derive(Clone, Default)]
pub struct SideEffects {
    table: BTreeMap<Id<SettingType>, Arc<dyn SideEffect>>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `effect` for `id`, replacing any previous registration.
    pub fn register(mut self, id: Id<SettingType>, effect: impl SideEffect + 'static) -> Self {
        self.table.insert(id, Arc::new(effect));
        self
    }

    fn get(&self, id: &Id<SettingType>) -> Option<Arc<dyn SideEffect>> {
        self.table.get(id).cloned()
    }
}

/// The locale currently used to render messages.
#[derive(Clone, Debug)]
pub struct ActiveLocale {
    current: Arc<SyncRwLock<String>>,
}

impl ActiveLocale {
    pub fn new(locale: &str) -> Self {
        ActiveLocale {
            current: Arc::new(SyncRwLock::new(locale.to_owned())),
        }
    }

    pub fn get(&self) -> String {
        self.current.read().expect("lock poisoned").clone()
    }

    fn set(&self, locale: &str) {
        *self.current.write().expect("lock poisoned") = locale.to_owned();
    }
}

/// Keeps an [`ActiveLocale`] in sync with the `language` setting.
pub struct LocaleRefresh {
    locale: ActiveLocale,
    available: Vec<String>,
}

impl LocaleRefresh {
    /// `available` lists the locales that can be switched to.
    pub fn new(locale: ActiveLocale, available: Vec<String>) -> Self {
        LocaleRefresh { locale, available }
    }

    pub fn language_id() -> Id<SettingType> {
        Id::parse("language").unwrap_or_else(|f| assert_never_reached(f))
    }
}

#[async_trait::async_trait]
impl SideEffect for LocaleRefresh {
    async fn apply(&self, setting: &Setting) -> anyhow::Result<()> {
        let language = setting
            .value
            .as_str()
            .with_context(|| format!("setting {} is not a language tag", setting.id))?;
        if !self.available.iter().any(|l| l == language) {
            bail!(
                "no locale for language '{}' (available: {})",
                language,
                self.available.join(", ")
            );
        }
        self.locale.set(language);
        tracing::info!(language, "refreshed locale");
        Ok(())
    }
}

pub struct SettingsStore {
    store: RwLock<Store<SettingsSchema>>,
    /// Held for the whole of a mutation
    writer: Mutex<()>,
    side_effects: SideEffects,
    events: Arc<EventBus>,
}

impl SettingsStore {
    pub fn new(
        store: Store<SettingsSchema>,
        side_effects: SideEffects,
        events: Arc<EventBus>,
    ) -> Self {
        SettingsStore {
            store: RwLock::new(store),
            writer: Mutex::new(()),
            side_effects,
            events,
        }
    }

    /// Open the settings document at `location`.
    pub async fn open(
        location: impl Into<PathBuf>,
        side_effects: SideEffects,
        events: Arc<EventBus>,
    ) -> Outcome<Self> {
        let store = Store::open(location).await?;
        Ok(Self::new(store, side_effects, events))
    }

    pub async fn get_setting(&self, id: &Id<SettingType>) -> Option<Setting> {
        self.store.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Setting> {
        self.store.read().await.get_all().cloned().collect()
    }

    pub async fn to_serializable(&self) -> Value {
        self.store.read().await.to_serializable()
    }

    /// Change the value of an existing setting.
    ///
    /// Fails with [`Failure::NotFound`] for unknown ids and with
    /// [`Failure::InvalidValue`] when `value` is of a different kind than the
    /// current value; neither persists nor emits. A `null` value changes
    /// nothing but is still persisted and announced.
    ///
    /// If persisting fails, the new value stays in memory and the failure is
    /// returned. The caller may retry with [`SettingsStore::persist`], or by
    /// setting the value again. If the side effect fails, the new value has been persisted, no
    /// event is emitted, and [`Failure::SideEffect`] is returned.
    pub async fn set_setting(&self, id: &Id<SettingType>, value: Value) -> Outcome<Setting> {
        self.set_setting_impl(id, value)
            .instrument(info_span!("set_setting", id = %id))
            .await
    }

    async fn set_setting_impl(&self, id: &Id<SettingType>, value: Value) -> Outcome<Setting> {
        let _writer = self.writer.lock().await;

        let mut setting = self
            .get_setting(id)
            .await
            .ok_or_else(|| Failure::NotFound {
                store: SettingsSchema::NAME,
                id: id.to_string(),
            })?;

        if let Some(kind) = SettingKind::of(&value) {
            if kind != setting.kind() {
                return Err(Failure::InvalidValue {
                    id: id.to_string(),
                    detail: format!(
                        "expected a {} value, got a {} value",
                        setting.kind().as_str(),
                        kind.as_str()
                    ),
                });
            }
        } else if !value.is_null() {
            return Err(Failure::InvalidValue {
                id: id.to_string(),
                detail: "value must be a string, number or boolean".to_owned(),
            });
        }

        let changes = ChangeSet::new().with("value", value);
        merge::update(&mut setting, &changes, &mut Handlers::new())?;

        {
            let mut store = self.store.write().await;
            store.insert(setting.clone());
            store.persist().await?;
        }
        tracing::info!(value = %setting.value, "setting updated");

        if let Some(effect) = self.side_effects.get(id) {
            effect
                .apply(&setting)
                .await
                .map_err(|e| Failure::side_effect(id.as_str(), &e))?;
        }

        self.events
            .emit(StoreEvent::SettingUpdated {
                id: id.clone(),
                setting: setting.clone(),
            })
            .await;

        Ok(setting)
    }

    /// Write the current settings to the settings file.
    ///
    /// Mutations persist by themselves; this is for retrying after a failed
    /// persist. Nothing is emitted and no side effect runs.
    pub async fn persist(&self) -> Outcome<()> {
        let _writer = self.writer.lock().await;
        self.store.read().await.persist().await
    }

    /// Tear down the store. The settings file keeps its last persisted content.
    pub fn destroy(self) {
        self.store.into_inner().destroy();
    }
}
