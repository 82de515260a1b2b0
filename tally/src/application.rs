use std::{process::exit, sync::Arc};

use anyhow::{Context, Result};
use serde_json::json;
use tally_core::Id;
use tally_store::{
    currencies::CurrencyStore,
    document,
    events::{EventBus, EventName, StoreEvent},
    settings::{self, ActiveLocale, LocaleRefresh, SettingsSchema, SettingsStore, SideEffects},
    store::Store,
};

use crate::config::Config;

/// Create the single-threaded tokio runtime used by the CLI.
///
/// Panics if the runtime cannot be created.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to initialize tokio runtime")
}

/// Handle a Result, printing the error and exiting with code 1 on failure.
pub fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("tally error: {:#}", e);
            exit(1);
        }
    }
}

/// The stores, opened and wired together.
pub struct App {
    pub settings: SettingsStore,
    pub currencies: CurrencyStore,
    pub locale: ActiveLocale,
}

impl App {
    pub async fn open(config: &Config) -> Result<App> {
        let events = Arc::new(EventBus::new());
        events.on(EventName::SettingUpdated, |event| {
            if let StoreEvent::SettingUpdated { id, setting } = event {
                tracing::info!(id = %id, value = %setting.value, "setting changed");
            }
            Ok(())
        });

        let settings_store: Store<SettingsSchema> = Store::open(config.settings_path())
            .await
            .context("opening settings; run `tally init` to create them")?;
        let language = settings_store
            .get(&LocaleRefresh::language_id())
            .and_then(|s| s.value.as_str().map(str::to_owned))
            .unwrap_or_else(|| "en".to_owned());
        let locale = ActiveLocale::new(&language);
        let side_effects = SideEffects::new().register(
            LocaleRefresh::language_id(),
            LocaleRefresh::new(locale.clone(), config.locales.clone()),
        );
        let settings = SettingsStore::new(settings_store, side_effects, events.clone());

        let currencies = CurrencyStore::open(config.currencies_path(), events.clone())
            .await
            .context("opening currencies; run `tally init` to create them")?;

        Ok(App {
            settings,
            currencies,
            locale,
        })
    }
}

/// Create the data directory and any missing store documents.
///
/// Existing documents are left untouched. Returns the paths that were created.
pub async fn init(config: &Config) -> Result<Vec<std::path::PathBuf>> {
    tokio::fs::create_dir_all(config.data_dir())
        .await
        .with_context(|| format!("creating {}", config.data_dir().display()))?;

    let mut created = Vec::new();
    for (path, seed) in [
        (config.settings_path(), settings::default_document()),
        (config.currencies_path(), json!({})),
    ] {
        if tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            tracing::info!(path = %path.display(), "already present");
            continue;
        }
        document::write_document(&path, &seed).await?;
        tracing::info!(path = %path.display(), "created");
        created.push(path);
    }
    Ok(created)
}

/// Parse an id given on the command line.
pub fn parse_id<T>(s: &str) -> Result<Id<T>> {
    Ok(Id::parse(s)?)
}
