use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use tally_store::{currencies::CURRENCIES_FILE, settings::SETTINGS_FILE};

use crate::options::Options;

/// Where the stores live and what they may contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub locales: Vec<String>,
}

impl Config {
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn currencies_path(&self) -> PathBuf {
        self.data_dir.join(CURRENCIES_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl From<&Options> for Config {
    fn from(options: &Options) -> Self {
        let mut seen = BTreeSet::new();
        let locales: Vec<String> = options
            .locales
            .iter()
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty() && seen.insert(l.clone()))
            .collect();
        Config {
            data_dir: options.data_dir.clone(),
            locales,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        options: Options,
    }

    #[test]
    fn flags_override_defaults() {
        let w = Wrapper::parse_from([
            "tally",
            "--data-dir",
            "/srv/bot",
            "--locales",
            "en, fr,,de,en",
        ]);
        let config = Config::from(&w.options);
        assert_eq!(config.settings_path(), PathBuf::from("/srv/bot/settings.json"));
        assert_eq!(
            config.currencies_path(),
            PathBuf::from("/srv/bot/currencies.json")
        );
        assert_eq!(config.locales, vec!["en", "fr", "de"]);
    }

    #[test]
    fn repeated_locales_keep_first_position() {
        let w = Wrapper::parse_from(["tally", "--locales", "fr,en,fr,de,en"]);
        let config = Config::from(&w.options);
        assert_eq!(config.locales, vec!["fr", "en", "de"]);
    }
}
