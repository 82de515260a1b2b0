use std::path::PathBuf;

use clap::{ColorChoice, Parser};

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Directory holding the store documents
    #[arg(long, global = true, env = "TALLY_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Locales the `language` setting may be switched to
    #[arg(
        long,
        global = true,
        env = "TALLY_LOCALES",
        value_delimiter = ',',
        default_value = "en,fr,de,es,nl"
    )]
    pub locales: Vec<String>,
}
