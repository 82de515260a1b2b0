mod application;
mod config;
mod logging;
mod options;

use std::io::IsTerminal as _;

use anyhow::{Context, Result};
use clap::{ColorChoice, CommandFactory as _, Parser, Subcommand};
use serde_json::Value;
use tally_core::{CurrencyType, SettingType};
use tally_store::{
    currencies::{Currency, CurrencyChanges},
    document::to_pretty_bytes,
    settings::LocaleRefresh,
};

use application::{handle_result, parse_id, App};
use config::Config;
use options::Options;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            return Ok(());
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            return Ok(());
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "tally", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let _logger = logging::set_up(logging::Options {
        verbose: args.options.verbose,
        color: match args.options.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        },
    })?;
    let config = Config::from(&args.options);

    application::runtime().block_on(run_command(&config, &args.command))
}

async fn run_command(config: &Config, command: &Commands) -> Result<()> {
    match command {
        Commands::Init => {
            let created = application::init(config).await?;
            for path in created {
                println!("created {}", path.display());
            }
            Ok(())
        }
        Commands::Settings(sub) => {
            let app = App::open(config).await?;
            settings(&app, sub).await
        }
        Commands::Currencies(sub) => {
            let app = App::open(config).await?;
            currencies(&app, sub).await
        }
        Commands::GenerateMan | Commands::GenerateMarkdown | Commands::GenerateCompletion { .. } => {
            Ok(())
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let value = serde_json::to_value(value)?;
    print!("{}", String::from_utf8(to_pretty_bytes(&value)?)?);
    Ok(())
}

async fn settings(app: &App, command: &SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::List => {
            for setting in app.settings.list().await {
                println!("{}\t{}\t{}", setting.id, setting.kind().as_str(), setting.value);
            }
        }
        SettingsCommand::Get { id } => {
            let id = parse_id::<SettingType>(id)?;
            match app.settings.get_setting(&id).await {
                Some(setting) => print_json(&setting.value)?,
                None => anyhow::bail!("no setting with id '{}'", id),
            }
        }
        SettingsCommand::Set { id, value, raw } => {
            let id = parse_id::<SettingType>(id)?;
            let value = if *raw {
                Value::String(value.clone())
            } else {
                serde_json::from_str(value)
                    .with_context(|| format!("failed to parse JSON value for {}", id))?
            };
            let setting = app.settings.set_setting(&id, value).await?;
            print_json(&setting)?;
            if id == LocaleRefresh::language_id() {
                eprintln!("active locale: {}", app.locale.get());
            }
        }
    }
    Ok(())
}

async fn currencies(app: &App, command: &CurrenciesCommand) -> Result<()> {
    match command {
        CurrenciesCommand::List => {
            for c in app.currencies.list().await {
                let trade = if c.tradeable { "" } else { " (not tradeable)" };
                println!("{}\t{} {}{}", c.id, c.emoji, c.name, trade);
            }
        }
        CurrenciesCommand::Show { id } => {
            let id = parse_id::<CurrencyType>(id)?;
            match app.currencies.get(&id).await {
                Some(currency) => print_json(&currency)?,
                None => anyhow::bail!("no currency with id '{}'", id),
            }
        }
        CurrenciesCommand::Create {
            id,
            name,
            emoji,
            untradeable,
        } => {
            let currency = app
                .currencies
                .create(Currency {
                    id: parse_id(id)?,
                    name: name.clone(),
                    emoji: emoji.clone(),
                    tradeable: !untradeable,
                })
                .await?;
            print_json(&currency)?;
        }
        CurrenciesCommand::Edit {
            id,
            name,
            emoji,
            tradeable,
        } => {
            let id = parse_id::<CurrencyType>(id)?;
            let changes = CurrencyChanges {
                name: name.clone(),
                emoji: emoji.clone(),
                tradeable: *tradeable,
            };
            let currency = app.currencies.update(&id, &changes).await?;
            print_json(&currency)?;
        }
        CurrenciesCommand::Remove { id } => {
            let id = parse_id::<CurrencyType>(id)?;
            let removed = app.currencies.remove(&id).await?;
            println!("removed {}", removed.id);
        }
    }
    Ok(())
}

/// tally: inspect and edit the economy bot's persisted stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the data directory and seed missing store files
    Init,

    /// Read and change settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Manage currencies
    #[command(subcommand)]
    Currencies(CurrenciesCommand),

    /// Generate markdown documentation for tally
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for tally
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for tally
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// List all settings with their kind and value
    List,

    /// Print the value of a setting as JSON
    Get { id: String },

    /// Change the value of an existing setting
    Set {
        id: String,

        /// The new value, in JSON format
        value: String,

        /// Take the value as a raw string instead of JSON
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CurrenciesCommand {
    /// List all currencies
    List,

    /// Print a currency as JSON
    Show { id: String },

    /// Add a currency
    Create {
        id: String,
        name: String,

        #[arg(long, default_value = "🪙")]
        emoji: String,

        /// Do not allow members to trade this currency
        #[arg(long)]
        untradeable: bool,
    },

    /// Change some fields of a currency
    Edit {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        emoji: Option<String>,

        #[arg(long)]
        tradeable: Option<bool>,
    },

    /// Delete a currency
    Remove { id: String },
}
