use std::path::PathBuf;
use std::sync::Once;

use clap::{Parser, Subcommand, ValueEnum};
use propgroups::{
    Combinator, Condition, Linker, LinkerService, PropertyGroups, Settings,
    SourceConfig, SuggestionData, Vault, suggest,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(
    name = "propg",
    version,
    about = "Group Obsidian notes by property and maintain hub-page backlinks"
)]
struct Cli {
    /// Path to the Obsidian vault.
    #[arg(long, env = "OBSIDIAN_VAULT", global = true)]
    vault: Option<PathBuf>,

    /// Settings file (defaults to `.obsidian/propgroups/settings.toml` inside the vault).
    #[arg(long, env = "PROPG_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print notes grouped by property and value.
    Groups {
        /// Emit JSON instead of an indented tree.
        #[arg(long)]
        json: bool,
    },
    /// Reconcile every note against every enabled rule.
    Sync,
    /// Inspect, validate, add and apply linking rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Replace a property value across all notes.
    Replace {
        #[arg(long)]
        property: String,

        /// Current value.
        #[arg(long)]
        from: String,

        /// New value.
        #[arg(long)]
        to: String,

        /// Only list the notes that would be rewritten.
        #[arg(long)]
        dry_run: bool,
    },
    /// Rank autocomplete candidates for a query.
    Suggest {
        #[arg(value_enum)]
        kind: SuggestKind,

        query: String,

        /// Property whose values to suggest (required for `value`).
        #[arg(long)]
        property: Option<String>,

        #[arg(long, default_value_t = suggest::DEFAULT_SUGGESTION_LIMIT)]
        limit: usize,
    },
    /// Keep hub pages in sync while the vault changes.
    Watch,
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    /// List configured rules.
    List,
    /// Validate the settings file.
    Check,
    /// Link every note currently matching rule N (1-based, as printed by `list`).
    Apply { number: usize },
    /// Append a rule and save the settings.
    Add {
        /// Hub page name without extension, e.g. `Projects/SO1`.
        #[arg(long)]
        page: String,

        /// Heading the links go under, e.g. `# Associated Pages`.
        #[arg(long, default_value = "# Associated Pages")]
        heading: String,

        /// `name=value` condition using exact match; repeatable.
        #[arg(long = "equals", value_name = "NAME=VALUE")]
        equals: Vec<String>,

        /// `name=value` condition using case-insensitive substring match; repeatable.
        #[arg(long = "contains", value_name = "NAME=VALUE")]
        contains: Vec<String>,

        /// Match when any condition holds instead of all.
        #[arg(long)]
        any: bool,

        /// Save the rule disabled.
        #[arg(long)]
        disabled: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SuggestKind {
    Property,
    Value,
    Page,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let vault = Vault::open(require_vault(cli.vault)?)?;
    let settings_path = cli.settings.unwrap_or_else(|| vault.settings_path());

    match cli.command {
        Command::Groups { json } => handle_groups(&vault, &settings_path, json)?,
        Command::Sync => handle_sync(&vault, &settings_path)?,
        Command::Rules { command } => handle_rules(&vault, &settings_path, command)?,
        Command::Replace {
            property,
            from,
            to,
            dry_run,
        } => handle_replace(&vault, &settings_path, &property, &from, &to, dry_run)?,
        Command::Suggest {
            kind,
            query,
            property,
            limit,
        } => handle_suggest(&vault, kind, &query, property.as_deref(), limit)?,
        Command::Watch => handle_watch(vault, settings_path).await?,
    }

    Ok(())
}

fn handle_groups(vault: &Vault, settings_path: &std::path::Path, as_json: bool) -> anyhow::Result<()> {
    let settings = Settings::load(settings_path)?;
    let groups = PropertyGroups::from_store(vault, &settings.excluded_set())?;
    let sorted = groups.sorted();

    if as_json {
        let doc: Vec<serde_json::Value> = sorted
            .iter()
            .map(|g| {
                json!({
                    "property": g.property,
                    "values": g.values.iter().map(|v| json!({
                        "value": v.value,
                        "notes": v.notes.iter().map(|p| p.as_str_lossy()).collect::<Vec<_>>(),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if sorted.is_empty() {
        println!("no properties found");
        return Ok(());
    }
    for group in &sorted {
        println!("{}", group.property);
        for value in &group.values {
            println!("  {} ({})", value.value, value.notes.len());
            for note in &value.notes {
                println!("    - {}", note.as_str_lossy());
            }
        }
    }
    Ok(())
}

fn handle_sync(vault: &Vault, settings_path: &std::path::Path) -> anyhow::Result<()> {
    let settings = load_valid_settings(settings_path)?;
    let report = Linker::new(vault, &settings).sync_all()?;
    println!(
        "linked {}, unlinked {}, failed {}",
        report.linked, report.unlinked, report.failed
    );
    Ok(())
}

fn handle_rules(
    vault: &Vault,
    settings_path: &std::path::Path,
    command: RulesCommand,
) -> anyhow::Result<()> {
    match command {
        RulesCommand::List => {
            let settings = Settings::load(settings_path)?;
            if settings.source_pages.is_empty() {
                println!("no rules configured");
            }
            for (i, cfg) in settings.source_pages.iter().enumerate() {
                let state = if cfg.enabled { "" } else { " (disabled)" };
                println!(
                    "{}. {} -> {} {}{state}",
                    i + 1,
                    cfg.describe(),
                    cfg.target_page,
                    cfg.target_heading
                );
            }
        }
        RulesCommand::Check => {
            let settings = Settings::load(settings_path)?;
            settings.validate()?;
            println!("{} rule(s) ok", settings.source_pages.len());
        }
        RulesCommand::Apply { number } => {
            let settings = Settings::load(settings_path)?;
            let Some(cfg) = number
                .checked_sub(1)
                .and_then(|i| settings.source_pages.get(i))
            else {
                anyhow::bail!(
                    "no rule #{number} (have {})",
                    settings.source_pages.len()
                );
            };
            propgroups::validate_source_config(cfg).map_err(anyhow::Error::msg)?;
            let report = Linker::new(vault, &settings).apply_rule(cfg)?;
            println!(
                "processed {} notes, linked {} to {}",
                report.processed, report.linked, cfg.target_page
            );
        }
        RulesCommand::Add {
            page,
            heading,
            equals,
            contains,
            any,
            disabled,
        } => {
            let mut settings = Settings::load(settings_path)?;
            let mut cfg = SourceConfig::new(page, heading);
            for raw in &equals {
                let (name, value) = split_condition(raw)?;
                cfg = cfg.with_condition(Condition::equals(name, value));
            }
            for raw in &contains {
                let (name, value) = split_condition(raw)?;
                cfg = cfg.with_condition(Condition::contains(name, value));
            }
            if any {
                cfg = cfg.with_combinator(Combinator::Or);
            }
            cfg.enabled = !disabled;
            let summary = cfg.describe();
            settings.source_pages.push(cfg);
            settings.save(settings_path)?;
            println!("added rule {}: {summary}", settings.source_pages.len());
        }
    }
    Ok(())
}

fn handle_replace(
    vault: &Vault,
    settings_path: &std::path::Path,
    property: &str,
    from: &str,
    to: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load(settings_path)?;
    let linker = Linker::new(vault, &settings);

    if dry_run {
        let notes = linker.preview_replace(property, from)?;
        for note in &notes {
            println!("{}", note.as_str_lossy());
        }
        println!("{} note(s) would be updated", notes.len());
        return Ok(());
    }

    let report = linker.bulk_replace(property, from, to)?;
    println!(
        "modified {} of {} notes ({} failed)",
        report.modified, report.scanned, report.failed
    );
    Ok(())
}

fn handle_suggest(
    vault: &Vault,
    kind: SuggestKind,
    query: &str,
    property: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let data = SuggestionData::from_store(vault)?;
    let candidates = match kind {
        SuggestKind::Property => data.property_names.clone(),
        SuggestKind::Page => data.page_names.clone(),
        SuggestKind::Value => {
            let Some(property) = property else {
                anyhow::bail!("--property is required for value suggestions");
            };
            data.values_for(property)
        }
    };
    for hit in suggest::rank(query, &candidates, limit) {
        println!("{hit}");
    }
    Ok(())
}

async fn handle_watch(vault: Vault, settings_path: PathBuf) -> anyhow::Result<()> {
    let settings = load_valid_settings(&settings_path)?;
    let mut service = LinkerService::with_settings_path(vault, settings, settings_path)?;
    let mut rx = service.subscribe();

    let report = service.start().await?;
    println!(
        "initial sync: linked {}, unlinked {}, failed {}",
        report.linked, report.unlinked, report.failed
    );
    println!("watching... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = rx.recv() => {
                match ev {
                    Ok(ev) => println!("{ev:?}"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        eprintln!("(lagged {n} events)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    });
}

fn load_valid_settings(path: &std::path::Path) -> anyhow::Result<Settings> {
    let settings = Settings::load(path)?;
    settings.validate()?;
    Ok(settings)
}

fn split_condition(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        anyhow::bail!("condition must look like NAME=VALUE, got {raw:?}");
    };
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        anyhow::bail!("condition must look like NAME=VALUE, got {raw:?}");
    }
    Ok((name.to_string(), value.to_string()))
}

fn require_vault(vault: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    vault.ok_or_else(|| anyhow::anyhow!("--vault is required (or set OBSIDIAN_VAULT)"))
}
