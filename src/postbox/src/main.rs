//! Postbox: notification dashboard tooling.
//!
//! Command-line entry point over the segmentation engine, the SMS
//! estimator and channel recipient resolution. Reads JSON exports of the
//! contacts, preferences and segments tables and prints JSON results.

use anyhow::Context;
use clap::{Parser, Subcommand};
use postbox_channels::recipients::{filter_by_consent, resolve_channel_recipients};
use postbox_channels::sms::{estimate_batch, estimate_sms_segments};
use postbox_core::config::AppConfig;
use postbox_core::{Channel, Contact, ContactPreferences, PreferenceMap};
use postbox_segmentation::registry::matching;
use postbox_segmentation::{match_contacts, Segment, SegmentFilter, SegmentRegistry};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "postbox")]
#[command(about = "Segment matching and message estimation for the notification dashboard")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, env = "POSTBOX_CONFIG")]
    config: Option<String>,

    /// Log filter directive (overrides config)
    #[arg(long, env = "POSTBOX__LOG__FILTER")]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match contacts against a filter list or a saved segment
    Segment {
        /// JSON array of contacts
        #[arg(long)]
        contacts: PathBuf,
        /// JSON array of contact preference rows
        #[arg(long)]
        preferences: Option<PathBuf>,
        /// JSON array of filters, or a saved segment object
        #[arg(long)]
        filters: PathBuf,
        /// Scope a bare filter list to one service's contacts
        #[arg(long)]
        service_id: Option<Uuid>,
        /// Print only the number of matches
        #[arg(long, default_value_t = false)]
        count: bool,
    },
    /// SMS length and cost estimation
    #[command(subcommand)]
    Sms(SmsCommand),
    /// Resolve deliverable addresses for a channel
    Recipients {
        #[arg(long)]
        channel: Channel,
        #[arg(long)]
        contacts: PathBuf,
        #[arg(long)]
        preferences: Option<PathBuf>,
        /// Narrow the contacts with a filter list or saved segment first
        #[arg(long)]
        filters: Option<PathBuf>,
        /// Scope a bare filter list to one service's contacts
        #[arg(long)]
        service_id: Option<Uuid>,
        /// Drop contacts that have not opted in to the channel
        #[arg(long, default_value_t = false)]
        consent_only: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SmsCommand {
    /// Estimate one message body
    Estimate {
        /// Message text
        text: Option<String>,
        /// Read the message text from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// Estimate a personalised template across a contact list
    Batch {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        contacts: PathBuf,
    },
}

/// A filters file holds either a bare filter list or a saved segment.
#[derive(Deserialize)]
#[serde(untagged)]
enum FilterSource {
    Segment(Segment),
    Filters(Vec<SegmentFilter>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, load_error) = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(filter) = cli.log_filter.clone() {
        config.log.filter = filter;
    }

    init_tracing(&config);
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    info!(
        max_filters = config.segments.max_filters,
        max_segments_warning = config.sms.max_segments_warning,
        "Configuration loaded"
    );

    match cli.command {
        Command::Segment {
            contacts,
            preferences,
            filters,
            service_id,
            count,
        } => {
            let contacts: Vec<Contact> = read_json(&contacts).await?;
            let prefs = read_preferences(preferences.as_deref()).await?;
            let source: FilterSource = read_json(&filters).await?;
            let registry = SegmentRegistry::new(config.segments.max_filters);
            let matched = select(&registry, source, service_id, &contacts, &prefs)?;

            if count {
                print_json(&serde_json::json!({ "count": matched.len() }))?;
            } else {
                print_json(&matched)?;
            }
        }
        Command::Sms(SmsCommand::Estimate { text, file }) => {
            let content = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => anyhow::bail!("provide message text or --file"),
            };
            let estimate = estimate_sms_segments(&content);
            for warning in estimate.warnings(&config.sms) {
                warn!(warning = %warning, "SMS composer warning");
            }
            print_json(&estimate)?;
        }
        Command::Sms(SmsCommand::Batch { template, contacts }) => {
            let template = tokio::fs::read_to_string(&template)
                .await
                .with_context(|| format!("reading {}", template.display()))?;
            let contacts: Vec<Contact> = read_json(&contacts).await?;
            let batch = estimate_batch(&template, &contacts);
            if batch.max_segments > config.sms.max_segments_warning {
                warn!(
                    max_segments = batch.max_segments,
                    "Some recipients will receive multi-part messages"
                );
            }
            print_json(&batch)?;
        }
        Command::Recipients {
            channel,
            contacts,
            preferences,
            filters,
            service_id,
            consent_only,
        } => {
            let contacts: Vec<Contact> = read_json(&contacts).await?;
            let prefs = read_preferences(preferences.as_deref()).await?;
            let registry = SegmentRegistry::new(config.segments.max_filters);

            let mut selected = match filters {
                Some(path) => {
                    let source: FilterSource = read_json(&path).await?;
                    select(&registry, source, service_id, &contacts, &prefs)?
                }
                None => contacts.iter().collect(),
            };
            if consent_only {
                selected = filter_by_consent(channel, selected, &prefs);
            }

            let resolution = resolve_channel_recipients(channel, selected);
            info!(
                channel = channel.display_name(),
                recipients = resolution.recipients.len(),
                skipped = resolution.skipped.len(),
                "Recipients resolved"
            );
            print_json(&resolution)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log.filter.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Apply a filter source to the contact list. Saved segments are scoped
/// to their own service. A bare filter list is scoped to `service_id`
/// when given, otherwise the export is taken to hold a single service.
fn select<'a>(
    registry: &SegmentRegistry,
    source: FilterSource,
    service_id: Option<Uuid>,
    contacts: &'a [Contact],
    prefs: &PreferenceMap,
) -> anyhow::Result<Vec<&'a Contact>> {
    match (source, service_id) {
        (FilterSource::Segment(segment), _) => {
            let id = segment.id;
            registry.restore_segment(segment);
            Ok(registry.resolve_recipients(&id, contacts, prefs)?)
        }
        (FilterSource::Filters(filters), Some(service_id)) => {
            Ok(matching(&service_id, &filters, contacts, prefs))
        }
        (FilterSource::Filters(filters), None) => Ok(match_contacts(&filters, contacts, prefs)),
    }
}

async fn read_preferences(path: Option<&Path>) -> anyhow::Result<PreferenceMap> {
    match path {
        Some(path) => {
            let rows: Vec<ContactPreferences> = read_json(path).await?;
            Ok(ContactPreferences::index(rows))
        }
        None => Ok(PreferenceMap::new()),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
