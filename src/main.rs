//! CLI entry point for `mailnorm`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};

use mailnorm::config::Config;
use mailnorm::model::message::NormalizedMessage;
use mailnorm::normalize::Normalizer;
use mailnorm::parser::mime::{flatten, SectionPath};
use mailnorm::store::eml::EmlStore;
use mailnorm::store::MailStore;

/// UID the loaded file is stored under.
const FILE_UID: u32 = 1;

#[derive(Parser)]
#[command(
    name = "mailnorm",
    version,
    about = "Normalize MIME messages into flat records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized record of a message file as JSON
    Show {
        path: PathBuf,
        /// Only populate header-derived fields
        #[arg(long)]
        headers_only: bool,
        /// Mailbox name recorded in the output
        #[arg(long, default_value = "INBOX", env = "MAILNORM_MAILBOX")]
        mailbox: String,
        /// Print a readable summary instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Print the section map of a message file
    Parts { path: PathBuf },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailnorm::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Show {
            path,
            headers_only,
            mailbox,
            summary,
        } => cmd_show(&path, &mailbox, headers_only, summary, &config),
        Commands::Parts { path } => cmd_parts(&path),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailnorm::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailnorm.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn open_store(path: &Path, mailbox: &str) -> anyhow::Result<EmlStore> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(EmlStore::open(mailbox, path)?)
}

/// Normalize a message file and print the record.
fn cmd_show(
    path: &Path,
    mailbox: &str,
    headers_only: bool,
    summary: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let mut store = open_store(path, mailbox)?;
    let normalizer = Normalizer::new(config);
    let message = normalizer.normalize(&mut store, mailbox, FILE_UID, headers_only)?;
    if summary {
        print_summary(&message);
    } else {
        println!("{}", serde_json::to_string_pretty(&message)?);
    }
    Ok(())
}

fn print_summary(message: &NormalizedMessage) {
    println!("Subject:  {}", message.subject);
    println!("Thread:   {}", message.subject_group);
    println!("From:     {}", message.from);
    println!("To:       {}", message.to.join(", "));
    println!("Date:     {}", message.date_string());
    println!("Mailbox:  {}", message.mailbox);

    let flags = &message.flags;
    let set: Vec<&str> = [
        (flags.seen, "seen"),
        (flags.answered, "answered"),
        (flags.flagged, "flagged"),
        (flags.draft, "draft"),
        (flags.deleted, "deleted"),
        (flags.recent, "recent"),
        (flags.autosubmitted, "autosubmitted"),
        (flags.mailerdaemon, "mailerdaemon"),
        (flags.spam, "spam"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect();
    println!("Flags:    {}", set.join(" "));

    if let Some(ref text) = message.text {
        println!(
            "Text:     {}",
            humansize::format_size(text.len(), humansize::BINARY)
        );
    }
    for attachment in &message.attachments {
        println!(
            "File:     {}  {}  {}",
            attachment.name.as_deref().unwrap_or("(unnamed)"),
            attachment.content_type,
            humansize::format_size(attachment.content.len(), humansize::BINARY)
        );
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailnorm", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print one line per section: address (indented by depth), type,
/// encoding with its numeric code, child count.
fn cmd_parts(path: &Path) -> anyhow::Result<()> {
    let mailbox = "INBOX";
    let mut store = open_store(path, mailbox)?;
    let structure = store.fetch_structure(mailbox, FILE_UID)?;
    let flat = flatten(&structure);

    let label = |section: &SectionPath| {
        format!("{}{}", "  ".repeat(section.depth() - 1), section)
    };
    let width = flat
        .sections()
        .map(|s| label(s).len())
        .max()
        .unwrap_or(1);
    for entry in flat.iter() {
        let encoding = &entry.part.encoding;
        println!(
            "{:<width$}  {:<32}  {:<16}  {}",
            label(entry.section),
            entry.part.canonical_type(),
            format!("{} ({})", encoding.as_str(), encoding.code()),
            entry.part.parts.len(),
        );
    }
    Ok(())
}
