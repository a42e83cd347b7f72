//! CardSync CLI
//!
//! Command-line front end for the CardSync engine. Contacts and sync
//! bookkeeping live in a locked state directory between runs.
//!
//! # Commands
//!
//! - `check-url` - Check a server URL against the SSRF rules
//! - `keygen` / `encrypt` / `decrypt` - Vault key handling
//! - `inspect` - Summarize a `.vcf` file
//! - `connection` - Add, list, test and remove CardDAV connections
//! - `sync` - Run pull-then-push for one, the due, or all connections
//! - `import` / `export` - Move contacts in and out as `.vcf` files
//! - `pending` - Review staged imports
//! - `conflicts` / `resolve` - Review and settle conflicts
//! - `dedupe` - List likely duplicate contacts

mod commands;
mod state_dir;

use cardsync_engine::{
    ConflictId, ConflictPolicy, ConnectionId, OrphanPolicy, PendingImportId, RetryConfig, SyncConfig,
};
use cardsync_vcard::EncodeOptions;
use clap::{Parser, Subcommand, ValueEnum};
use commands::CliResult;
use state_dir::Workspace;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Two-way contact sync with CardDAV servers.
#[derive(Parser)]
#[command(name = "cardsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the state directory
    #[arg(global = true, short, long, env = "CARDSYNC_STATE", default_value = ".cardsync")]
    state: PathBuf,

    /// Vault key (64 hex characters)
    #[arg(global = true, long, env = "CARDSYNC_VAULT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a server URL may be used
    CheckUrl {
        /// URL to check
        url: String,
    },

    /// Print a new vault key
    Keygen {
        /// Derive the key from this high-entropy secret instead
        #[arg(long)]
        passphrase: Option<String>,

        /// Salt for the derivation
        #[arg(long)]
        salt: Option<String>,
    },

    /// Encrypt a password with the vault key
    Encrypt {
        /// Plaintext
        plaintext: String,
    },

    /// Decrypt a stored password with the vault key
    Decrypt {
        /// Stored value (iv:tag:ciphertext)
        stored: String,
    },

    /// Summarize the cards in a .vcf file
    Inspect {
        /// File to read
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List contacts that look like duplicates
    Dedupe {
        /// Similarity threshold between 0 and 1
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage CardDAV connections
    #[command(subcommand)]
    Connection(ConnectionCommand),

    /// Synchronize connections
    Sync {
        /// Connection to sync; all enabled connections when omitted
        id: Option<String>,

        /// Only connections whose interval has elapsed
        #[arg(long, conflicts_with = "id")]
        due: bool,

        /// Keep local contacts whose remote object was deleted
        #[arg(long)]
        keep_orphans: bool,

        /// Attempts per request before giving up
        #[arg(long, default_value = "3")]
        attempts: u32,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Import contacts from a .vcf file
    Import {
        /// File to import
        file: PathBuf,

        /// Stage the contacts for review instead of creating them
        #[arg(long)]
        review: bool,

        /// Name recorded as the uploader
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Export all contacts to a .vcf file
    Export {
        /// Name the file is derived from
        #[arg(short, long, default_value = "contacts")]
        name: String,

        /// Output file or directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Leave photos out
        #[arg(long)]
        no_photos: bool,

        /// Leave custom fields out
        #[arg(long)]
        no_custom_fields: bool,

        /// Strip markdown from notes
        #[arg(long)]
        plain_notes: bool,
    },

    /// Review staged imports
    #[command(subcommand)]
    Pending(PendingCommand),

    /// List open conflicts
    Conflicts {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve a conflict
    Resolve {
        /// Conflict id
        id: String,

        /// Keep one side entirely (local, remote)
        #[arg(long)]
        keep: Option<String>,

        /// Take a field from one side, e.g. phones=remote
        #[arg(long)]
        take: Vec<String>,

        /// Set a text field, e.g. notes=new text
        #[arg(long)]
        set: Vec<String>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ConnectionCommand {
    /// Add a connection
    Add {
        /// Address book URL
        #[arg(long)]
        url: String,

        /// Account name
        #[arg(long)]
        username: String,

        /// Password
        #[arg(long, env = "CARDSYNC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Stage new remote contacts for review
        #[arg(long)]
        review: bool,

        /// Upload local contacts the server does not have
        #[arg(long)]
        auto_export: bool,

        /// What to do when both sides changed
        #[arg(long, value_enum, default_value = "manual")]
        conflicts: PolicyArg,

        /// Minutes between scheduled syncs
        #[arg(long, default_value = "60")]
        interval: u64,
    },

    /// List connections
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the remote address book without changing anything
    Test {
        /// Connection id
        id: String,
    },

    /// Remove a connection; local contacts are kept
    Remove {
        /// Connection id
        id: String,
    },
}

#[derive(Subcommand)]
enum PendingCommand {
    /// List pending imports
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Accept pending imports (all when no id is given)
    Accept {
        /// Pending import ids
        ids: Vec<String>,
    },

    /// Reject pending imports (all when no id is given)
    Reject {
        /// Pending import ids
        ids: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Manual,
    KeepLocal,
    KeepRemote,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Manual => ConflictPolicy::Manual,
            PolicyArg::KeepLocal => ConflictPolicy::KeepLocal,
            PolicyArg::KeepRemote => ConflictPolicy::KeepRemote,
        }
    }
}

fn main() -> CliResult {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let key = commands::keys::parse_key(cli.key.as_deref())?;

    match cli.command {
        Commands::CheckUrl { url } => commands::check_url::run(&url),
        Commands::Keygen { passphrase, salt } => {
            commands::keys::keygen(passphrase.as_deref(), salt.as_deref())
        }
        Commands::Encrypt { plaintext } => commands::keys::encrypt(key, &plaintext),
        Commands::Decrypt { stored } => commands::keys::decrypt(key, &stored),
        Commands::Inspect { file, format } => commands::inspect::run(&file, &format),
        Commands::Version => {
            println!("CardSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("vCard PRODID {}", cardsync_vcard::PRODID);
            Ok(())
        }
        Commands::Dedupe { threshold, format } => {
            let mut config = SyncConfig::default();
            if let Some(threshold) = threshold {
                config = config.with_duplicate_threshold(threshold);
            }
            let workspace = Workspace::open(&cli.state, key, config)?;
            commands::dedupe::run(&workspace, &format)
        }
        Commands::Sync {
            id,
            due,
            keep_orphans,
            attempts,
            timeout,
            format,
        } => {
            let mut config = SyncConfig::default()
                .with_retry(RetryConfig::new(attempts))
                .with_request_timeout(Duration::from_secs(timeout));
            if keep_orphans {
                config = config.with_orphan_policy(OrphanPolicy::KeepLocal);
            }
            let workspace = Workspace::open(&cli.state, key, config)?;
            let target = match (id, due) {
                (Some(id), _) => commands::sync::Target::One(id.parse::<ConnectionId>()?),
                (None, true) => commands::sync::Target::Due,
                (None, false) => commands::sync::Target::All,
            };
            // Failed runs still record their error on the connection.
            let result = commands::sync::run(&workspace, target, &format);
            workspace.save()?;
            result
        }
        command => {
            let workspace = Workspace::open(&cli.state, key, SyncConfig::default())?;
            run_stateful(&workspace, command)?;
            workspace.save()?;
            Ok(())
        }
    }
}

fn run_stateful(workspace: &Workspace, command: Commands) -> CliResult {
    match command {
        Commands::Connection(ConnectionCommand::Add {
            url,
            username,
            password,
            name,
            review,
            auto_export,
            conflicts,
            interval,
        }) => {
            let args = commands::connection::AddArgs {
                url,
                username,
                password,
                name,
                review,
                auto_export,
                conflict_policy: conflicts.into(),
                interval_minutes: interval,
            };
            commands::connection::add(workspace, args).map(|_| ())
        }
        Commands::Connection(ConnectionCommand::List { format }) => {
            commands::connection::list(workspace, &format)
        }
        Commands::Connection(ConnectionCommand::Test { id }) => {
            commands::connection::test(workspace, id.parse::<ConnectionId>()?)
        }
        Commands::Connection(ConnectionCommand::Remove { id }) => {
            commands::connection::remove(workspace, id.parse::<ConnectionId>()?)
        }
        Commands::Import { file, review, user } => {
            commands::transfer::import(workspace, &file, &user, review).map(|_| ())
        }
        Commands::Export {
            name,
            out,
            no_photos,
            no_custom_fields,
            plain_notes,
        } => {
            let options = EncodeOptions::new()
                .include_photo(!no_photos)
                .include_custom_fields(!no_custom_fields)
                .strip_markdown(plain_notes);
            commands::transfer::export(workspace, &name, out.as_deref(), &options).map(|_| ())
        }
        Commands::Pending(PendingCommand::List { format }) => {
            commands::pending::list(workspace, &format)
        }
        Commands::Pending(PendingCommand::Accept { ids }) => {
            let ids = ids
                .iter()
                .map(|id| id.parse::<PendingImportId>())
                .collect::<Result<Vec<_>, _>>()?;
            commands::pending::accept(workspace, &ids).map(|_| ())
        }
        Commands::Pending(PendingCommand::Reject { ids }) => {
            let ids = ids
                .iter()
                .map(|id| id.parse::<PendingImportId>())
                .collect::<Result<Vec<_>, _>>()?;
            commands::pending::reject(workspace, &ids).map(|_| ())
        }
        Commands::Conflicts { format } => commands::conflicts::list(workspace, &format),
        Commands::Resolve {
            id,
            keep,
            take,
            set,
        } => {
            let resolution = commands::conflicts::resolution(keep.as_deref(), &take, &set)?;
            commands::conflicts::resolve(workspace, id.parse::<ConflictId>()?, resolution)
        }
        Commands::CheckUrl { .. }
        | Commands::Keygen { .. }
        | Commands::Encrypt { .. }
        | Commands::Decrypt { .. }
        | Commands::Inspect { .. }
        | Commands::Version
        | Commands::Dedupe { .. }
        | Commands::Sync { .. } => Ok(()),
    }
}
