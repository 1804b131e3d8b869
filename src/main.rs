//! pkgdb inspection binary
//!
//! Usage: pkgdb [--data-dir DIR] <command>
//!
//! Exit codes:
//!   0 - Success
//!   1 - Database error

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pkgdb::db::{DbConfig, PackageDb, RelationId};
use pkgdb::relation::{Scope, Variant};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and maintain a package database")]
struct Cli {
    #[arg(long, default_value = "./data", env = "PKGDB_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every pair of a relation
    List {
        relation: RelationId,
        #[arg(long, value_enum, default_value_t = ScopeArg::Public)]
        scope: ScopeArg,
    },
    /// Print the values of some keys
    Fetch {
        relation: RelationId,
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, value_enum, default_value_t = ScopeArg::Both)]
        scope: ScopeArg,
    },
    /// Print the packages owning some files
    Owners {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Rewrite a relation's files in canonical order
    Rebuild {
        relation: RelationId,
        #[arg(long)]
        private: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Public,
    Private,
    Both,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Public => Scope::Public,
            ScopeArg::Private => Scope::Private,
            ScopeArg::Both => Scope::Both,
        }
    }
}

fn print_row(key: &[u8], value: Option<impl std::fmt::Display>) {
    let key = String::from_utf8_lossy(key);
    match value {
        Some(value) => println!("{}\t{}", key, value),
        None => println!("{}\t-", key),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Cli { data_dir, command } = Cli::parse();
    let db = PackageDb::open(DbConfig::new(data_dir)).await?;

    match command {
        Command::List { relation, scope } => {
            for (key, value) in db.list(relation, scope.into()).await? {
                print_row(&key, Some(value));
            }
        }
        Command::Fetch {
            relation,
            keys,
            scope,
        } => {
            for (key, value) in db.fetch(relation, &keys, scope.into()).await? {
                print_row(&key, value);
            }
        }
        Command::Owners { files } => {
            let rows = db
                .joined_fetch(&files, &[RelationId::FileId, RelationId::IdName], Scope::Both)
                .await?;
            for (file, owner) in rows {
                print_row(&file, owner);
            }
        }
        Command::Rebuild { relation, private } => {
            let variant = if private {
                Variant::Private
            } else {
                Variant::Public
            };
            db.rebuild(relation, variant).await?;
            tracing::info!(%relation, ?variant, "rebuild complete");
        }
    }

    Ok(())
}
