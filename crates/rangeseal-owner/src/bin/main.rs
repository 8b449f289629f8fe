//! rangeseal-owner binary: data owner and delegated searcher CLI
//!
//! ```bash
//! rangeseal-owner init --config owner.json --store-path ./owner --set grpA --set grpB
//! rangeseal-owner insert --config owner.json --records records.json
//! rangeseal-owner find --config owner.json --partition grpA --dimension B --value loc1 \
//!     --from 2024-01-01T00:00:00Z --to 2024-01-02T00:00:00Z
//! rangeseal-owner delegate --config owner.json --partition grpA --out searcher.json
//! rangeseal-owner search --config searcher.json --dimension B --value loc1 --from ... --to ...
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rangeseal_core::{Dimension, Field, Record};
use rangeseal_owner::{
    DocumentResult, Owner, OwnerConfig, RangeQuery, Searcher, SearcherConfig,
};

#[derive(Parser, Debug)]
#[command(name = "rangeseal-owner")]
#[command(about = "Insert and range-query encrypted records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct RangeArgs {
    /// Index dimension: A (UserId) or B (Location)
    #[arg(long, default_value = "B")]
    dimension: Dimension,

    /// Field value to match in that dimension
    #[arg(long)]
    value: String,

    /// Range start (RFC 3339)
    #[arg(long)]
    from: DateTime<Utc>,

    /// Range end, inclusive (RFC 3339)
    #[arg(long)]
    to: DateTime<Utc>,

    /// Also decrypt the Set field
    #[arg(long)]
    with_sets: bool,
}

impl RangeArgs {
    fn fields(&self) -> Vec<Field> {
        if self.with_sets {
            vec![Field::UserId, Field::Set]
        } else {
            vec![Field::UserId]
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an owner config and generate keys
    Init {
        #[arg(long, default_value = "owner.json")]
        config: PathBuf,

        #[arg(long, default_value = "./rangeseal-owner")]
        store_path: PathBuf,

        /// Known partition (repeatable)
        #[arg(long = "set", required = true)]
        set_list: Vec<String>,

        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        #[arg(long)]
        prefind: bool,
    },

    /// Insert records from a JSON array
    Insert {
        #[arg(long, default_value = "owner.json")]
        config: PathBuf,

        #[arg(long)]
        records: PathBuf,
    },

    /// Range query as the owner
    Find {
        #[arg(long, default_value = "owner.json")]
        config: PathBuf,

        #[arg(long)]
        partition: String,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Export a searcher config for one partition
    Delegate {
        #[arg(long, default_value = "owner.json")]
        config: PathBuf,

        #[arg(long)]
        partition: String,

        #[arg(long, default_value = "searcher.json")]
        out: PathBuf,
    },

    /// Range query with a delegated searcher config
    Search {
        #[arg(long, default_value = "searcher.json")]
        config: PathBuf,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rangeseal_owner=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Init {
            config,
            store_path,
            set_list,
            server,
            prefind,
        } => {
            let owner_config = OwnerConfig::new(store_path, set_list)
                .with_server_addr(server)
                .with_prefind(prefind);
            let owner = Owner::open(owner_config)?;
            owner.config().save(&config)?;
            println!(
                "[OK] Owner initialized: keys at {}, config at {}",
                owner.config().keys_path().display(),
                config.display()
            );
        }
        Command::Insert { config, records } => {
            let owner = Owner::open(OwnerConfig::load(&config)?)?;
            let content = std::fs::read_to_string(&records)?;
            let records: Vec<Record> = serde_json::from_str(&content)?;
            let ids = owner.insert(&records).await?;
            println!("[OK] Inserted {} documents", ids.len());
            for id in ids {
                println!("  {}", id);
            }
        }
        Command::Find {
            config,
            partition,
            range,
        } => {
            let owner = Owner::open(OwnerConfig::load(&config)?)?;
            let query = RangeQuery::new(partition, range.dimension, &range.value, range.from, range.to);
            let results = owner.find_range(&query, &range.fields()).await?;
            print_results(&results)?;
        }
        Command::Delegate {
            config,
            partition,
            out,
        } => {
            let owner = Owner::open(OwnerConfig::load(&config)?)?;
            owner.export_searcher_config(&partition)?.save(&out)?;
            println!("[OK] Searcher config for {} written to {}", partition, out.display());
        }
        Command::Search { config, range } => {
            let searcher = Searcher::open(SearcherConfig::load(&config)?)?;
            let query = RangeQuery::new(
                searcher.partition(),
                range.dimension,
                &range.value,
                range.from,
                range.to,
            );
            let results = searcher.find_range(&query, &range.fields()).await?;
            print_results(&results)?;
        }
    }

    Ok(())
}

fn print_results(results: &[DocumentResult]) -> anyhow::Result<()> {
    println!("{} matching documents", results.len());
    for result in results {
        match result {
            Ok(record) => println!("  {}", serde_json::to_string(&record.fields)?),
            Err(e) => println!("  [ERROR] {}", e),
        }
    }
    Ok(())
}
