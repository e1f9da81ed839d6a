use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use tag_catalog::database::repo::ItemRecord;
use tag_catalog::utils::load_config;
use tag_catalog::Catalog;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Overrides CATALOG_DB_PATH.
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a catalog query, e.g. `search 1girl -solo order:score`.
    Search {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,

        /// Shuffle the hits when the query allows it.
        #[arg(long)]
        shuffle: bool,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 50)]
        per_page: usize,
    },
    /// Items most similar to the given item.
    Related {
        item_id: i64,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Look up a tag's id and similarity weight.
    Tag { name: String },
    /// Corpus statistics.
    Stats,
    /// Import a JSON array of item records.
    Import { path: PathBuf },
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    path: tag_catalog::SearchPath,
    total: usize,
    page: usize,
    shuffled: bool,
    hits: &'a [tag_catalog::model::SearchHit],
}

#[derive(Serialize)]
struct TagOutput<'a> {
    name: &'a str,
    id: Option<i64>,
    weight: f64,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = load_config()?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    let catalog = Catalog::open(config)?;

    match args.command {
        Command::Search {
            query,
            shuffle,
            page,
            per_page,
        } => {
            let mut results = catalog.search(&query.join(" "));
            let shuffled = shuffle && results.shuffle(&mut rand::thread_rng());
            if shuffle && !shuffled {
                warn!("{:?} results keep their order; not shuffling", results.path);
            }
            print_json(&SearchOutput {
                path: results.path,
                total: results.len(),
                page,
                shuffled,
                hits: results.page(page, per_page),
            })?;
        }
        Command::Related { item_id, limit } => {
            print_json(&*catalog.related(item_id, limit))?;
        }
        Command::Tag { name } => {
            print_json(&TagOutput {
                name: &name,
                id: catalog.get_tag_id(&name),
                weight: catalog.weight_for(&name),
            })?;
        }
        Command::Stats => {
            print_json(&*catalog.stats()?)?;
        }
        Command::Import { path } => {
            let file = File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
            let records: Vec<ItemRecord> = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse {:?}", path))?;

            let bar = ProgressBar::new(records.len() as u64);
            bar.set_style(ProgressStyle::with_template(
                "{bar:40} {pos}/{len} items ({eta})",
            )?);

            let mut writer = catalog.writer();
            for record in records {
                writer.add(record)?;
                bar.inc(1);
            }
            writer.flush()?;
            bar.finish_and_clear();
            info!("Imported {:?}", path);

            print_json(&*catalog.stats()?)?;
        }
    }

    Ok(())
}
