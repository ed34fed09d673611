//! querycube - query snapshot analyzer

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use log::info;
use querycube::catalog::BuiltinTypeResolver;
use querycube::config::DisplayConfiguration;
use querycube::query::{
    analyze_code, derive_from_interaction, generate_code, BaseQuery, GridInteraction, GridSortItem,
};
use querycube::snapshot::{FinalizedSnapshot, SortDirection};
use querycube::value::Column;
use std::path::PathBuf;

/// querycube - analyze Pure relation queries into snapshots
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source column as name:Type (repeatable)
    #[arg(short, long = "column", global = true)]
    columns: Vec<Column>,

    /// Query name recorded in the snapshot
    #[arg(short, long, default_value = "query", global = true)]
    name: String,

    /// Display configuration JSON file
    #[arg(short = 'C', long, global = true)]
    configuration: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the snapshot of a query as JSON
    Analyze { query: String },

    /// Analyze a query and print the code regenerated from its snapshot
    Generate { query: String },

    /// Apply a grid grouping/sorting to a query and print the resulting code
    Derive {
        query: String,

        /// Row group column (repeatable)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Sort as column:ascending|descending (repeatable)
        #[arg(short, long = "sort", value_parser = parse_sort_item)]
        sorts: Vec<GridSortItem>,
    },
}

fn parse_sort_item(s: &str) -> Result<GridSortItem> {
    let (column, direction) = s.rsplit_once(':').unwrap_or((s, "ascending"));
    let Some(direction) = SortDirection::from_function_name(direction) else {
        bail!("Invalid sort direction '{}': expected ascending or descending", direction);
    };
    Ok(GridSortItem {
        column: column.to_string(),
        direction,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let configuration = match &args.configuration {
        Some(path) => DisplayConfiguration::from_path(path)?
            .to_value()
            .context("Failed to encode configuration")?,
        None => serde_json::Value::Null,
    };
    let base = BaseQuery {
        name: args.name.clone(),
        configuration,
    };

    match &args.command {
        Command::Analyze { query } => {
            let snapshot = analyze(query, &args.columns, &base)?;
            println!("{}", snapshot.to_json()?);
        }
        Command::Generate { query } => {
            let snapshot = analyze(query, &args.columns, &base)?;
            println!("{}", generate_code(&snapshot).unwrap_or_default());
        }
        Command::Derive {
            query,
            groups,
            sorts,
        } => {
            let snapshot = analyze(query, &args.columns, &base)?;
            let request = GridInteraction {
                row_group_columns: groups.clone(),
                sort_model: sorts.clone(),
            };
            let derived = derive_from_interaction(&snapshot, &request)
                .context("Failed to apply grid interaction")?;
            println!("{}", generate_code(&derived).unwrap_or_default());
        }
    }

    Ok(())
}

fn analyze(query: &str, columns: &[Column], base: &BaseQuery) -> Result<FinalizedSnapshot> {
    let snapshot = analyze_code(query, columns, base, &BuiltinTypeResolver)?;
    info!(
        "Analyzed query '{}' into snapshot {} ({})",
        base.name,
        snapshot.uuid(),
        snapshot.hash_code()
    );
    Ok(snapshot)
}
