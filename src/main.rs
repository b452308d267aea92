use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tallybook::cli::{handle_check_command, handle_import_command, ImportOptions};

#[derive(Parser)]
#[command(
    name = "tallybook",
    version,
    about = "Import transactions and track them against a budget",
    long_about = "tallybook imports transactions from GnuCash books or CSV bank \
                  statements, assigns them to budget estimates through \
                  user-defined rules, and reports actual activity against the \
                  budgeted amounts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a file, assign its transactions, and report actuals
    Import {
        /// GnuCash book or CSV statement to import
        file: PathBuf,

        /// Assignment rules file (JSON)
        #[arg(short, long)]
        rules: PathBuf,

        /// Budget estimate tree file (JSON); enables progress reporting
        #[arg(short, long)]
        budget: Option<PathBuf>,

        /// Start of the date range (YYYY-MM-DD); only applied with --end
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// End of the date range (YYYY-MM-DD); only applied with --start
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Treat the file as CSV with the named column profile
        /// (default, bank, credit-card)
        #[arg(long)]
        csv_profile: Option<String>,
    },

    /// Parse a file and report its contents without assigning
    Check {
        /// GnuCash book or CSV statement to inspect
        file: PathBuf,

        /// Start of the date range (YYYY-MM-DD); only applied with --end
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// End of the date range (YYYY-MM-DD); only applied with --start
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Treat the file as CSV with the named column profile
        #[arg(long)]
        csv_profile: Option<String>,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    s.parse()
        .map_err(|_| format!("Invalid date: {} (expected YYYY-MM-DD)", s))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Import {
            file,
            rules,
            budget,
            start,
            end,
            csv_profile,
        } => {
            let options = ImportOptions {
                start,
                end,
                csv_profile,
            };
            handle_import_command(&file, &rules, budget.as_deref(), &options)?;
        }
        Commands::Check {
            file,
            start,
            end,
            csv_profile,
        } => {
            handle_check_command(&file, start, end, csv_profile.as_deref())?;
        }
    }
    Ok(())
}
