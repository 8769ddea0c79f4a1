use std::path::PathBuf;
use std::process;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use facture_fixe::scraper::BillScraper;
use facture_fixe::types::{Bill, Credentials};
use facture_fixe::utils::{BillFilter, BillStats};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "facture-fixe")]
#[command(about = "An espace-client.sfr.fr fixed-line bill scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct AuthArgs {
    #[arg(long, help = "Portal login (the espace-client account email)")]
    login: String,

    #[arg(
        long,
        help = "Portal password; read from the SFR_PASSWORD environment variable when omitted"
    )]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and list every downloadable bill
    Fetch {
        #[command(flatten)]
        auth: AuthArgs,

        #[arg(
            long,
            value_name = "YYYY-MM-DD",
            help = "Keep bills from this date onwards",
            value_parser = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string()),
        )]
        start_date: Option<NaiveDate>,

        #[arg(
            long,
            value_name = "YYYY-MM-DD",
            help = "Keep bills up to this date",
            value_parser = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string()),
        )]
        end_date: Option<NaiveDate>,

        #[arg(long, help = "Maximum number of bills to return")]
        limit: Option<usize>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Log in and download every bill PDF that is not on disk yet
    Download {
        #[command(flatten)]
        auth: AuthArgs,

        #[arg(
            short = 'd',
            long = "output-dir",
            default_value = ".",
            help = "Directory the PDFs are written to"
        )]
        output_dir: PathBuf,
    },
}

fn resolve_credentials(auth: AuthArgs) -> Credentials {
    let password = auth
        .password
        .or_else(|| std::env::var("SFR_PASSWORD").ok())
        .unwrap_or_else(|| {
            log::error!("No password given: pass --password or set SFR_PASSWORD");
            process::exit(1);
        });
    Credentials::new(auth.login, password)
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn pdf_file_name(bill: &Bill) -> String {
    format!("sfr-{}-{:.2}.pdf", bill.date, bill.amount)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let scraper = BillScraper::new().unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Fetch {
            auth,
            start_date,
            end_date,
            limit,
            format,
        } => {
            let filter = BillFilter {
                start_date,
                end_date,
                limit,
            };
            let filter = filter.validate().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            let credentials = resolve_credentials(auth);
            let bills = scraper.fetch_bills(&credentials).await.unwrap_or_else(|e| {
                log::error!("Error fetching bills: {}", e);
                process::exit(1);
            });

            let bills = filter.apply(bills);

            match format {
                OutputFormat::Json => serialize_json(&bills),
                OutputFormat::Text => {
                    if bills.is_empty() {
                        println!("No bills to display.");
                    } else {
                        for (i, bill) in bills.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, bill);
                        }
                        print!("{}", BillStats::from_bills(&bills));
                    }
                }
            }
        }

        Commands::Download { auth, output_dir } => {
            let credentials = resolve_credentials(auth);
            let bills = scraper.fetch_bills(&credentials).await.unwrap_or_else(|e| {
                log::error!("Error fetching bills: {}", e);
                process::exit(1);
            });

            if let Err(e) = std::fs::create_dir_all(&output_dir) {
                log::error!("Cannot create {}: {}", output_dir.display(), e);
                process::exit(1);
            }

            let mut written = 0usize;
            for bill in &bills {
                let path = output_dir.join(pdf_file_name(bill));
                if path.exists() {
                    log::info!("{} already on disk, skipping", path.display());
                    continue;
                }

                let bytes = scraper.download_pdf(&bill.pdf_url).await.unwrap_or_else(|e| {
                    log::error!("Error downloading {}: {}", bill.pdf_url, e);
                    process::exit(1);
                });

                if let Err(e) = std::fs::write(&path, &bytes) {
                    log::error!("Cannot write {}: {}", path.display(), e);
                    process::exit(1);
                }
                written += 1;
            }

            println!("Downloaded {} of {} bill(s).", written, bills.len());
        }
    }
}
