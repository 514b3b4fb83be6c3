use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod analytics;
mod config;
mod db;
mod error;
mod grading;
mod models;
mod query;
mod report;

use config::Config;
use query::{SortBy, SortOrder, StudentFilters};

#[derive(Parser)]
#[command(name = "student-insights")]
#[command(about = "Student records, placement eligibility and batch analytics", long_about = None)]
struct Cli {
    /// Config file (defaults to ./student-insights.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Postgres connection string; overrides database.url from the config file
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Semester {
    #[value(name = "5th")]
    Fifth,
    #[value(name = "7th")]
    Seventh,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default student-insights.toml
    InitConfig,
    /// Create or upgrade the database schema
    InitDb,
    /// Load seed records for one semester batch
    Seed {
        #[arg(long, value_enum)]
        semester: Semester,
    },
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List students with optional filters
    List {
        /// Case-insensitive match on name or USN
        #[arg(long)]
        search: Option<String>,
        /// Batch such as 5th-sem; "all" disables the filter
        #[arg(long)]
        batch: Option<String>,
        #[arg(long, value_name = "true|false")]
        eligible: Option<bool>,
        #[arg(long, default_value = "usn")]
        sort_by: SortBy,
        #[arg(long, default_value = "asc")]
        sort_order: SortOrder,
        #[arg(long)]
        json: bool,
    },
    /// Show one student's academic detail
    Show {
        usn: String,
        #[arg(long)]
        json: bool,
    },
    /// Print aggregate analytics
    Analytics {
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown analytics report
    Report {
        #[arg(long)]
        batch: Option<String>,
        #[arg(long, default_value = "analytics-report.md")]
        out: PathBuf,
    },
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

/// Batch argument with "all" and blanks treated as no scope.
fn batch_scope(batch: Option<String>) -> Option<String> {
    StudentFilters::for_batch(batch.as_deref())
        .batch_scope()
        .map(str::to_string)
}

const REMEDIATION: &str = "failed to load student data; run `student-insights init-db` and `student-insights seed` first";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    if let Commands::InitConfig = cli.command {
        let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);
        if path.exists() {
            anyhow::bail!("{} already exists; edit it or remove it first", path.display());
        }
        std::fs::write(path, Config::default_toml()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}.", path.display());
        return Ok(());
    }

    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(url) = cli.database_url.clone() {
        config.database.url = Some(url);
    }
    debug!(?config, "loaded configuration");
    let threshold = config.analytics.eligibility_threshold;
    let options = config.analytics.options;
    let pool = db::connect(&config).await?;

    match cli.command {
        Commands::InitConfig => {}
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { semester } => {
            let message = match semester {
                Semester::Fifth => db::seed_fifth_sem_data(&pool, threshold).await,
                Semester::Seventh => db::seed_seventh_sem_data(&pool, threshold).await,
            }
            .context("failed to seed data")?;
            println!("{message}");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(&pool, &csv, threshold).await?;
            println!("Imported {written} students from {}.", csv.display());
        }
        Commands::List {
            search,
            batch,
            eligible,
            sort_by,
            sort_order,
            json,
        } => {
            let filters = StudentFilters {
                search,
                batch,
                placement_eligible: eligible,
                sort_by,
                sort_order,
            };
            let list = db::list_students(&pool, &filters)
                .await
                .context(REMEDIATION)?;
            info!(total = list.total, sort_by = %filters.sort_by, "listed students");

            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", report::render_student_list(&list));
            }
        }
        Commands::Show { usn, json } => match db::get_student(&pool, &usn).await {
            Ok(student) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&student)?);
                } else {
                    print!("{}", report::render_student_detail(&student, threshold));
                }
            }
            Err(err) if err.is_not_found() => {
                eprintln!("Student not found: the requested USN '{}' does not exist.", usn.trim());
                eprintln!("Run `student-insights list` to browse students.");
                std::process::exit(1);
            }
            Err(err) => return Err(err).context(REMEDIATION),
        },
        Commands::Analytics { batch, json } => {
            let batch = batch_scope(batch);
            let summary = db::get_analytics(&pool, batch.as_deref(), &options)
                .await
                .context(REMEDIATION)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!(
                    "{}",
                    report::build_report(batch.as_deref(), chrono::Utc::now(), &summary)
                );
            }
        }
        Commands::Report { batch, out } => {
            let batch = batch_scope(batch);
            let summary = db::get_analytics(&pool, batch.as_deref(), &options)
                .await
                .context(REMEDIATION)?;
            let report = report::build_report(batch.as_deref(), chrono::Utc::now(), &summary);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
