use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use violation_tracker::auth::{AuthGateway, EnvIdentityProvider};
use violation_tracker::blob::FsBlobStore;
use violation_tracker::models::{NewViolation, ViolationFilter, ViolationStatus};
use violation_tracker::store::{StudentStore, ViolationStore};
use violation_tracker::{db, report, stats};

#[derive(Parser)]
#[command(name = "violation-tracker")]
#[command(about = "Student violation tracker for campus disciplinary staff", long_about = None)]
struct Cli {
    /// Log debug detail
    #[arg(long, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Upsert students from a CSV export, keyed on NIM
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Submit a new violation
    Record {
        #[arg(long)]
        student_name: String,
        /// NIM of the student involved
        #[arg(long)]
        student_id: String,
        #[arg(long = "type")]
        violation_type: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        reported_by: String,
        /// Photo evidence to upload alongside the record
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// List violations, newest first
    List {
        #[arg(long)]
        student_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Search students by name, NIM, or program
    Search { query: String },
    /// List all students
    Students,
    /// Move a violation to a new status
    UpdateStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: String,
    },
    /// Dashboard counts for violations and students
    Stats,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Sign in against the configured identity provider
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportStudents { csv } => {
            let pool = connect().await?;
            let imported = db::import_students_csv(&pool, &csv).await?;
            println!("Imported {imported} students from {}.", csv.display());
        }
        Commands::Record {
            student_name,
            student_id,
            violation_type,
            description,
            location,
            reported_by,
            image,
        } => {
            let pool = connect().await?;
            let (violations, _) = stores(pool);
            let image_bytes = match &image {
                Some(path) => Some(
                    std::fs::read(path)
                        .with_context(|| format!("failed to read image {}", path.display()))?,
                ),
                None => None,
            };
            let input = NewViolation {
                student_name,
                student_id,
                violation_type,
                description,
                location,
                reported_by,
            };
            let id = violations.add(&input, image_bytes.as_deref()).await?;
            println!("Violation recorded with id {id}.");
        }
        Commands::List {
            student_id,
            status,
            from,
            to,
        } => {
            let pool = connect().await?;
            let (violations, _) = stores(pool);
            let filter = ViolationFilter {
                student_id,
                status: status
                    .as_deref()
                    .map(str::parse::<ViolationStatus>)
                    .transpose()?,
                date_from: from.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|d| d.and_utc()),
                date_to: to.and_then(|d| d.and_hms_opt(23, 59, 59)).map(|d| d.and_utc()),
            };
            let found = violations.query(&filter).await?;
            if found.is_empty() {
                println!("No violations match.");
                return Ok(());
            }
            for violation in found {
                println!(
                    "- {} [{}] {} ({}): {} at {}{}",
                    violation.reported_at.format("%Y-%m-%d %H:%M"),
                    violation.status,
                    violation.student_name,
                    violation.student_id,
                    violation.violation_type,
                    violation.location,
                    violation
                        .image_url
                        .as_deref()
                        .map(|url| format!(" (photo: {url})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Search { query } => {
            let pool = connect().await?;
            let (_, students) = stores(pool);
            let found = students.search(&query).await?;
            if found.is_empty() {
                println!("No students match '{query}'.");
                return Ok(());
            }
            for hit in found {
                println!(
                    "- {} ({}, {}) {} violations{}",
                    hit.student.name,
                    hit.student.nim,
                    hit.student.program,
                    hit.violation_count,
                    hit.last_violation
                        .map(|at| format!(", last on {}", at.format("%Y-%m-%d")))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Students => {
            let pool = connect().await?;
            let (_, students) = stores(pool);
            for student in students.list_all().await? {
                println!(
                    "- {} ({}, {}, enrolled {}, {})",
                    student.name,
                    student.nim,
                    student.program,
                    student.enrollment_year,
                    student.status
                );
            }
        }
        Commands::UpdateStatus { id, status } => {
            let pool = connect().await?;
            let (violations, _) = stores(pool);
            let status: ViolationStatus = status.parse()?;
            violations.update_status(id, status).await?;
            println!("Violation {id} moved to {status}.");
        }
        Commands::Stats => {
            let pool = connect().await?;
            let (violations, students) = stores(pool);
            let vstats = violations.stats().await?;
            let sstats = students.stats().await?;
            println!("{}", serde_json::to_string_pretty(&vstats)?);
            println!("{}", serde_json::to_string_pretty(&sstats)?);
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let (violations, students) = stores(pool);
            let all = violations.query(&ViolationFilter::default()).await?;
            let vstats = violations.stats().await?;
            let sstats = students.stats().await?;
            let report = report::build_report(
                stats::local_day(Utc::now()),
                &all,
                &vstats,
                &sstats,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Login { email, password } => {
            let provider = EnvIdentityProvider::from_env()?;
            let gateway = AuthGateway::new(Arc::new(provider));
            let session = gateway.login(&email, &password).await?;
            println!("Signed in as {} ({}).", session.email, session.role);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("violation_tracker={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Wire the store objects once at startup and hand them to the command
/// handlers. The violation store owns the blob store; the student store
/// depends on the violation store for its projection.
fn stores(pool: PgPool) -> (Arc<dyn ViolationStore>, Arc<dyn StudentStore>) {
    let blob_dir = std::env::var("VIOLATION_BLOB_DIR").unwrap_or_else(|_| "blobs".to_string());
    let blobs = Arc::new(FsBlobStore::new(blob_dir));
    let violations: Arc<dyn ViolationStore> = Arc::new(db::PgViolationStore::new(pool.clone(), blobs));
    let students: Arc<dyn StudentStore> =
        Arc::new(db::PgStudentStore::new(pool, violations.clone()));
    (violations, students)
}
