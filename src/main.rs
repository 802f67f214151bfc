// ==========================================
// 标本导入系统 - 命令行入口
// ==========================================
// 子命令: init-db / configure / import / template / batches
// ==========================================

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use specimen_import::api::SpecimenUploadApi;
use specimen_import::config::ConfigManager;
use specimen_import::db::{get_default_db_path, init_schema, open_sqlite_connection, DB_PATH_ENV};
use specimen_import::domain::types::{ImportMode, TimepointType};
use specimen_import::logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "specimen-import")]
#[command(author, version, about = "Tab-delimited specimen manifest importer")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema (idempotent)
    InitDb,

    /// Configure a study container
    Configure {
        #[arg(long)]
        container: String,

        /// Visit-based or date-based study
        #[arg(long, value_enum)]
        timepoint: Option<TimepointArg>,

        /// Singular subject noun used in the upload template
        #[arg(long)]
        subject_noun: Option<String>,
    },

    /// Import a specimen file into a study container
    Import {
        #[arg(long)]
        container: String,

        /// Acting user recorded on the import batch
        #[arg(long)]
        user: String,

        /// Keep existing specimens instead of replacing them
        #[arg(long)]
        merge: bool,

        /// .tsv, .txt, .csv, .xlsx or .xls file
        file: PathBuf,
    },

    /// Print the upload template header for a study container
    Template {
        #[arg(long)]
        container: String,
    },

    /// List recent import batches
    Batches {
        #[arg(long)]
        container: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimepointArg {
    Visit,
    Date,
}

impl From<TimepointArg> for TimepointType {
    fn from(arg: TimepointArg) -> Self {
        match arg {
            TimepointArg::Visit => TimepointType::Visit,
            TimepointArg::Date => TimepointType::Date,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let db_path = cli.db.unwrap_or_else(get_default_db_path);
    info!(db_path = %db_path, version = specimen_import::VERSION, "使用数据库");

    match cli.command {
        Command::InitDb => {
            let conn = open_sqlite_connection(&db_path)
                .with_context(|| format!("could not open {}", db_path))?;
            init_schema(&conn).context("could not create schema")?;
            println!("Database ready: {}", db_path);
        }
        Command::Configure {
            container,
            timepoint,
            subject_noun,
        } => {
            let config = ConfigManager::new(&db_path, container.as_str())?;
            if let Some(timepoint) = timepoint {
                config.set_timepoint_type(timepoint.into())?;
            }
            if let Some(noun) = subject_noun {
                config.set_subject_noun(&noun)?;
            }
            println!("{}", config.get_config_snapshot()?);
        }
        Command::Import {
            container,
            user,
            merge,
            file,
        } => {
            let api = SpecimenUploadApi::new(&db_path, &container)?;
            let mode = if merge {
                ImportMode::Merge
            } else {
                ImportMode::Replace
            };
            let response = api.upload_file(&file, &user, mode).await?;

            if !response.success {
                for error in &response.errors {
                    eprintln!("{}", error);
                }
                bail!("import of {} failed", file.display());
            }
            println!("{}", serde_json::to_string_pretty(&response.summary)?);
        }
        Command::Template { container } => {
            let api = SpecimenUploadApi::new(&db_path, &container)?;
            print!("{}", api.template().await?);
        }
        Command::Batches { container, limit } => {
            let api = SpecimenUploadApi::new(&db_path, &container)?;
            for batch in api.recent_batches(limit)? {
                println!(
                    "{}\t{}\t{}\t{}\t{} rows\t{}",
                    batch.batch_id,
                    batch.imported_at.to_rfc3339(),
                    batch.imported_by,
                    batch.mode,
                    batch.total_rows,
                    batch.elapsed_ms
                );
            }
        }
    }

    Ok(())
}
