/*!
 * Orbit Cloud CLI - Command Line Interface
 *
 * Browses and transfers objects over the connections declared in a TOML
 * configuration file.
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orbit_cloud::{
    backend::{Bucket, ObjectRef},
    cli_progress::CliProgressRenderer,
    config::{CloudConfig, LogLevel},
    core::{
        events::JobReporter,
        path::format_file_size,
        preview::PreviewContent,
        transfer::{JobStatus, TransferJob},
    },
    error::{CloudError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging,
    service::CloudService,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "orbit-cloud")]
#[command(version, about = "Browse and transfer objects on S3 and Google Cloud Storage", long_about = None)]
struct Cli {
    /// Configuration file with engine settings and connections
    #[arg(short, long, value_name = "FILE", default_value = "orbit-cloud.toml")]
    config: PathBuf,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Log file path (JSON lines)
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Do not draw progress bars
    #[arg(long = "no-progress", global = true)]
    no_progress: bool,

    /// Connection id from the configuration
    connection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List buckets
    Buckets,

    /// Create a bucket
    Mb {
        bucket: String,
        /// Region or location constraint
        #[arg(long)]
        region: Option<String>,
    },

    /// Delete an empty bucket
    Rb { bucket: String },

    /// List the folder below a prefix
    Ls {
        bucket: String,
        #[arg(default_value = "")]
        prefix: String,
        /// List every descendant instead of one level
        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Show object metadata
    Stat { bucket: String, key: String },

    /// Print a text preview or an image data URL
    Preview { bucket: String, key: String },

    /// Create a folder
    Mkdir { bucket: String, path: String },

    /// Delete an object or a folder and everything below it
    Rm { bucket: String, key: String },

    /// Copy an object or folder within the connection
    Cp {
        bucket: String,
        source: String,
        dest: String,
        /// Destination bucket (defaults to the source bucket)
        #[arg(long = "to-bucket")]
        to_bucket: Option<String>,
    },

    /// Move an object or folder within the connection
    Mv {
        bucket: String,
        source: String,
        dest: String,
        #[arg(long = "to-bucket")]
        to_bucket: Option<String>,
    },

    /// Duplicate an object or folder next to itself
    Clone { bucket: String, key: String },

    /// Rename an object or folder in place
    Rename {
        bucket: String,
        key: String,
        new_name: String,
    },

    /// Check whether a key exists
    Exists { bucket: String, key: String },

    /// Download an object or folder into a local directory
    Get {
        bucket: String,
        key: String,
        #[arg(default_value = ".")]
        local_dir: PathBuf,
    },

    /// Upload local files or directories into a folder
    Put {
        bucket: String,
        /// Destination folder ("" for the bucket root)
        folder: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<CloudError>()
                .map(CloudError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut config = CloudConfig::from_file(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    if cli.log.is_some() {
        config.logging.file = cli.log.clone();
    }
    config.logging.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(execute(cli, config))
}

async fn execute(cli: Cli, config: CloudConfig) -> Result<i32> {
    let (reporter, events) = JobReporter::channel();
    let renderer = CliProgressRenderer::new(!cli.no_progress && !cli.json).spawn(events);
    let service = CloudService::new(config, reporter);

    let conn = cli.connection.as_str();
    let object = |bucket: &str, key: &str| ObjectRef::from_key(conn, bucket, key);

    let code = match cli.command {
        Commands::Buckets => {
            let buckets = service.list_buckets(conn).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            } else {
                for bucket in &buckets {
                    let created = bucket
                        .created
                        .map(|c| c.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("{:<19}  {:<14}  {}", created, bucket.region.as_deref().unwrap_or("-"), bucket.name);
                }
            }
            EXIT_SUCCESS
        }

        Commands::Mb { bucket, region } => {
            let mut new_bucket = Bucket::new(bucket.as_str());
            if let Some(region) = region {
                new_bucket = new_bucket.with_region(region);
            }
            service.create_bucket(conn, &new_bucket).await?;
            println!("Created bucket: {}", bucket);
            EXIT_SUCCESS
        }

        Commands::Rb { bucket } => {
            service.delete_bucket(conn, &bucket).await?;
            println!("Removed bucket: {}", bucket);
            EXIT_SUCCESS
        }

        Commands::Ls { bucket, prefix, recursive } => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let prefix = if prefix.is_empty() {
                prefix
            } else {
                orbit_cloud::core::path::ensure_folder_path(&prefix)
            };
            let entries = if recursive {
                let mut report = |count: usize| tracing::debug!(count, "Listed so far");
                service
                    .list_files_recursive(conn, &bucket, &prefix, Some(&cancel), Some(&mut report))
                    .await?
            } else {
                service.list_files(conn, &bucket, &prefix, Some(&cancel)).await?
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_listing(&entries);
            }
            EXIT_SUCCESS
        }

        Commands::Stat { bucket, key } => {
            let detail = service.get_object_detail(&object(&bucket, &key), false).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            EXIT_SUCCESS
        }

        Commands::Preview { bucket, key } => {
            let detail = service.get_object_detail(&object(&bucket, &key), true).await?;
            let detail_has_preview = detail.preview.is_some();
            match detail.preview {
                Some(PreviewContent::Text(text)) => print!("{}", text),
                Some(PreviewContent::Image(data_url)) => println!("{}", data_url),
                None => eprintln!("{} cannot be previewed", key),
            }
            if detail_has_preview {
                EXIT_SUCCESS
            } else {
                EXIT_PARTIAL
            }
        }

        Commands::Mkdir { bucket, path } => {
            let folder = service.create_folder(&object(&bucket, &path)).await?;
            println!("Created folder: {}", folder);
            EXIT_SUCCESS
        }

        Commands::Rm { bucket, key } => {
            service.delete_tree(&object(&bucket, &key)).await?;
            println!("Deleted: {}/{}", bucket, key);
            EXIT_SUCCESS
        }

        Commands::Cp { bucket, source, dest, to_bucket } => {
            let destination = object(to_bucket.as_deref().unwrap_or(&bucket), &dest);
            service.copy_tree(&object(&bucket, &source), &destination).await?;
            println!("Copied: {}/{} -> {}", bucket, source, destination);
            EXIT_SUCCESS
        }

        Commands::Mv { bucket, source, dest, to_bucket } => {
            let destination = object(to_bucket.as_deref().unwrap_or(&bucket), &dest);
            service.move_tree(&object(&bucket, &source), &destination).await?;
            println!("Moved: {}/{} -> {}", bucket, source, destination);
            EXIT_SUCCESS
        }

        Commands::Clone { bucket, key } => {
            let cloned = service.clone_object(&object(&bucket, &key)).await?;
            println!("Cloned: {}/{} -> {}", bucket, key, cloned);
            EXIT_SUCCESS
        }

        Commands::Rename { bucket, key, new_name } => {
            let renamed = service.rename_object(&object(&bucket, &key), &new_name).await?;
            println!("Renamed: {}/{} -> {}", bucket, key, renamed);
            EXIT_SUCCESS
        }

        Commands::Exists { bucket, key } => {
            let exists = service.object_exists(&object(&bucket, &key)).await?;
            println!("{}", exists);
            if exists {
                EXIT_SUCCESS
            } else {
                EXIT_PARTIAL
            }
        }

        Commands::Get { bucket, key, local_dir } => {
            let mut target = object(&bucket, &key);
            if !target.is_folder() {
                target = service.get_object_detail(&target, false).await?.object;
            }
            let job = service.download(&target, &local_dir).await?;
            report_jobs(&[job], cli.json)?
        }

        Commands::Put { bucket, folder, paths } => {
            let folder = ObjectRef::folder(conn, bucket.as_str(), &folder);
            let folder = if folder.path == "/" {
                folder.with_path("")
            } else {
                folder
            };
            let jobs = service.upload_files(&folder, &paths).await?;
            report_jobs(&jobs, cli.json)?
        }
    };

    // The renderer stops once the last reporter is dropped
    drop(service);
    let _ = renderer.await;
    Ok(code)
}

fn print_listing(entries: &[ObjectRef]) {
    for entry in entries {
        let modified = entry
            .last_modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let size = if entry.is_folder() {
            "PRE".to_string()
        } else {
            format_file_size(entry.size.unwrap_or(0))
        };
        println!("{:<19}  {:>12}  {}", modified, size, entry.path);
    }
}

fn report_jobs(jobs: &[TransferJob], json: bool) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(jobs)?);
    }

    let failed: Vec<&TransferJob> = jobs.iter().filter(|j| j.status == JobStatus::Failed).collect();
    if failed.is_empty() {
        return Ok(EXIT_SUCCESS);
    }
    for job in &failed {
        eprintln!(
            "✗ {} -> {}: {}",
            job.object,
            display(&job.local_path),
            job.error.as_deref().unwrap_or("failed")
        );
    }
    Err(CloudError::Transfer(format!("{} of {} transfers failed", failed.len(), jobs.len())).into())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
