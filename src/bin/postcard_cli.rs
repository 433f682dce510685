//! Postcard Studio CLI
//!
//! Commands: serve, templates, validate, build
//! Outputs JSON to stdout
//! Returns 2 on validation failure

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use postcard_studio::{
    config::{DEFAULT_ALLOWLIST, DEFAULT_BIND_ADDR, DEFAULT_DESIGN_DIR},
    engine::{LayerDocumentImporter, MemoryEngineFactory},
    loader::HttpFetcher,
    server, BusinessData, ContentSource, EditorConfig, EditorMode, EditorSession, ExportFormat,
    ExportOptions, FileServerConfig, TemplateCatalog, Validator,
};

#[derive(Parser)]
#[command(name = "postcard-cli")]
#[command(about = "Postcard Studio CLI - templates, design files and exports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Template catalog file or directory
    #[arg(short = 'T', long, default_value = "templates")]
    templates_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve allowlisted design files over HTTP
    Serve {
        /// Directory holding the design files
        #[arg(long, default_value = DEFAULT_DESIGN_DIR)]
        root: PathBuf,

        #[arg(long, default_value_t = DEFAULT_BIND_ADDR)]
        bind: SocketAddr,

        /// Allowed file name (repeatable); defaults to the built-in list
        #[arg(long = "allow")]
        allow: Vec<String>,
    },

    /// List templates
    Templates {
        /// Only templates in this category ("all" for every template)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Validate template configurations
    Validate {
        /// Template ID; every template when omitted
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Build a template and export it
    Build {
        /// Template ID
        #[arg(short, long)]
        template: String,

        /// Business data JSON file
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(short, long, default_value = "pdf")]
        format: ExportFormat,

        /// Output file; named after the design when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Import the template's design file from the file server
        #[arg(long)]
        design_file: bool,

        #[arg(long, env = "POSTCARD_FILE_SERVER_URL")]
        file_server_url: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let output = serde_json::json!({ "success": false, "error": format!("{e:#}") });
            println!("{output}");
            ExitCode::FAILURE
        }
    }
}

fn load_catalog(path: &Path) -> Result<TemplateCatalog> {
    TemplateCatalog::load_from_path(path)
        .with_context(|| format!("failed to load templates from {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Serve { root, bind, allow } => {
            let allowlist = if allow.is_empty() {
                DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
            } else {
                allow
            };
            server::serve(FileServerConfig {
                root,
                allowlist,
                bind,
            })
            .await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Templates { category } => {
            let catalog = load_catalog(&cli.templates_dir)?;
            let templates = match category.as_deref() {
                Some(c) => catalog.by_category(c),
                None => catalog.list(),
            };
            let listing: Vec<_> = templates
                .iter()
                .map(|t| {
                    let availability = t.availability();
                    serde_json::json!({
                        "id": t.id,
                        "name": t.name,
                        "category": t.category,
                        "designFile": t.design_file,
                        "available": availability.is_valid,
                        "reason": availability.reason,
                        "fileSize": availability.file_size,
                    })
                })
                .collect();
            print_json(&listing)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate { template } => {
            let catalog = load_catalog(&cli.templates_dir)?;
            let validator = Validator::new()
                .with_allowlist(DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect());
            let targets = match template {
                Some(id) => match catalog.get(&id) {
                    Some(t) => vec![t],
                    None => bail!("template not found: {id}"),
                },
                None => catalog.list(),
            };
            let results: Vec<_> = targets.into_iter().map(|t| validator.validate(t)).collect();
            print_json(&results)?;
            if results.iter().all(|r| r.valid) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }

        Commands::Build {
            template,
            data,
            format,
            out,
            design_file,
            file_server_url,
        } => {
            let catalog = load_catalog(&cli.templates_dir)?;
            let template = catalog
                .get(&template)
                .with_context(|| format!("template not found: {template}"))?;
            let data: BusinessData = match data {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&raw).context("invalid business data")?
                }
                None => BusinessData::default(),
            };

            let mut config = EditorConfig::from_env();
            config.mode = EditorMode::Advanced;
            if design_file {
                config.source = ContentSource::DesignFile;
            }
            if let Some(url) = file_server_url {
                config.file_server_url = url;
            }

            let session = EditorSession::open(
                &MemoryEngineFactory::default(),
                &LayerDocumentImporter,
                &HttpFetcher::default(),
                &config,
                template,
                &data,
            )
            .await
            .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;

            let exported = session.export(format, &ExportOptions::default()).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(&exported.filename));
            tokio::fs::write(&path, &exported.bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;

            print_json(&serde_json::json!({
                "success": true,
                "session": session.id(),
                "path": path,
                "export": exported,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
