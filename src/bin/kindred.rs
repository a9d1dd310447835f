//! Kindred CLI: fetch CoreNLP and parse annotated corpora.
//!
//! Usage:
//!   kindred download [--cache-root path]
//!   kindred status [--cache-root path]
//!   kindred parse <corpus.json> [--output path] [--url url] [--constituency]

use clap::{Parser as ClapParser, Subcommand};
use kindred::{
    AnnotationBackend, AssetError, AssetManager, Corpus, CoreNlpClient, ParseError, Parser,
    ParserConfig, Pipeline,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit status for a bundle that fails its integrity check
const EXIT_INTEGRITY: i32 = 255;

#[derive(ClapParser)]
#[command(
    name = "kindred",
    version,
    about = "Parse annotated documents with Stanford CoreNLP"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Cache directory for CoreNLP (default ~/.kindred)
    #[arg(long, global = true)]
    cache_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and unpack CoreNLP into the cache
    Download,
    /// Report whether CoreNLP is installed and a server is reachable
    Status,
    /// Parse a JSON corpus and write it back with sentences
    Parse {
        /// Corpus file to parse
        input: PathBuf,
        /// Where to write the parsed corpus (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// CoreNLP server URL
        #[arg(long)]
        url: Option<String>,
        /// Use the constituency parser for dependencies (slower)
        #[arg(long)]
        constituency: bool,
        /// Annotation requests to keep in flight
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Fail instead of downloading CoreNLP when it is missing
        #[arg(long)]
        no_download: bool,
    },
}

fn load_config(cli: &Cli) -> Result<ParserConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ParserConfig::from_yaml_file(path),
        None => ParserConfig::from_env(),
    }
    .map_err(|e| format!("Failed to load configuration: {}", e))?;
    if let Some(root) = &cli.cache_root {
        config = config.with_cache_root(root);
    }
    Ok(config)
}

fn exit_code_for(e: &ParseError) -> i32 {
    match e {
        ParseError::Asset(AssetError::Integrity { .. }) => EXIT_INTEGRITY,
        _ => 1,
    }
}

async fn cmd_download(config: &ParserConfig) -> i32 {
    let assets = match config.resolved_cache_root() {
        Ok(root) => AssetManager::new(root),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if assets.is_installed(&config.bundle) {
        println!("CoreNLP is already downloaded. No need to download");
        return 0;
    }
    match assets.ensure(&config.bundle).await {
        Ok(dir) => {
            println!("CoreNLP installed at {}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                AssetError::Integrity { .. } => EXIT_INTEGRITY,
                _ => 1,
            }
        }
    }
}

async fn cmd_status(config: &ParserConfig) -> i32 {
    let installed = config
        .resolved_cache_root()
        .ok()
        .and_then(|root| AssetManager::new(root).locate(&config.bundle));
    match installed {
        Some(dir) => println!("{:<10} {}", "installed", dir.display()),
        None => println!("{:<10} no", "installed"),
    }

    let reachable = match CoreNlpClient::new(&config.corenlp_url, config.pipeline, config.request_timeout) {
        Ok(client) => client.probe().await,
        Err(_) => false,
    };
    println!(
        "{:<10} {} ({})",
        "server",
        if reachable { "reachable" } else { "unreachable" },
        config.corenlp_url
    );
    0
}

async fn cmd_parse(
    config: ParserConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    concurrency: usize,
) -> i32 {
    let mut corpus = match Corpus::from_json_file(&input) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", input.display(), e);
            return 1;
        }
    };
    let mut parser = match Parser::connect(config).await {
        Ok(p) => p.with_concurrency(concurrency),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    let result = parser.parse(&mut corpus).await;
    parser.shutdown().await;
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return exit_code_for(&e);
    }

    let json = match corpus.to_json_string() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match output {
        Some(path) => match std::fs::write(&path, json) {
            Ok(()) => {
                println!("Wrote {} documents to {}", corpus.len(), path.display());
                0
            }
            Err(e) => {
                eprintln!("Error: cannot write '{}': {}", path.display(), e);
                1
            }
        },
        None => {
            println!("{}", json);
            0
        }
    }
}

async fn run(cli: Cli) -> i32 {
    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match cli.command {
        Commands::Download => cmd_download(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Parse {
            input,
            output,
            url,
            constituency,
            concurrency,
            no_download,
        } => {
            if let Some(url) = url {
                config = config.with_url(url);
            }
            if constituency {
                config = config.with_pipeline(Pipeline::Constituency);
            }
            if no_download {
                config = config.with_download_if_missing(false);
            }
            cmd_parse(config, input, output, concurrency).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kindred=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Dropping `run` on Ctrl-C drops any managed server, which kills it.
    let code = tokio::select! {
        code = run(cli) => code,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            130
        }
    };
    std::process::exit(code);
}
