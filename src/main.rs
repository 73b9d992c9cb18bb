//! Tessera CLI
//!
//! Usage:
//!   tessera [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -r, --root <DIR>        Directory templates are looked up in
//!       --sandbox <DIR>     Directory `..` lookups may reach
//!       --config <FILE>     Renderer configuration (TOML format)
//!   -c, --context <FILE>    JSON context, `-` reads stdin
//!       --ext <EXT>         Default template extension
//!       --ast               Print the resolved document tree instead of rendering
//!       --async             Render on the asynchronous pipeline
//!   -v, --verbose           Increase log verbosity (repeatable)

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use tracing::Level;

use tessera::{AsyncRenderer, Renderer, RendererConfig, TemplateError};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Render composable text templates")]
struct Cli {
    /// Template name, relative to the root directory
    template: String,

    /// Directory templates are looked up in
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Directory `..` lookups may reach
    #[arg(long)]
    sandbox: Option<PathBuf>,

    /// Renderer configuration file (TOML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON context file; `-` reads from stdin
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Default template extension
    #[arg(long)]
    ext: Option<String>,

    /// Print the resolved document tree instead of rendering
    #[arg(long)]
    ast: bool,

    /// Render on the asynchronous pipeline
    #[arg(long = "async")]
    use_async: bool,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // Load config, then let flags override it
    let mut config = match &cli.config {
        Some(path) => match RendererConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RendererConfig::default(),
    };
    if let Some(root) = &cli.root {
        config = config.with_root_directory(root);
    }
    if let Some(sandbox) = &cli.sandbox {
        config = config.with_sandbox_directory(sandbox);
    }
    if let Some(ext) = &cli.ext {
        config = config.with_default_extension(ext);
    }

    let context = match read_context(cli.context.as_ref()) {
        Ok(value) => value,
        Err(message) => {
            eprintln!("Error reading context: {}", message);
            std::process::exit(1);
        }
    };

    let result = if cli.use_async {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("Error starting runtime: {}", e);
                std::process::exit(1);
            }
        };
        runtime.block_on(run_async(config, &cli.template, &context, cli.ast))
    } else {
        run(config, &cli.template, &context, cli.ast)
    };

    match result {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("{}", e.report());
            std::process::exit(1);
        }
    }
}

fn run(
    config: RendererConfig,
    template: &str,
    context: &Value,
    ast: bool,
) -> Result<String, TemplateError> {
    let renderer = Renderer::from_config(config)?;
    if ast {
        return Ok(renderer.document(template)?.tree());
    }
    renderer.render(template, context)
}

async fn run_async(
    config: RendererConfig,
    template: &str,
    context: &Value,
    ast: bool,
) -> Result<String, TemplateError> {
    let renderer = AsyncRenderer::from_config(config)?;
    if ast {
        return Ok(renderer.document(template).await?.tree());
    }
    renderer.render(template, context).await
}

fn read_context(path: Option<&PathBuf>) -> Result<Value, String> {
    let text = match path {
        None => return Ok(Value::Object(Default::default())),
        Some(path) if path.as_os_str() == "-" => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("stdin: {}", e))?;
            buffer
        }
        Some(path) => {
            fs::read_to_string(path).map_err(|e| format!("'{}': {}", path.display(), e))?
        }
    };
    serde_json::from_str(&text).map_err(|e| e.to_string())
}
