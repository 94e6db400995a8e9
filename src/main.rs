use clap::{Parser, Subcommand};
use imgfly::config::{self, ServerConfig};
use imgfly::imaging::{self, Dimensions};
use imgfly::{output, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imgfly")]
#[command(about = "On-demand image resizing server")]
#[command(long_about = "\
On-demand image resizing server

Serves images from a bucket directory and transforms them on request:

  GET /<key>                           original bytes
  GET /<key>?w=400                     400px wide, height from aspect ratio
  GET /<key>?w=400&h=400               cover 400x400, cropped top-left
  GET /<key>?w=400&format=jpeg&quality=80

Images are never upscaled: a request larger than the source returns the
original. Transformed responses are cached on disk by URL.

Run 'imgfly gen-config' to generate a documented imgfly.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Listen address, overrides server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Bucket directory, overrides storage.root
    #[arg(long)]
    root: Option<PathBuf>,

    /// Disable the response cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Requested width (0 = derive from height)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Requested height (0 = derive from width)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Source size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    natural: Dimensions,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Print the pipeline planned for a request, without touching any image
    Plan(PlanArgs),
    /// Validate the config and list the decoders compiled in
    Check,
    /// Print a stock imgfly.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let mut config = ServerConfig::load(cli.config.as_deref())?;
            if let Some(bind) = args.bind {
                config.server.bind = bind;
            }
            if let Some(root) = args.root {
                config.storage.root = root;
            }
            if args.no_cache {
                config.cache.enabled = false;
            }
            config.validate()?;
            init_tracing(&config.log.level);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(&config))?;
        }
        Command::Plan(args) => {
            let plan = imaging::resolve_pipeline(args.width, args.height, args.natural);
            for line in output::format_plan(args.width, args.height, args.natural, &plan) {
                println!("{line}");
            }
        }
        Command::Check => {
            let config = ServerConfig::load(cli.config.as_deref())?;
            for line in output::format_check(&config, imaging::supported_input_formats()) {
                println!("{line}");
            }
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

fn parse_size(s: &str) -> Result<Dimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    Ok(Dimensions::new(width, height))
}
