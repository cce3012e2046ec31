//! vmount binary.
//!
//! Loads a static mount configuration, initializes the registry and runs
//! one operation.
//!
//! Usage:
//!   vmount --config vmount.toml mounts
//!   vmount --config vmount.toml ls home:///docs
//!   vmount --mount scratch=/tmp/scratch cat scratch:///notes.md
//!   echo hi | vmount --mount scratch=/tmp/scratch write scratch:///hi.txt
//!
//! Logs go to stderr; set `RUST_LOG=vmount_kernel=debug` to see dispatch.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vmount_kernel::{
    Dispatcher, FileMetadata, ListFilter, MountParams, MountRegistry, Request, RequestOptions,
    Response, VfsConfig,
};

/// Virtual filesystem mount layer.
#[derive(Parser, Debug)]
#[command(name = "vmount")]
#[command(about = "Inspect and operate on vmount mountpoints")]
struct Args {
    /// Static mount configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra local mount, NAME=DIR (repeatable)
    #[arg(short, long = "mount", value_name = "NAME=DIR")]
    mounts: Vec<String>,

    /// Fall back to this mount for unmatched paths
    #[arg(long)]
    default_mount: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mountpoints
    Mounts {
        /// Include hidden and special mounts
        #[arg(short, long)]
        all: bool,
    },
    /// Show which mount owns a path
    Resolve {
        path: String,
        /// Don't fall back to the default mount
        #[arg(long)]
        strict: bool,
    },
    /// List a directory
    Ls { path: String },
    /// Print a file to stdout
    Cat { path: String },
    /// Print an entry's metadata as JSON
    Stat { path: String },
    /// Write stdin to a file
    Write { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Remove a file or directory tree
    Rm { path: String },
    /// Copy a file or tree within a mount
    Cp { from: String, to: String },
    /// Move within a mount
    Mv { from: String, to: String },
    /// Print a URL for an entry
    Url { path: String },
}

fn parse_mount(spec: &str) -> Result<MountParams> {
    let Some((name, dir)) = spec.split_once('=') else {
        bail!("--mount expects NAME=DIR, got {spec:?}");
    };
    Ok(MountParams::new(name, "local").option("root", dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VfsConfig::default(),
    };
    let registry = Arc::new(MountRegistry::with_config(config));
    if let Some(name) = &args.default_mount {
        registry.set_default_mount(Some(name.clone()));
    }

    // Queued ahead of the config mounts
    for spec in &args.mounts {
        registry.queue_or_register(parse_mount(spec)?, None, false).await?;
    }
    registry.init().await?;

    let dispatcher = Dispatcher::new(registry.clone());
    run(&dispatcher, args.command).await
}

async fn run(dispatcher: &Dispatcher, command: Command) -> Result<()> {
    let registry = dispatcher.registry();
    let meta = |path: &str| registry.metadata(path, None);
    let opts = RequestOptions::new;

    match command {
        Command::Mounts { all } => {
            let filter = if all {
                ListFilter::all()
            } else {
                ListFilter::visible()
            };
            for info in registry.mount_info(filter) {
                let mut flags = Vec::new();
                if info.read_only {
                    flags.push("ro");
                }
                if info.internal {
                    flags.push("internal");
                }
                if info.dynamic {
                    flags.push("dynamic");
                }
                if info.special {
                    flags.push("special");
                }
                println!("{:<12} {:<10} {}", info.root, info.transport, flags.join(","));
            }
        }
        Command::Resolve { path, strict } => match registry.resolve(&path, !strict) {
            Some(name) => println!("{name}"),
            None => bail!("no mount owns {path}"),
        },
        Command::Ls { path } => {
            let dir = registry.metadata(path.as_str(), Some("directory"));
            let entries = dispatcher
                .request_path(Request::Scandir { dir }, opts())
                .await?
                .into_entries()
                .unwrap_or_default();
            for entry in entries {
                let suffix = if entry.is_dir() { "/" } else { "" };
                println!("{:>10}  {}{}", entry.size(), entry.filename(), suffix);
            }
        }
        Command::Cat { path } => {
            let data = dispatcher
                .request_path(Request::Read { file: meta(&path) }, opts())
                .await?
                .into_data()
                .unwrap_or_default();
            std::io::stdout().write_all(&data)?;
        }
        Command::Stat { path } => {
            let info = dispatcher
                .request_path(Request::Fileinfo { file: meta(&path) }, opts())
                .await?
                .into_info()
                .context("backend returned no metadata")?;
            println!("{}", serde_json::to_string_pretty(&info.to_plain_object())?);
        }
        Command::Write { path } => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            let request = Request::Write {
                file: meta(&path),
                data,
            };
            if let Response::Written(n) = dispatcher.request_path(request, opts()).await? {
                eprintln!("wrote {n} bytes to {path}");
            }
        }
        Command::Mkdir { path } => {
            let dir = FileMetadata::directory(path);
            dispatcher.request_path(Request::Mkdir { dir }, opts()).await?;
        }
        Command::Rm { path } => {
            dispatcher
                .request_path(Request::Unlink { file: meta(&path) }, opts())
                .await?;
        }
        Command::Cp { from, to } => {
            let request = Request::Copy {
                from: meta(&from),
                to: meta(&to),
            };
            dispatcher.request_path(request, opts()).await?;
        }
        Command::Mv { from, to } => {
            let request = Request::Move {
                from: meta(&from),
                to: meta(&to),
            };
            dispatcher.request_path(request, opts()).await?;
        }
        Command::Url { path } => {
            if let Response::Url(url) = dispatcher
                .request_path(Request::Url { file: meta(&path) }, opts())
                .await?
            {
                println!("{url}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mount() {
        let params = parse_mount("scratch=/tmp/scratch").unwrap();
        assert_eq!(params.name, "scratch");
        assert_eq!(params.transport, "local");
        assert_eq!(
            params.options.get("root").and_then(|v| v.as_str()),
            Some("/tmp/scratch")
        );
        assert!(parse_mount("scratch").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "vmount", "--mount", "a=/tmp/a", "-m", "b=/tmp/b", "resolve", "--strict", "a:///x",
        ])
        .unwrap();
        assert_eq!(args.mounts.len(), 2);
        assert!(matches!(args.command, Command::Resolve { strict: true, .. }));
    }

    #[tokio::test]
    async fn test_run_against_memory_mount() {
        let registry = Arc::new(MountRegistry::new());
        registry.init().await.unwrap();
        registry.add(MountParams::new("mem", "memory")).await.unwrap();
        let dispatcher = Dispatcher::new(registry);

        run(&dispatcher, Command::Mkdir { path: "mem:///d".into() }).await.unwrap();
        run(&dispatcher, Command::Stat { path: "mem:///d".into() }).await.unwrap();
        assert!(run(&dispatcher, Command::Cat { path: "mem:///nope".into() }).await.is_err());
        assert!(run(&dispatcher, Command::Resolve { path: "x:///".into(), strict: true }).await.is_err());
    }
}
