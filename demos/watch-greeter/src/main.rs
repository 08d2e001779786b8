//! Hot reloads the `greeter` library.
//!
//! Run from the workspace root:
//!
//! ```text
//! cargo build -p greeter
//! cargo run -p watch-greeter
//! # edit demos/greeter/src/lib.rs, then in another shell:
//! cargo build -p greeter
//! ```

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;

use clap::Parser;
use hmr::{ConsoleNotifier, Hmr, HmrOptions, ModuleHandle, RunOutcome};
use tracing::{info, warn};

type Export = extern "C" fn(i32, i32) -> i32;

#[derive(Parser, Debug)]
#[command(name = "watch-greeter", version, about = "Hot reload the greeter demo library")]
struct Args {
    /// Library to load, relative to this source file
    #[arg(long)]
    library: Option<String>,

    /// Path or glob to watch, relative to the working directory
    #[arg(long)]
    watch: Option<String>,

    /// Config file (defaults to ./hmr.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not clear the terminal before each reload
    #[arg(long)]
    no_clear: bool,

    /// Print lifecycle events as JSON lines on stdout
    #[arg(long)]
    events: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn library_name() -> String {
    format!("{DLL_PREFIX}greeter{DLL_SUFFIX}")
}

fn greet(module: ModuleHandle<hmr::Dylib>) -> anyhow::Result<()> {
    // SAFETY: both exports are `extern "C" fn(i32, i32) -> i32` in the greeter crate
    let default = unsafe { module.get::<Export>("default")? };
    let named_export = unsafe { module.get::<Export>("named_export")? };

    info!(
        token = %module.token(),
        default = default(2, 3),
        named_export = named_export(2, 3),
        "greeter loaded"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let colors = !args.no_color && hmr::logger::should_use_colors();
    hmr::logger::init_logger(args.verbose, args.quiet, !colors);

    let mut options = match &args.config {
        Some(path) => HmrOptions::load_from(path)?,
        None => HmrOptions::load()?,
    };
    if args.no_clear {
        options.clear_on_reload = false;
    }

    let library = args
        .library
        .unwrap_or_else(|| format!("../../../target/debug/{}", library_name()));
    let watch = args
        .watch
        .unwrap_or_else(|| format!("target/debug/{}", library_name()));

    let mut session = Hmr::with_options(library, options)
        .caller(hmr::caller_location!())
        .watch(watch)
        .notifier(ConsoleNotifier::new(true, colors));

    if args.events {
        let (tx, mut rx) = hmr::events::channel();
        session = session.events(tx);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "could not serialize event"),
                }
            }
        });
    }

    let task = session.spawn(greet);

    tokio::select! {
        report = task.join() => {
            if let RunOutcome::Halted(err) = report.outcome {
                return Err(err.into());
            }
            info!(reloads = report.deliveries, "watch ended");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
