// ─────────────────────────────────────────────────────────────────────────────
//  tsuki-discover  —  Arduino include discovery & library resolution
//
//  Runs the board's preprocessor over a merged sketch, maps every missing
//  header to an installed library, and repeats until nothing is missing.
//
//  USAGE
//  ─────
//    tsuki-discover run     --sketch build/sketch/blink.ino.cpp --board uno \
//                           --libraries ~/Arduino/libraries --hardware /usr/share/arduino/hardware
//    tsuki-discover resolve Servo.h --board uno --libraries ~/Arduino/libraries
//    tsuki-discover libs    --libraries ~/Arduino/libraries
//    tsuki-discover boards
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use tsuki_discover::config::CONFIG_FILE;
use tsuki_discover::platform::PlatformCore;
use tsuki_discover::{Board, DiscoveryConfig, LibraryIndex, Pipeline};

// ─────────────────────────────────────────────────────────────────────────────
//  CLI definition (clap derive)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "tsuki-discover",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Find the Arduino libraries a sketch needs by asking the compiler",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Suppress the summary output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log every probe and resolution step
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Discover include folders and imported libraries for a sketch
    Run(RunArgs),
    /// Show the ranked candidates for one header
    Resolve {
        /// Header name, e.g. "Servo.h"
        header: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List the libraries found in the configured folders
    Libs {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List all catalog boards
    Boards,
}

#[derive(Args)]
struct CommonArgs {
    /// Config file (default: ./tsuki-discover.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target board ID or FQBN  (e.g. uno, arduino:avr:leonardo)
    #[arg(long, short = 'b')]
    board: Option<String>,

    /// Override the target architecture
    #[arg(long)]
    arch: Option<String>,

    /// Hardware folders  (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    hardware: Vec<PathBuf>,

    /// Library folders in priority order  (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    libraries: Vec<PathBuf>,

    /// Do not append the platform's bundled libraries folder
    #[arg(long)]
    no_platform_libs: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Merged sketch translation unit (.cpp)
    #[arg(long)]
    sketch: Option<PathBuf>,

    /// Build directory  (where --write puts includes.json)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Compiler binary  (default: avr-g++)
    #[arg(long)]
    compiler: Option<PathBuf>,

    /// Extra compiler flag  (repeatable)
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Also write the JSON result to <build-dir>/includes.json
    #[arg(long)]
    write: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("tsuki_discover=debug")
        } else if cli.quiet {
            EnvFilter::new("tsuki_discover=warn")
        } else {
            EnvFilter::new("tsuki_discover=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Cmd::Run(args)                  => cmd_run(args, cli.quiet),
        Cmd::Resolve { header, common } => cmd_resolve(&header, common),
        Cmd::Libs { common }            => cmd_libs(common),
        Cmd::Boards                     => { cmd_boards(); Ok(()) }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_run(args: RunArgs, quiet: bool) -> Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(s) = args.sketch {
        cfg.sketch = Some(s);
    }
    if let Some(b) = args.build_dir {
        cfg.build_dir = Some(b);
    }
    if let Some(c) = args.compiler {
        cfg.compiler.path = c;
    }
    cfg.compiler.flags.extend(args.flags);

    let build_dir = cfg.build_dir.clone();
    let t0 = Instant::now();
    let ctx = Pipeline::new(cfg).run()?;

    if args.write {
        let dir = build_dir.context("--write needs a build directory (--build-dir)")?;
        std::fs::create_dir_all(&dir)?;
        let out = dir.join("includes.json");
        std::fs::write(&out, ctx.to_json()?)
            .with_context(|| format!("cannot write {}", out.display()))?;
    }

    if args.json {
        println!("{}", ctx.to_json()?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!(
        "{} {} {}",
        "Resolved".cyan().bold(),
        format!("[board: {}]", ctx.board.fqbn).dimmed(),
        format!("[arch: {}]", ctx.arch).dimmed(),
    );
    println!("{}", "─".repeat(60).dimmed());

    if ctx.imported_libraries.is_empty() {
        println!("  {}", "no libraries needed".dimmed());
    }
    for lib in &ctx.imported_libraries {
        let version = lib.version.as_deref().unwrap_or("");
        println!(
            "  {} {:<28} {} {}",
            "•".green(),
            lib.name.bold(),
            version.dimmed(),
            lib.source_folder.display().to_string().dimmed()
        );
    }
    println!(
        "\n{} {} librar{}, {} include folder(s), {} probe(s) in {:.2}s",
        "✓".green().bold(),
        ctx.imported_libraries.len(),
        if ctx.imported_libraries.len() == 1 { "y" } else { "ies" },
        ctx.include_folders.len(),
        ctx.iterations,
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_resolve(header: &str, common: CommonArgs) -> Result<()> {
    let cfg = load_config(&common)?;
    let board = Board::find(&cfg.board)?;
    let arch = cfg.arch.clone().unwrap_or_else(|| board.arch.clone());
    let index = build_index(&cfg, &board);

    if index.is_platform_header(header) {
        println!("{} {} is provided by the {} core", "•".cyan(), header.bold(), board.fqbn);
        return Ok(());
    }

    let candidates = index.resolve(header, &HashSet::new(), &arch);
    if candidates.is_empty() {
        println!("{} No library provides '{}' for {}", "!".yellow(), header, arch);
        return Ok(());
    }

    for (rank, lib) in candidates.iter().enumerate() {
        let marker = if rank == 0 { "→".green().bold() } else { " ".normal() };
        println!(
            "{} {}. {:<28} {}",
            marker,
            rank + 1,
            lib.name.cyan(),
            lib.folder.display().to_string().dimmed()
        );
    }
    Ok(())
}

fn cmd_libs(common: CommonArgs) -> Result<()> {
    let cfg = load_config(&common)?;
    let board = Board::find(&cfg.board)?;
    let index = build_index(&cfg, &board);

    if index.is_empty() {
        println!("{} No libraries found.", "!".yellow());
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:<10} {}",
        "LIBRARY".bold().underline(),
        "VERSION".bold().underline(),
        "LAYOUT".bold().underline(),
        "HEADERS".bold().underline()
    );
    println!("{}", "─".repeat(70).dimmed());

    for lib in index.libraries() {
        let headers: Vec<&str> = lib.provided_headers.iter().map(String::as_str).collect();
        println!(
            "{:<28} {:<10} {:<10} {}",
            lib.name.cyan(),
            lib.version.as_deref().unwrap_or("?").dimmed(),
            format!("{:?}", lib.layout).to_lowercase(),
            headers.join(" ")
        );
    }
    println!("\n  {} libraries", index.len());
    Ok(())
}

fn cmd_boards() {
    println!("{:<14} {:<30} {:<8} {}", "ID", "NAME", "ARCH", "FQBN");
    println!("{}", "─".repeat(80).dimmed());
    for b in Board::catalog() {
        println!("{:<14} {:<30} {:<8} {}", b.id.cyan(), b.name, b.arch, b.fqbn.dimmed());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config(common: &CommonArgs) -> Result<DiscoveryConfig> {
    let mut cfg = match &common.config {
        Some(path) => DiscoveryConfig::load(path)?,
        None => {
            let cwd = std::env::current_dir()?;
            DiscoveryConfig::load_or_default(&cwd)
                .with_context(|| format!("reading {}", cwd.join(CONFIG_FILE).display()))?
        }
    };

    if let Some(b) = &common.board {
        cfg.board = b.clone();
    }
    if let Some(a) = &common.arch {
        cfg.arch = Some(a.clone());
    }
    if !common.hardware.is_empty() {
        cfg.hardware_folders = common.hardware.clone();
    }
    if !common.libraries.is_empty() {
        cfg.library_folders = common.libraries.clone();
    }
    if common.no_platform_libs {
        cfg.platform_libraries = false;
    }
    cfg.apply_env();
    Ok(cfg)
}

fn build_index(cfg: &DiscoveryConfig, board: &Board) -> LibraryIndex {
    let platform = PlatformCore::locate(&cfg.hardware_folders, board);
    LibraryIndex::scan(&cfg.library_roots(&platform), &platform.headers)
}
