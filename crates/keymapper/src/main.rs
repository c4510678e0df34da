use anyhow::Context;
use clap::{Parser, Subcommand};
use keymapper_core::config::ConfigRows;
use keymapper_core::remap_helper::{check_if_remappings_are_valid, get_orphaned_keys};
use keymapper_core::{KeyboardManagerModule, ValidationOutcome};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{info, warn};

/// Keyboard remapper: single keys and shortcuts, globally or per application
#[derive(Parser, Debug)]
#[command(name = "keymapper")]
#[command(version)]
#[command(about = "Keyboard remapper for single keys and shortcuts", long_about = None)]
struct Args {
    /// Directory holding settings.json and the configuration files
    #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Configuration to use instead of the active one
    #[arg(short, long, value_name = "NAME")]
    config: Option<String>,

    /// Log verbosity (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the configuration and remap keys until stopped
    Run,
    /// Validate a configuration and print its tables
    Check,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    match args.command {
        Command::Run => run(&args),
        Command::Check => check(&args),
    }
}

fn load(module: &KeyboardManagerModule, args: &Args) -> anyhow::Result<()> {
    let summary = match &args.config {
        Some(name) => module.switch_configuration(name),
        None => module.load_config(),
    }
    .with_context(|| format!("loading configuration from {}", args.config_dir.display()))?;
    info!(
        config = %module.state().get_current_config_name(),
        single_key = summary.single_key_rows,
        shortcuts = summary.shortcut_rows,
        "configuration ready"
    );
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut module = KeyboardManagerModule::new(&args.config_dir);
    load(&module, args)?;
    module.enable()?;

    println!("Remapping active. Type 'reload' to re-read the configuration, 'quit' to stop.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line?.trim() {
            "quit" | "exit" => {
                module.disable();
                return Ok(());
            }
            "reload" => match module.reload() {
                Ok(summary) => println!(
                    "Reloaded: {} key rows, {} shortcut rows",
                    summary.single_key_rows, summary.shortcut_rows
                ),
                Err(err) => warn!(error = %err, "reload failed, keeping previous tables"),
            },
            "" => {}
            other => println!("Unknown command: {}", other),
        }
    }

    // No console attached: keep the hook alive until the process is killed.
    loop {
        std::thread::park();
    }
}

fn check(args: &Args) -> anyhow::Result<()> {
    let module = KeyboardManagerModule::new(&args.config_dir);
    let name = match &args.config {
        Some(name) => name.clone(),
        None => module.store().active_configuration()?,
    };
    let rows: ConfigRows = module.store().read_rows(&name)?;

    let mut valid = true;
    for (label, buffer) in [("key", &rows.single_key), ("shortcut", &rows.shortcuts)] {
        if check_if_remappings_are_valid(buffer) == ValidationOutcome::RemapUnsuccessful {
            println!("{} remaps contain incomplete or duplicate rows", label);
            valid = false;
        }
    }
    let orphaned = get_orphaned_keys(&rows.single_key);
    if !orphaned.is_empty() {
        let names: Vec<String> = orphaned.iter().map(ToString::to_string).collect();
        println!("Orphaned keys (no longer typeable): {}", names.join(", "));
    }

    module.store().load(module.state(), &name)?;
    let state = module.state();
    println!("Configuration '{}':", name);
    println!("Keys:");
    for (original, target) in state.single_key_remaps() {
        println!("  {} -> {}", original, target);
    }
    println!("Shortcuts:");
    let global = state.get_shortcut_remap_table(None);
    for original in state.get_sorted_shortcut_remap_vector(None) {
        if let Some(remap) = global.get(&original) {
            println!("  {} -> {}", original, remap.target);
        }
    }
    for (app, table) in state.app_specific_shortcut_remaps() {
        for (original, remap) in table.iter() {
            println!("  [{}] {} -> {}", app, original, remap.target);
        }
    }

    if valid {
        println!("Configuration is valid");
        Ok(())
    } else {
        anyhow::bail!("configuration '{}' has invalid rows", name)
    }
}
