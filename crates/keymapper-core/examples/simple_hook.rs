use keymapper_core::KeyboardManagerModule;
use std::io::BufRead;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Starting Full Hook Test...");

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut module = KeyboardManagerModule::new(&dir);

    let summary = module.load_config()?;
    println!(
        "Loaded '{}' from {:?}: {} key rows, {} shortcut rows",
        module.state().get_current_config_name(),
        dir,
        summary.single_key_rows,
        summary.shortcut_rows
    );
    for (original, target) in module.state().single_key_remaps() {
        println!("  {} -> {}", original, target);
    }
    for original in module.state().get_sorted_shortcut_remap_vector(None) {
        println!("  {} (global)", original);
    }

    module.enable()?;
    println!("Hook installed. Press Enter to stop.");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    module.disable();
    Ok(())
}
