//! Schema export for client-side stub generation.
//!
//! Emits, for each message variant, its JSONSchema document. External
//! tooling consumes the output at build time to generate client-side type
//! definitions; nothing here touches the runtime data path.

use clap::Parser;
use std::path::PathBuf;

use bounty_bridge::events::SchemaRegistry;

#[derive(Parser)]
#[command(name = "schema-stubs")]
#[command(about = "Emit JSONSchema documents for every message variant", long_about = None)]
struct Cli {
    /// Write to this file instead of stdout.
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let registry = SchemaRegistry::standard();
    let export = serde_json::to_string_pretty(&registry.export())?;

    match cli.out {
        Some(path) => {
            std::fs::write(&path, export)?;
            eprintln!("Wrote schema stubs to {}", path.display());
        }
        None => println!("{export}"),
    }
    Ok(())
}
