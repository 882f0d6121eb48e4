use super::{load_options, open_tree, read_summary, resolve};
use anyhow::{Context, Result};
use arbor_editor::WriteFormat;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Summary file to upgrade
    pub input: PathBuf,

    /// Output file (default: overwrite the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep only this many trailing edits after the base tree
    #[arg(short, long)]
    pub window: Option<u64>,
}

pub fn upgrade(args: UpgradeArgs, cwd: &Path) -> Result<()> {
    let summary = read_summary(&args.input, cwd)?;
    let from = summary.format();

    let upgraded = match args.window {
        None => summary.upgrade()?,
        Some(window) => {
            let mut options = load_options(cwd)?;
            options.summary_edit_window = Some(window);
            open_tree(&summary, options)?.summarize_as(WriteFormat::V0_1_1)?
        }
    };

    let output = resolve(args.output.as_deref().unwrap_or(&args.input), cwd);
    std::fs::write(&output, upgraded.to_json()?).with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "✨ {} {} → {}",
        "Upgraded".green().bold(),
        from,
        upgraded.format()
    );
    println!("   Latest revision: {}", upgraded.latest_seq());
    println!("   Output: {}", output.display());
    Ok(())
}
