use super::{load_options, open_tree, read_summary};
use anyhow::{bail, Result};
use arbor_editor::{EditStatus, NullSequencer, SharedTree, SharedTreeOptions};
use arbor_tree::{apply_edit, views_semantically_equal};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Summary file to verify
    pub input: PathBuf,

    /// List every edit that did not apply
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Default)]
struct Tally {
    valid: usize,
    invalid: usize,
    malformed: usize,
}

pub fn verify(args: VerifyArgs, cwd: &Path) -> Result<()> {
    println!("🔍 {} {}", "Verifying".green().bold(), args.input.display());

    let summary = read_summary(&args.input, cwd)?;
    let mut tree = open_tree(&summary, load_options(cwd)?)?;
    let earliest = tree.edit_log().earliest_seq();
    let latest = tree.latest_seq();

    let mut tally = Tally::default();
    let mut view = tree.view_at(earliest)?;
    for seq in earliest + 1..=latest {
        let Some(edit) = tree.edit_log().sequenced_edit_at(seq).cloned() else {
            bail!("edit {seq} is missing from the log");
        };
        let result = apply_edit(&view, edit.changes)?;
        match result.status() {
            EditStatus::Valid => tally.valid += 1,
            EditStatus::Invalid => tally.invalid += 1,
            EditStatus::Malformed => tally.malformed += 1,
        }
        if args.verbose && result.status() != EditStatus::Valid {
            let reason = result.failure().map(|f| f.to_string()).unwrap_or_default();
            println!("   {} #{} {} {}", "✗".red(), seq, edit.id, reason.dimmed());
        }
        if let Some(after) = result.after() {
            view = after.clone();
        }
    }

    if view != tree.view_at(latest)? {
        bail!("replaying the log does not reproduce revision {latest}");
    }

    // The document must survive being written and read back.
    let rewritten = tree.summarize_as(summary.format())?;
    let reloaded = SharedTree::load(&rewritten, SharedTreeOptions::default(), Box::new(NullSequencer))?;
    if !views_semantically_equal(tree.current_view(), tree.compressor(), reloaded.current_view(), reloaded.compressor()) {
        bail!("summary does not round trip");
    }

    println!();
    println!("✨ {} Summary is consistent", "Done".green().bold());
    println!("   Format:    {}", summary.format());
    println!("   Revisions: {}..={}", earliest, latest);
    println!("   Valid:     {}", tally.valid);
    if tally.invalid > 0 {
        println!("   {} {}", "Invalid:  ".yellow(), tally.invalid);
    }
    if tally.malformed > 0 {
        println!("   {} {}", "Malformed:".red(), tally.malformed);
    }
    Ok(())
}
