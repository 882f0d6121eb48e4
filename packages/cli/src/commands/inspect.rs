use super::{load_options, open_tree, read_summary};
use anyhow::Result;
use arbor_editor::{ChangeNode, IdCompressor, NodeId, TreeView};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Summary file to inspect
    pub input: PathBuf,

    /// Show the tree as of this sequence number (default: latest)
    #[arg(short, long)]
    pub seq: Option<u64>,

    /// Print node ids as stable UUIDs
    #[arg(long)]
    pub stable_ids: bool,

    /// Print the tree as JSON instead of an outline
    #[arg(long)]
    pub json: bool,
}

pub fn inspect(args: InspectArgs, cwd: &Path) -> Result<()> {
    let summary = read_summary(&args.input, cwd)?;
    let mut tree = open_tree(&summary, load_options(cwd)?)?;
    let seq = args.seq.unwrap_or_else(|| tree.latest_seq());
    let view = tree.view_at(seq)?;
    let root = view.to_tree(view.root()).ok_or_else(|| anyhow::anyhow!("root is missing"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&root)?);
        return Ok(());
    }

    println!("🌳 {} {}", "Summary".green().bold(), args.input.display());
    println!("   Format:    {}", summary.format());
    println!(
        "   Revisions: {}..={}",
        tree.edit_log().earliest_seq(),
        tree.latest_seq()
    );
    println!("   Showing:   {}", seq);
    println!("   Nodes:     {}", view.size());
    println!();
    print_node(&root, tree.compressor(), args.stable_ids, "", None);
    Ok(())
}

fn format_id(id: NodeId, compressor: &IdCompressor, stable: bool) -> String {
    if stable {
        match compressor.decompress(id) {
            Ok(stable) => return stable.to_string(),
            Err(err) => tracing::warn!(%id, error = %err, "id has no stable form"),
        }
    }
    id.to_string()
}

fn print_node(node: &ChangeNode, compressor: &IdCompressor, stable: bool, indent: &str, label: Option<&str>) {
    let label = label.map(|l| format!("{}: ", l.cyan())).unwrap_or_default();
    let payload = node
        .payload
        .as_ref()
        .map(|p| format!(" = {}", p.to_string().yellow()))
        .unwrap_or_default();
    println!(
        "{}{}{} {}{}",
        indent,
        label,
        node.definition.as_str().bold(),
        format!("#{}", format_id(node.identifier, compressor, stable)).dimmed(),
        payload
    );

    let nested = format!("{indent}  ");
    for (trait_label, children) in &node.traits {
        for child in children {
            print_node(child, compressor, stable, &nested, Some(trait_label.as_str()));
        }
    }
}
