pub mod inspect;
pub mod upgrade;
pub mod verify;

pub use inspect::{inspect, InspectArgs};
pub use upgrade::{upgrade, UpgradeArgs};
pub use verify::{verify, VerifyArgs};

use anyhow::{Context, Result};
use arbor_editor::{NullSequencer, SharedTree, SharedTreeOptions, Summary};
use std::path::{Path, PathBuf};

/// Resolve `path` against the working directory.
fn resolve(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn read_summary(path: &Path, cwd: &Path) -> Result<Summary> {
    let path = resolve(path, cwd);
    let json = std::fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    Summary::from_json(&json).with_context(|| format!("{} is not a readable summary", path.display()))
}

fn load_options(cwd: &Path) -> Result<SharedTreeOptions> {
    SharedTreeOptions::load(cwd).context("invalid options file")
}

/// A detached replica holding the summarized document.
fn open_tree(summary: &Summary, options: SharedTreeOptions) -> Result<SharedTree> {
    Ok(SharedTree::load(summary, options, Box::new(NullSequencer))?)
}
