//! `knit graph`: print the module table as JSON.

use std::io::Write;

use anyhow::Context;
use knit_bundler::{Bundler, FileSystem, ModuleLowering};

use super::ProjectArgs;

pub fn execute(args: ProjectArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let project = args.resolve(&cwd)?;

    let source = FileSystem::new(&project.root);
    let (entry, table) = Bundler::new(&source, &ModuleLowering)
        .with_options(project.options)
        .graph(&project.entry)?;

    let report = serde_json::json!({
        "entry": entry,
        "dialect": project.options.dialect,
        "modules": table,
    });

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &report)?;
    writeln!(handle)?;
    Ok(())
}
