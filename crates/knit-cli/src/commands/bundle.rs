//! `knit bundle`: build the entry's bundle and write it to disk.

use std::fs;
use std::path::Path;

use anyhow::Context;
use knit_bundler::bundle;

use super::ProjectArgs;
use crate::output::StyledOutput;

pub fn execute(args: ProjectArgs, out: &mut StyledOutput) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let project = args.resolve(&cwd)?;

    let built = bundle(&project.root, Path::new(&project.entry), project.options)?;

    if let Some(dir) = project.out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }
    built.write_to(&project.out)?;

    out.success("Bundled");
    out.plain(&format!(
        " {} modules from {} ",
        built.table().len(),
        built.entry()
    ));
    out.info(&format!("-> {}", project.out.display()));
    out.plain(&format!(
        " ({} bytes, {}, {})",
        built.text().len(),
        project.options.dialect,
        project.options.cache_policy
    ));
    out.newline();
    Ok(())
}
