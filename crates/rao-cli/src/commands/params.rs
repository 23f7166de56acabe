use anyhow::{Context, Result};
use rao_cli::ParamsFile;
use std::path::Path;

use crate::commands::util::write_text;

pub fn handle(out: Option<&Path>) -> Result<()> {
    let text = ParamsFile::default_toml()?;
    match out {
        Some(path) => {
            write_text(path, &text)
                .with_context(|| format!("writing parameter file {}", path.display()))?;
            println!("Wrote default parameters to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
