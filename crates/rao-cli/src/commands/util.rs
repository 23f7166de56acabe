use anyhow::{anyhow, Result};
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::Path;

/// Thread count from `--threads`: a positive number or `auto`.
pub fn parse_threads(spec: &str) -> Result<usize> {
    if spec.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match spec.parse::<usize>() {
        Ok(0) | Err(_) => Err(anyhow!(
            "invalid --threads value '{spec}': expected a positive number or 'auto'"
        )),
        Ok(count) => Ok(count),
    }
}

/// Size the global Rayon pool; ignored when it is already built.
pub fn configure_threads(count: usize) {
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads() {
        assert_eq!(parse_threads("3").unwrap(), 3);
        assert_eq!(parse_threads("AUTO").unwrap(), num_cpus::get());
        assert!(parse_threads("0").is_err());
        assert!(parse_threads("many").is_err());
    }
}
