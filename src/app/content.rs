use crate::app::models::AppConfig;
use anyhow::{Context, Result};
use std::fs;

/// Reads every content file named in the configuration and returns their lines, in order.
pub fn some_code(config: &AppConfig) -> Result<Vec<String>> {
    let rendered = serde_yaml::to_string(config).context("Failed to render configuration")?;
    log::debug!(configuration = rendered.as_str(); "Configuration");
    log::info!("Running some code...");

    if config.paths.is_empty() {
        log::warn!("No content given.");
    }

    let mut lines = Vec::new();
    for path in &config.paths {
        if config.dryrun {
            log::info!("Dry run, not reading `{}`", path);
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read content from {:?}", path))?;
        let before = lines.len();
        lines.extend(content.lines().map(str::to_string));
        log::debug!(path = path.as_str(), lines = lines.len() - before; "Read content");
    }

    log::info!("All done!");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::tests::sample_defaults;
    use tempfile::TempDir;

    fn with_paths(paths: Vec<String>, dryrun: bool) -> AppConfig {
        AppConfig {
            paths,
            dryrun,
            ..sample_defaults()
        }
    }

    #[test]
    fn concatenates_lines_in_argument_order() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        fs::write(&first, "alpha\nbeta\n").unwrap();
        fs::write(&second, "gamma").unwrap();
        let config = with_paths(
            vec![
                first.to_string_lossy().into_owned(),
                second.to_string_lossy().into_owned(),
            ],
            false,
        );

        let lines = some_code(&config).unwrap();
        assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn dry_run_reads_nothing() {
        let config = with_paths(vec!["does/not/exist.txt".to_string()], true);
        assert!(some_code(&config).unwrap().is_empty());
    }

    #[test]
    fn no_content_is_not_an_error() {
        assert!(some_code(&with_paths(Vec::new(), false)).unwrap().is_empty());
    }

    #[test]
    fn unreadable_content_names_the_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt").to_string_lossy().into_owned();
        let config = with_paths(vec![missing.clone()], false);

        let err = some_code(&config).unwrap_err();
        assert!(err.to_string().contains(&missing));
        assert!(err.root_cause().downcast_ref::<std::io::Error>().is_some());
    }
}
