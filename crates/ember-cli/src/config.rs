//! VM options from `ember.toml` and command-line overrides
//!
//! ```toml
//! max_registers = 65536
//!
//! [gc]
//! heap_size = 33554432
//! strategy = "compact"
//! ```

use anyhow::{bail, Context};
use ember_engine::{GcStrategy, VmOptions};
use std::path::Path;

/// Flags that take precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub heap_size: Option<&'a str>,
    pub strategy: Option<&'a str>,
}

/// Build VM options: defaults, then the file (if any), then flags
pub fn resolve(file: Option<&Path>, overrides: Overrides<'_>) -> anyhow::Result<VmOptions> {
    let mut options = match file {
        Some(path) => load_file(path)?,
        None => VmOptions::default(),
    };

    if let Some(size) = overrides.heap_size {
        options.gc.heap_size =
            parse_size(size).with_context(|| format!("invalid --heap-size '{}'", size))?;
    }
    if let Some(strategy) = overrides.strategy {
        options.gc.strategy = strategy.parse::<GcStrategy>()?;
    }

    options.validate()?;
    Ok(options)
}

fn load_file(path: &Path) -> anyhow::Result<VmOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

/// Parse a byte count such as `65536`, `64K`, or `32M`
pub fn parse_size(text: &str) -> anyhow::Result<usize> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((i, 'k' | 'K')) => (&text[..i], 1024),
        Some((i, 'm' | 'M')) => (&text[..i], 1024 * 1024),
        _ => (text, 1),
    };
    let count: usize = digits
        .parse()
        .with_context(|| format!("'{}' is not a number", digits))?;
    match count.checked_mul(multiplier) {
        Some(bytes) => Ok(bytes),
        None => bail!("size '{}' overflows", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("32m").unwrap(), 32 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("12G").is_err());
        assert!(parse_size("-1").is_err());
    }

    #[test]
    fn test_defaults_without_file() {
        let options = resolve(None, Overrides::default()).unwrap();
        assert_eq!(options, VmOptions::default());
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_registers = 512\n\n[gc]\nheap_size = 65536\nstrategy = \"sweep\"").unwrap();

        let options = resolve(Some(file.path()), Overrides::default()).unwrap();
        assert_eq!(options.max_registers, 512);
        assert_eq!(options.gc.heap_size, 65536);
        assert_eq!(options.gc.strategy, GcStrategy::Sweep);

        let overrides = Overrides {
            heap_size: Some("16K"),
            strategy: Some("compact"),
        };
        let options = resolve(Some(file.path()), overrides).unwrap();
        assert_eq!(options.max_registers, 512);
        assert_eq!(options.gc.heap_size, 16 * 1024);
        assert_eq!(options.gc.strategy, GcStrategy::Compact);
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gc]\nheap_sise = 65536").unwrap();
        assert!(resolve(Some(file.path()), Overrides::default()).is_err());

        let overrides = Overrides {
            heap_size: Some("16"),
            strategy: None,
        };
        assert!(resolve(None, overrides).is_err());

        let overrides = Overrides {
            heap_size: None,
            strategy: Some("copying"),
        };
        assert!(resolve(None, overrides).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = resolve(Some(Path::new("/nonexistent/ember.toml")), Overrides::default());
        assert!(format!("{:#}", err.unwrap_err()).contains("failed to read config"));
    }
}
