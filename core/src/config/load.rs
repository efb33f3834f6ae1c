use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Default data directory: ~/.imgbatch
pub fn get_imgbatch_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".imgbatch"))
}

/// Expand `~` and `$VARS` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    load(None)
}

/// Load configuration.
///
/// Priority: `explicit` path, then `~/.imgbatch/config.toml`, then
/// `./imgbatch.toml`, then built-in defaults. Environment variables override
/// the logging and events-out sections afterwards.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let data_dir = get_imgbatch_data_dir()?;
    let user_config = data_dir.join("config.toml");
    let local_config = Path::new("imgbatch.toml");

    let mut cfg = if let Some(path) = explicit {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", path.display()))?;
        parse_config(&s)?
    } else if user_config.exists() {
        parse_config(&std::fs::read_to_string(&user_config)?)?
    } else if local_config.exists() {
        parse_config(&std::fs::read_to_string(local_config)?)?
    } else {
        AppConfig::default()
    };

    if cfg
        .logging
        .directory
        .as_deref()
        .map(str::trim)
        .map(str::is_empty)
        .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (highest priority)
    if let Ok(v) = std::env::var("IMGBATCH_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
    if let Ok(v) = std::env::var("IMGBATCH_LOG_DIR") {
        if !v.trim().is_empty() {
            cfg.logging.directory = Some(v);
        }
    }
    if let Ok(v) = std::env::var("IMGBATCH_EVENTS_OUT") {
        if !v.trim().is_empty() {
            cfg.events_out.enabled = true;
            cfg.events_out.path = v;
        }
    }

    Ok(cfg)
}

/// Parse and validate a TOML document, expanding pipeline paths.
pub fn parse_config(s: &str) -> anyhow::Result<AppConfig> {
    let mut cfg: AppConfig = toml::from_str(s)?;

    for p in &mut cfg.pipelines {
        p.input_root = expand_path(&p.input_root).to_string_lossy().to_string();
        p.output_root = expand_path(&p.output_root).to_string_lossy().to_string();
        for path in p.reference.values_mut() {
            *path = expand_path(path).to_string_lossy().to_string();
        }
    }
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = expand_path(dir).to_string_lossy().to_string();
    }

    cfg.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntryKind, StageConfig};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[logging]
level = "debug"
console = false

[[pipelines]]
name = "convert"
input_root = "/data/DICOM"
output_root = "/data/NIFTI_RAW"
group_depth = 2
max_workers = 16
entries = "dirs"
naming = { suffix = ".nii.gz" }

[[pipelines]]
name = "register"
input_root = "/data/NIFTI_RAW/MP-RAGE"
output_root = "/data/PROCESSED/MP-RAGE"
max_workers = 4
item_timeout_secs = 3600
include = "*.nii*"

[pipelines.reference]
template = "/atlas/template.nii"
mask = "/atlas/mask.nii"

[pipelines.stage]
kind = "command"
program = "register-image"
args = ["--fixed", "{ref:template}", "--mask", "{ref:mask}", "{input}", "{output}"]
"#;

    #[test]
    fn test_parse_two_pipelines() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert!(!cfg.logging.console);
        assert_eq!(cfg.pipelines.len(), 2);

        let convert = cfg.pipeline("convert").unwrap();
        assert_eq!(convert.group_depth, 2);
        assert_eq!(convert.max_workers, 16);
        assert_eq!(convert.entries, EntryKind::Dirs);
        assert_eq!(convert.naming.suffix, ".nii.gz");
        assert!(matches!(convert.stage, StageConfig::Copy));

        let register = cfg.pipeline("register").unwrap();
        assert_eq!(register.group_depth, 1);
        assert_eq!(register.item_timeout_secs, Some(3600));
        assert_eq!(register.reference.len(), 2);
        match &register.stage {
            StageConfig::Command(cmd) => {
                assert_eq!(cmd.program, "register-image");
                assert_eq!(cmd.args.len(), 6);
                assert_eq!(cmd.stderr_tail_bytes, 2048);
            }
            other => panic!("unexpected stage: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_invalid_pipeline() {
        let bad = r#"
[[pipelines]]
name = "convert"
input_root = "/in"
output_root = "/out"
max_workers = 0
"#;
        assert!(parse_config(bad).is_err());
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert!(cfg.pipelines.is_empty());
        assert!(cfg.logging.enabled);
        assert!(!cfg.events_out.enabled);
    }
}
