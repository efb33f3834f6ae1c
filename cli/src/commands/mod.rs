pub mod cli;
pub mod init;
pub mod plan;
pub mod run;

use imgbatch_core::api::{AppConfig, CliError, PipelineConfig};

/// Pipelines named on the command line, in config order; all of them when
/// none is named.
pub fn select_pipelines<'a>(
    cfg: &'a AppConfig,
    names: &[String],
) -> Result<Vec<&'a PipelineConfig>, CliError> {
    if cfg.pipelines.is_empty() {
        return Err(CliError::Config(
            "no pipelines configured (run `imgbatch init` for a sample)".to_string(),
        ));
    }
    if let Some(unknown) = names.iter().find(|n| cfg.pipeline(n).is_none()) {
        return Err(CliError::Config(format!("unknown pipeline '{unknown}'")));
    }
    Ok(cfg
        .pipelines
        .iter()
        .filter(|p| names.is_empty() || names.contains(&p.name))
        .collect())
}

/// `--group` values, or `None` to discover groups.
pub fn group_selection(groups: &[String]) -> Option<&[String]> {
    (!groups.is_empty()).then_some(groups)
}
