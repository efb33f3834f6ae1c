//! Sample configuration writer
use std::path::{Path, PathBuf};

use imgbatch_core::api::{get_imgbatch_data_dir, CliError};

use super::cli::InitArgs;

pub const SAMPLE_CONFIG: &str = r#"# imgbatch configuration
#
# Pipelines run in the order they are declared. Each pipeline walks
# input_root/<group>/<item> (or input_root/<subject>/<group>/<item> with
# group_depth = 2) and produces output_root/<group>/<output name>. Items
# whose output already exists are skipped, so re-running resumes.

[logging]
enabled = true
console = true
file = true
level = "info"
# directory = "~/.imgbatch/logs"

[events_out]
enabled = false
path = "./imgbatch.events.jsonl"

# DICOM series directories -> compressed NIfTI, one file per series.
[[pipelines]]
name = "convert"
input_root = "~/data/DICOM"
output_root = "~/data/NIFTI_RAW"
group_depth = 2
max_workers = 16
entries = "dirs"
naming = { suffix = ".nii.gz" }

[pipelines.stage]
kind = "command"
program = "dcm2niix"
args = ["-z", "y", "-b", "n", "-f", "{name}", "-o", "{scratch}", "{input}"]

# Register every converted scan against a shared template and brain mask.
[[pipelines]]
name = "register"
input_root = "~/data/NIFTI_RAW"
output_root = "~/data/PROCESSED"
group_depth = 2
max_workers = 4
entries = "files"
include = "*.nii.gz"
# item_timeout_secs = 3600

[pipelines.reference]
template = "~/data/templates/MNI152_T1_1mm.nii.gz"
mask = "~/data/templates/MNI152_T1_1mm_brain_mask.nii.gz"

[pipelines.stage]
kind = "command"
program = "register.sh"
args = ["{input}", "{ref:template}", "{ref:mask}", "{output}"]
"#;

pub fn handle_init(args: InitArgs) -> Result<i32, CliError> {
    let path = match args.path {
        Some(p) => p,
        None => get_imgbatch_data_dir()
            .map_err(|e| CliError::Config(e.to_string()))?
            .join("config.toml"),
    };
    write_sample(&path, args.force)?;
    println!("Configuration written to {}", path.display());
    println!("Edit the pipeline roots, then preview with: imgbatch plan");
    Ok(0)
}

fn write_sample(path: &Path, force: bool) -> Result<PathBuf, CliError> {
    if path.exists() && !force {
        return Err(CliError::Command(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    Ok(path.to_path_buf())
}
