use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use imgbatch_core::api::{CommandStageConfig, SharedReference, StageError, TransformStage};
use tempfile::TempDir;
use tokio::process::Command;

/// Product of one external command run, kept alive in its scratch directory
/// until persisted.
pub struct ScratchOutput {
    path: PathBuf,
    _scratch: TempDir,
}

impl ScratchOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs an external converter or registration tool once per item.
///
/// Argument placeholders: `{input}` (item path), `{name}` (item file name),
/// `{stem}` (name up to the first `.`), `{output}` (expected product, inside
/// a private scratch directory), `{scratch}` (that directory) and
/// `{ref:<name>}` (path of a reference resource). When the tool picks its own
/// output file name, the single entry it leaves in `{scratch}` is taken.
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    stderr_tail_bytes: usize,
}

impl CommandStage {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| program.clone());
        Self {
            name,
            program,
            args,
            env: BTreeMap::new(),
            stderr_tail_bytes: 2048,
        }
    }

    pub fn from_config(cfg: &CommandStageConfig) -> Self {
        let mut stage = Self::new(cfg.program.clone(), cfg.args.clone());
        stage.env = cfg.env.clone();
        stage.stderr_tail_bytes = cfg.stderr_tail_bytes;
        stage
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    fn render_args(
        &self,
        vars: &Placeholders<'_>,
        reference: &SharedReference,
    ) -> Result<Vec<String>, StageError> {
        self.args
            .iter()
            .map(|arg| render_arg(arg, vars, reference))
            .collect()
    }
}

struct Placeholders<'a> {
    input: &'a Path,
    name: &'a str,
    output: &'a Path,
    scratch: &'a Path,
}

fn render_arg(
    arg: &str,
    vars: &Placeholders<'_>,
    reference: &SharedReference,
) -> Result<String, StageError> {
    let stem = vars.name.split('.').next().unwrap_or(vars.name);
    let mut out = arg
        .replace("{input}", &vars.input.to_string_lossy())
        .replace("{output}", &vars.output.to_string_lossy())
        .replace("{scratch}", &vars.scratch.to_string_lossy())
        .replace("{name}", vars.name)
        .replace("{stem}", stem);

    while let Some(start) = out.find("{ref:") {
        let Some(len) = out[start..].find('}') else {
            return Err(StageError::InvalidInput(format!("unterminated placeholder in '{arg}'")));
        };
        let key = &out[start + 5..start + len];
        let resource = reference.get(key).ok_or_else(|| {
            StageError::InvalidInput(format!("unknown reference '{key}' in '{arg}'"))
        })?;
        let path = resource.path().to_string_lossy().to_string();
        out.replace_range(start..start + len + 1, &path);
    }
    Ok(out)
}

fn stderr_tail(stderr: &[u8], max: usize) -> String {
    let start = stderr.len().saturating_sub(max);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

async fn single_entry(dir: &Path) -> Result<Option<PathBuf>, StageError> {
    let mut rd = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        found.push(entry.path());
        if found.len() > 1 {
            return Err(StageError::Failed(format!(
                "expected one output in scratch directory, found several: {}",
                found
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    Ok(found.pop())
}

#[async_trait]
impl TransformStage for CommandStage {
    type Artifact = ScratchOutput;

    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(
        &self,
        input: &Path,
        reference: &SharedReference,
    ) -> Result<ScratchOutput, StageError> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StageError::InvalidInput(format!("{} has no file name", input.display())))?;

        let scratch = tempfile::Builder::new().prefix("imgbatch-").tempdir()?;
        let output = scratch.path().join(&name);
        let args = self.render_args(
            &Placeholders {
                input,
                name: &name,
                output: &output,
                scratch: scratch.path(),
            },
            reference,
        )?;

        tracing::debug!(program = %self.program, args = ?args, "spawning stage command");
        let result = Command::new(&self.program)
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    StageError::Failed(format!("program not found: {}", self.program))
                }
                _ => StageError::Io(e),
            })?;

        if !result.status.success() {
            return Err(StageError::Command {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr, self.stderr_tail_bytes),
            });
        }

        let path = if tokio::fs::symlink_metadata(&output).await.is_ok() {
            output
        } else {
            single_entry(scratch.path()).await?.ok_or_else(|| {
                StageError::Failed(format!("{} exited successfully but produced no output", self.program))
            })?
        };
        Ok(ScratchOutput {
            path,
            _scratch: scratch,
        })
    }

    async fn persist(&self, artifact: ScratchOutput, destination: &Path) -> Result<(), StageError> {
        super::move_path(&artifact.path, destination).await
    }
}
