use crate::config::NamingConfig;

/// Deterministic mapping from an input entry name to its output name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputNaming {
    suffix: String,
    strip_extension: bool,
}

impl OutputNaming {
    /// Output keeps the input name unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            strip_extension: false,
        }
    }

    pub fn stripping_extension(mut self) -> Self {
        self.strip_extension = true;
        self
    }

    pub fn output_name(&self, input_name: &str) -> String {
        let stem = if self.strip_extension {
            input_name
                .split_once('.')
                .map(|(stem, _)| stem)
                .filter(|stem| !stem.is_empty())
                .unwrap_or(input_name)
        } else {
            input_name
        };
        format!("{stem}{}", self.suffix)
    }
}

impl From<&NamingConfig> for OutputNaming {
    fn from(cfg: &NamingConfig) -> Self {
        Self {
            suffix: cfg.suffix.clone(),
            strip_extension: cfg.strip_extension,
        }
    }
}

/// Name under which an artifact is persisted before it is renamed into place.
/// Starts with `.` and ends with `.partial`, so it never equals an output name
/// produced from a visible input.
pub fn staging_name(output_name: &str) -> String {
    format!(".{output_name}.partial")
}

pub fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".partial")
}
