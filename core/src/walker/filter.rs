use crate::config::{EntryKind, PipelineConfig};

/// Decides which directory entries of a group are work items.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    kind: EntryKind,
    include: Option<glob::Pattern>,
    include_hidden: bool,
}

impl EntryFilter {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            include: None,
            include_hidden: false,
        }
    }

    pub fn include(mut self, pattern: &str) -> Result<Self, glob::PatternError> {
        self.include = Some(glob::Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn include_hidden(mut self, yes: bool) -> Self {
        self.include_hidden = yes;
        self
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, String> {
        let filter = Self::new(cfg.entries).include_hidden(cfg.include_hidden);
        match &cfg.include {
            Some(pattern) => filter
                .include(pattern)
                .map_err(|e| format!("bad include glob '{pattern}': {e}")),
            None => Ok(filter),
        }
    }

    pub fn accepts(&self, name: &str, is_dir: bool) -> bool {
        if !self.include_hidden && name.starts_with('.') {
            return false;
        }
        let kind_ok = match self.kind {
            EntryKind::Any => true,
            EntryKind::Files => !is_dir,
            EntryKind::Dirs => is_dir,
        };
        kind_ok && self.include.as_ref().map_or(true, |p| p.matches(name))
    }
}
