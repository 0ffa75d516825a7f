//! Persona loading.
//!
//! Every agent is built from an external behaviour specification (a prompt
//! or config blob). Loading happens in the agent's constructor so a missing
//! resource aborts bootstrap instead of surfacing on the first `execute`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::ConstructionError;

/// Behaviour specification loaded at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    source: PathBuf,
    content: String,
}

impl Persona {
    /// Load a persona from a file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstructionError`] if the file is missing, unreadable or
    /// contains only whitespace. There is no fallback persona.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConstructionError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to load persona");
            if e.kind() == ErrorKind::NotFound {
                ConstructionError::PersonaNotFound(path.to_path_buf())
            } else {
                ConstructionError::PersonaUnreadable {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if content.trim().is_empty() {
            error!(path = %path.display(), "Persona file is empty");
            return Err(ConstructionError::EmptyPersona(path.to_path_buf()));
        }

        info!(path = %path.display(), bytes = content.len(), "Persona loaded");

        Ok(Self {
            source: path.to_path_buf(),
            content,
        })
    }

    /// Build a persona from inline text, e.g. one embedded at compile time.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::EmptyPersona`] for blank text.
    pub fn from_text(
        label: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Result<Self, ConstructionError> {
        let source = label.into();
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ConstructionError::EmptyPersona(source));
        }
        Ok(Self { source, content })
    }

    /// Where the persona came from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The behaviour specification text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_persona() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are the analyst agent.").unwrap();

        let persona = Persona::load(file.path()).unwrap();
        assert_eq!(persona.content().trim(), "You are the analyst agent.");
        assert_eq!(persona.source(), file.path());
    }

    #[test]
    fn test_missing_persona_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md");

        match Persona::load(&path) {
            Err(ConstructionError::PersonaNotFound(p)) => assert_eq!(p, path),
            other => panic!("Expected PersonaNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_persona_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();

        assert!(matches!(
            Persona::load(file.path()),
            Err(ConstructionError::EmptyPersona(_))
        ));
        assert!(Persona::from_text("inline", "").is_err());
    }

    #[test]
    fn test_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Persona::load(dir.path()).is_err());
    }
}
