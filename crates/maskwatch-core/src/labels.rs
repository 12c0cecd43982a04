//! Class vocabulary loaded from a plain-text label file.

use std::io;
use std::ops::Index;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label file not found: {0}")]
    NotFound(String),
    #[error("failed to read label file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("label file {0} contains no labels")]
    Empty(String),
}

/// Ordered class names; position `i` names output index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Build a label set from text, one label per line.
    ///
    /// Lines are trimmed and blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        let labels = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

}

impl Index<usize> for LabelSet {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.labels[index]
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Load the label file at `path`.
pub fn load_labels(path: impl AsRef<Path>) -> Result<LabelSet, LabelError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            LabelError::NotFound(display.clone())
        } else {
            LabelError::Io {
                path: display.clone(),
                source,
            }
        }
    })?;

    let labels = LabelSet::parse(&text);
    if labels.is_empty() {
        return Err(LabelError::Empty(display));
    }

    tracing::debug!(path = %path.display(), count = labels.len(), "loaded labels");
    Ok(labels)
}
