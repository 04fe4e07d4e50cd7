use std::path::Path;

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::error::{GeneratorError, Result};
use crate::value::{as_mapping, as_sequence, as_str};

/// The parsed job description, keyed by section (`presubmits`, `periodics`).
///
/// Backed by `serde_yaml::Mapping`, which keeps insertion order, so every
/// traversal follows the order the file was written in. Generation never
/// mutates the document; it is only rewritten by the release-branch refresh
/// before any output is produced.
#[derive(Debug, Clone)]
pub struct JobConfigDocument {
    root: Mapping,
}

/// Callback invoked for every job entry of a section.
pub type SectionGenerator<S> = fn(&mut S, &str, &str, &Mapping) -> Result<()>;

/// Callback invoked once per repository, after all of its job entries.
pub type SectionFinalizer<S> = fn(&mut S, &str, &str) -> Result<()>;

impl JobConfigDocument {
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        let root = match value {
            Value::Null => Mapping::new(),
            other => as_mapping(&other)?.clone(),
        };
        Ok(Self { root })
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Reading job description from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Returns the named section, if present.
    pub fn section(&self, title: &str) -> Result<Option<&Mapping>> {
        self.root.get(title).map(as_mapping).transpose()
    }

    /// Returns the named section, failing when it is missing.
    pub fn require_section(&self, title: &str) -> Result<&Mapping> {
        self.section(title)?
            .ok_or_else(|| GeneratorError::MissingSection(title.to_string()))
    }

    pub(crate) fn section_mut(&mut self, title: &str) -> Option<&mut Mapping> {
        self.root.get_mut(title).and_then(Value::as_mapping_mut)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }
}

/// Splits an `org/repo` key. Exactly one slash is accepted.
pub fn split_repo_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((org, repo)) if !org.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((org, repo))
        }
        _ => Err(GeneratorError::InvalidRepoKey(key.to_string())),
    }
}

/// Iterates the `org/repo` entries of a section with their job lists.
pub fn repositories(section: &Mapping) -> Result<Vec<(&str, &[Value])>> {
    section
        .iter()
        .map(|(key, jobs)| Ok((as_str(key)?, as_sequence(jobs)?)))
        .collect()
}

/// Walks one section depth-first in document order.
///
/// `generate` is called for every job entry of every repository; `finalize`,
/// when given, is called once per repository after its last job.
/// A missing section produces nothing.
pub fn parse_section<S>(
    document: &JobConfigDocument,
    title: &str,
    state: &mut S,
    generate: SectionGenerator<S>,
    finalize: Option<SectionFinalizer<S>>,
) -> Result<()> {
    let Some(section) = document.section(title)? else {
        debug!("Section {title} not present, skipping");
        return Ok(());
    };

    for (repo_name, jobs) in repositories(section)? {
        for job in jobs {
            generate(state, title, repo_name, as_mapping(job)?)?;
        }
        if let Some(finalize) = finalize {
            finalize(state, title, repo_name)?;
        }
    }

    Ok(())
}
