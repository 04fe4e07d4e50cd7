//! Keeps the release jobs of the job description in line with the release
//! branches that exist on GitHub.
//!
//! For every periodic repository with `release:` entries, the entries of its
//! newest configured release are duplicated for a newer `release-X.Y` branch
//! when one appears, and the oldest releases are dropped past the limit.

use std::collections::BTreeSet;
use std::fmt;

use futures::future::try_join_all;
use log::{debug, info};
use serde_yaml::Value;

use crate::document::{repositories, split_repo_key, JobConfigDocument};
use crate::error::{GeneratorError, Result};
use crate::prow::PERIODICS;
use crate::value::{as_mapping, as_str};

use super::BranchSource;

const RELEASE_KEY: &str = "release";
const RELEASE_BRANCH_PREFIX: &str = "release-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
}

impl ReleaseVersion {
    /// Parses `X.Y`.
    pub fn parse(version: &str) -> Option<Self> {
        let (major, minor) = version.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    /// Parses a `release-X.Y` branch name.
    pub fn from_branch(branch: &str) -> Option<Self> {
        branch
            .strip_prefix(RELEASE_BRANCH_PREFIX)
            .and_then(Self::parse)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What the refresh changed for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseUpgrade {
    pub repository: String,
    pub added: ReleaseVersion,
    pub dropped: Vec<ReleaseVersion>,
}

struct Candidate {
    key: String,
    org: String,
    repo: String,
    versions: BTreeSet<ReleaseVersion>,
}

fn release_of(job: &Value) -> Option<ReleaseVersion> {
    job.get(RELEASE_KEY)
        .and_then(Value::as_str)
        .and_then(ReleaseVersion::parse)
}

fn candidates(document: &JobConfigDocument) -> Result<Vec<Candidate>> {
    let Some(periodics) = document.section(PERIODICS)? else {
        return Ok(Vec::new());
    };

    let mut found = Vec::new();
    for (key, jobs) in repositories(periodics)? {
        let (org, repo) = split_repo_key(key)?;
        let mut versions = BTreeSet::new();
        for job in jobs {
            if let Some(value) = as_mapping(job)?.get(RELEASE_KEY) {
                let release = as_str(value)?;
                let version = ReleaseVersion::parse(release).ok_or_else(|| {
                    GeneratorError::invalid_job(key, format!("invalid release {release:?}"))
                })?;
                versions.insert(version);
            }
        }
        if !versions.is_empty() {
            found.push(Candidate {
                key: key.to_string(),
                org: org.to_string(),
                repo: repo.to_string(),
                versions,
            });
        }
    }
    Ok(found)
}

/// Rewrites the release entries of `document` from the branches reported by
/// `source`, keeping at most `max_branches` releases per repository.
pub async fn upgrade_release_branches<S: BranchSource>(
    document: &mut JobConfigDocument,
    source: &S,
    max_branches: usize,
) -> Result<Vec<ReleaseUpgrade>> {
    let candidates = candidates(document)?;

    let latest = try_join_all(candidates.iter().map(|candidate| async move {
        let branches = source.list_branches(&candidate.org, &candidate.repo).await?;
        Ok::<_, GeneratorError>(
            branches
                .iter()
                .filter_map(|branch| ReleaseVersion::from_branch(branch))
                .max(),
        )
    }))
    .await?;

    let Some(periodics) = document.section_mut(PERIODICS) else {
        return Ok(Vec::new());
    };

    let mut upgrades = Vec::new();
    for (mut candidate, latest) in candidates.into_iter().zip(latest) {
        let Some(newest) = candidate.versions.last().copied() else {
            continue;
        };
        let Some(latest) = latest.filter(|latest| *latest > newest) else {
            debug!("{} is up to date at release {newest}", candidate.key);
            continue;
        };
        let Some(jobs) = periodics
            .get_mut(candidate.key.as_str())
            .and_then(Value::as_sequence_mut)
        else {
            continue;
        };

        let added: Vec<Value> = jobs
            .iter()
            .filter(|job| release_of(job) == Some(newest))
            .cloned()
            .map(|mut job| {
                if let Some(entry) = job.as_mapping_mut() {
                    entry.insert(Value::from(RELEASE_KEY), Value::from(latest.to_string()));
                }
                job
            })
            .collect();
        jobs.extend(added);
        candidate.versions.insert(latest);

        let excess = candidate.versions.len().saturating_sub(max_branches);
        let dropped: Vec<ReleaseVersion> =
            candidate.versions.iter().take(excess).copied().collect();
        jobs.retain(|job| !release_of(job).is_some_and(|version| dropped.contains(&version)));

        info!(
            "Added release {latest} to {}{}",
            candidate.key,
            if dropped.is_empty() {
                String::new()
            } else {
                format!(", dropped {} old release(s)", dropped.len())
            }
        );
        upgrades.push(ReleaseUpgrade {
            repository: candidate.key,
            added: latest,
            dropped,
        });
    }

    Ok(upgrades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeSource {
        branches: HashMap<String, Vec<String>>,
    }

    impl FakeSource {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            Self {
                branches: entries
                    .iter()
                    .map(|(repo, branches)| {
                        (
                            repo.to_string(),
                            branches.iter().map(|b| b.to_string()).collect(),
                        )
                    })
                    .collect(),
            }
        }
    }

    impl BranchSource for FakeSource {
        async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
            self.branches
                .get(&format!("{owner}/{repo}"))
                .cloned()
                .ok_or_else(|| GeneratorError::ApiError {
                    status: 404,
                    message: "Not Found".to_string(),
                })
        }
    }

    const INPUT: &str = r#"
periodics:
  knative/serving:
    - continuous: true
    - dot-release: true
      release: "0.22"
    - dot-release: true
      release: "0.23"
    - branch-ci: true
      release: "0.23"
  knative/eventing:
    - nightly: true
"#;

    fn releases(document: &JobConfigDocument, repo: &str) -> Vec<String> {
        document
            .section(PERIODICS)
            .unwrap()
            .unwrap()
            .get(repo)
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .filter_map(|job| job.get(RELEASE_KEY).and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_release_version() {
        assert_eq!(
            ReleaseVersion::from_branch("release-1.10"),
            Some(ReleaseVersion { major: 1, minor: 10 })
        );
        assert_eq!(ReleaseVersion::from_branch("main"), None);
        assert_eq!(ReleaseVersion::from_branch("release-next"), None);
        assert!(ReleaseVersion::parse("0.9").unwrap() < ReleaseVersion::parse("0.10").unwrap());
        assert_eq!(ReleaseVersion::parse("1.2").unwrap().to_string(), "1.2");
    }

    #[tokio::test]
    async fn test_new_release_branch_is_added() {
        let mut document = JobConfigDocument::parse(INPUT).unwrap();
        let source = FakeSource::new(&[(
            "knative/serving",
            &["main", "release-0.22", "release-0.23", "release-0.24"],
        )]);

        let upgrades = upgrade_release_branches(&mut document, &source, 4).await.unwrap();

        assert_eq!(
            upgrades,
            vec![ReleaseUpgrade {
                repository: "knative/serving".to_string(),
                added: ReleaseVersion { major: 0, minor: 24 },
                dropped: Vec::new(),
            }]
        );
        assert_eq!(
            releases(&document, "knative/serving"),
            vec!["0.22", "0.23", "0.23", "0.24", "0.24"]
        );
        // Repositories without release entries are never queried.
        assert!(releases(&document, "knative/eventing").is_empty());
    }

    #[tokio::test]
    async fn test_oldest_release_is_dropped() {
        let mut document = JobConfigDocument::parse(INPUT).unwrap();
        let source = FakeSource::new(&[("knative/serving", &["release-0.24"])]);

        let upgrades = upgrade_release_branches(&mut document, &source, 2).await.unwrap();

        assert_eq!(upgrades[0].dropped, vec![ReleaseVersion { major: 0, minor: 22 }]);
        assert_eq!(
            releases(&document, "knative/serving"),
            vec!["0.23", "0.23", "0.24", "0.24"]
        );
        // Entries without a release are kept.
        let jobs = document.section(PERIODICS).unwrap().unwrap()["knative/serving"]
            .as_sequence()
            .unwrap()
            .clone();
        assert_eq!(jobs[0]["continuous"].as_bool(), Some(true));
    }

    #[test]
    fn test_up_to_date_document_is_unchanged() {
        let mut document = JobConfigDocument::parse(INPUT).unwrap();
        let before = document.to_yaml().unwrap();
        let source = FakeSource::new(&[("knative/serving", &["release-0.22", "release-0.23"])]);

        let upgrades =
            tokio_test::block_on(upgrade_release_branches(&mut document, &source, 4)).unwrap();

        assert!(upgrades.is_empty());
        assert_eq!(document.to_yaml().unwrap(), before);
    }

    #[tokio::test]
    async fn test_source_errors_propagate() {
        let mut document = JobConfigDocument::parse(INPUT).unwrap();
        let source = FakeSource::new(&[]);
        let err = upgrade_release_branches(&mut document, &source, 4).await.unwrap_err();
        assert!(matches!(err, GeneratorError::ApiError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_release_value() {
        let mut document =
            JobConfigDocument::parse("periodics:\n  knative/serving:\n    - dot-release: true\n      release: next\n")
                .unwrap();
        let source = FakeSource::new(&[]);
        let err = upgrade_release_branches(&mut document, &source, 4).await.unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidJob { .. }));
    }
}
