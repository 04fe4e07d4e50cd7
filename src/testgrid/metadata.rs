//! Project → repository → job-type aggregation backing the TestGrid
//! test groups and dashboards.
//!
//! A project is an organization name, optionally suffixed with a release
//! version (`knative-0.23`) for jobs running on a release branch.

use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use regex::Regex;
use serde_yaml::Mapping;

use crate::document::{repositories, split_repo_key};
use crate::error::Result;
use crate::value::{as_bool, as_mapping, as_string, entries};

pub const TEST_COVERAGE: &str = "test-coverage";

static RELEASE_PROJECT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r".+-[0-9.]+$").ok());

/// Whether `project` carries a release version suffix.
pub fn is_released(project: &str) -> bool {
    RELEASE_PROJECT
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(project))
}

/// Splits `knative-sandbox-0.15` into `("knative-sandbox", Some("0.15"))`.
/// Names without a version suffix are returned whole.
pub fn split_project_version(project: &str) -> (&str, Option<&str>) {
    if !is_released(project) {
        return (project, None);
    }
    match project.rsplit_once('-') {
        Some((base, version)) => (base, Some(version)),
        None => (project, None),
    }
}

/// The `<project>-<repo>[-<version>]` name of a repository's dashboard and
/// test groups, lower-cased.
pub fn build_proj_repo_str(project: &str, repo: &str) -> String {
    let (base, version) = split_project_version(project);
    let name = match version {
        Some(version) => format!("{base}-{repo}-{version}"),
        None => format!("{base}-{repo}"),
    };
    name.to_lowercase()
}

/// Job types of one repository, together with its own organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoJobTypes {
    pub org: String,
    pub repo: String,
    pub job_types: IndexSet<String>,
}

impl RepoJobTypes {
    /// Test group and dashboard prefix of the repository inside `project`.
    ///
    /// Built from the repository's organization rather than the project, so
    /// it matches the Prow job names even when the repository was filed
    /// under a default project.
    pub fn proj_repo(&self, project: &str) -> String {
        match split_project_version(project) {
            (_, Some(version)) => {
                build_proj_repo_str(&format!("{}-{version}", self.org), &self.repo)
            }
            (_, None) => build_proj_repo_str(&self.org, &self.repo),
        }
    }
}

/// Job types of every repository of one project, in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectRepos {
    repos: IndexMap<String, RepoJobTypes>,
}

impl ProjectRepos {
    pub fn ensure_repo(&mut self, org: &str, repo: &str) -> &mut IndexSet<String> {
        &mut self
            .repos
            .entry(format!("{org}/{repo}"))
            .or_insert_with(|| RepoJobTypes {
                org: org.to_string(),
                repo: repo.to_string(),
                job_types: IndexSet::new(),
            })
            .job_types
    }

    /// Registers `job_type` for `org/repo`; returns false if it was already there.
    pub fn add(&mut self, org: &str, repo: &str, job_type: &str) -> bool {
        self.ensure_repo(org, repo).insert(job_type.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepoJobTypes> {
        self.repos.values()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestGridMetadata {
    projects: IndexMap<String, ProjectRepos>,
}

impl TestGridMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_mut(&mut self, project: &str) -> &mut ProjectRepos {
        self.projects.entry(project.to_string()).or_default()
    }

    pub fn project(&self, project: &str) -> Option<&ProjectRepos> {
        self.projects.get(project)
    }

    pub fn add(&mut self, project: &str, org: &str, repo: &str, job_type: &str) -> bool {
        self.project_mut(project).add(org, repo, job_type)
    }

    pub fn projects(&self) -> impl Iterator<Item = (&str, &ProjectRepos)> {
        self.projects
            .iter()
            .map(|(project, repos)| (project.as_str(), repos))
    }

    /// Builds the aggregation from the `periodics` section.
    ///
    /// `coverage` maps `org/repo` to whether it runs Go coverage. Coverage
    /// repositories get a `test-coverage` job type under their organization;
    /// those without periodics go under `default_project`, or their own
    /// organization when none is set. Either way they keep their own
    /// organization for naming.
    pub fn collect(
        periodics: &Mapping,
        coverage: &IndexMap<String, bool>,
        default_project: Option<&str>,
    ) -> Result<Self> {
        let mut metadata = Self::new();
        let mut pending = coverage.clone();

        for (key, jobs) in repositories(periodics)? {
            let (org, repo) = split_repo_key(key)?;
            metadata.project_mut(org).ensure_repo(org, repo);

            for job in jobs {
                let Some((job_type, release)) = classify(as_mapping(job)?)? else {
                    continue;
                };
                let project = match release {
                    Some(version) => format!("{org}-{version}"),
                    None => org.to_string(),
                };
                metadata.add(&project, org, repo, &job_type);
            }

            if pending.shift_remove(key) == Some(true) {
                metadata.add(org, org, repo, TEST_COVERAGE);
            }
        }

        for (key, enabled) in &pending {
            if !enabled {
                continue;
            }
            let (org, repo) = split_repo_key(key)?;
            let project = default_project.unwrap_or(org);
            debug!("Adding coverage-only repository {key} to project {project}");
            metadata.add(project, org, repo, TEST_COVERAGE);
        }

        Ok(metadata)
    }
}

/// Job type and release version of one periodic entry; `None` when the
/// entry enables nothing.
fn classify(job: &Mapping) -> Result<Option<(String, Option<String>)>> {
    let mut job_type: Option<String> = None;
    let mut release: Option<String> = None;

    for (key, value) in entries(job)? {
        match key {
            "continuous" | "dot-release" | "auto-release" | "performance" | "nightly"
            | "webhook-apicoverage" => {
                if as_bool(value)? {
                    job_type = Some(key.to_string());
                }
            }
            "branch-ci" => {
                if as_bool(value)? {
                    job_type = Some("continuous".to_string());
                }
            }
            "custom-job" => job_type = Some(as_string(value)?),
            "release" => release = Some(as_string(value)?),
            _ => {}
        }
    }

    Ok(job_type.map(|job_type| (job_type, release)))
}

/// Maps every `org/repo` of the `presubmits` section to whether any of its
/// entries enables Go coverage.
pub fn parse_go_coverage_map(presubmits: &Mapping) -> Result<IndexMap<String, bool>> {
    let mut coverage = IndexMap::new();
    for (key, jobs) in repositories(presubmits)? {
        split_repo_key(key)?;
        let mut enabled = false;
        for job in jobs {
            for (option, value) in entries(as_mapping(job)?)? {
                if option == "go-coverage" {
                    enabled |= as_bool(value)?;
                }
            }
        }
        coverage.insert(key.to_string(), enabled);
    }
    Ok(coverage)
}
