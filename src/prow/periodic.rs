use std::io::Write;

use log::debug;
use serde::Serialize;
use serde_yaml::Mapping;

use crate::error::{GeneratorError, Result};
use crate::render::templates;
use crate::testgrid::k8s::dashboard_name;
use crate::value::{as_bool, as_string};

use super::cron::generate_cron;
use super::data::{JobTemplateData, DEFAULT_BRANCH};
use super::overrides::{apply_job_overrides, partition};
use super::ProwJobGenerator;

const PERIODIC_KEYS: &[&str] = &[
    "continuous",
    "nightly",
    "branch-ci",
    "dot-release",
    "auto-release",
    "webhook-apicoverage",
    "performance",
    "custom-job",
    "cron",
    "release",
];

const RELEASE_TIMEOUT: i64 = 90;
const PERFORMANCE_TIMEOUT: i64 = 180;
const CUSTOM_JOB_TIMEOUT: i64 = 100;

const HUB_TOKEN_SECRET: &str = "hub-token";

#[derive(Debug, Serialize)]
struct PeriodicJobTemplateData {
    #[serde(flatten)]
    base: JobTemplateData,
    job_name: String,
    cron: String,
    command: Vec<String>,
}

impl<'a, W: Write> ProwJobGenerator<'a, W> {
    /// Generates one periodic job from a `periodics` entry.
    pub(super) fn generate_periodic(
        &mut self,
        title: &str,
        repo: &str,
        job: &Mapping,
    ) -> Result<()> {
        let (handled, overrides) = partition(job, PERIODIC_KEYS)?;

        let mut base = JobTemplateData::new(repo, self.config)?;
        let mut job_type: Option<&str> = None;
        let mut suffix = String::new();
        let mut cron: Option<String> = None;
        let mut release: Option<String> = None;
        let mut enabled = true;
        let mut monitored = false;

        for (key, value) in handled {
            match key {
                "continuous" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = key.to_string();
                    monitored = true;
                    base.command = self.config.presubmit_script.clone();
                    base.args = vec!["--all-tests".to_string()];
                }
                "nightly" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = "nightly-release".to_string();
                    base.service_account = self.config.nightly_account.clone();
                    base.command = self.config.release_script.clone();
                    base.args = vec!["--publish".to_string(), "--tag-release".to_string()];
                    base.timeout = RELEASE_TIMEOUT;
                }
                "branch-ci" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = "continuous".to_string();
                    base.command = self.config.release_script.clone();
                    base.args = vec!["--nopublish".to_string(), "--notag-release".to_string()];
                    base.setup_docker_in_docker();
                    base.timeout = RELEASE_TIMEOUT;
                }
                "dot-release" | "auto-release" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = key.to_string();
                    base.service_account = self.config.release_account.clone();
                    base.command = self.config.release_script.clone();
                    base.args = vec![
                        format!("--{key}"),
                        "--release-gcs".to_string(),
                        base.release_gcs.clone(),
                        "--release-gcr".to_string(),
                        self.config.release_gcr.clone(),
                        "--github-token".to_string(),
                        format!("/etc/{HUB_TOKEN_SECRET}/token"),
                    ];
                    base.add_volume(
                        &format!("/etc/{HUB_TOKEN_SECRET}"),
                        HUB_TOKEN_SECRET,
                        true,
                        &[],
                    );
                    base.timeout = RELEASE_TIMEOUT;
                }
                "webhook-apicoverage" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = key.to_string();
                    base.command = self.config.webhook_api_coverage_script.clone();
                    let namespace = base.repo_name_for_job.clone();
                    base.add_env("SYSTEM_NAMESPACE", &namespace);
                }
                "performance" => {
                    enabled &= as_bool(value)?;
                    job_type = Some(key);
                    suffix = key.to_string();
                    base.command = self.config.performance_script.clone();
                    base.timeout = PERFORMANCE_TIMEOUT;
                }
                "custom-job" => {
                    job_type = Some(key);
                    suffix = as_string(value)?;
                    base.timeout = CUSTOM_JOB_TIMEOUT;
                }
                "cron" => cron = Some(as_string(value)?),
                "release" => release = Some(as_string(value)?),
                _ => {}
            }
        }

        if let Some(version) = &release {
            base.repo_branch = format!("release-{version}");
            suffix = if suffix.is_empty() {
                version.clone()
            } else {
                format!("{version}-{suffix}")
            };
            if job_type == Some("dot-release") {
                base.args.push("--branch".to_string());
                base.args.push(base.repo_branch.clone());
            }
            monitored = true;
        }

        apply_job_overrides(&mut base, &overrides, &mut self.repositories, self.config)?;

        let job_name = if suffix.is_empty() {
            format!("ci-{}", base.repo_name_for_job)
        } else {
            format!("ci-{}-{suffix}", base.repo_name_for_job)
        };

        if !enabled {
            debug!("Periodic {job_name} disabled, skipping");
            return Ok(());
        }
        let Some(job_type) = job_type else {
            return Err(GeneratorError::invalid_job(
                &job_name,
                "periodic entry does not name a job type",
            ));
        };
        if job_type == "branch-ci" && release.is_none() {
            return Err(GeneratorError::invalid_job(
                &job_name,
                "branch-ci jobs need a release",
            ));
        }
        if base.command.is_empty() {
            return Err(GeneratorError::invalid_job(&job_name, "missing command"));
        }
        let cron = cron
            .or_else(|| generate_cron(job_type, &job_name, base.timeout))
            .ok_or_else(|| GeneratorError::invalid_job(&job_name, "missing cron string"))?;

        if monitored || base.needs_monitor {
            base.add_monitoring_labels(&job_name);
        }
        self.render_periodic(title, repo, base, job_name, cron, &suffix)?;
        self.repositories.mark_processed(repo);
        Ok(())
    }

    /// Emits the Go coverage periodic of `repo`, if it enabled coverage.
    pub(super) fn generate_go_coverage_periodic(&mut self, title: &str, repo: &str) -> Result<()> {
        let threshold = match self.repositories.get(repo) {
            Some(record) if record.enable_go_coverage => record.go_coverage_threshold,
            _ => return Ok(()),
        };
        self.repositories.mark_processed(repo);

        let mut base = self.base_job(repo)?;
        base.image = self.config.coverage_docker_image.clone();
        base.service_account.clear();
        base.command = "coverage".to_string();
        base.args = vec![
            "--artifacts=$(ARTIFACTS)".to_string(),
            format!("--cov-threshold-percentage={threshold}"),
        ];

        let job_name = format!("ci-{}-go-coverage", base.repo_name_for_job);
        let cron = self.required_cron("go-coverage", &job_name, base.timeout)?;
        self.render_periodic(title, repo, base, job_name, cron, "go-coverage")
    }

    /// Emits the cluster maintenance periodics of repositories running
    /// performance tests.
    pub(super) fn generate_performance_cluster_periodics(&mut self) -> Result<()> {
        let repos: Vec<String> = self
            .repositories
            .iter()
            .filter(|record| record.enable_performance_tests)
            .map(|record| record.name.clone())
            .collect();

        for repo in repos {
            for job_type in ["recreate-clusters", "update-clusters"] {
                let mut base = self.base_job(&repo)?;
                base.command = self.config.performance_script.clone();
                base.args = vec![format!("--{job_type}")];

                let job_name = format!("ci-{}-{job_type}", base.repo_name_for_job);
                let cron = self.required_cron(job_type, &job_name, base.timeout)?;
                self.render_periodic(super::PERIODICS, &repo, base, job_name, cron, job_type)?;
            }
        }
        Ok(())
    }

    fn required_cron(&self, job_type: &str, job_name: &str, timeout: i64) -> Result<String> {
        generate_cron(job_type, job_name, timeout)
            .ok_or_else(|| GeneratorError::invalid_job(job_name, "missing cron string"))
    }

    fn render_periodic(
        &mut self,
        title: &str,
        repo: &str,
        mut base: JobTemplateData,
        job_name: String,
        cron: String,
        tab_name: &str,
    ) -> Result<()> {
        let dashboard = if self.renderer.accepts_job(&job_name) {
            self.dashboards.add(&base.org_name, &base.repo_name)
        } else {
            dashboard_name(&base.org_name, &base.repo_name)
        };
        base.add_annotation("testgrid-dashboards", &dashboard);
        base.add_annotation("testgrid-tab-name", tab_name);
        if base.repo_branch != DEFAULT_BRANCH {
            let branch = base.repo_branch.clone();
            base.add_env("PULL_BASE_REF", &branch);
        }
        self.finish_job(&mut base)?;

        let command = base.command_line(self.config.pre_command());
        let data = PeriodicJobTemplateData {
            base,
            job_name,
            cron,
            command,
        };
        self.renderer
            .render_job(templates::PERIODIC_JOB, title, repo, &data.job_name, false, &data)
    }
}
