use std::io::Write;

use log::debug;
use serde::Serialize;
use serde_yaml::Mapping;

use crate::error::{GeneratorError, Result};
use crate::render::templates;
use crate::value::{as_bool, as_int, as_string};

use super::data::JobTemplateData;
use super::overrides::{apply_job_overrides, partition};
use super::repository::DEFAULT_GO_COVERAGE_THRESHOLD;
use super::ProwJobGenerator;

const PRESUBMIT_KEYS: &[&str] = &[
    "build-tests",
    "unit-tests",
    "integration-tests",
    "go-coverage",
    "go-coverage-threshold",
    "custom-test",
    "repo-settings",
];

const TEST_KINDS: &[&str] = &["build-tests", "unit-tests", "integration-tests"];

const COVERAGE_COMMAND: &str = "coverage";
const COVERAGE_TOKEN_SECRET: &str = "covbot-token";

#[derive(Debug, Serialize)]
struct PresubmitJobTemplateData {
    #[serde(flatten)]
    base: JobTemplateData,
    job_name: String,
    command: Vec<String>,
}

impl<'a, W: Write> ProwJobGenerator<'a, W> {
    /// Generates one presubmit job from a `presubmits` entry.
    pub(super) fn generate_presubmit(
        &mut self,
        title: &str,
        repo: &str,
        job: &Mapping,
    ) -> Result<()> {
        let (handled, overrides) = partition(job, PRESUBMIT_KEYS)?;

        let mut base = JobTemplateData::new(repo, self.config)?;
        base.command = self.config.presubmit_script.clone();
        base.go_coverage_threshold = DEFAULT_GO_COVERAGE_THRESHOLD;

        let mut kind: Option<String> = None;
        let mut enabled = true;
        let mut go_coverage = false;
        let mut threshold: Option<i64> = None;
        let mut repo_settings = false;

        for (key, value) in handled {
            match key {
                "build-tests" | "unit-tests" | "integration-tests" => {
                    enabled &= as_bool(value)?;
                    kind = Some(key.to_string());
                }
                "go-coverage" => {
                    enabled &= as_bool(value)?;
                    go_coverage = true;
                    kind = Some(key.to_string());
                }
                "go-coverage-threshold" => threshold = Some(as_int(value)?),
                "custom-test" => kind = Some(as_string(value)?),
                "repo-settings" => repo_settings = true,
                _ => {}
            }
        }

        if let Some(threshold) = threshold {
            base.go_coverage_threshold = threshold;
        }

        let record = self.repositories.entry(repo);
        if go_coverage && enabled {
            record.enable_go_coverage = true;
            record.go_coverage_threshold = base.go_coverage_threshold;
        } else if let Some(threshold) = threshold {
            record.go_coverage_threshold = threshold;
        }

        let Some(kind) = kind else {
            if repo_settings {
                // Only carries repository-wide options.
                return apply_job_overrides(&mut base, &overrides, &mut self.repositories, self.config);
            }
            return Err(GeneratorError::invalid_job(
                repo,
                "presubmit entry does not name a job type",
            ));
        };

        let job_name = format!("pull-{}-{kind}", base.repo_name_for_job);

        if TEST_KINDS.contains(&kind.as_str()) {
            base.args = vec![format!("--{kind}")];
            base.add_monitoring_labels(&job_name);
        }
        if go_coverage {
            self.setup_presubmit_coverage(&mut base);
        }

        apply_job_overrides(&mut base, &overrides, &mut self.repositories, self.config)?;

        if !enabled || repo_settings {
            debug!("Presubmit {job_name} disabled, skipping");
            return Ok(());
        }
        if base.needs_monitor {
            base.add_monitoring_labels(&job_name);
        }
        self.finish_job(&mut base)?;

        let command = base.command_line(self.config.pre_command());
        let data = PresubmitJobTemplateData {
            base,
            job_name,
            command,
        };
        self.renderer
            .render_job(templates::PRESUBMIT_JOB, title, repo, &data.job_name, true, &data)
    }

    fn setup_presubmit_coverage(&self, base: &mut JobTemplateData) {
        let post_job_name = format!("post-{}-go-coverage", base.repo_name_for_job);
        base.image = self.config.coverage_docker_image.clone();
        base.service_account.clear();
        base.command = COVERAGE_COMMAND.to_string();
        base.args = vec![
            format!("--postsubmit-gcs-bucket={}", self.config.gcs_bucket),
            format!("--postsubmit-job-name={post_job_name}"),
            "--artifacts=$(ARTIFACTS)".to_string(),
            "--profile-name=coverage_profile.txt".to_string(),
            "--cov-target=.".to_string(),
            format!("--cov-threshold-percentage={}", base.go_coverage_threshold),
            format!("--github-token=/etc/{COVERAGE_TOKEN_SECRET}/token"),
        ];
        base.add_volume(
            &format!("/etc/{COVERAGE_TOKEN_SECRET}"),
            COVERAGE_TOKEN_SECRET,
            true,
            &[],
        );
    }
}
