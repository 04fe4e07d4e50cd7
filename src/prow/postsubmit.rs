use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::render::templates;

use super::data::{JobTemplateData, DEFAULT_BRANCH};
use super::repository::RepositoryRecord;
use super::{ProwJobGenerator, POSTSUBMITS};

const BENCHMARKS_PATH_PATTERN: &str = "^test/performance/benchmarks/";

#[derive(Debug, Serialize)]
struct PostsubmitJobTemplateData {
    #[serde(flatten)]
    base: JobTemplateData,
    job_name: String,
    command: Vec<String>,
    run_if_changed: String,
}

impl<'a, W: Write> ProwJobGenerator<'a, W> {
    /// Emits the postsubmits derived from the repository records: Go coverage
    /// and benchmark cluster reconciliation.
    pub(super) fn generate_postsubmits(&mut self) -> Result<()> {
        let records: Vec<RepositoryRecord> = self.repositories.iter().cloned().collect();

        for record in &records {
            if record.enable_go_coverage {
                let mut base = self.base_job(&record.name)?;
                base.image = self.config.coverage_docker_image.clone();
                base.service_account.clear();
                base.command = "coverage".to_string();
                base.args = vec![
                    "--artifacts=$(ARTIFACTS)".to_string(),
                    format!("--cov-threshold-percentage={}", record.go_coverage_threshold),
                ];
                let job_name = format!("post-{}-go-coverage", base.repo_name_for_job);
                self.render_postsubmit(&record.name, base, job_name, String::new())?;
            }

            if record.enable_performance_tests {
                let mut base = self.base_job(&record.name)?;
                base.command = self.config.performance_script.clone();
                base.args = vec!["--reconcile-benchmark-clusters".to_string()];
                let job_name = format!("post-{}-reconcile-clusters", base.repo_name_for_job);
                self.render_postsubmit(
                    &record.name,
                    base,
                    job_name,
                    BENCHMARKS_PATH_PATTERN.to_string(),
                )?;
            }
        }
        Ok(())
    }

    fn render_postsubmit(
        &mut self,
        repo: &str,
        mut base: JobTemplateData,
        job_name: String,
        run_if_changed: String,
    ) -> Result<()> {
        base.branches = vec![DEFAULT_BRANCH.to_string()];
        self.finish_job(&mut base)?;

        let command = base.command_line(self.config.pre_command());
        let data = PostsubmitJobTemplateData {
            base,
            job_name,
            command,
            run_if_changed,
        };
        self.renderer
            .render_job(templates::POSTSUBMIT_JOB, POSTSUBMITS, repo, &data.job_name, true, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::generate;

    fn postsubmits(input: &str) -> serde_yaml::Value {
        let out = generate(input).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        parsed["postsubmits"].clone()
    }

    #[test]
    fn test_go_coverage_postsubmit() {
        let section = postsubmits(
            "presubmits:\n  knative/serving:\n    - go-coverage: true\n      go-coverage-threshold: 65\n",
        );
        let job = &section["knative/serving"][0];
        assert_eq!(job["name"].as_str(), Some("post-knative-serving-go-coverage"));
        assert_eq!(job["branches"][0].as_str(), Some("main"));
        assert!(job["run_if_changed"].is_null());
        let args = job["spec"]["containers"][0]["args"].as_sequence().unwrap();
        assert_eq!(args[0].as_str(), Some("coverage"));
        assert_eq!(args[2].as_str(), Some("--cov-threshold-percentage=65"));
    }

    #[test]
    fn test_reconcile_clusters_postsubmit() {
        let section = postsubmits(
            "presubmits:\n  knative/serving:\n    - unit-tests: true\n      performance: true\n",
        );
        let job = &section["knative/serving"][0];
        assert_eq!(job["name"].as_str(), Some("post-knative-serving-reconcile-clusters"));
        assert_eq!(
            job["run_if_changed"].as_str(),
            Some("^test/performance/benchmarks/")
        );
        assert_eq!(
            job["spec"]["containers"][0]["args"][1].as_str(),
            Some("--reconcile-benchmark-clusters")
        );
    }

    #[test]
    fn test_no_postsubmits_without_flags() {
        let out = generate("presubmits:\n  knative/serving:\n    - build-tests: true\n").unwrap();
        assert!(!out.contains("postsubmits:"));
    }
}
