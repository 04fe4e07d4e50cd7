pub mod k8s;
mod metadata;

use std::collections::BTreeMap;
use std::io::Write;

use log::info;
use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::document::JobConfigDocument;
use crate::error::{GeneratorError, Result};
use crate::prow::{PERIODICS, PRESUBMITS};
use crate::render::{templates, HeaderTemplateData, Renderer};

pub use metadata::{is_released, parse_go_coverage_map, TestGridMetadata, TEST_COVERAGE};

pub const TEST_GROUPS: &str = "test_groups";
pub const DASHBOARDS: &str = "dashboards";
pub const DASHBOARD_GROUPS: &str = "dashboard_groups";

const SORT_BY_NAME: &str = "sort-by-name=";
const GROUP_BY_DIRECTORY: &str =
    "exclude-filter-by-regex=Overall$&group-by-directory=&expand-groups=&sort-by-name=";

/// Job types that page on failures.
const ALERTING_JOB_TYPES: &[&str] = &[
    "continuous",
    "dot-release",
    "auto-release",
    "performance",
    "nightly",
    "webhook-apicoverage",
];

#[derive(Debug, Serialize)]
struct TestGroupTemplateData {
    name: String,
    gcs_prefix: String,
    extras: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DashboardTemplateData<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct DashboardTabTemplateData {
    name: String,
    test_group_name: String,
    base_options: &'static str,
    extras: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DashboardGroupTemplateData {
    pub name: String,
    pub dashboard_names: Vec<String>,
}

/// Name of the test group of a job type, matching the periodic job name.
pub fn test_group_name(proj_repo: &str, job_type: &str) -> String {
    let job_type = if job_type == "nightly" {
        "nightly-release"
    } else {
        job_type
    };
    format!("ci-{proj_repo}-{job_type}").to_lowercase()
}

/// Generates the TestGrid configuration document.
pub struct TestGridGenerator<'a, W: Write> {
    config: &'a GeneratorConfig,
    renderer: &'a mut Renderer<W>,
}

impl<'a, W: Write> TestGridGenerator<'a, W> {
    pub fn new(config: &'a GeneratorConfig, renderer: &'a mut Renderer<W>) -> Self {
        Self { config, renderer }
    }

    /// Emits test groups, dashboards and dashboard groups, preceded by the
    /// header and general defaults when `include_config` is set.
    pub fn generate(
        &mut self,
        document: &JobConfigDocument,
        include_config: bool,
    ) -> Result<TestGridMetadata> {
        if include_config {
            let header = HeaderTemplateData::new(self.config);
            self.renderer.render(templates::COMMON_HEADER, &header)?;
            self.renderer.render(templates::TESTGRID_GENERAL, &header)?;
        }

        let coverage = parse_go_coverage_map(document.require_section(PRESUBMITS)?)?;
        let metadata = TestGridMetadata::collect(
            document.require_section(PERIODICS)?,
            &coverage,
            self.config.default_coverage_project.as_deref(),
        )?;

        self.generate_test_groups(&metadata)?;
        self.generate_dashboards(&metadata)?;
        self.generate_release_dashboards(&metadata)?;
        self.generate_dashboard_groups(&metadata)?;

        info!(
            "Generated TestGrid config for {} projects",
            metadata.projects().count()
        );
        Ok(metadata)
    }

    fn generate_test_groups(&mut self, metadata: &TestGridMetadata) -> Result<()> {
        for (project, repos) in metadata.projects() {
            for entry in repos.iter() {
                let proj_repo = entry.proj_repo(project);
                for job_type in &entry.job_types {
                    let data = self.test_group(&proj_repo, job_type);
                    self.renderer.open_section(TEST_GROUPS)?;
                    self.renderer.render(templates::TESTGRID_TEST_GROUP, &data)?;
                }
            }
        }
        Ok(())
    }

    fn test_group(&self, proj_repo: &str, job_type: &str) -> TestGroupTemplateData {
        let name = test_group_name(proj_repo, job_type);
        let logs = format!("{}/{}", self.config.gcs_bucket, self.config.logs_dir);
        let mut extras = BTreeMap::new();

        let gcs_prefix = if job_type == TEST_COVERAGE {
            extras.insert("short_text_metric".to_string(), "\"coverage\"".to_string());
            format!("{logs}/ci-{proj_repo}-go-coverage").to_lowercase()
        } else {
            if ALERTING_JOB_TYPES.contains(&job_type) {
                extras.insert("num_failures_to_alert".to_string(), "3".to_string());
                extras.insert("alert_options".to_string(), self.alert_options(4));
            } else {
                extras.insert("alert_stale_results_hours".to_string(), "3".to_string());
            }
            format!("{logs}/{name}")
        };

        TestGroupTemplateData {
            name,
            gcs_prefix,
            extras,
        }
    }

    /// Nested `alert_options` block; `indent` is the column of its keys.
    fn alert_options(&self, indent: usize) -> String {
        format!(
            "\n{}alert_mail_to_addresses: \"{}\"",
            " ".repeat(indent),
            self.config.alert_mail_to
        )
    }

    fn generate_dashboards(&mut self, metadata: &TestGridMetadata) -> Result<()> {
        for (project, repos) in metadata.projects() {
            if is_released(project) {
                continue;
            }
            for entry in repos.iter() {
                if entry.job_types.is_empty() {
                    continue;
                }
                let proj_repo = entry.proj_repo(project);
                self.renderer.open_section(DASHBOARDS)?;
                self.renderer.render(
                    templates::TESTGRID_DASHBOARD,
                    &DashboardTemplateData { name: &proj_repo },
                )?;
                for job_type in &entry.job_types {
                    let tab = dashboard_tab(&proj_repo, job_type);
                    self.renderer.render(templates::TESTGRID_DASHBOARD_TAB, &tab)?;
                }
            }
        }
        Ok(())
    }

    /// One dashboard per release project, with a tab per repository job.
    fn generate_release_dashboards(&mut self, metadata: &TestGridMetadata) -> Result<()> {
        for (project, repos) in metadata.projects() {
            if !is_released(project) {
                continue;
            }
            let name = project.to_lowercase();
            self.renderer.open_section(DASHBOARDS)?;
            self.renderer.render(
                templates::TESTGRID_DASHBOARD,
                &DashboardTemplateData { name: &name },
            )?;

            for entry in repos.iter() {
                let proj_repo = entry.proj_repo(project);
                for job_type in &entry.job_types {
                    let failures = match job_type.as_str() {
                        "continuous" => "3",
                        "dot-release" => "1",
                        other => {
                            return Err(GeneratorError::UnsupportedReleaseJob {
                                project: project.to_string(),
                                job_type: other.to_string(),
                            })
                        }
                    };
                    let extras = BTreeMap::from([
                        ("num_failures_to_alert".to_string(), failures.to_string()),
                        ("alert_options".to_string(), self.alert_options(6)),
                    ]);
                    let tab = DashboardTabTemplateData {
                        name: format!("{}-{job_type}", entry.repo),
                        test_group_name: test_group_name(&proj_repo, job_type),
                        base_options: SORT_BY_NAME,
                        extras,
                    };
                    self.renderer.render(templates::TESTGRID_DASHBOARD_TAB, &tab)?;
                }
            }
        }
        Ok(())
    }

    fn generate_dashboard_groups(&mut self, metadata: &TestGridMetadata) -> Result<()> {
        for (project, repos) in metadata.projects() {
            if is_released(project) {
                continue;
            }
            let dashboard_names: Vec<String> = repos
                .iter()
                .filter(|entry| !entry.job_types.is_empty())
                .map(|entry| entry.proj_repo(project))
                .collect();
            if dashboard_names.is_empty() {
                continue;
            }
            self.renderer.open_section(DASHBOARD_GROUPS)?;
            self.renderer.render(
                templates::TESTGRID_DASHBOARD_GROUP,
                &DashboardGroupTemplateData {
                    name: project.to_string(),
                    dashboard_names,
                },
            )?;
        }
        Ok(())
    }
}

fn dashboard_tab(proj_repo: &str, job_type: &str) -> DashboardTabTemplateData {
    let test_group_name = test_group_name(proj_repo, job_type);
    if job_type == TEST_COVERAGE {
        return DashboardTabTemplateData {
            name: "coverage".to_string(),
            test_group_name,
            base_options: GROUP_BY_DIRECTORY,
            extras: BTreeMap::from([(
                "short_text_metric".to_string(),
                "\"coverage\"".to_string(),
            )]),
        };
    }
    DashboardTabTemplateData {
        name: job_type.to_string(),
        test_group_name,
        base_options: SORT_BY_NAME,
        extras: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"
presubmits:
  knative/serving:
    - build-tests: true
    - go-coverage: true
  knative/eventing:
    - go-coverage: true
periodics:
  knative/serving:
    - continuous: true
    - nightly: true
    - dot-release: true
      release: "0.23"
    - custom-job: flaky
      command: ./flaky.sh
  knative-sandbox/kn-plugin:
    - continuous: true
"#;

    fn generate_with(
        config: &GeneratorConfig,
        input: &str,
        include_config: bool,
    ) -> Result<String> {
        let document = JobConfigDocument::parse(input)?;
        let mut renderer = Renderer::new(Vec::new(), config)?;
        TestGridGenerator::new(config, &mut renderer).generate(&document, include_config)?;
        Ok(String::from_utf8(renderer.into_output().into_inner()).unwrap())
    }

    fn generate(input: &str) -> serde_yaml::Value {
        let out = generate_with(&GeneratorConfig::default(), input, false).unwrap();
        serde_yaml::from_str(&out).unwrap()
    }

    fn names(items: &serde_yaml::Value) -> Vec<String> {
        items
            .as_sequence()
            .unwrap()
            .iter()
            .map(|item| item["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_test_group_name() {
        assert_eq!(test_group_name("knative-serving", "nightly"), "ci-knative-serving-nightly-release");
        assert_eq!(test_group_name("knative-serving-0.23", "dot-release"), "ci-knative-serving-0.23-dot-release");
    }

    #[test]
    fn test_test_groups() {
        let config = generate(INPUT);
        let groups = &config["test_groups"];
        assert_eq!(
            names(groups),
            vec![
                "ci-knative-serving-continuous",
                "ci-knative-serving-nightly-release",
                "ci-knative-serving-flaky",
                "ci-knative-serving-test-coverage",
                "ci-knative-eventing-test-coverage",
                "ci-knative-serving-0.23-dot-release",
                "ci-knative-sandbox-kn-plugin-continuous",
            ]
        );

        let continuous = &groups[0];
        assert_eq!(
            continuous["gcs_prefix"].as_str(),
            Some("knative-prow/logs/ci-knative-serving-continuous")
        );
        assert_eq!(continuous["num_failures_to_alert"].as_i64(), Some(3));
        assert_eq!(
            continuous["alert_options"]["alert_mail_to_addresses"].as_str(),
            Some("knative-productivity-dev@googlegroups.com")
        );

        let flaky = &groups[2];
        assert_eq!(flaky["alert_stale_results_hours"].as_i64(), Some(3));

        let coverage = &groups[3];
        assert_eq!(
            coverage["gcs_prefix"].as_str(),
            Some("knative-prow/logs/ci-knative-serving-go-coverage")
        );
        assert_eq!(coverage["short_text_metric"].as_str(), Some("coverage"));
    }

    #[test]
    fn test_dashboards() {
        let config = generate(INPUT);
        let dashboards = &config["dashboards"];
        assert_eq!(
            names(dashboards),
            vec![
                "knative-serving",
                "knative-eventing",
                "knative-sandbox-kn-plugin",
                "knative-0.23",
            ]
        );

        let serving = &dashboards[0]["dashboard_tab"];
        assert_eq!(
            names(serving),
            vec!["continuous", "nightly", "flaky", "coverage"]
        );
        assert_eq!(
            serving[1]["test_group_name"].as_str(),
            Some("ci-knative-serving-nightly-release")
        );
        assert_eq!(serving[0]["base_options"].as_str(), Some(SORT_BY_NAME));
        assert_eq!(serving[3]["base_options"].as_str(), Some(GROUP_BY_DIRECTORY));

        let release = &dashboards[3]["dashboard_tab"];
        assert_eq!(names(release), vec!["serving-dot-release"]);
        assert_eq!(release[0]["num_failures_to_alert"].as_i64(), Some(1));
        assert_eq!(
            release[0]["test_group_name"].as_str(),
            Some("ci-knative-serving-0.23-dot-release")
        );
        assert!(release[0]["alert_options"]["alert_mail_to_addresses"].is_string());
    }

    #[test]
    fn test_dashboard_groups() {
        let config = generate(INPUT);
        let groups = &config["dashboard_groups"];
        assert_eq!(names(groups), vec!["knative", "knative-sandbox"]);
        let dashboards: Vec<&str> = groups[0]["dashboard_names"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|name| name.as_str().unwrap())
            .collect();
        assert_eq!(dashboards, vec!["knative-serving", "knative-eventing"]);
    }

    #[test]
    fn test_default_coverage_project_keeps_job_names() {
        let mut config = GeneratorConfig::default();
        config.default_coverage_project = Some("knative".to_string());
        let input = r#"
presubmits:
  knative-sandbox/kn-plugin:
    - go-coverage: true
periodics:
  knative/serving:
    - continuous: true
"#;
        let out = generate_with(&config, input, false).unwrap();
        let testgrid: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();

        let coverage = &testgrid["test_groups"][1];
        assert_eq!(
            coverage["name"].as_str(),
            Some("ci-knative-sandbox-kn-plugin-test-coverage")
        );
        assert_eq!(
            coverage["gcs_prefix"].as_str(),
            Some("knative-prow/logs/ci-knative-sandbox-kn-plugin-go-coverage")
        );
        assert_eq!(
            names(&testgrid["dashboards"]),
            vec!["knative-serving", "knative-sandbox-kn-plugin"]
        );
        // Filed under the default project's dashboard group.
        assert_eq!(names(&testgrid["dashboard_groups"]), vec!["knative"]);
        assert_eq!(
            testgrid["dashboard_groups"][0]["dashboard_names"][1].as_str(),
            Some("knative-sandbox-kn-plugin")
        );

        // The Prow side emits the job that test group reads.
        let document = JobConfigDocument::parse(input).unwrap();
        let mut renderer = Renderer::new(Vec::new(), &config).unwrap();
        crate::prow::ProwJobGenerator::new(&config, &mut renderer)
            .generate(&document)
            .unwrap();
        let jobs = String::from_utf8(renderer.into_output().into_inner()).unwrap();
        assert!(jobs.contains("name: ci-knative-sandbox-kn-plugin-go-coverage"));
    }

    #[test]
    fn test_unsupported_release_job() {
        let input = "presubmits: {}\nperiodics:\n  knative/serving:\n    - nightly: true\n      release: \"0.23\"\n";
        let err = generate_with(&GeneratorConfig::default(), input, false).unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::UnsupportedReleaseJob { ref job_type, .. } if job_type == "nightly"
        ));
    }

    #[test]
    fn test_missing_sections() {
        let err = generate_with(&GeneratorConfig::default(), "periodics: {}\n", false).unwrap_err();
        assert!(matches!(err, GeneratorError::MissingSection(ref s) if s == "presubmits"));
    }

    #[test]
    fn test_include_config() {
        let out = generate_with(&GeneratorConfig::default(), INPUT, true).unwrap();
        let config: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(
            config["default_test_group"]["gcs_prefix"].as_str(),
            Some("knative-testgrid/default")
        );
        assert_eq!(
            config["default_dashboard_tab"]["results_url_template"]["url"].as_str(),
            Some("https://prow.knative.dev/job-history/<gcs_prefix>")
        );
        assert!(config["test_groups"].is_sequence());
    }
}
