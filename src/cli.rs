use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::info;

use crate::auth::Token;
use crate::config::GeneratorConfig;
use crate::document::JobConfigDocument;
use crate::github::{upgrade_release_branches, GitHubClient};
use crate::output::{print_summary, GeneratedDocument, PhaseProgress};
use crate::prow::ProwJobGenerator;
use crate::render::{open_output, Renderer};
use crate::testgrid::{k8s, TestGridGenerator};

#[derive(Parser)]
#[command(name = "prowgen")]
#[command(author, version, about = "Prow job and TestGrid config generator", long_about = None)]
pub struct Cli {
    /// Job description (YAML) to generate from
    config_file: PathBuf,

    /// Settings file (TOML, JSON or YAML)
    #[arg(long, env = "PROWGEN_SETTINGS")]
    settings: Option<PathBuf>,

    /// Destination of the Prow jobs config, stdout when unset
    #[arg(long)]
    prow_jobs_config_output: Option<PathBuf>,

    /// Destination of the TestGrid config, stdout when unset
    #[arg(long)]
    testgrid_config_output: Option<PathBuf>,

    /// Destination of the k8s TestGrid config, stdout when unset
    #[arg(long)]
    k8s_testgrid_config_output: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    generate_testgrid_config: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    generate_k8s_testgrid_config: bool,

    /// Include the general TestGrid defaults in the TestGrid config
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_config: bool,

    #[arg(long)]
    prow_host: Option<String>,

    #[arg(long)]
    gubernator_host: Option<String>,

    #[arg(long)]
    gcs_bucket: Option<String>,

    #[arg(long)]
    testgrid_gcs_bucket: Option<String>,

    #[arg(long)]
    logs_dir: Option<String>,

    #[arg(long)]
    presubmit_logs_dir: Option<String>,

    #[arg(long)]
    test_account: Option<String>,

    #[arg(long)]
    nightly_account: Option<String>,

    #[arg(long)]
    release_account: Option<String>,

    /// Registry of the job images
    #[arg(long)]
    image_docker: Option<String>,

    #[arg(long)]
    prow_tests_docker: Option<String>,

    #[arg(long)]
    presubmit_script: Option<String>,

    #[arg(long)]
    release_script: Option<String>,

    #[arg(long)]
    webhook_api_coverage_script: Option<String>,

    /// Repository (github.com/foo/bar[=branch]) used by every job
    #[arg(long)]
    repo_override: Option<String>,

    /// Timeout in minutes used by every job
    #[arg(long)]
    timeout_override: Option<i64>,

    /// Generate only this job
    #[arg(long)]
    job_filter: Option<String>,

    /// Executable run instead of the real command of a job
    #[arg(long)]
    pre_command: Option<String>,

    /// Extra environment variable (key=value) added to every job; repeatable
    #[arg(long = "extra-env")]
    extra_env: Vec<String>,

    /// Add jobs for new release branches found on GitHub before generating
    #[arg(long, default_value_t = false)]
    upgrade_release_branches: bool,

    /// File holding the GitHub token used by --upgrade-release-branches
    #[arg(long)]
    github_token_path: Option<PathBuf>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long)]
    github_api_url: Option<String>,

    /// TestGrid project receiving coverage repositories without periodic jobs
    #[arg(long)]
    default_coverage_project: Option<String>,
}

fn set(field: &mut String, value: Option<&String>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

impl Cli {
    /// Settings file values with the command-line overrides applied.
    fn settings(&self) -> Result<GeneratorConfig> {
        let mut config = GeneratorConfig::load(self.settings.as_deref())?;

        set(&mut config.prow_host, self.prow_host.as_ref());
        set(&mut config.gubernator_host, self.gubernator_host.as_ref());
        set(&mut config.gcs_bucket, self.gcs_bucket.as_ref());
        set(&mut config.testgrid_gcs_bucket, self.testgrid_gcs_bucket.as_ref());
        set(&mut config.logs_dir, self.logs_dir.as_ref());
        set(&mut config.presubmit_logs_dir, self.presubmit_logs_dir.as_ref());
        set(&mut config.test_account, self.test_account.as_ref());
        set(&mut config.nightly_account, self.nightly_account.as_ref());
        set(&mut config.release_account, self.release_account.as_ref());
        set(&mut config.image_docker, self.image_docker.as_ref());
        set(&mut config.prow_tests_docker, self.prow_tests_docker.as_ref());
        set(&mut config.presubmit_script, self.presubmit_script.as_ref());
        set(&mut config.release_script, self.release_script.as_ref());
        set(
            &mut config.webhook_api_coverage_script,
            self.webhook_api_coverage_script.as_ref(),
        );
        set(&mut config.github_api_url, self.github_api_url.as_ref());

        if self.default_coverage_project.is_some() {
            config
                .default_coverage_project
                .clone_from(&self.default_coverage_project);
        }

        let overrides = &mut config.overrides;
        if self.repo_override.is_some() {
            overrides.repository.clone_from(&self.repo_override);
        }
        if let Some(timeout) = self.timeout_override {
            overrides.timeout = timeout;
        }
        if self.job_filter.is_some() {
            overrides.job_filter.clone_from(&self.job_filter);
        }
        if self.pre_command.is_some() {
            overrides.pre_command.clone_from(&self.pre_command);
        }
        overrides.extra_env_vars.extend(self.extra_env.iter().cloned());

        Ok(config)
    }

    fn github_token(&self) -> Result<Option<Token>> {
        if let Some(path) = &self.github_token_path {
            let token = Token::from_file(path)
                .with_context(|| format!("Failed to read GitHub token from {}", path.display()))?;
            return Ok(Some(token));
        }
        Ok(self.github_token.as_deref().map(Token::from))
    }

    async fn load_document(&self, config: &GeneratorConfig) -> Result<JobConfigDocument> {
        let mut document = JobConfigDocument::load(&self.config_file).with_context(|| {
            format!("Cannot read job description {}", self.config_file.display())
        })?;

        if self.upgrade_release_branches {
            let client = GitHubClient::new(&config.github_api_url, self.github_token()?)
                .context("Failed creating GitHub client")?;
            let upgrades =
                upgrade_release_branches(&mut document, &client, config.max_release_branches)
                    .await
                    .context("Failed upgrading release branches")?;
            info!("Release jobs added for {} repositories", upgrades.len());
        }

        Ok(document)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.settings()?;
        let mut documents = Vec::new();

        let progress = PhaseProgress::start(3, "Loading job description");
        let document = self.load_document(&config).await?;
        let progress = progress.next("Loaded job description", "Generating Prow jobs");

        let path = self.prow_jobs_config_output.as_deref();
        let mut renderer = Renderer::new(open_output(path)?, &config)?;
        let (repositories, dashboards) = {
            let mut generator = ProwJobGenerator::new(&config, &mut renderer);
            generator.generate(&document)?;
            (
                generator.repositories().len(),
                generator.testgrid_dashboards().clone(),
            )
        };
        documents.push(finish_document(
            &mut renderer,
            "Prow jobs",
            path,
            format!("{repositories} repositories"),
        )?);
        let progress = progress.next("Generated Prow jobs", "Generating TestGrid configs");

        if self.generate_k8s_testgrid_config {
            let path = self.k8s_testgrid_config_output.as_deref();
            renderer.set_output(open_output(path)?);
            let organizations = k8s::generate(&config, &dashboards, &mut renderer)?;
            documents.push(finish_document(
                &mut renderer,
                "k8s TestGrid",
                path,
                format!("{organizations} organizations"),
            )?);
        }

        if self.generate_testgrid_config {
            let path = self.testgrid_config_output.as_deref();
            renderer.set_output(open_output(path)?);
            let metadata = TestGridGenerator::new(&config, &mut renderer)
                .generate(&document, self.include_config)?;
            documents.push(finish_document(
                &mut renderer,
                "TestGrid",
                path,
                format!("{} projects", metadata.projects().count()),
            )?);
        }

        progress.finish("Generated TestGrid configs");
        print_summary(&self.config_file, &documents);
        Ok(())
    }
}

fn finish_document<W: Write>(
    renderer: &mut Renderer<W>,
    name: &'static str,
    path: Option<&Path>,
    details: String,
) -> Result<GeneratedDocument> {
    renderer.flush()?;
    Ok(GeneratedDocument::new(
        name,
        path,
        renderer.output().count(),
        details,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("prowgen").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["jobs.yaml"]);
        assert_eq!(cli.config_file, PathBuf::from("jobs.yaml"));
        assert!(cli.generate_testgrid_config);
        assert!(cli.generate_k8s_testgrid_config);
        assert!(cli.include_config);
        assert!(!cli.upgrade_release_branches);
    }

    #[test]
    fn test_unused_host_flags_are_rejected() {
        let err = Cli::try_parse_from(["prowgen", "jobs.yaml", "--testgrid-host", "https://tg"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
        assert!(Cli::try_parse_from(["prowgen", "jobs.yaml", "--prow-host", "https://p"]).is_ok());
    }

    #[test]
    fn test_config_file_is_required() {
        assert!(Cli::try_parse_from(["prowgen"]).is_err());
    }

    #[test]
    fn test_toggles_take_values() {
        let cli = parse(&[
            "jobs.yaml",
            "--generate-testgrid-config=false",
            "--include-config",
            "false",
        ]);
        assert!(!cli.generate_testgrid_config);
        assert!(!cli.include_config);
    }

    #[test]
    fn test_flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.toml");
        std::fs::write(&settings, "gcs-bucket = \"from-file\"\ncluster = \"other\"\n").unwrap();
        let settings = settings.to_string_lossy().to_string();

        let cli = parse(&[
            "jobs.yaml",
            "--settings",
            &settings,
            "--gcs-bucket",
            "from-flag",
            "--timeout-override",
            "30",
            "--extra-env",
            "A=1",
            "--extra-env",
            "B=2",
            "--job-filter",
            "ci-knative-serving-continuous",
        ]);
        let config = cli.settings().unwrap();

        assert_eq!(config.gcs_bucket, "from-flag");
        assert_eq!(config.cluster, "other");
        assert_eq!(config.overrides.timeout, 30);
        assert_eq!(config.overrides.extra_env_vars, vec!["A=1", "B=2"]);
        assert_eq!(
            config.overrides.job_filter.as_deref(),
            Some("ci-knative-serving-continuous")
        );
    }

    #[tokio::test]
    async fn test_execute_writes_every_document() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("jobs.yaml");
        std::fs::write(
            &input,
            "presubmits:\n  knative/serving:\n    - build-tests: true\nperiodics:\n  knative/serving:\n    - continuous: true\n",
        )
        .unwrap();
        let settings = dir.path().join("settings.toml");
        std::fs::write(&settings, "").unwrap();
        let jobs = dir.path().join("jobs-out.yaml");
        let testgrid = dir.path().join("testgrid.yaml");
        let k8s = dir.path().join("k8s.yaml");

        let arg = |path: &Path| path.to_string_lossy().to_string();
        let cli = parse(&[
            &arg(&input),
            "--settings",
            &arg(&settings),
            "--prow-jobs-config-output",
            &arg(&jobs),
            "--testgrid-config-output",
            &arg(&testgrid),
            "--k8s-testgrid-config-output",
            &arg(&k8s),
        ]);
        cli.execute().await.unwrap();

        let jobs = std::fs::read_to_string(jobs).unwrap();
        assert!(jobs.contains("name: pull-knative-serving-build-tests"));
        assert!(jobs.contains("name: ci-knative-serving-continuous"));
        let testgrid = std::fs::read_to_string(testgrid).unwrap();
        assert!(testgrid.contains("default_test_group:"));
        assert!(testgrid.contains("- name: ci-knative-serving-continuous"));
        let k8s = std::fs::read_to_string(k8s).unwrap();
        assert!(k8s.contains("- name: knative-serving"));
    }

    #[tokio::test]
    async fn test_execute_fails_on_unknown_option() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("jobs.yaml");
        std::fs::write(
            &input,
            "presubmits:\n  knative/serving:\n    - build-tests: true\n      frobnicate: true\n",
        )
        .unwrap();
        let settings = dir.path().join("settings.toml");
        std::fs::write(&settings, "").unwrap();
        let out = dir.path().join("out.yaml");

        let arg = |path: &Path| path.to_string_lossy().to_string();
        let cli = parse(&[
            &arg(&input),
            "--settings",
            &arg(&settings),
            "--prow-jobs-config-output",
            &arg(&out),
            "--generate-testgrid-config=false",
            "--generate-k8s-testgrid-config=false",
        ]);
        let err = cli.execute().await.unwrap_err();
        assert!(format!("{err:#}").contains("frobnicate"));
    }
}
