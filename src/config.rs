use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global settings for the generator.
///
/// Built once at startup (settings file, then command-line flags) and passed
/// by reference to every component. Nothing reads global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GeneratorConfig {
    /// Prow host, including HTTP protocol
    pub prow_host: String,

    /// Gubernator host, including HTTP protocol
    pub gubernator_host: String,

    /// GCS bucket the job logs are uploaded to
    pub gcs_bucket: String,

    /// GCS bucket holding the TestGrid configuration
    pub testgrid_gcs_bucket: String,

    /// Path in the GCS bucket for periodic and postsubmit logs
    pub logs_dir: String,

    /// Path in the GCS bucket for presubmit logs
    pub presubmit_logs_dir: String,

    /// Service account JSON for test jobs
    pub test_account: String,

    /// Service account JSON for nightly release jobs
    pub nightly_account: String,

    /// Service account JSON for release jobs
    pub release_account: String,

    /// Registry the job images are pulled from
    pub image_docker: String,

    /// Name of the test runner image inside `image_docker`
    pub prow_tests_docker: String,

    /// Image used by Go coverage jobs
    pub coverage_docker_image: String,

    pub presubmit_script: String,
    pub release_script: String,
    pub webhook_api_coverage_script: String,
    pub performance_script: String,

    /// Build cluster the jobs are scheduled on
    pub cluster: String,

    /// Organizations whose repositories are checked out under `path_alias_domain`
    pub path_alias_orgs: Vec<String>,

    /// Repositories (`org/repo`) excluded from the path alias
    pub non_path_alias_repos: Vec<String>,

    pub path_alias_domain: String,

    /// GCS prefix release jobs publish to (`<prefix>/<repo>`)
    pub release_gcs_prefix: String,

    /// Container registry release jobs publish to
    pub release_gcr: String,

    /// Address TestGrid alerts are mailed to
    pub alert_mail_to: String,

    /// GitHub API base URL used by the release-branch refresh
    pub github_api_url: String,

    /// Number of release branches kept per repository by the refresh
    pub max_release_branches: usize,

    /// Project bucket receiving coverage-only repositories; their own
    /// organization is used when unset
    pub default_coverage_project: Option<String>,

    /// Per-run overrides, mostly for debugging a single job
    pub overrides: OverrideConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OverrideConfig {
    /// Repository reference (`github.com/foo/bar[=branch]`) used for every job
    pub repository: Option<String>,

    /// Generate only this job
    pub job_filter: Option<String>,

    /// Executable run instead of the real command of a job
    pub pre_command: Option<String>,

    /// Extra environment variables (`key=value`) added to every job
    pub extra_env_vars: Vec<String>,

    /// Timeout in minutes replacing every job's own timeout when positive
    pub timeout: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            prow_host: "https://prow.knative.dev".to_string(),
            gubernator_host: "https://gubernator.knative.dev".to_string(),
            gcs_bucket: "knative-prow".to_string(),
            testgrid_gcs_bucket: "knative-testgrid".to_string(),
            logs_dir: "logs".to_string(),
            presubmit_logs_dir: "pr-logs".to_string(),
            test_account: "/etc/test-account/service-account.json".to_string(),
            nightly_account: "/etc/nightly-account/service-account.json".to_string(),
            release_account: "/etc/release-account/service-account.json".to_string(),
            image_docker: "gcr.io/knative-tests/test-infra".to_string(),
            prow_tests_docker: "prow-tests:stable".to_string(),
            coverage_docker_image: "gcr.io/knative-tests/test-infra/coverage:latest".to_string(),
            presubmit_script: "./test/presubmit-tests.sh".to_string(),
            release_script: "./hack/release.sh".to_string(),
            webhook_api_coverage_script: "./test/apicoverage.sh".to_string(),
            performance_script: "./test/performance/performance-tests.sh".to_string(),
            cluster: "build-knative".to_string(),
            path_alias_orgs: vec!["knative".to_string(), "knative-sandbox".to_string()],
            non_path_alias_repos: vec!["knative/docs".to_string()],
            path_alias_domain: "knative.dev".to_string(),
            release_gcs_prefix: "knative-releases".to_string(),
            release_gcr: "gcr.io/knative-releases".to_string(),
            alert_mail_to: "knative-productivity-dev@googlegroups.com".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            max_release_branches: 4,
            default_coverage_project: None,
            overrides: OverrideConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./prowgen.toml, ./prowgen.json, ./prowgen.yaml, ./prowgen.yml
    /// 3. `<config dir>/prowgen/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["prowgen.toml", "prowgen.json", "prowgen.yaml", "prowgen.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = user_config_path() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML settings: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON settings: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML settings: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse settings file: {}", path.display())),
        }
    }

    /// Full reference of the test runner image.
    pub fn prow_tests_image(&self) -> String {
        format!(
            "{}/{}",
            self.image_docker.trim_end_matches('/'),
            self.prow_tests_docker.trim_start_matches('/')
        )
    }

    /// The pre-command, if one is set and non-empty.
    pub fn pre_command(&self) -> Option<&str> {
        self.overrides
            .pre_command
            .as_deref()
            .filter(|command| !command.is_empty())
    }

    pub fn uses_path_alias(&self, org: &str, org_repo: &str) -> bool {
        self.path_alias_orgs.iter().any(|o| o == org)
            && !self.non_path_alias_repos.iter().any(|r| r == org_repo)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prowgen").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GeneratorConfig::default();
        assert_eq!(config.gcs_bucket, "knative-prow");
        assert_eq!(config.max_release_branches, 4);
        assert_eq!(
            config.prow_tests_image(),
            "gcr.io/knative-tests/test-infra/prow-tests:stable"
        );
        assert_eq!(config.overrides.timeout, 0);
        assert!(config.pre_command().is_none());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
gcs-bucket = "my-bucket"
path-alias-orgs = ["acme"]
max-release-branches = 2

[overrides]
timeout = 120
pre-command = "/bin/echo"
extra-env-vars = ["FOO=bar"]
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = GeneratorConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.gcs_bucket, "my-bucket");
        assert_eq!(config.path_alias_orgs, vec!["acme".to_string()]);
        assert_eq!(config.max_release_branches, 2);
        assert_eq!(config.overrides.timeout, 120);
        assert_eq!(config.pre_command(), Some("/bin/echo"));
        assert_eq!(config.overrides.extra_env_vars, vec!["FOO=bar".to_string()]);
        // Untouched fields keep their defaults.
        assert_eq!(config.logs_dir, "logs");
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "prow-host: https://prow.example.com\ndefault-coverage-project: acme\n"
        )
        .unwrap();

        let config = GeneratorConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.prow_host, "https://prow.example.com");
        assert_eq!(config.default_coverage_project.as_deref(), Some("acme"));
    }

    #[test]
    fn test_load_nonexistent_explicit_path_fails() {
        let result = GeneratorConfig::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_pre_command_is_ignored() {
        let mut config = GeneratorConfig::default();
        config.overrides.pre_command = Some(String::new());
        assert!(config.pre_command().is_none());
    }

    #[test]
    fn test_path_alias() {
        let config = GeneratorConfig::default();
        assert!(config.uses_path_alias("knative", "knative/serving"));
        assert!(!config.uses_path_alias("knative", "knative/docs"));
        assert!(!config.uses_path_alias("google", "google/go-github"));
    }
}
