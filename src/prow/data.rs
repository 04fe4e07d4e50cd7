use serde::Serialize;
use serde_yaml::Mapping;

use crate::config::GeneratorConfig;
use crate::document::split_repo_key;
use crate::error::{GeneratorError, Result};
use crate::value::{as_mapping, as_str, entries, scalar_to_string};

pub const DEFAULT_TIMEOUT: i64 = 50;
pub const DEFAULT_BRANCH: &str = "main";

const MONITORING_PUBSUB_PROJECT: &str = "knative-tests";
const MONITORING_PUBSUB_TOPIC: &str = "knative-monitoring";

/// Resolved values for one Prow job, handed to the job templates.
///
/// List fields hold pre-formatted YAML lines; the templates only indent them.
#[derive(Debug, Clone, Serialize)]
pub struct JobTemplateData {
    pub org_name: String,
    pub repo_name: String,
    pub repo_name_for_job: String,
    pub gcs_bucket: String,
    pub gcs_log_dir: String,
    pub gcs_presubmit_log_dir: String,
    pub repo_uri: String,
    pub repo_branch: String,
    pub clone_uri: String,
    pub security_context: Vec<String>,
    pub skip_branches: Vec<String>,
    pub branches: Vec<String>,
    pub extra_refs: Vec<String>,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    pub volume_mounts: Vec<String>,
    pub resources: Vec<String>,
    pub reporter_config: Vec<String>,
    pub timeout: i64,
    pub always_run: bool,
    pub optional: bool,
    pub service_account: String,
    pub release_gcs: String,
    pub go_coverage_threshold: i64,
    pub image: String,
    pub labels: Vec<String>,
    pub annotations: Vec<String>,
    pub path_alias: String,
    pub cluster: String,
    pub needs_monitor: bool,
}

impl JobTemplateData {
    /// Creates the data for a job of `repo` (`org/repo`) with system-wide defaults.
    pub fn new(repo: &str, config: &GeneratorConfig) -> Result<Self> {
        let (org_name, repo_name) = split_repo_key(repo)?;

        let mut extra_refs = vec![
            format!("- org: {org_name}"),
            format!("  repo: {repo_name}"),
        ];
        let mut path_alias = String::new();
        if config.uses_path_alias(org_name, repo) {
            path_alias = format!("path_alias: {}/{repo_name}", config.path_alias_domain);
            extra_refs.push(format!("  {path_alias}"));
        }

        let repo_uri = format!("github.com/{repo}");

        Ok(Self {
            org_name: org_name.to_string(),
            repo_name: repo_name.to_string(),
            repo_name_for_job: repo.replace('/', "-").to_lowercase(),
            gcs_bucket: config.gcs_bucket.clone(),
            gcs_log_dir: format!("gs://{}/{}", config.gcs_bucket, config.logs_dir),
            gcs_presubmit_log_dir: format!(
                "gs://{}/{}",
                config.gcs_bucket, config.presubmit_logs_dir
            ),
            clone_uri: format!("\"https://{repo_uri}.git\""),
            repo_uri,
            repo_branch: DEFAULT_BRANCH.to_string(),
            security_context: Vec::new(),
            skip_branches: Vec::new(),
            branches: Vec::new(),
            extra_refs,
            command: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            volumes: Vec::new(),
            volume_mounts: Vec::new(),
            resources: Vec::new(),
            reporter_config: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            always_run: true,
            optional: false,
            service_account: config.test_account.clone(),
            release_gcs: format!("{}/{repo_name}", config.release_gcs_prefix),
            go_coverage_threshold: 0,
            image: config.prow_tests_image(),
            labels: Vec::new(),
            annotations: Vec::new(),
            path_alias,
            cluster: format!("cluster: \"{}\"", config.cluster),
            needs_monitor: false,
        })
    }

    /// Full `org/repo` name.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org_name, self.repo_name)
    }

    /// The invocation: optional pre-command, then the command, then its arguments.
    pub fn command_line(&self, pre_command: Option<&str>) -> Vec<String> {
        pre_command
            .map(str::to_string)
            .into_iter()
            .chain(std::iter::once(self.command.clone()))
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Adds an environment variable. Numeric values are quoted so they stay strings.
    pub fn add_env(&mut self, key: &str, value: &str) {
        let value = if is_numeric(value) {
            format!("\"{value}\"")
        } else {
            value.to_string()
        };
        self.env.push(format!("- name: {key}"));
        self.env.push(format!("  value: {value}"));
    }

    pub fn add_label(&mut self, key: &str, value: &str) {
        self.labels.push(format!("{key}: {value}"));
    }

    pub fn add_annotation(&mut self, key: &str, value: &str) {
        self.annotations.push(format!("{key}: {value}"));
    }

    /// Adds the pub/sub labels picked up by the test-infra monitoring.
    pub fn add_monitoring_labels(&mut self, run_id: &str) {
        if self.has_monitoring_labels() {
            return;
        }
        self.add_label("prow.k8s.io/pubsub.project", MONITORING_PUBSUB_PROJECT);
        self.add_label("prow.k8s.io/pubsub.topic", MONITORING_PUBSUB_TOPIC);
        self.add_label("prow.k8s.io/pubsub.runID", run_id);
    }

    fn has_monitoring_labels(&self) -> bool {
        self.labels
            .iter()
            .any(|label| label.starts_with("prow.k8s.io/pubsub.project:"))
    }

    /// Mounts a volume at `mount_path`. Secret volumes are backed by the secret `name`.
    pub fn add_volume(&mut self, mount_path: &str, name: &str, is_secret: bool, content: &[&str]) {
        self.volume_mounts.push(format!("- name: {name}"));
        self.volume_mounts.push(format!("  mountPath: {mount_path}"));
        if is_secret {
            self.volume_mounts.push("  readOnly: true".to_string());
        }

        self.volumes.push(format!("- name: {name}"));
        if is_secret {
            self.volumes.push("  secret:".to_string());
            self.volumes.push(format!("    secretName: {name}"));
        }
        self.volumes
            .extend(content.iter().map(|line| format!("  {line}")));
    }

    /// Mounts the service account secret, if the job has one.
    ///
    /// The path must be exactly `/etc/<name>/service-account.json`; `<name>`
    /// is the secret holding it.
    pub fn configure_service_account(&mut self) -> Result<()> {
        if self.service_account.is_empty() {
            return Ok(());
        }
        let name = service_account_secret(&self.service_account)?.to_string();
        let service_account = self.service_account.clone();
        self.add_env("GOOGLE_APPLICATION_CREDENTIALS", &service_account);
        self.add_volume(&format!("/etc/{name}"), &name, true, &[]);
        Ok(())
    }

    /// Adds `key=value` environment variables.
    pub fn add_extra_env_vars(&mut self, env_vars: &[String]) -> Result<()> {
        for env in env_vars {
            match env.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                    self.add_env(key, value)
                }
                _ => return Err(GeneratorError::InvalidEnvVar(env.clone())),
            }
        }
        Ok(())
    }

    /// Enables docker-in-docker: docker graph, kernel modules and cgroups
    /// volumes plus a privileged security context.
    pub fn setup_docker_in_docker(&mut self) {
        self.add_volume("/docker-graph", "docker-graph", false, &["emptyDir: {}"]);
        self.add_volume(
            "/lib/modules",
            "modules",
            false,
            &["hostPath:", "  path: /lib/modules", "  type: Directory"],
        );
        self.add_volume(
            "/sys/fs/cgroup",
            "cgroup",
            false,
            &["hostPath:", "  path: /sys/fs/cgroup", "  type: Directory"],
        );
        self.add_env("DOCKER_IN_DOCKER_ENABLED", "\"true\"");
        self.security_context = vec!["privileged: true".to_string()];
    }

    /// Replaces the resource requirements, e.g. `requests: {cpu: 4}`.
    pub fn set_resources(&mut self, resources: &Mapping) -> Result<()> {
        let mut lines = Vec::new();
        for (kind, values) in entries(resources)? {
            lines.push(format!("  {kind}:"));
            for (name, quantity) in entries(as_mapping(values)?)? {
                lines.push(format!("    {name}: {}", scalar_to_string(quantity)?));
            }
        }
        self.resources = lines;
        Ok(())
    }

    /// Replaces the reporter configuration. List values (job states) become
    /// nested YAML lists.
    pub fn set_reporter_config(&mut self, reporters: &Mapping) -> Result<()> {
        let mut lines = Vec::new();
        for (reporter, settings) in entries(reporters)? {
            lines.push(format!("  {reporter}:"));
            for (key, value) in entries(as_mapping(settings)?)? {
                match value.as_sequence() {
                    Some(items) => {
                        lines.push(format!("    {key}:"));
                        for item in items {
                            lines.push(format!("    - {}", as_str(item)?));
                        }
                    }
                    None => lines.push(format!("    {key}: {}", scalar_to_string(value)?)),
                }
            }
        }
        self.reporter_config = lines;
        Ok(())
    }
}

/// Extracts `<name>` from `/etc/<name>/service-account.json`.
pub fn service_account_secret(path: &str) -> Result<&str> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["", "etc", name, "service-account.json"] if !name.is_empty() => Ok(name),
        _ => Err(GeneratorError::InvalidServiceAccount(path.to_string())),
    }
}

fn is_numeric(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}
