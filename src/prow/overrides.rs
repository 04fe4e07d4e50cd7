use serde_yaml::{Mapping, Value};

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, Result};
use crate::value::{as_bool, as_int, as_mapping, as_string, as_string_array, entries};

use super::data::JobTemplateData;
use super::repository::RepositoryRegistry;

/// Splits a job entry into the keys claimed by a job-type handler and the rest.
///
/// The handler-specific keys are returned in document order so they can be
/// interpreted first; everything else goes to [`apply_job_overrides`].
pub fn partition<'a>(
    job: &'a Mapping,
    handled: &[&str],
) -> Result<(Vec<(&'a str, &'a Value)>, Vec<(&'a str, &'a Value)>)> {
    Ok(entries(job)?
        .into_iter()
        .partition(|(key, _)| handled.contains(key)))
}

/// Applies the generic job options, in order, on top of `data`.
///
/// Any key this function does not know is fatal. The global timeout
/// override, when positive, is applied last and wins over a job's own
/// `timeout`.
pub fn apply_job_overrides(
    data: &mut JobTemplateData,
    overrides: &[(&str, &Value)],
    repositories: &mut RepositoryRegistry,
    config: &GeneratorConfig,
) -> Result<()> {
    data.extra_refs
        .push(format!("  base_ref: {}", data.repo_branch));

    for &(key, value) in overrides {
        match key {
            "skip_branches" => data.skip_branches = as_string_array(value)?,
            "branches" => data.branches = as_string_array(value)?,
            "args" => data.args = as_string_array(value)?,
            "timeout" => data.timeout = as_int(value)?,
            "command" => data.command = as_string(value)?,
            "needs-monitor" => data.needs_monitor = as_bool(value)?,
            "needs-dind" => {
                if as_bool(value)? {
                    data.setup_docker_in_docker();
                }
            }
            "always-run" => data.always_run = as_bool(value)?,
            "performance" => {
                repositories.entry(&data.full_name()).enable_performance_tests = as_bool(value)?;
            }
            "env-vars" => data.add_extra_env_vars(&as_string_array(value)?)?,
            "optional" => data.optional = as_bool(value)?,
            "resources" => data.set_resources(as_mapping(value)?)?,
            "reporter_config" => data.set_reporter_config(as_mapping(value)?)?,
            unknown => return Err(GeneratorError::UnknownJobOption(unknown.to_string())),
        }
    }

    if config.overrides.timeout > 0 {
        data.timeout = config.overrides.timeout;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    fn resolve(text: &str, config: &GeneratorConfig) -> Result<JobTemplateData> {
        let job = job(text);
        let mut data = JobTemplateData::new("knative/serving", config)?;
        let mut repositories = RepositoryRegistry::new();
        let overrides = entries(&job)?;
        apply_job_overrides(&mut data, &overrides, &mut repositories, config)?;
        Ok(data)
    }

    #[test]
    fn test_basic_overrides() {
        let data = resolve(
            r#"
args: ["--one", "--two"]
command: ./run.sh
timeout: 120
always-run: false
optional: true
needs-monitor: true
branches: [main]
skip_branches: ["release-.*"]
env-vars: ["PORT=80", "MODE=fast"]
"#,
            &GeneratorConfig::default(),
        )
        .unwrap();

        assert_eq!(data.args, vec!["--one", "--two"]);
        assert_eq!(data.command, "./run.sh");
        assert_eq!(data.timeout, 120);
        assert!(!data.always_run);
        assert!(data.optional);
        assert!(data.needs_monitor);
        assert_eq!(data.branches, vec!["main"]);
        assert_eq!(data.skip_branches, vec!["release-.*"]);
        assert_eq!(
            data.env,
            vec!["- name: PORT", "  value: \"80\"", "- name: MODE", "  value: fast"]
        );
        assert_eq!(data.extra_refs.last().unwrap(), "  base_ref: main");
    }

    #[test]
    fn test_unknown_option_is_fatal() {
        let err = resolve("frobnicate: true\n", &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, GeneratorError::UnknownJobOption(ref key) if key == "frobnicate"));
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_needs_dind_adds_three_volumes() {
        let data = resolve("needs-dind: true\ntimeout: 10\n", &GeneratorConfig::default()).unwrap();
        let volumes = data
            .volumes
            .iter()
            .filter(|line| line.starts_with("- name: "))
            .count();
        assert_eq!(volumes, 3);
        assert_eq!(data.security_context, vec!["privileged: true"]);

        let data = resolve("needs-dind: false\n", &GeneratorConfig::default()).unwrap();
        assert!(data.volumes.is_empty());
        assert!(data.security_context.is_empty());
    }

    #[test]
    fn test_global_timeout_override_wins() {
        let mut config = GeneratorConfig::default();
        config.overrides.timeout = 7;

        let data = resolve("timeout: 120\n", &config).unwrap();
        assert_eq!(data.timeout, 7);

        let data = resolve("args: []\n", &config).unwrap();
        assert_eq!(data.timeout, 7);

        config.overrides.timeout = 0;
        let data = resolve("timeout: 120\n", &config).unwrap();
        assert_eq!(data.timeout, 120);
    }

    #[test]
    fn test_performance_flags_repository() {
        let config = GeneratorConfig::default();
        let job = job("performance: true\n");
        let mut data = JobTemplateData::new("knative/serving", &config).unwrap();
        let mut repositories = RepositoryRegistry::new();
        let overrides = entries(&job).unwrap();
        apply_job_overrides(&mut data, &overrides, &mut repositories, &config).unwrap();

        assert!(
            repositories
                .get("knative/serving")
                .unwrap()
                .enable_performance_tests
        );
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let err = resolve("timeout: fifty\n", &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, GeneratorError::TypeMismatch { .. }));
    }

    #[test]
    fn test_partition_keeps_order() {
        let job = job("cron: x\ncontinuous: true\nargs: []\nrelease: \"1.2\"\n");
        let (handled, rest) = partition(&job, &["continuous", "release", "cron"]).unwrap();
        let handled: Vec<&str> = handled.into_iter().map(|(k, _)| k).collect();
        let rest: Vec<&str> = rest.into_iter().map(|(k, _)| k).collect();
        assert_eq!(handled, vec!["cron", "continuous", "release"]);
        assert_eq!(rest, vec!["args"]);
    }
}
