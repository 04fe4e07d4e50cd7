mod cron;
mod data;
mod overrides;
mod periodic;
mod postsubmit;
mod presubmit;
mod repository;

use std::io::Write;

use log::info;

use crate::config::GeneratorConfig;
use crate::document::{parse_section, JobConfigDocument};
use crate::error::Result;
use crate::render::{templates, HeaderTemplateData, Renderer};
use crate::testgrid::k8s::K8sDashboards;

pub use data::JobTemplateData;
pub use repository::{RepositoryRecord, RepositoryRegistry};

use overrides::apply_job_overrides;

pub const PRESUBMITS: &str = "presubmits";
pub const PERIODICS: &str = "periodics";
pub const POSTSUBMITS: &str = "postsubmits";

/// Generates the Prow job configuration document.
pub struct ProwJobGenerator<'a, W: Write> {
    config: &'a GeneratorConfig,
    renderer: &'a mut Renderer<W>,
    repositories: RepositoryRegistry,
    dashboards: K8sDashboards,
}

impl<'a, W: Write> ProwJobGenerator<'a, W> {
    pub fn new(config: &'a GeneratorConfig, renderer: &'a mut Renderer<W>) -> Self {
        Self {
            config,
            renderer,
            repositories: RepositoryRegistry::new(),
            dashboards: K8sDashboards::new(),
        }
    }

    /// Emits the header, then presubmits, periodics and postsubmits.
    pub fn generate(&mut self, document: &JobConfigDocument) -> Result<()> {
        self.renderer
            .render(templates::COMMON_HEADER, &HeaderTemplateData::new(self.config))?;

        parse_section(document, PRESUBMITS, self, Self::generate_presubmit, None)?;
        parse_section(
            document,
            PERIODICS,
            self,
            Self::generate_periodic,
            Some(Self::generate_go_coverage_periodic),
        )?;

        // Coverage repositories without any periodic entry.
        let pending: Vec<String> = self
            .repositories
            .iter()
            .filter(|record| !record.processed && record.enable_go_coverage)
            .map(|record| record.name.clone())
            .collect();
        for repo in pending {
            self.generate_go_coverage_periodic(PERIODICS, &repo)?;
        }

        self.generate_performance_cluster_periodics()?;
        self.generate_postsubmits()?;

        info!(
            "Generated Prow jobs for {} repositories",
            self.repositories.len()
        );
        Ok(())
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    /// Dashboards named by the `testgrid-dashboards` annotations of the
    /// periodic jobs emitted so far.
    pub fn testgrid_dashboards(&self) -> &K8sDashboards {
        &self.dashboards
    }

    /// Fresh job data for `repo` with only the global overrides applied.
    fn base_job(&mut self, repo: &str) -> Result<JobTemplateData> {
        let mut data = JobTemplateData::new(repo, self.config)?;
        apply_job_overrides(&mut data, &[], &mut self.repositories, self.config)?;
        Ok(data)
    }

    /// Last touches shared by every job: extra env vars and the service account.
    fn finish_job(&self, data: &mut JobTemplateData) -> Result<()> {
        data.add_extra_env_vars(&self.config.overrides.extra_env_vars)?;
        data.configure_service_account()
    }
}
