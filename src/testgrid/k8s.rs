//! TestGrid configuration for the Kubernetes TestGrid instance, which reads
//! tab membership from the `testgrid-*` annotations of the periodic jobs.
//! Only the dashboards and their groups are declared here, one dashboard per
//! repository and one group per organization.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use log::info;

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::render::{templates, HeaderTemplateData, Renderer};

use super::{DashboardGroupTemplateData, DASHBOARDS, DASHBOARD_GROUPS};

/// Dashboard of `org/repo`; matches the `testgrid-dashboards` job annotation.
pub fn dashboard_name(org: &str, repo: &str) -> String {
    format!("{org}-{repo}").to_lowercase()
}

/// Dashboards named by the `testgrid-dashboards` annotations of the emitted
/// periodic jobs, grouped by organization. Both levels are sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct K8sDashboards {
    orgs: BTreeMap<String, BTreeSet<String>>,
}

impl K8sDashboards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the dashboard of `org/repo` and returns its name.
    pub fn add(&mut self, org: &str, repo: &str) -> String {
        let name = dashboard_name(org, repo);
        self.orgs
            .entry(org.to_string())
            .or_default()
            .insert(name.clone());
        name
    }

    pub fn organizations(&self) -> usize {
        self.orgs.len()
    }
}

/// Writes the dashboards and dashboard groups, returning the number of
/// organizations.
pub fn generate<W: Write>(
    config: &GeneratorConfig,
    dashboards: &K8sDashboards,
    renderer: &mut Renderer<W>,
) -> Result<usize> {
    renderer.render(templates::COMMON_HEADER, &HeaderTemplateData::new(config))?;

    for names in dashboards.orgs.values() {
        for name in names {
            renderer.open_section(DASHBOARDS)?;
            renderer.output_line(&format!("- name: {name}"))?;
        }
    }

    for (org, names) in &dashboards.orgs {
        renderer.open_section(DASHBOARD_GROUPS)?;
        let data = DashboardGroupTemplateData {
            name: org.clone(),
            dashboard_names: names.iter().cloned().collect(),
        };
        renderer.render(templates::TESTGRID_DASHBOARD_GROUP, &data)?;
    }

    info!(
        "Generated k8s TestGrid config for {} organizations",
        dashboards.organizations()
    );
    Ok(dashboards.organizations())
}
