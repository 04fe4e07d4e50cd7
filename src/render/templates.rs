use tera::Tera;

use crate::error::{GeneratorError, Result};

pub const COMMON_HEADER: &str = "common_header.yaml";
pub const PRESUBMIT_JOB: &str = "presubmit.yaml";
pub const PERIODIC_JOB: &str = "periodic.yaml";
pub const POSTSUBMIT_JOB: &str = "postsubmit.yaml";
pub const TESTGRID_GENERAL: &str = "testgrid_general.yaml";
pub const TESTGRID_TEST_GROUP: &str = "testgrid_test_group.yaml";
pub const TESTGRID_DASHBOARD: &str = "testgrid_dashboard.yaml";
pub const TESTGRID_DASHBOARD_TAB: &str = "testgrid_dashboard_tab.yaml";
pub const TESTGRID_DASHBOARD_GROUP: &str = "testgrid_dashboard_group.yaml";

const TEMPLATES: &[(&str, &str)] = &[
    (COMMON_HEADER, include_str!("../../templates/common_header.yaml")),
    (PRESUBMIT_JOB, include_str!("../../templates/presubmit.yaml")),
    (PERIODIC_JOB, include_str!("../../templates/periodic.yaml")),
    (POSTSUBMIT_JOB, include_str!("../../templates/postsubmit.yaml")),
    (TESTGRID_GENERAL, include_str!("../../templates/testgrid_general.yaml")),
    (TESTGRID_TEST_GROUP, include_str!("../../templates/testgrid_test_group.yaml")),
    (TESTGRID_DASHBOARD, include_str!("../../templates/testgrid_dashboard.yaml")),
    (TESTGRID_DASHBOARD_TAB, include_str!("../../templates/testgrid_dashboard_tab.yaml")),
    (TESTGRID_DASHBOARD_GROUP, include_str!("../../templates/testgrid_dashboard_group.yaml")),
];

/// Adds the built-in templates to `tera`.
pub fn register(tera: &mut Tera) -> Result<()> {
    for (name, content) in TEMPLATES {
        tera.add_raw_template(name, content)
            .map_err(|e| GeneratorError::template(name, &e))?;
    }
    Ok(())
}
