mod functions;
mod outputter;
pub mod templates;

use std::collections::HashSet;
use std::io::Write;

use chrono::Datelike;
use log::debug;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, Result};

pub use outputter::{open_output, Outputter};

/// Indentation of a repository key under a section key.
const BASE_INDENT: &str = "  ";

/// Values shared by the file header and the TestGrid general section.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderTemplateData {
    pub year: i32,
    pub prow_host: String,
    pub gubernator_host: String,
    pub testgrid_gcs_bucket: String,
}

impl HeaderTemplateData {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            year: chrono::Utc::now().year(),
            prow_host: config.prow_host.clone(),
            gubernator_host: config.gubernator_host.clone(),
            testgrid_gcs_bucket: config.testgrid_gcs_bucket.clone(),
        }
    }
}

/// Renders the built-in templates into an output stream.
///
/// Tracks which section (`presubmits:`) and repository (`  org/repo:`)
/// headers were already written, so jobs of the same section can be
/// streamed one at a time without repeating them.
pub struct Renderer<W: Write> {
    tera: Tera,
    output: Outputter<W>,
    sections: HashSet<String>,
    job_filter: Option<String>,
}

impl<W: Write> Renderer<W> {
    pub fn new(writer: W, config: &GeneratorConfig) -> Result<Self> {
        let mut tera = Tera::default();
        functions::register(&mut tera, config.overrides.repository.clone());
        templates::register(&mut tera)?;

        Ok(Self {
            tera,
            output: Outputter::new(writer),
            sections: HashSet::new(),
            job_filter: config.overrides.job_filter.clone(),
        })
    }

    /// Redirects output to `writer`, returning the previous sink.
    ///
    /// Section tracking starts over, since the new stream is a new document.
    pub fn set_output(&mut self, writer: W) -> Outputter<W> {
        self.sections.clear();
        std::mem::replace(&mut self.output, Outputter::new(writer))
    }

    pub fn output(&self) -> &Outputter<W> {
        &self.output
    }

    pub fn into_output(self) -> Outputter<W> {
        self.output
    }

    pub fn output_line(&mut self, line: &str) -> Result<()> {
        self.output.output_config(line)
    }

    /// Writes `title:` the first time the section is opened.
    pub fn open_section(&mut self, title: &str) -> Result<()> {
        if self.sections.insert(title.to_string()) {
            self.output.output_config(&format!("{title}:"))?;
        }
        Ok(())
    }

    /// Writes `  repo:` the first time the repository is opened in `title`.
    pub fn open_repo_section(&mut self, title: &str, repo: &str) -> Result<()> {
        if self.sections.insert(format!("{title}{repo}")) {
            self.output.output_config(&format!("{BASE_INDENT}{repo}:"))?;
        }
        Ok(())
    }

    /// Renders `template` with `data` and writes the non-blank lines.
    pub fn render(&mut self, template: &str, data: &impl Serialize) -> Result<()> {
        let context =
            Context::from_serialize(data).map_err(|e| GeneratorError::template(template, &e))?;
        let rendered = self
            .tera
            .render(template, &context)
            .map_err(|e| GeneratorError::template(template, &e))?;
        self.output.output_block(&rendered)
    }

    /// Whether the job filter lets `job_name` through.
    pub fn accepts_job(&self, job_name: &str) -> bool {
        self.job_filter
            .as_deref()
            .map_or(true, |filter| filter == job_name)
    }

    /// Renders a job into section `title`, honoring the job filter.
    ///
    /// With `group_by_repo`, the job is nested under its repository key.
    pub fn render_job(
        &mut self,
        template: &str,
        title: &str,
        repo: &str,
        job_name: &str,
        group_by_repo: bool,
        data: &impl Serialize,
    ) -> Result<()> {
        if !self.accepts_job(job_name) {
            debug!("Skipping job {job_name}, filtered out");
            return Ok(());
        }
        self.open_section(title)?;
        if group_by_repo {
            self.open_repo_section(title, repo)?;
        }
        self.render(template, data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()
    }
}
