use std::fmt::Write;
use std::path::Path;

use comfy_table::Cell;

use super::styling::{bright, cyan, dim};
use super::tables::{create_table, header_cells, line_count_cell};

/// One generated configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub name: &'static str,
    pub destination: String,
    pub lines: usize,
    /// Short description of what the document covers, e.g. `12 repositories`
    pub details: String,
}

impl GeneratedDocument {
    pub fn new(
        name: &'static str,
        path: Option<&Path>,
        lines: usize,
        details: impl Into<String>,
    ) -> Self {
        Self {
            name,
            destination: path.map_or_else(
                || "stdout".to_string(),
                |path| path.display().to_string(),
            ),
            lines,
            details: details.into(),
        }
    }
}

/// Prints the table of generated documents to stderr.
pub fn print_summary(source: &Path, documents: &[GeneratedDocument]) {
    eprintln!("{}", render_summary(source, documents));
}

fn render_summary(source: &Path, documents: &[GeneratedDocument]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} {}", bright("📄"), bright("Generated").underlined());
    let _ = writeln!(
        output,
        "  {} {}\n",
        dim("Job description:"),
        cyan(source.display())
    );

    let mut table = create_table();
    table.set_header(header_cells(&["Document", "Destination", "Lines", "Contents"]));
    for document in documents {
        table.add_row(vec![
            Cell::new(document.name),
            Cell::new(&document.destination),
            line_count_cell(document.lines),
            Cell::new(&document.details),
        ]);
    }
    let _ = writeln!(output, "{table}");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_destination_defaults_to_stdout() {
        let document = GeneratedDocument::new("Prow jobs", None, 10, "2 repositories");
        assert_eq!(document.destination, "stdout");

        let path = PathBuf::from("config/jobs.yaml");
        let document = GeneratedDocument::new("Prow jobs", Some(&path), 10, "");
        assert_eq!(document.destination, "config/jobs.yaml");
    }

    #[test]
    fn test_render_summary_lists_every_document() {
        let documents = vec![
            GeneratedDocument::new("Prow jobs", None, 120, "3 repositories"),
            GeneratedDocument::new(
                "TestGrid",
                Some(Path::new("testgrid.yaml")),
                0,
                "0 projects",
            ),
        ];
        let rendered = render_summary(Path::new("jobs.yaml"), &documents);

        assert!(rendered.contains("jobs.yaml"));
        assert!(rendered.contains("Prow jobs"));
        assert!(rendered.contains("120"));
        assert!(rendered.contains("testgrid.yaml"));
        assert!(rendered.contains("3 repositories"));
    }
}
