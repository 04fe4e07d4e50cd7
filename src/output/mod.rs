mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{print_summary, GeneratedDocument};

/// Prints the `prowgen` banner to stderr.
///
/// stdout is left alone since it may carry the generated configuration.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⚙️ prowgen"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Prow job and TestGrid config generator")
    );
}
