mod client;
mod release_branches;

use std::future::Future;

use crate::error::Result;

pub use client::GitHubClient;
pub use release_branches::{upgrade_release_branches, ReleaseUpgrade, ReleaseVersion};

/// Anything that can list the branches of a repository.
pub trait BranchSource {
    fn list_branches(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}
