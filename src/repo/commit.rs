use tracing::trace;

use crate::config;
use crate::digest::Digest;
use crate::storable::commit::Signature;
use crate::Result;

impl super::Repo {
    /// Commit the index, with the author and committer taken from the environment.
    pub fn commit(&self, message: &str) -> Result<Digest> {
        let author = config::author_from_env()?;
        let committer = config::committer_from_env(&author)?;
        self.commit_as(message, author, committer)
    }

    /// Commit the index on top of HEAD and advance the checked-out branch (or a detached HEAD)
    /// to the new commit.
    pub fn commit_as(
        &self,
        message: &str,
        author: Signature,
        committer: Signature,
    ) -> Result<Digest> {
        trace!(path=%self.root, %message, "Starting commit");
        let index = self.index()?;
        let tree = index.build_tree(&self.database)?;

        let parents = self.refs.head_commit()?.into_iter().collect();

        let message = if message.ends_with('\n') {
            message.to_owned()
        } else {
            format!("{message}\n")
        };

        let oid = self.create_commit(tree, parents, author, committer, &message)?;
        self.refs.update_head(&oid)?;

        Ok(oid)
    }
}
