// ABOUTME: Image reference parsing so pulls always target a single tag or digest

use std::fmt;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Splits `repository[:tag][@digest]`. A registry port (`host:5000/app`) is not a tag.
    pub fn parse(reference: &str) -> Self {
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (reference, None),
        };

        let last_segment_start = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_segment_start..].rfind(':') {
            Some(i) => {
                let split = last_segment_start + i;
                (name[..split].to_string(), Some(name[split + 1..].to_string()))
            }
            None => (name.to_string(), None),
        };

        Self {
            repository,
            tag,
            digest,
        }
    }

    /// Tag or digest to request from the registry; never empty, since an empty tag
    /// makes the daemon pull every tag of the repository.
    pub fn pull_tag(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Digest-pinned references resolve to the same content on every pull.
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
