use anyhow::{Result, anyhow};
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
}

impl std::fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for GitHubRepo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            Err(anyhow!("Invalid repository format. Expected 'owner/repo'."))
        } else {
            Ok(GitHubRepo {
                owner: parts[0].to_string(),
                repo: parts[1].to_string(),
            })
        }
    }
}

impl GitHubRepo {
    /// Parses a repository URL as written in spec files.
    ///
    /// Accepts `https://host/owner/repo`, `git@host:owner/repo` and a bare
    /// `owner/repo`, each with an optional `.git` suffix or trailing slash.
    pub fn from_repository_url(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_end_matches('/');

        let path = if let Some(rest) = trimmed.strip_prefix("git@") {
            rest.split_once(':')
                .map(|(_, path)| path)
                .ok_or_else(|| anyhow!("Invalid repository URL {:?}.", input))?
        } else if trimmed.contains("://") {
            let url = url::Url::parse(trimmed)
                .map_err(|e| anyhow!("Invalid repository URL {:?}: {}", input, e))?;
            return Self::from_path(url.path(), input);
        } else {
            trimmed
        };

        Self::from_path(path, input)
    }

    fn from_path(path: &str, input: &str) -> Result<Self> {
        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        path.parse::<GitHubRepo>()
            .map_err(|_| anyhow!("Invalid repository URL {:?}. Expected a path of the form owner/repo.", input))
    }
}
