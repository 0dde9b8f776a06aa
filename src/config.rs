use anyhow::Result;
use log::debug;
use reqwest::Client;
use std::env;

use crate::github::GitHub;
use crate::http::HttpClient;
use crate::model::StoreConfig;

pub const USER_AGENT: &str = "relfetch-cli";

/// Shared HTTP client plus credentials picked up from the environment.
pub struct Config {
    pub http: HttpClient,
    github_token: Option<String>,
}

impl Config {
    pub fn new() -> Result<Self> {
        let github_token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        if let Some(token) = &github_token {
            debug!("Using GITHUB_TOKEN for authentication: {}", mask(token));
        }

        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http: HttpClient::new(client),
            github_token,
        })
    }

    /// Token for a GitHub release source: its own `github_token`, else `GITHUB_TOKEN`.
    pub fn github_token_for(&self, source: &StoreConfig) -> Option<String> {
        if source.github_token.is_empty() {
            self.github_token.clone()
        } else {
            Some(source.github_token.clone())
        }
    }

    /// GitHub API client authenticated with `GITHUB_TOKEN`, if set.
    pub fn github(&self) -> GitHub {
        GitHub::new(self.http.clone(), None, self.github_token.clone())
    }
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoreType;
    use mockito::Server;

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask("ghp_0123456789abcdef"), "ghp_0123*********cdef");
        assert_eq!(mask("tökén-ünïcödé-välüé"), "tökén-ün*********älüé");
    }

    #[test]
    fn test_source_token_wins() {
        let config = Config {
            http: HttpClient::new(Client::new()),
            github_token: Some("from-env".into()),
        };
        let mut source = StoreConfig::new(StoreType::GitHub);
        assert_eq!(config.github_token_for(&source).as_deref(), Some("from-env"));
        source.github_token = "from-source".into();
        assert_eq!(
            config.github_token_for(&source).as_deref(),
            Some("from-source")
        );
    }

    // the shared client identifies itself and carries no credentials of its own
    #[tokio::test]
    async fn test_client_sends_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("user-agent", USER_AGENT)
            .match_header("authorization", mockito::Matcher::Missing)
            .create_async()
            .await;

        let config = Config::new().unwrap();
        let _ = config.http.inner().get(server.url()).send().await;

        mock.assert_async().await;
    }
}
