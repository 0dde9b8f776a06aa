use anyhow::{Context, Result};

use super::{
    ArtifactorySource, BoshIoSource, GitHubSource, ReleaseSource, ReleaseSourceList, S3Source,
};
use crate::config::Config;
use crate::model::{Specfile, StoreConfig, StoreType};

/// Builds the adapter selected by the configuration's `type`.
pub fn new_release_source(config: &StoreConfig, env: &Config) -> Result<Box<dyn ReleaseSource>> {
    let http = env.http.clone();
    let source: Box<dyn ReleaseSource> = match config.kind {
        StoreType::S3 => Box::new(S3Source::new(config.clone(), http)?),
        StoreType::BoshIo => Box::new(BoshIoSource::new(config.clone(), http)),
        StoreType::Artifactory => Box::new(ArtifactorySource::new(config.clone(), http)?),
        StoreType::GitHub => Box::new(GitHubSource::new(
            config.clone(),
            http,
            env.github_token_for(config),
        )?),
    };
    Ok(source)
}

/// Builds every configured source, in order, optionally keeping only publishable ones.
pub fn new_release_source_list(
    specfile: &Specfile,
    env: &Config,
    only_publishable: bool,
) -> Result<ReleaseSourceList> {
    let sources = specfile
        .release_sources
        .iter()
        .enumerate()
        .map(|(index, config)| {
            new_release_source(config, env).with_context(|| {
                format!("release_sources[{}] ({}) is misconfigured", index, config.kind)
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ReleaseSourceList::new(sources)?.filter(only_publishable))
}
