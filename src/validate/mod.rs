//! Consistency checks between a spec file, its lock file and the configured stores.
//!
//! Every problem is reported; validation never stops at the first one.

use thiserror::Error;

use crate::model::{
    ComponentLock, ComponentSpec, Lockfile, Specfile, StoreConfig, StoreType, VersionConstraint,
    parse_version,
};
use crate::template::PathTemplate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("release at index {index} missing name in spec")]
    SpecMissingName { index: usize },

    #[error("release {name:?} not found in lock")]
    MissingLock { name: String },

    #[error("spec {name} (index {index} in lock file) has invalid lock version {version:?}: {reason}")]
    InvalidLockVersion {
        name: String,
        index: usize,
        version: String,
        reason: String,
    },

    #[error("spec {name} (index {index} in spec file) has invalid version constraint: {reason}")]
    InvalidConstraint {
        name: String,
        index: usize,
        reason: String,
    },

    #[error("spec {name} version in lock {version:?} does not match constraint {constraint:?}")]
    VersionMismatch {
        name: String,
        version: String,
        constraint: String,
    },

    #[error("release at index {index} missing name in lock")]
    LockMissingName { index: usize },

    #[error("release {name:?} not found in spec")]
    MissingSpec { name: String },

    #[error("release source {source_id:?} for release lock {name:?} not found in spec file")]
    UnknownRemoteSource { source_id: String, name: String },

    #[error("release_sources[{index}] is missing required field {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("release_sources[{index}] failed to parse path_template: {reason}")]
    InvalidPathTemplate { index: usize, reason: String },

    #[error("release_sources[{index}] ({kind}) has unexpected field {field}")]
    UnexpectedField {
        index: usize,
        kind: StoreType,
        field: &'static str,
    },
}

/// Collects every inconsistency between `specfile` and `lockfile`.
#[tracing::instrument(skip_all)]
pub fn validate(specfile: &Specfile, lockfile: &Lockfile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (index, spec) in specfile.releases.iter().enumerate() {
        if spec.name.is_empty() {
            errors.push(ValidationError::SpecMissingName { index });
            continue;
        }
        let Some(lock) = lockfile.find_release(&spec.name) else {
            errors.push(ValidationError::MissingLock {
                name: spec.name.clone(),
            });
            continue;
        };
        if let Some(err) = check_version(spec, lock, index) {
            errors.push(err);
        }
    }

    for (index, lock) in lockfile.releases.iter().enumerate() {
        if lock.name.is_empty() {
            errors.push(ValidationError::LockMissingName { index });
            continue;
        }
        if specfile.component_spec(&lock.name).is_none() {
            errors.push(ValidationError::MissingSpec {
                name: lock.name.clone(),
            });
        }
    }

    for lock in &lockfile.releases {
        let configured = specfile
            .release_sources
            .iter()
            .any(|source| source.answers_to(&lock.remote_source));
        if !configured {
            errors.push(ValidationError::UnknownRemoteSource {
                source_id: lock.remote_source.clone(),
                name: lock.name.clone(),
            });
        }
    }

    for (index, source) in specfile.release_sources.iter().enumerate() {
        if source.kind == StoreType::Artifactory {
            errors.extend(check_artifactory(index, source));
        }
    }

    errors
}

fn check_version(spec: &ComponentSpec, lock: &ComponentLock, index: usize) -> Option<ValidationError> {
    let version = match parse_version(&lock.version) {
        Ok(version) => version,
        Err(e) => {
            return Some(ValidationError::InvalidLockVersion {
                name: spec.name.clone(),
                index,
                version: lock.version.clone(),
                reason: format!("{:#}", e),
            });
        }
    };
    if spec.version.is_empty() {
        return None;
    }
    let constraint = match VersionConstraint::parse(&spec.version) {
        Ok(constraint) => constraint,
        Err(e) => {
            return Some(ValidationError::InvalidConstraint {
                name: spec.name.clone(),
                index,
                reason: format!("{:#}", e),
            });
        }
    };
    if constraint.matches(&version) {
        None
    } else {
        Some(ValidationError::VersionMismatch {
            name: spec.name.clone(),
            version: lock.version.clone(),
            constraint: spec.version.clone(),
        })
    }
}

fn check_artifactory(index: usize, source: &StoreConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let required = [
        ("artifactory_host", &source.artifactory_host),
        ("username", &source.username),
        ("password", &source.password),
        ("repo", &source.repo),
    ];
    for (field, value) in required {
        if value.is_empty() {
            errors.push(ValidationError::MissingField { index, field });
        }
    }

    if source.path_template.is_empty() {
        errors.push(ValidationError::MissingField {
            index,
            field: "path_template",
        });
    } else if let Err(e) = PathTemplate::parse(&source.path_template) {
        errors.push(ValidationError::InvalidPathTemplate {
            index,
            reason: e.to_string(),
        });
    }

    let unexpected = [
        ("bucket", &source.bucket),
        ("region", &source.region),
        ("access_key_id", &source.access_key_id),
        ("secret_access_key", &source.secret_access_key),
        ("endpoint", &source.endpoint),
        ("org", &source.org),
        ("github_token", &source.github_token),
    ];
    for (field, value) in unexpected {
        if !value.is_empty() {
            errors.push(ValidationError::UnexpectedField {
                index,
                kind: source.kind,
                field,
            });
        }
    }

    errors
}
