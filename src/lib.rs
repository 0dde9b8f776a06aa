pub mod application;
pub mod bump;
pub mod config;
pub mod download;
pub mod error;
pub mod github;
pub mod http;
pub mod model;
pub mod source;
pub mod tarball;
pub mod template;
pub mod validate;
