use anyhow::{Result, bail};
use clap::Parser;
use log::{info, warn};
use relfetch::application::{self, ReleaseVersionOutput, UpdateOutcome, UpdateRequest};
use relfetch::bump::{calculate_bumps, release_notes};
use relfetch::config::Config;
use relfetch::model::{Lockfile, Specfile};
use relfetch::source::new_release_source_list;
use relfetch::validate::validate;
use std::path::{Path, PathBuf};

/// relfetch - resolve and fetch tile releases
///
/// Resolves the releases a spec file asks for against the configured
/// release sources (S3, bosh.io, Artifactory, GitHub) and downloads the
/// versions pinned in its lock file.
///
/// If the GITHUB_TOKEN environment variable is set, it is used for GitHub
/// release sources that do not configure their own token.
#[derive(Parser, Debug)]
#[command(author, version = env!("RELFETCH_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Spec file listing release sources and releases
    #[arg(
        long,
        env = "RELFETCH_SPECFILE",
        value_name = "PATH",
        default_value = "Tilefile",
        global = true
    )]
    pub specfile: PathBuf,

    /// Lock file (defaults to <specfile>.lock)
    #[arg(long, value_name = "PATH", global = true)]
    pub lockfile: Option<PathBuf>,
}

impl Cli {
    fn lockfile_path(&self) -> PathBuf {
        self.lockfile.clone().unwrap_or_else(|| {
            let mut path = self.specfile.clone().into_os_string();
            path.push(".lock");
            PathBuf::from(path)
        })
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download every locked release into a directory
    Fetch(FetchArgs),

    /// Print the best available version of a release as JSON
    FindReleaseVersion(FindReleaseVersionArgs),

    /// Check that the spec and lock files agree
    Validate,

    /// List releases whose locked version changed since a previous lock file
    Bumps(BumpsArgs),

    /// Move one release to a new version and rewrite the lock file
    UpdateRelease(UpdateReleaseArgs),

    /// Upload a finalized release tarball to a release source
    UploadRelease(UploadReleaseArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Directory the release tarballs are written to
    #[arg(long, value_name = "DIR")]
    pub releases_directory: PathBuf,

    /// Parallel requests per download, for sources that support it
    #[arg(long, value_name = "N")]
    pub download_threads: Option<usize>,

    /// Only use release sources marked publishable
    #[arg(long)]
    pub allow_only_publishable_releases: bool,
}

#[derive(clap::Args, Debug)]
pub struct FindReleaseVersionArgs {
    /// Name of the release in the spec file
    #[arg(long, value_name = "NAME")]
    pub release: String,

    /// Skip downloading to compute checksums where a source would have to
    #[arg(long)]
    pub no_download: bool,
}

#[derive(clap::Args, Debug)]
pub struct BumpsArgs {
    /// Lock file to compare against
    #[arg(long, value_name = "PATH")]
    pub previous_lockfile: PathBuf,

    /// Also print GitHub release notes between the versions
    #[arg(long)]
    pub release_notes: bool,
}

#[derive(clap::Args, Debug)]
pub struct UpdateReleaseArgs {
    /// Name of the release to update
    #[arg(long, short = 'n', value_name = "NAME")]
    pub name: String,

    /// Desired version; a constraint when used with --without-download
    #[arg(long, short = 'v', value_name = "VERSION", default_value = "")]
    pub version: String,

    /// Directory the release tarball is downloaded into
    #[arg(long, value_name = "DIR", default_value = "releases")]
    pub releases_directory: PathBuf,

    /// Only use release sources marked publishable
    #[arg(long)]
    pub allow_only_publishable_releases: bool,

    /// Update the lock file without downloading the release
    #[arg(long)]
    pub without_download: bool,
}

#[derive(clap::Args, Debug)]
pub struct UploadReleaseArgs {
    /// ID of the release source the tarball is uploaded to
    #[arg(long, value_name = "ID")]
    pub upload_target_id: String,

    /// Path to the release tarball
    #[arg(long, value_name = "PATH")]
    pub local_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let lockfile_path = cli.lockfile_path();

    match &cli.command {
        Commands::Fetch(args) => fetch(&cli.specfile, &lockfile_path, args).await?,
        Commands::FindReleaseVersion(args) => {
            find_release_version(&cli.specfile, &lockfile_path, args).await?
        }
        Commands::Validate => validate_files(&cli.specfile, &lockfile_path)?,
        Commands::Bumps(args) => bumps(&cli.specfile, &lockfile_path, args).await?,
        Commands::UpdateRelease(args) => {
            update_release(&cli.specfile, &lockfile_path, args).await?
        }
        Commands::UploadRelease(args) => upload_release(&cli.specfile, args).await?,
    }
    Ok(())
}

async fn fetch(specfile: &Path, lockfile: &Path, args: &FetchArgs) -> Result<()> {
    if !args.allow_only_publishable_releases {
        warn!(
            "the \"allow-only-publishable-releases\" flag was not set. Some fetched releases may be intended for development/testing only."
        );
    }
    let specfile = Specfile::load(specfile)?;
    let lockfile = Lockfile::load(lockfile)?;
    let config = Config::new()?;

    let mut sources =
        new_release_source_list(&specfile, &config, args.allow_only_publishable_releases)?;
    if let Some(threads) = args.download_threads {
        sources.set_download_threads(threads);
    }

    let report = application::fetch(&args.releases_directory, &lockfile, &sources).await?;
    for local in &report.downloaded {
        println!("{} {} -> {}", local.lock.name, local.lock.version, local.local_path.display());
    }
    Ok(())
}

async fn find_release_version(
    specfile: &Path,
    lockfile: &Path,
    args: &FindReleaseVersionArgs,
) -> Result<()> {
    let specfile = Specfile::load(specfile)?;
    let lockfile = Lockfile::load(lockfile)?;
    let config = Config::new()?;
    let sources = new_release_source_list(&specfile, &config, false)?;

    let lock = application::find_release_version(
        &specfile,
        &lockfile,
        &sources,
        &args.release,
        args.no_download,
    )
    .await?;
    println!("{}", serde_json::to_string(&ReleaseVersionOutput::from(lock))?);
    Ok(())
}

fn validate_files(specfile: &Path, lockfile: &Path) -> Result<()> {
    let specfile = Specfile::load(specfile)?;
    let lockfile = Lockfile::load(lockfile)?;

    let errors = validate(&specfile, &lockfile);
    for error in &errors {
        eprintln!("{}", error);
    }
    if !errors.is_empty() {
        bail!("validation failed with {} error(s)", errors.len());
    }
    Ok(())
}

async fn bumps(specfile: &Path, lockfile: &Path, args: &BumpsArgs) -> Result<()> {
    let current = Lockfile::load(lockfile)?;
    let previous = Lockfile::load(&args.previous_lockfile)?;
    let mut bumps = calculate_bumps(&current.releases, &previous.releases);

    if args.release_notes {
        let specfile = Specfile::load(specfile)?;
        let github = Config::new()?.github();
        bumps = release_notes(&specfile, bumps, &github).await;
    }

    for bump in &bumps {
        println!("{}", bump);
        if args.release_notes {
            for line in bump.release_notes_text().lines() {
                println!("    {}", line);
            }
        }
    }
    Ok(())
}

async fn update_release(specfile: &Path, lockfile_path: &Path, args: &UpdateReleaseArgs) -> Result<()> {
    let specfile = Specfile::load(specfile)?;
    let mut lockfile = Lockfile::load(lockfile_path)?;
    let config = Config::new()?;
    let sources =
        new_release_source_list(&specfile, &config, args.allow_only_publishable_releases)?;

    let request = UpdateRequest {
        name: &args.name,
        version: &args.version,
        releases_dir: &args.releases_directory,
        without_download: args.without_download,
    };
    match application::update_release(&specfile, &mut lockfile, &sources, &request).await? {
        UpdateOutcome::Unchanged => {
            println!("Neither the version nor remote location of the release changed. No changes made.");
        }
        UpdateOutcome::Updated { to, .. } => {
            lockfile.save(lockfile_path)?;
            info!("wrote {:?}", lockfile_path);
            println!(
                "Updated {} to {}. DON'T FORGET TO MAKE A COMMIT AND PR",
                to.name, to.version
            );
        }
    }
    Ok(())
}

async fn upload_release(specfile: &Path, args: &UploadReleaseArgs) -> Result<()> {
    let specfile = Specfile::load(specfile)?;
    let config = Config::new()?;
    let sources = new_release_source_list(&specfile, &config, false)?;

    let lock =
        application::upload_release(&sources, &args.upload_target_id, &args.local_path).await?;
    println!("Uploaded {} {} to {}", lock.name, lock.version, lock.remote_path);
    Ok(())
}
