use anyhow::{Context, Result};
use ccm_cache::{sanitize_fetch_url, PackageCache, PackageSource, S3Store, StoreSet};
use ccm_config::{CcmConfig, CONFIG_PATH_ENV_VAR};
use ccm_repository::{
    host_arch, Component, ComponentOverrides, InstallLayout, InstalledPackage, Repository,
    VersionResolver, VersionSpec,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "ccm-repo",
    version,
    about = "Fetch, verify and cache relocatable Scylla packages"
)]
struct Cli {
    /// Config file (defaults to `$CCM_CONFIG_PATH`, then `ccm.toml` in the ccm config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a version and make its packages current in the repository
    Setup(SetupArgs),
    /// List every cached package slot
    List(ListArgs),
    /// Print the fingerprint of a package location
    Hash(HashArgs),
}

#[derive(Args)]
struct SetupArgs {
    /// `release:X.Y[.Z][:debug]`, `unstable/<branch>:<build>[:debug]`, or a local archive path
    version: String,
    /// Use this core package instead of the resolved one
    #[arg(long, value_name = "SOURCE")]
    core: Option<String>,
    /// Use this tools package instead of the resolved one
    #[arg(long, value_name = "SOURCE")]
    tools: Option<String>,
    /// Use this jmx package instead of the resolved one
    #[arg(long, value_name = "SOURCE")]
    jmx: Option<String>,
    /// Use this unified package; replaces every other component
    #[arg(long, value_name = "SOURCE")]
    unified: Option<String>,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct HashArgs {
    /// `s3://bucket/key`, an `http(s)://` URL, or a local path
    source: String,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

impl SetupArgs {
    /// Config file and environment overrides, then command-line ones on top.
    fn overrides(&self, config: &CcmConfig) -> Result<ComponentOverrides> {
        let mut overrides = config.repository.component_overrides()?;
        let flags = [
            (Component::Core, &self.core),
            (Component::Tools, &self.tools),
            (Component::Jmx, &self.jmx),
            (Component::Unified, &self.unified),
        ];
        for (component, raw) in flags {
            if let Some(raw) = raw {
                let source = PackageSource::parse(raw)
                    .with_context(|| format!("invalid --{component} package location"))?;
                overrides.set(component, source);
            }
        }
        Ok(overrides)
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Setup(args) => {
            let spec = VersionSpec::parse(&args.version)?;
            let overrides = args.overrides(&config)?;
            let mut repo = open_repository(&config)?;
            let layout = repo
                .setup(&spec, &overrides)
                .with_context(|| format!("failed to set up {spec}"))?;
            print_layout(&layout, args.json)?;
            Ok(0)
        }
        Command::List(args) => {
            let repo = open_repository(&config)?;
            let entries: Vec<ListEntry> = repo
                .installed()?
                .into_iter()
                .map(ListEntry::from)
                .collect();
            if args.json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("no packages in {}", repo.dir().root().display());
            } else {
                for entry in &entries {
                    println!(
                        "{}\t{}\t{}\t{}",
                        entry.version,
                        entry.component.map_or("-", Component::as_str),
                        entry.hash,
                        entry.origin
                    );
                }
            }
            Ok(0)
        }
        Command::Hash(args) => {
            let source = PackageSource::parse(&args.source)?;
            let mut cache = PackageCache::new(stores(&config));
            let hash = cache.resolve_hash(&source)?;
            if args.json {
                print_json(&serde_json::json!({
                    "source": source.redacted(),
                    "hash": hash.as_str(),
                }))?;
            } else {
                println!("{hash}  {}", source.redacted());
            }
            Ok(0)
        }
    }
}

/// A cached slot as shown by `list`.
#[derive(Serialize)]
struct ListEntry {
    version: String,
    component: Option<Component>,
    slot_dir: PathBuf,
    origin: String,
    hash: String,
}

impl From<InstalledPackage> for ListEntry {
    fn from(package: InstalledPackage) -> Self {
        Self {
            version: package.record.version,
            component: package.component,
            slot_dir: package.slot_dir,
            origin: sanitize_fetch_url(&package.record.origin),
            hash: package.record.hash.as_str().to_owned(),
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<CcmConfig> {
    let lookup = |key: &str| match explicit {
        Some(path) if key == CONFIG_PATH_ENV_VAR => Some(path.display().to_string()),
        _ => std::env::var(key).ok(),
    };
    let (config, path, diagnostics) =
        ccm_config::load_with_env(lookup).context("failed to load ccm config")?;

    ccm_config::init_tracing(&config.logging);
    if let Some(path) = &path {
        for key in &diagnostics.unknown_keys {
            tracing::warn!(
                target: "ccm.config",
                path = %path.display(),
                %key,
                "unknown config key"
            );
        }
        for warning in &diagnostics.warnings {
            tracing::warn!(target: "ccm.config", path = %path.display(), "{warning}");
        }
    }
    Ok(config)
}

#[cfg(not(feature = "s3"))]
fn stores(config: &CcmConfig) -> StoreSet {
    StoreSet::new(&config.repository.s3_endpoint)
}

#[cfg(feature = "s3")]
fn stores(config: &CcmConfig) -> StoreSet {
    let endpoint = &config.repository.s3_endpoint;
    StoreSet::new(endpoint).with_s3(Box::new(ccm_cache::SdkS3Store::with_endpoint(endpoint)))
}

fn open_repository(config: &CcmConfig) -> Result<Repository<S3Store>> {
    let repository = &config.repository;
    let dir = repository
        .repository_dir()
        .context("failed to locate the package repository")?;
    let arch = repository
        .arch
        .clone()
        .unwrap_or_else(|| host_arch().to_owned());
    let resolver = VersionResolver::new(S3Store::new(&repository.s3_endpoint))
        .product(&repository.product)
        .arch(arch)
        .bucket(&repository.bucket);
    Ok(Repository::new(dir, resolver, stores(config)))
}

fn print_layout(layout: &InstallLayout, json: bool) -> Result<()> {
    if json {
        return print_json(layout);
    }

    println!("version: {}", layout.version_name);
    println!("  dir: {}", layout.version_dir.display());
    println!("  mode: {}", layout.mode);
    for (component, slot_dir) in &layout.slots {
        let state = if layout.installed.contains(component) {
            "installed"
        } else {
            "reused"
        };
        println!("  {component}: {} ({state})", slot_dir.display());
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
