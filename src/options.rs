//! Push/pull/key options
//!
//! Command-line arguments and the loaded configuration are merged here, once,
//! into plain option values. Flags win over config, config wins over defaults.

use crate::cache::{derive, CacheTag, ChunkLimit, FilePermission, FileSet, KeySet, Platform};
use crate::cli::args::{InputArgs, PullArgs, PushArgs, RegistryArgs};
use crate::config::{Config, ProfileConfig};
use crate::credentials::ExplicitCredentials;
use crate::error::{CracError, CracResult};
use crate::registry::{Repository, TlsMode};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository used when neither the command line nor the config names one
pub const DEFAULT_REPOSITORY: &str = "docker.io/crac";

/// Everything that feeds the cache tag
#[derive(Debug, Clone)]
pub struct KeyOptions {
    pub workdir: PathBuf,
    pub deps: FileSet,
    pub keys: KeySet,
    pub platform: Platform,
    /// Payload patterns contributed by the selected profile
    pub profile_files: Vec<String>,
}

impl KeyOptions {
    pub fn resolve(args: &InputArgs, config: &Config) -> CracResult<Self> {
        let workdir = match &args.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| CracError::io("getting current directory", e))?,
        };

        let profile = select_profile(args, config, std::io::stdin().lock())?;

        let platform = if args.unknown_platform {
            Platform::unknown()
        } else if let Some(platform) = args.platform.as_deref().or(config.cache.platform.as_deref()) {
            Platform::parse(platform)?
        } else {
            Platform::host()
        };

        let mut dep_patterns = args.deps.clone();
        let mut keys: KeySet = args.keys.iter().cloned().collect();
        let mut profile_files = Vec::new();

        if let Some(selected) = profile {
            let profile = selected.profile();
            dep_patterns.extend(profile.deps.iter().cloned());
            profile_files.extend(profile.files.iter().cloned());
            for key in &profile.keys {
                keys.insert(key.clone());
            }
            if let SelectedProfile::Named(name, _) = &selected {
                keys.insert(format!("profile:{}", name));
            }
        }
        keys.insert(platform.key());

        let deps = FileSet::scan(&dep_patterns, &workdir)?;

        debug!(
            workdir = %workdir.display(),
            deps = deps.len(),
            keys = keys.len(),
            platform = %platform,
            "Resolved cache key inputs"
        );

        Ok(Self {
            workdir,
            deps,
            keys,
            platform,
            profile_files,
        })
    }

    /// Derive the cache tag for these inputs
    pub fn derive_tag(&self) -> CracResult<CacheTag> {
        derive(&self.deps, &self.keys, &self.workdir)
    }
}

/// Label used in errors for a profile read from stdin
const STDIN_LABEL: &str = "<stdin>";

/// Where the profile merged into the key inputs came from
#[derive(Debug)]
enum SelectedProfile<'a> {
    /// `[profiles.<name>]` in the config file
    Named(&'a str, &'a ProfileConfig),
    /// `--profile-file` or `--profile-stdin`
    Inline(ProfileConfig),
}

impl SelectedProfile<'_> {
    fn profile(&self) -> &ProfileConfig {
        match self {
            Self::Named(_, profile) => profile,
            Self::Inline(profile) => profile,
        }
    }
}

/// Pick the profile source: stdin beats a profile file, which beats a named profile.
fn select_profile<'a>(
    args: &'a InputArgs,
    config: &'a Config,
    mut stdin: impl Read,
) -> CracResult<Option<SelectedProfile<'a>>> {
    if args.profile_stdin {
        let mut contents = String::new();
        stdin
            .read_to_string(&mut contents)
            .map_err(|e| CracError::io("reading profile from stdin", e))?;
        debug!("Using profile from stdin");
        let profile = parse_profile(&contents, Path::new(STDIN_LABEL))?;
        return Ok(Some(SelectedProfile::Inline(profile)));
    }

    if let Some(path) = &args.profile_file {
        let contents = fs::read_to_string(path)
            .map_err(|e| CracError::io(format!("reading profile {}", path.display()), e))?;
        debug!(path = %path.display(), "Using profile file");
        let profile = parse_profile(&contents, path)?;
        return Ok(Some(SelectedProfile::Inline(profile)));
    }

    match &args.profile {
        Some(name) => Ok(Some(SelectedProfile::Named(name, lookup_profile(config, name)?))),
        None => Ok(None),
    }
}

fn parse_profile(contents: &str, origin: &Path) -> CracResult<ProfileConfig> {
    toml::from_str(contents).map_err(|e| CracError::ConfigInvalid {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })
}

fn lookup_profile<'a>(config: &'a Config, name: &str) -> CracResult<&'a ProfileConfig> {
    config
        .profiles
        .get(name)
        .ok_or_else(|| CracError::ProfileNotFound(name.to_string()))
}

/// Registry access shared by push and pull
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub repository: Repository,
    pub tls: TlsMode,
    pub credentials: ExplicitCredentials,
}

impl RegistryOptions {
    pub fn resolve(
        repository: Option<&str>,
        args: &RegistryArgs,
        config: &Config,
    ) -> CracResult<Self> {
        let reference = repository
            .or(config.registry.default_repository.as_deref())
            .unwrap_or(DEFAULT_REPOSITORY);

        Ok(Self {
            repository: Repository::parse(reference)?,
            tls: TlsMode::from_flags(
                args.insecure || config.registry.insecure,
                args.force_http || config.registry.force_http,
            ),
            credentials: ExplicitCredentials {
                username: args.username.clone(),
                password: args.password.clone(),
            },
        })
    }
}

/// Options for building and pushing a cache image
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub key: KeyOptions,
    pub registry: RegistryOptions,
    pub files: FileSet,
    pub tag: Option<CacheTag>,
    pub chunk_limit: ChunkLimit,
    pub skip_existing: bool,
}

impl PushOptions {
    pub fn resolve(args: &PushArgs, config: &Config) -> CracResult<Self> {
        let key = KeyOptions::resolve(&args.input, config)?;
        let registry = RegistryOptions::resolve(args.repository.as_deref(), &args.registry, config)?;

        let mut patterns = args.files.clone();
        patterns.extend(key.profile_files.iter().cloned());
        let files = FileSet::scan(&patterns, &key.workdir)?;

        let chunk_limit = ChunkLimit::parse(
            args.chunk_size
                .as_deref()
                .unwrap_or(config.cache.chunk_size.as_str()),
        )?;

        Ok(Self {
            key,
            registry,
            files,
            tag: args.tag.as_deref().map(CacheTag::parse).transpose()?,
            chunk_limit,
            skip_existing: args.skip_existing,
        })
    }
}

/// Options for pulling and extracting a cache image
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub key: KeyOptions,
    pub registry: RegistryOptions,
    pub tag: Option<CacheTag>,
    pub permission: FilePermission,
}

impl PullOptions {
    pub fn resolve(args: &PullArgs, config: &Config) -> CracResult<Self> {
        let key = KeyOptions::resolve(&args.input, config)?;
        let registry = RegistryOptions::resolve(args.repository.as_deref(), &args.registry, config)?;

        let permission =
            FilePermission::parse(args.perm.as_deref().unwrap_or(config.cache.file_perm.as_str()))?;

        Ok(Self {
            key,
            registry,
            tag: args.tag.as_deref().map(CacheTag::parse).transpose()?,
            permission,
        })
    }

    /// Files are restored into the working directory
    pub fn destination(&self) -> &std::path::Path {
        &self.key.workdir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn input(dir: &TempDir) -> InputArgs {
        InputArgs {
            workdir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn push_args(dir: &TempDir) -> PushArgs {
        PushArgs {
            repository: None,
            files: vec![],
            tag: None,
            chunk_size: None,
            skip_existing: false,
            input: input(dir),
            registry: RegistryArgs::default(),
        }
    }

    #[test]
    fn platform_key_always_present() {
        let dir = TempDir::new().unwrap();
        let opts = KeyOptions::resolve(&input(&dir), &Config::default()).unwrap();

        let keys: Vec<&str> = opts.keys.iter().collect();
        assert_eq!(keys, vec![Platform::host().key().as_str()]);
    }

    #[test]
    fn unknown_platform_overrides_config() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.platform = Some("linux/arm64".to_string());

        let mut args = input(&dir);
        assert_eq!(
            KeyOptions::resolve(&args, &config).unwrap().platform.to_string(),
            "linux/arm64"
        );

        args.unknown_platform = true;
        assert_eq!(
            KeyOptions::resolve(&args, &config).unwrap().platform,
            Platform::unknown()
        );
    }

    #[test]
    fn platform_changes_tag() {
        let dir = TempDir::new().unwrap();
        let mut args = input(&dir);
        args.platform = Some("linux/amd64".to_string());
        let amd = KeyOptions::resolve(&args, &Config::default()).unwrap().derive_tag().unwrap();

        args.platform = Some("linux/arm64".to_string());
        let arm = KeyOptions::resolve(&args, &Config::default()).unwrap().derive_tag().unwrap();

        assert_ne!(amd, arm);
    }

    #[test]
    fn profile_merges_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pnpm-lock.yaml"), "lock").unwrap();

        let mut config = Config::default();
        config.profiles.insert(
            "pnpm".to_string(),
            ProfileConfig {
                keys: vec!["node20".to_string()],
                deps: vec!["pnpm-lock.yaml".to_string()],
                files: vec!["node_modules".to_string()],
            },
        );

        let mut args = input(&dir);
        args.profile = Some("pnpm".to_string());
        let opts = KeyOptions::resolve(&args, &config).unwrap();

        assert_eq!(opts.deps.names(), vec!["pnpm-lock.yaml"]);
        assert!(opts.keys.iter().any(|k| k == "node20"));
        assert!(opts.keys.iter().any(|k| k == "profile:pnpm"));
        assert_eq!(opts.profile_files, vec!["node_modules"]);
    }

    fn pnpm_config() -> Config {
        let mut config = Config::default();
        config.profiles.insert(
            "pnpm".to_string(),
            ProfileConfig {
                keys: vec!["from-config".to_string()],
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn profile_file_overrides_named_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, "keys = [\"from-file\"]\nfiles = [\"target\"]\n").unwrap();

        let config = pnpm_config();
        let mut args = input(&dir);
        args.profile = Some("pnpm".to_string());
        args.profile_file = Some(path);

        let selected = select_profile(&args, &config, Cursor::new("")).unwrap().unwrap();
        assert!(matches!(selected, SelectedProfile::Inline(_)));
        assert_eq!(selected.profile().keys, vec!["from-file"]);
        assert_eq!(selected.profile().files, vec!["target"]);

        let opts = KeyOptions::resolve(&args, &config).unwrap();
        assert!(opts.keys.iter().any(|k| k == "from-file"));
        assert!(!opts.keys.iter().any(|k| k == "from-config" || k == "profile:pnpm"));
        assert_eq!(opts.profile_files, vec!["target"]);
    }

    #[test]
    fn profile_stdin_overrides_file_and_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.lock"), "lock").unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, "keys = [\"from-file\"]\n").unwrap();

        let config = pnpm_config();
        let mut args = input(&dir);
        args.profile = Some("pnpm".to_string());
        args.profile_file = Some(path);
        args.profile_stdin = true;

        let stdin = Cursor::new("keys = [\"from-stdin\"]\ndeps = [\"Cargo.lock\"]\n");
        let selected = select_profile(&args, &config, stdin).unwrap().unwrap();

        assert_eq!(selected.profile().keys, vec!["from-stdin"]);
        assert_eq!(selected.profile().deps, vec!["Cargo.lock"]);
    }

    #[test]
    fn inline_profile_changes_tag_by_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.toml");
        let args = InputArgs {
            profile_file: Some(path.clone()),
            platform: Some("linux/amd64".to_string()),
            ..input(&dir)
        };

        fs::write(&path, "keys = [\"node20\"]\n").unwrap();
        let node20 = KeyOptions::resolve(&args, &Config::default()).unwrap().derive_tag().unwrap();
        fs::write(&path, "keys = [\"node22\"]\n").unwrap();
        let node22 = KeyOptions::resolve(&args, &Config::default()).unwrap().derive_tag().unwrap();

        assert_ne!(node20, node22);
    }

    #[test]
    fn malformed_profile_reports_origin() {
        let dir = TempDir::new().unwrap();
        let mut args = input(&dir);
        args.profile_stdin = true;

        match select_profile(&args, &Config::default(), Cursor::new("keys = \"not-a-list\"")) {
            Err(CracError::ConfigInvalid { path, .. }) => assert_eq!(path, Path::new("<stdin>")),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn missing_profile_file_errors() {
        let dir = TempDir::new().unwrap();
        let mut args = input(&dir);
        args.profile_file = Some(dir.path().join("absent.toml"));

        assert!(matches!(
            KeyOptions::resolve(&args, &Config::default()),
            Err(CracError::Io { .. })
        ));
    }

    #[test]
    fn unknown_profile_errors() {
        let dir = TempDir::new().unwrap();
        let mut args = input(&dir);
        args.profile = Some("missing".to_string());

        assert!(matches!(
            KeyOptions::resolve(&args, &Config::default()),
            Err(CracError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn push_defaults() {
        let dir = TempDir::new().unwrap();
        let opts = PushOptions::resolve(&push_args(&dir), &Config::default()).unwrap();

        assert_eq!(opts.registry.repository.to_string(), DEFAULT_REPOSITORY);
        assert_eq!(opts.registry.tls, TlsMode::Https);
        assert_eq!(opts.chunk_limit, ChunkLimit::unbounded());
        assert!(opts.files.is_empty());
        assert!(opts.tag.is_none());
    }

    #[test]
    fn push_flags_beat_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("out.bin"), "x").unwrap();

        let mut config = Config::default();
        config.cache.chunk_size = "1M".to_string();
        config.registry.default_repository = Some("ghcr.io/org/from-config".to_string());
        config.registry.insecure = true;

        let mut args = push_args(&dir);
        args.repository = Some("oci:/tmp/layout".to_string());
        args.chunk_size = Some("4K".to_string());
        args.files = vec!["out.bin".to_string()];
        args.tag = Some("pinned".to_string());

        let opts = PushOptions::resolve(&args, &config).unwrap();

        assert!(opts.registry.repository.is_layout());
        assert_eq!(opts.chunk_limit, ChunkLimit::bytes(4096));
        assert_eq!(opts.registry.tls, TlsMode::Insecure);
        assert_eq!(opts.files.names(), vec!["out.bin"]);
        assert_eq!(opts.tag.unwrap().as_str(), "pinned");
    }

    #[test]
    fn push_rejects_invalid_tag() {
        let dir = TempDir::new().unwrap();
        let mut args = push_args(&dir);
        args.tag = Some("bad/tag".to_string());

        assert!(matches!(
            PushOptions::resolve(&args, &Config::default()),
            Err(CracError::InvalidTag(_))
        ));
    }

    #[test]
    fn pull_permission_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.file_perm = "0600".to_string();

        let args = PullArgs {
            repository: Some("ghcr.io/org/cache".to_string()),
            tag: None,
            perm: None,
            input: input(&dir),
            registry: RegistryArgs::default(),
        };
        let opts = PullOptions::resolve(&args, &config).unwrap();

        assert_eq!(opts.permission.mode(), 0o600);
        assert_eq!(opts.destination(), dir.path());
    }
}
