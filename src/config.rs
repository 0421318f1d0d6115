//! Session configuration
//!
//! Values come from three layers: command-line flags, an optional YAML file
//! (`--config`, or `.cloudport.yaml` in the output directory), and built-in
//! defaults. Flags win over the file, the file wins over the defaults.

use anyhow::{Context as _, Result, bail};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::import::{MAPPING_FILE_NAME, SessionOptions};
use crate::traits::{CommandExecutor, FileSystem};

pub const DEFAULT_PARALLELISM: usize = 10;
pub const DEFAULT_ENGINE: &str = "terraform";
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_NAME_PATTERN: &str = "res-";
pub const CONFIG_FILE_NAME: &str = ".cloudport.yaml";

/// Environment variables consulted for the subscription, in order
const SUBSCRIPTION_ENV_VARS: &[&str] = &["CLOUDPORT_SUBSCRIPTION_ID", "ARM_SUBSCRIPTION_ID"];

lazy_static! {
    /// Generated names must stay valid configuration identifiers
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap();
    /// Dot separated module names, e.g. `network.hub`
    static ref MODULE_PATH: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*)*$").unwrap();
}

/// Contents of the YAML config file
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub parallelism: Option<usize>,
    pub continue_on_error: Option<bool>,
    pub engine: Option<String>,
    pub import_timeout_secs: Option<u64>,
    pub name_pattern: Option<String>,
    pub module_path: Option<String>,
}

impl FileConfig {
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Flags shared by every discovery mode, as given on the command line
#[derive(Debug, Default, Clone)]
pub struct ImportArgs {
    pub output_dir: PathBuf,
    pub non_interactive: bool,
    pub continue_on_error: bool,
    pub parallelism: Option<usize>,
    pub generate_mapping_file: bool,
    pub name_pattern: Option<String>,
    pub module_path: Option<String>,
    pub engine: Option<String>,
    pub import_timeout: Option<u64>,
    pub subscription_id: Option<String>,
    pub schema_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl ImportArgs {
    /// Reject flag combinations that only make sense without prompts
    pub fn validate(&self) -> Result<()> {
        if self.continue_on_error && !self.non_interactive {
            bail!("--continue requires --non-interactive");
        }
        if self.generate_mapping_file && !self.non_interactive {
            bail!("--generate-mapping-file requires --non-interactive");
        }
        if self.parallelism == Some(0) {
            bail!("--parallelism must be at least 1");
        }
        Ok(())
    }
}

/// Fully resolved settings of one import session
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub output_dir: PathBuf,
    pub non_interactive: bool,
    pub continue_on_error: bool,
    pub parallelism: usize,
    pub generate_mapping_file: bool,
    pub name_pattern: String,
    /// Empty for the root module
    pub module_path: String,
    pub engine: String,
    pub import_timeout: Duration,
    pub subscription_id: Option<String>,
    pub schema_file: Option<PathBuf>,
}

impl ImportConfig {
    /// Validate flags, read the config file and merge everything
    pub fn load(args: &ImportArgs, fs: &dyn FileSystem) -> Result<Self> {
        args.validate()?;

        let file = match &args.config {
            Some(path) => {
                let content = fs
                    .read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                FileConfig::parse(&content, path)?
            }
            None => {
                let path = args.output_dir.join(CONFIG_FILE_NAME);
                if fs.is_file(&path) {
                    tracing::debug!(path = %path.display(), "using config file");
                    FileConfig::parse(&fs.read_to_string(&path)?, &path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let config = Self::merge(args, file);
        config.validate()?;
        Ok(config)
    }

    pub fn merge(args: &ImportArgs, file: FileConfig) -> Self {
        Self {
            output_dir: args.output_dir.clone(),
            non_interactive: args.non_interactive,
            continue_on_error: args.continue_on_error || file.continue_on_error.unwrap_or(false),
            parallelism: args
                .parallelism
                .or(file.parallelism)
                .unwrap_or(DEFAULT_PARALLELISM),
            generate_mapping_file: args.generate_mapping_file,
            name_pattern: args
                .name_pattern
                .clone()
                .or(file.name_pattern)
                .unwrap_or_else(|| DEFAULT_NAME_PATTERN.to_string()),
            module_path: args
                .module_path
                .clone()
                .or(file.module_path)
                .unwrap_or_default(),
            engine: args
                .engine
                .clone()
                .or(file.engine)
                .unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
            import_timeout: Duration::from_secs(
                args.import_timeout
                    .or(file.import_timeout_secs)
                    .unwrap_or(DEFAULT_IMPORT_TIMEOUT_SECS),
            ),
            subscription_id: args.subscription_id.clone(),
            schema_file: args.schema_file.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            bail!("parallelism must be at least 1");
        }
        if self.engine.trim().is_empty() {
            bail!("engine must not be empty");
        }
        if self.import_timeout.is_zero() {
            bail!("import timeout must be at least one second");
        }
        if !NAME_PATTERN.is_match(&self.name_pattern) {
            bail!(
                "name pattern '{}' is not a valid resource name prefix",
                self.name_pattern
            );
        }
        if !self.module_path.is_empty() && !MODULE_PATH.is_match(&self.module_path) {
            bail!(
                "module path '{}' must be dot separated module names, e.g. network.hub",
                self.module_path
            );
        }
        Ok(())
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.output_dir.join(MAPPING_FILE_NAME)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            parallelism: self.parallelism,
            continue_on_error: self.continue_on_error,
            name_pattern: self.name_pattern.clone(),
            module_path: self.module_path.clone(),
        }
    }
}

/// Pick the subscription: flag, then environment, then the cloud CLI
///
/// `cli_lookup` is only called when nothing earlier yields a value.
pub fn resolve_subscription_id(
    flag: Option<&str>,
    env: &HashMap<String, String>,
    cli_lookup: impl FnOnce() -> Option<String>,
) -> Option<String> {
    let non_empty = |v: &str| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };

    flag.and_then(non_empty)
        .or_else(|| {
            SUBSCRIPTION_ENV_VARS
                .iter()
                .find_map(|var| env.get(*var).and_then(|v| non_empty(v)))
        })
        .or_else(|| cli_lookup().and_then(|v| non_empty(&v)))
}

/// Default subscription of the logged-in Azure CLI
pub fn az_account_subscription(command: &dyn CommandExecutor, working_dir: &Path) -> Option<String> {
    let output = command
        .execute(
            "az",
            &["account", "show", "--query", "id", "--output", "tsv"],
            working_dir,
        )
        .ok()?;

    if !output.status.success() {
        tracing::debug!("az account show failed, no default subscription");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::command::MockCommandResult;
    use crate::traits::{MockCommandExecutor, MockFileSystem};

    fn args() -> ImportArgs {
        ImportArgs {
            output_dir: PathBuf::from("/out"),
            non_interactive: true,
            ..ImportArgs::default()
        }
    }

    #[test]
    fn test_defaults_apply_without_file() {
        let fs = MockFileSystem::new();
        let config = ImportConfig::load(&args(), &fs).unwrap();

        assert_eq!(config.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(config.engine, "terraform");
        assert_eq!(config.name_pattern, "res-");
        assert_eq!(config.import_timeout, Duration::from_secs(600));
        assert!(!config.continue_on_error);
        assert_eq!(
            config.mapping_path(),
            PathBuf::from("/out/cloudport_mapping.json")
        );
    }

    #[test]
    fn test_flags_win_over_file_and_file_over_defaults() {
        let fs = MockFileSystem::new();
        fs.write(
            Path::new("/out/.cloudport.yaml"),
            "parallelism: 4\nengine: tofu\nname_pattern: imp_\n",
        )
        .unwrap();

        let mut args = args();
        args.parallelism = Some(2);
        let config = ImportConfig::load(&args, &fs).unwrap();

        assert_eq!(config.parallelism, 2);
        assert_eq!(config.engine, "tofu");
        assert_eq!(config.name_pattern, "imp_");
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let fs = MockFileSystem::new();
        let mut args = args();
        args.config = Some(PathBuf::from("/etc/cloudport.yaml"));
        assert!(ImportConfig::load(&args, &fs).is_err());
    }

    #[test]
    fn test_unknown_config_key_is_rejected() {
        let result = FileConfig::parse("paralelism: 3\n", Path::new("c.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_continue_requires_non_interactive() {
        let mut args = args();
        args.non_interactive = false;
        args.continue_on_error = true;
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("--continue"));
    }

    #[test]
    fn test_generate_mapping_requires_non_interactive() {
        let mut args = args();
        args.non_interactive = false;
        args.generate_mapping_file = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        let mut flags = args();
        flags.parallelism = Some(0);
        assert!(flags.validate().is_err());

        let fs = MockFileSystem::new();
        fs.write(Path::new("/out/.cloudport.yaml"), "parallelism: 0\n")
            .unwrap();
        assert!(ImportConfig::load(&args(), &fs).is_err());
    }

    #[test]
    fn test_invalid_name_pattern_is_rejected() {
        let mut args = args();
        args.name_pattern = Some("1 bad".to_string());
        assert!(ImportConfig::load(&args, &MockFileSystem::new()).is_err());
    }

    #[test]
    fn test_module_path_from_file_and_flag() {
        let fs = MockFileSystem::new();
        fs.write(Path::new("/out/.cloudport.yaml"), "module_path: network\n")
            .unwrap();
        let config = ImportConfig::load(&args(), &fs).unwrap();
        assert_eq!(config.session_options().module_path, "network");

        let mut flags = args();
        flags.module_path = Some("network.hub".to_string());
        let config = ImportConfig::load(&flags, &fs).unwrap();
        assert_eq!(config.module_path, "network.hub");

        assert!(ImportConfig::load(&args(), &MockFileSystem::new())
            .unwrap()
            .module_path
            .is_empty());
    }

    #[test]
    fn test_malformed_module_path_is_rejected() {
        for bad in ["network.", ".hub", "net work", "a..b", "1net"] {
            let mut flags = args();
            flags.module_path = Some(bad.to_string());
            let result = ImportConfig::load(&flags, &MockFileSystem::new());
            assert!(result.is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_subscription_flag_wins() {
        let mut env = HashMap::new();
        env.insert("ARM_SUBSCRIPTION_ID".to_string(), "from-env".to_string());
        let resolved = resolve_subscription_id(Some("from-flag"), &env, || {
            panic!("cli should not be consulted")
        });
        assert_eq!(resolved.as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_subscription_env_order() {
        let mut env = HashMap::new();
        env.insert("ARM_SUBSCRIPTION_ID".to_string(), "arm".to_string());
        env.insert("CLOUDPORT_SUBSCRIPTION_ID".to_string(), "  ".to_string());
        let resolved = resolve_subscription_id(None, &env, || None);
        assert_eq!(resolved.as_deref(), Some("arm"));
    }

    #[test]
    fn test_subscription_falls_back_to_cli() {
        let resolved = resolve_subscription_id(Some(""), &HashMap::new(), || {
            Some("from-cli\n".to_string())
        });
        assert_eq!(resolved.as_deref(), Some("from-cli"));
    }

    #[test]
    fn test_az_account_subscription() {
        let mock = MockCommandExecutor::with_outputs(vec![MockCommandResult::ok(
            "az account show",
            "0000-1111\n",
        )]);
        assert_eq!(
            az_account_subscription(&mock, Path::new(".")).as_deref(),
            Some("0000-1111")
        );

        let failing = MockCommandExecutor::with_outputs(vec![MockCommandResult::failed(
            "az account show",
            1,
            "Please run 'az login'",
        )]);
        assert!(az_account_subscription(&failing, Path::new(".")).is_none());
    }
}
