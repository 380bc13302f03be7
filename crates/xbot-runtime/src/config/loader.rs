//! Loading [`XbotConfig`] from files, the environment and code.
//!
//! Later sources win:
//!
//! 1. [`XbotConfig::default`]
//! 2. `xbot.<profile>.<ext>` next to the base file
//! 3. `xbot.<ext>`, the first one found in the search directories
//! 4. `XBOT_` variables, `__` between levels (`XBOT_BOT__COMMAND_PREFIX=!`)
//! 5. providers passed to [`ConfigLoader::merge`]
//!
//! `toml` is read by default; `yaml`/`yml` need the `yaml-config` feature.
//!
//! ```rust,ignore
//! use figment::providers::Serialized;
//! use xbot_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("prod")
//!     .merge(Serialized::default("bot.super_users", [10001]))
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::{Figment, Provider};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::XbotConfig;

const ENV_PREFIX: &str = "XBOT_";
const PROFILE_VAR: &str = "XBOT_PROFILE";
const FILE_STEM: &str = "xbot";

/// Name of the profile whose file variant is layered under the base file.
///
/// `dev` and `prod` are accepted for the two usual profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    pub const DEVELOPMENT: &'static str = "development";
    pub const PRODUCTION: &'static str = "production";

    pub fn new(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        Self(match name.as_str() {
            "dev" => Self::DEVELOPMENT.to_string(),
            "prod" => Self::PRODUCTION.to_string(),
            _ => name,
        })
    }

    /// Reads `XBOT_PROFILE`; unset or blank means development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .map_or_else(Self::default, |name| Self::new(&name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        self.0 == Self::PRODUCTION
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self(Self::DEVELOPMENT.to_string())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File formats compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Lookup order when searching a directory.
    const ENABLED: &'static [Self] = &[
        #[cfg(feature = "toml-config")]
        Self::Toml,
        #[cfg(feature = "yaml-config")]
        Self::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_variables)
    )]
    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

/// Where the base file comes from.
#[derive(Debug, Clone)]
enum FileSource {
    /// First `xbot.<ext>` in these directories; empty means the defaults.
    Search(Vec<PathBuf>),
    Exact(PathBuf),
}

/// Builder that layers configuration sources and extracts [`XbotConfig`].
pub struct ConfigLoader {
    profile: Profile,
    files: FileSource,
    env: bool,
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Searches the default directories, reads the environment and takes
    /// the profile from `XBOT_PROFILE`.
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            files: FileSource::Search(Vec::new()),
            env: true,
            overrides: Figment::new(),
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::new(profile.as_ref());
        self
    }

    /// Adds a directory to search for `xbot.<ext>`.
    ///
    /// Without any, the working directory and then the user config
    /// directory (`~/.config/xbot` on Linux) are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        let dir = path.as_ref().to_path_buf();
        match &mut self.files {
            FileSource::Search(dirs) => dirs.push(dir),
            FileSource::Exact(_) => self.files = FileSource::Search(vec![dir]),
        }
        self
    }

    /// Uses this base file instead of searching. Its profile variant is
    /// looked up beside it.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files = FileSource::Exact(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `provider` above every other source.
    pub fn merge<P: Provider>(mut self, provider: P) -> Self {
        self.overrides = self.overrides.merge(provider);
        self
    }

    pub fn load(self) -> ConfigResult<XbotConfig> {
        let mut figment = Figment::from(Serialized::defaults(XbotConfig::default()));

        for path in self.layered_files()? {
            let format = FileFormat::of(&path)
                .ok_or_else(|| ConfigError::UnsupportedFormat(path.clone()))?;
            info!(path = %path.display(), "reading configuration file");
            figment = format.merge_into(figment, &path);
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let config: XbotConfig = figment.merge(self.overrides).extract()?;
        debug!(
            profile = %self.profile,
            level = %config.logging.level,
            command_prefix = %config.bot.command_prefix,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Files to merge, lowest priority first.
    fn layered_files(&self) -> ConfigResult<Vec<PathBuf>> {
        let base = match &self.files {
            FileSource::Exact(path) if path.is_file() => path.clone(),
            FileSource::Exact(path) => return Err(ConfigError::FileNotFound(path.clone())),
            FileSource::Search(dirs) => {
                let dirs = if dirs.is_empty() {
                    default_dirs()
                } else {
                    dirs.clone()
                };
                match find_base(&dirs) {
                    Some(base) => base,
                    None => {
                        warn!(?dirs, "no configuration file found, using defaults");
                        return Ok(Vec::new());
                    }
                }
            }
        };

        Ok(match self.profile_variant(&base) {
            Some(variant) => vec![variant, base],
            None => vec![base],
        })
    }

    /// `dir/xbot.toml` → `dir/xbot.<profile>.toml`, if that file exists.
    fn profile_variant(&self, base: &Path) -> Option<PathBuf> {
        let stem = base.file_stem()?.to_str()?;
        let ext = base.extension()?.to_str()?;
        let variant = base.with_file_name(format!("{stem}.{}.{ext}", self.profile));
        variant.is_file().then_some(variant)
    }
}

fn find_base(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        FileFormat::ENABLED
            .iter()
            .flat_map(|format| format.extensions())
            .map(|ext| dir.join(format!("{FILE_STEM}.{ext}")))
            .find(|candidate| candidate.is_file())
    })
}

fn default_dirs() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
        .collect()
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<XbotConfig> {
    ConfigLoader::new().load()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::schema::{LogLevel, LogRotation, SpanMode};

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.bot.command_prefix, "/");
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::new("prod").as_str(), Profile::PRODUCTION);
        assert_eq!(Profile::new(" Dev ").as_str(), Profile::DEVELOPMENT);
        assert_eq!(Profile::new("Staging").as_str(), "staging");
        assert!(Profile::new("production").is_production());
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_VAR, "prod");
            assert!(Profile::from_env().is_production());

            jail.set_env(PROFILE_VAR, "  ");
            assert_eq!(Profile::from_env(), Profile::default());
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/definitely/not/here/xbot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unknown_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("xbot.ini", "level = debug")?;
            let result = ConfigLoader::new().file("xbot.ini").without_env().load();
            assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "xbot.production.toml",
                r##"
                [bot]
                command_prefix = "#"
                super_users = [1]

                [limiter]
                sweep_interval_secs = 5
                "##,
            )?;
            jail.create_file(
                "xbot.toml",
                r#"
                [logging]
                level = "debug"

                [bot]
                command_prefix = "!"
                "#,
            )?;
            jail.set_env("XBOT_BOT__SUPER_USERS", "[7, 8]");

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .merge(Serialized::default("logging.level", "warn"))
                .load()
                .map_err(|e| e.to_string())?;

            // base file over profile file
            assert_eq!(config.bot.command_prefix, "!");
            // profile file over defaults
            assert_eq!(config.limiter.sweep_interval_secs, 5);
            // environment over files
            assert_eq!(config.bot.super_users, vec![7, 8]);
            // overrides over everything
            assert_eq!(config.logging.level, LogLevel::Warn);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_explicit_file_picks_up_profile_variant() {
        Jail::expect_with(|jail| {
            jail.create_dir("conf")?;
            jail.create_file("conf/bot.toml", "[bot]\nnicknames = [\"^xbot\"]\n")?;
            jail.create_file(
                "conf/bot.staging.toml",
                "[logging]\nspans = \"lifecycle\"\nrotation = \"daily\"\n",
            )?;

            let config = ConfigLoader::new()
                .profile("staging")
                .file("conf/bot.toml")
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.bot.nicknames, ["^xbot"]);
            assert_eq!(config.logging.spans, SpanMode::Lifecycle);
            assert_eq!(config.logging.rotation, LogRotation::Daily);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_alone_is_ignored() {
        Jail::expect_with(|jail| {
            jail.create_file("xbot.production.toml", "[bot]\ncommand_prefix = \"#\"\n")?;
            let config = ConfigLoader::new()
                .profile("production")
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.bot.command_prefix, "/");
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_bad_value_names_its_key() {
        Jail::expect_with(|jail| {
            jail.create_file("xbot.toml", "[logging]\nlevel = \"loud\"\n")?;
            let err = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap_err();

            assert!(matches!(err, ConfigError::Extract(_)));
            assert_eq!(err.key().as_deref(), Some("logging.level"));
            Ok(())
        });
    }
}
