pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, ConfigError};
pub use types::{
    BatchSettings, CompactionConfig, Config, DestinationConfig, ForwardingConfig, IngestConfig,
};

/// `$env{NAME}` where NAME is a shell-style identifier
pub(crate) const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

const USER_CONFIG_SUFFIX: &str = ".config/drain/config.yml";
const SYSTEM_CONFIG_PATH: &str = "/etc/drain/config.yml";

/// Replace every `$env{NAME}` whose variable is set. Unset references are
/// kept verbatim so the loader can report them.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(ENV_VAR_PATTERN).unwrap();

    re.replace_all(text, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(home_dir) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home_dir,
        Ok(rest) => home_dir.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Per-user config location, where `drain config init` writes
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONFIG_SUFFIX))
}

/// Pick the config file to load.
///
/// An explicit path always wins (even if it does not exist, so the caller
/// gets a proper "not found" error). Otherwise the first existing file of
/// `~/.config/drain/config.yml` and `/etc/drain/config.yml` is used.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    user_config_path()
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG_PATH)))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("DRAIN_TEST_DIR", "/srv/events");
        let result = expand_env_vars("dir: $env{DRAIN_TEST_DIR}/parquet");
        assert_eq!(result, "dir: /srv/events/parquet");
        std::env::remove_var("DRAIN_TEST_DIR");
    }

    #[test]
    fn test_expand_env_vars_multiple() {
        std::env::set_var("DRAIN_MEASUREMENT", "G-1234");
        std::env::set_var("DRAIN_SECRET", "abc");
        let result = expand_env_vars("$env{DRAIN_MEASUREMENT}:$env{DRAIN_SECRET}");
        assert_eq!(result, "G-1234:abc");
        std::env::remove_var("DRAIN_MEASUREMENT");
        std::env::remove_var("DRAIN_SECRET");
    }

    #[test]
    fn test_expand_env_vars_keeps_unset() {
        std::env::set_var("DRAIN_SET_VAR", "exists");
        let result = expand_env_vars("$env{DRAIN_SET_VAR}/$env{DRAIN_UNSET_VAR}");
        assert_eq!(result, "exists/$env{DRAIN_UNSET_VAR}");
        std::env::remove_var("DRAIN_SET_VAR");
    }

    #[test]
    fn test_expand_env_vars_ignores_shell_syntax() {
        let result = expand_env_vars("${HOME}/data");
        assert_eq!(result, "${HOME}/data");
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/events")), home.join("events"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("/var/lib/drain")), Path::new("/var/lib/drain"));
        assert_eq!(expand_tilde(Path::new("data/~x")), Path::new("data/~x"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/nonexistent/drain.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/nonexistent/drain.yml")));
    }
}
