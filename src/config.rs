use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
pub const DEFAULT_YTDLP_PROGRAM: &str = "yt-dlp";
pub const VENV_YTDLP_PROGRAM: &str = "venv/bin/yt-dlp";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TITLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Raw `KEY=VALUE` pairs read from an env file.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    values: HashMap<String, String>,
}

impl EnvConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Everything the retrieval pipeline and the binaries need at runtime.
#[derive(Debug, Clone)]
pub struct Settings {
    pub proxy_url: Option<String>,
    pub cookies_file: PathBuf,
    pub cookies_base64: Option<String>,
    pub ytdlp_program: PathBuf,
    pub tool_timeout: Duration,
    pub title_timeout: Duration,
    pub http_timeout: Duration,
    pub ytdlp_fallback: bool,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_url: None,
            cookies_file: PathBuf::from(DEFAULT_COOKIES_FILE),
            cookies_base64: None,
            ytdlp_program: PathBuf::from(DEFAULT_YTDLP_PROGRAM),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            title_timeout: Duration::from_secs(DEFAULT_TITLE_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            ytdlp_fallback: true,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"').trim_matches('\'');
            cfg.values.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(Some(cfg))
}

impl Settings {
    /// Reads the env file (`CAPTIONS_ENV_FILE` or `.env`) and lets the process
    /// environment override it.
    pub fn load() -> Result<Self> {
        let env_path = env::var("CAPTIONS_ENV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE));
        let file = read_env_config(&env_path)?;
        let cwd = env::current_dir().context("resolving working directory")?;
        Self::from_lookup(file.as_ref(), &cwd, |key| env::var(key).ok())
    }

    /// Builds settings from an optional env file plus a variable lookup that
    /// takes precedence over it. `base_dir` anchors the default `venv` lookup.
    pub fn from_lookup<F>(file: Option<&EnvConfig>, base_dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .or_else(|| file.and_then(|cfg| cfg.get(key)).map(str::to_string))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Settings::default();

        let ytdlp_program = match get("YTDLP_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let venv = base_dir.join(VENV_YTDLP_PROGRAM);
                if venv.exists() {
                    venv
                } else {
                    defaults.ytdlp_program.clone()
                }
            }
        };

        Ok(Settings {
            proxy_url: get("PROXY_URL"),
            cookies_file: get("YOUTUBE_COOKIES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cookies_file),
            cookies_base64: get("YOUTUBE_COOKIES_BASE64"),
            ytdlp_program,
            tool_timeout: seconds(get("YTDLP_TIMEOUT_SECS"), "YTDLP_TIMEOUT_SECS")?
                .unwrap_or(defaults.tool_timeout),
            title_timeout: seconds(get("TITLE_TIMEOUT_SECS"), "TITLE_TIMEOUT_SECS")?
                .unwrap_or(defaults.title_timeout),
            http_timeout: seconds(
                get("TRANSCRIPT_HTTP_TIMEOUT_SECS"),
                "TRANSCRIPT_HTTP_TIMEOUT_SECS",
            )?
            .unwrap_or(defaults.http_timeout),
            ytdlp_fallback: match get("YTDLP_FALLBACK") {
                Some(value) => parse_flag(&value, "YTDLP_FALLBACK")?,
                None => defaults.ytdlp_fallback,
            },
            host: get("CAPTIONS_HOST").unwrap_or(defaults.host),
            port: match get("CAPTIONS_PORT") {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("Parsing CAPTIONS_PORT value {value:?}"))?,
                None => defaults.port,
            },
        })
    }
}

fn seconds(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("Parsing {key} value {raw:?}"))
        })
        .transpose()
}

fn parse_flag(value: &str, key: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Parsing {key}: expected a boolean, got {value:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn read_env_config_strips_quotes_and_comments() {
        let cfg = make_config("# proxy\nPROXY_URL=\"1.2.3.4:80\"\nexport YTDLP_TIMEOUT_SECS='5'\n\n");
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.get("PROXY_URL"), Some("1.2.3.4:80"));
        assert_eq!(parsed.get("YTDLP_TIMEOUT_SECS"), Some("5"));
    }

    #[test]
    fn missing_env_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_env_config(&dir.path().join(".env")).unwrap().is_none());
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let dir = tempdir().unwrap();
        let settings = Settings::from_lookup(None, dir.path(), vars(&[])).unwrap();
        assert_eq!(settings.proxy_url, None);
        assert_eq!(settings.cookies_file, PathBuf::from(DEFAULT_COOKIES_FILE));
        assert_eq!(settings.ytdlp_program, PathBuf::from(DEFAULT_YTDLP_PROGRAM));
        assert_eq!(settings.tool_timeout, Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS));
        assert!(settings.ytdlp_fallback);
        assert_eq!(settings.port, DEFAULT_PORT);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempdir().unwrap();
        let cfg = make_config("PROXY_URL=file-proxy:1\nTITLE_TIMEOUT_SECS=3\n");
        let parsed = read_env_config(cfg.path()).unwrap();
        let settings = Settings::from_lookup(
            parsed.as_ref(),
            dir.path(),
            vars(&[("PROXY_URL", "env-proxy:2"), ("YTDLP_FALLBACK", "off")]),
        )
        .unwrap();
        assert_eq!(settings.proxy_url.as_deref(), Some("env-proxy:2"));
        assert_eq!(settings.title_timeout, Duration::from_secs(3));
        assert!(!settings.ytdlp_fallback);
    }

    #[test]
    fn venv_program_is_preferred_when_present() {
        let dir = tempdir().unwrap();
        let venv = dir.path().join(VENV_YTDLP_PROGRAM);
        fs::create_dir_all(venv.parent().unwrap()).unwrap();
        fs::write(&venv, "").unwrap();
        let settings = Settings::from_lookup(None, dir.path(), vars(&[])).unwrap();
        assert_eq!(settings.ytdlp_program, venv);

        let settings =
            Settings::from_lookup(None, dir.path(), vars(&[("YTDLP_PATH", "/opt/yt-dlp")])).unwrap();
        assert_eq!(settings.ytdlp_program, PathBuf::from("/opt/yt-dlp"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let dir = tempdir().unwrap();
        let err = Settings::from_lookup(None, dir.path(), vars(&[("YTDLP_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("YTDLP_TIMEOUT_SECS"));
        assert!(
            Settings::from_lookup(None, dir.path(), vars(&[("CAPTIONS_PORT", "99999")])).is_err()
        );
    }
}
