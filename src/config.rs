use crate::{app::DEFAULT_UPLOAD_LIMIT, backend::S3Settings};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr};

const ENV_PREFIX: &str = "STORAGE_GATEWAY_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    File,
    S3,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "s3" => Ok(Self::S3),
            other => bail!("unknown backend `{}` (expected `file` or `s3`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub s3: S3Settings,
    pub policy_file: Option<PathBuf>,
    pub upload_limit: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("s3_bucket", &self.s3.bucket)
            .field("s3_endpoint", &self.s3.endpoint)
            .field("s3_region", &self.s3.region)
            .field("policy_file", &self.policy_file)
            .field("upload_limit", &self.upload_limit)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Authorization-aware storage gateway")]
pub struct Args {
    /// Host to bind to (overrides STORAGE_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORAGE_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides STORAGE_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend (overrides STORAGE_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory for the file backend (overrides STORAGE_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// JSON policy rules replacing the defaults (overrides STORAGE_GATEWAY_POLICY_FILE)
    #[arg(long)]
    pub policy_file: Option<PathBuf>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Reads `STORAGE_GATEWAY_{name}`. Unset and empty are both `None`.
fn env_var(name: &str) -> Result<Option<String>> {
    let key = format!("{ENV_PREFIX}{name}");
    match env::var(&key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name)? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {ENV_PREFIX}{name} value `{value}`: {err}")),
        None => Ok(None),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<Self> {
        let jwt_secret = env_var("JWT_SECRET")?
            .context("STORAGE_GATEWAY_JWT_SECRET must be set")?;

        let cfg = Self {
            host: args
                .host
                .or(env_var("HOST")?)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: match args.port {
                Some(port) => port,
                None => env_parse("PORT")?.unwrap_or(5000),
            },
            database_url: args
                .database_url
                .or(env_var("DATABASE_URL")?)
                .unwrap_or_else(|| "sqlite://./data/meta/storage.db".into()),
            jwt_secret,
            backend: match args.backend {
                Some(kind) => kind,
                None => env_parse("BACKEND")?.unwrap_or(BackendKind::File),
            },
            storage_dir: args
                .storage_dir
                .or(env_var("STORAGE_DIR")?)
                .unwrap_or_else(|| "./data/objects".into()),
            s3: S3Settings {
                bucket: env_var("S3_BUCKET")?.unwrap_or_default(),
                endpoint: env_var("S3_ENDPOINT")?,
                region: env_var("S3_REGION")?.unwrap_or_else(|| "us-east-1".into()),
                force_path_style: env_parse("S3_FORCE_PATH_STYLE")?.unwrap_or(false),
                access_key_id: env_var("S3_ACCESS_KEY_ID")?,
                secret_access_key: env_var("S3_SECRET_ACCESS_KEY")?,
                prefix: env_var("S3_PREFIX")?,
            },
            policy_file: args.policy_file.or(env_var("POLICY_FILE")?.map(PathBuf::from)),
            upload_limit: env_parse("UPLOAD_LIMIT")?.unwrap_or(DEFAULT_UPLOAD_LIMIT),
        };

        if cfg.backend == BackendKind::S3 && cfg.s3.bucket.is_empty() {
            bail!("STORAGE_GATEWAY_S3_BUCKET must be set when the s3 backend is selected");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("S3".parse::<BackendKind>().unwrap(), BackendKind::S3);
        assert_eq!("file".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert!("gcs".parse::<BackendKind>().is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = AppConfig {
            host: "127.0.0.1".into(),
            port: 5000,
            database_url: "sqlite::memory:".into(),
            jwt_secret: "super-secret".into(),
            backend: BackendKind::File,
            storage_dir: "./data".into(),
            s3: S3Settings::default(),
            policy_file: None,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert_eq!(cfg.addr(), "127.0.0.1:5000");
    }
}
