use std::collections::HashMap;
use std::fmt;

use url::Url;

use crate::Error;

const STORAGE_URL: &str = "LEAKR_STORAGE_URL";
const R2_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const R2_BUCKET_MAIN_NAME: &str = "R2_BUCKET_MAIN_NAME";
const R2_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const R2_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const R2_REGION: &str = "auto";

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub storage_url: Url,
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Reads `LEAKR_STORAGE_URL`, falling back to a Cloudflare R2 bucket
    /// described by the `R2_*` variables.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self, Error> {
        let credentials = match (env.get(R2_ACCESS_KEY_ID), env.get(R2_SECRET_ACCESS_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            }),
            _ => None,
        };

        if let Some(url) = env.get(STORAGE_URL) {
            let mut cfg = Config::from_url(url)?;
            cfg.credentials = credentials;
            return Ok(cfg);
        }

        let account_id = required(env, R2_ACCOUNT_ID)?;
        let bucket = required(env, R2_BUCKET_MAIN_NAME)?;

        let url = format!(
            "s3://{}?region={}&endpoint=https://{}.r2.cloudflarestorage.com",
            bucket, R2_REGION, account_id
        );

        let mut cfg = Config::from_url(url)?;
        cfg.credentials = credentials;
        Ok(cfg)
    }

    pub fn from_url<S>(url: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let storage_url = Url::parse(url.as_ref())
            .map_err(|err| Error::config(format!("Invalid storage url '{}': {}", url.as_ref(), err)))?;

        Ok(Config {
            storage_url,
            credentials: None,
        })
    }

    pub fn storage_url<S>(&mut self, url: S) -> Result<(), Error>
    where
        S: AsRef<str>,
    {
        let cfg = Config::from_url(url)?;
        self.storage_url = cfg.storage_url;
        Ok(())
    }
}

fn required<'a>(env: &'a HashMap<String, String>, key: &str) -> Result<&'a str, Error> {
    match env.get(key) {
        Some(val) if !val.is_empty() => Ok(val.as_str()),
        _ => {
            let err = format!(
                "Environment variable '{}' was not found (or set '{}')",
                key, STORAGE_URL
            );
            Err(Error::config(err))
        }
    }
}
