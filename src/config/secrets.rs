//! Secrets live in their own file (`secrets.toml`, typically mode 0600)
//! rather than the main config, so operators can keep it out of version
//! control without special-casing fields inside `SonicatConfig`.
//!
//! Shapes follow what each API actually needs
//! (`original_source/interfaces/api/Discogs.py`'s
//! `secret["discogs"]["user_agent"]`/`["token"]`, `LastFM.py`'s
//! `secret["lastfm"]["user_agent"]`/`["api_key"]`/`["shared_secret"]`)
//! rather than one generic `{key, secret}` pair for both.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct DiscogsSecret {
    pub user_agent: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastfmSecret {
    pub user_agent: String,
    pub api_key: String,
    #[serde(default)]
    pub shared_secret: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecretsFile {
    #[serde(default)]
    pub discogs: Option<DiscogsSecret>,
    #[serde(default)]
    pub lastfm: Option<LastfmSecret>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, toml::Value>,
}

pub fn load_secrets(path: &str) -> Result<SecretsFile, crate::error::SonicatError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| crate::error::SonicatError::Config(format!("cannot read {}: {}", path, e)))?;
    toml::from_str(&contents).map_err(|e| crate::error::SonicatError::Config(format!("invalid secrets file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_discogs_and_lastfm_credentials() {
        let toml = r#"
            [discogs]
            user_agent = "sonicat/0.1"
            token = "abc"

            [lastfm]
            user_agent = "sonicat/0.1"
            api_key = "ghi"
            shared_secret = "jkl"
        "#;
        let secrets: SecretsFile = toml::from_str(toml).unwrap();
        assert_eq!(secrets.discogs.unwrap().token, "abc");
        assert_eq!(secrets.lastfm.unwrap().api_key, "ghi");
    }

    #[test]
    fn missing_sections_are_none() {
        let secrets: SecretsFile = toml::from_str("").unwrap();
        assert!(secrets.discogs.is_none());
        assert!(secrets.lastfm.is_none());
    }
}
