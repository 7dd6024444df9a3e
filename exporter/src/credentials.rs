//! Writes a renewed OAuth token back into the file holding the Netatmo
//! account, so the next run can reuse or refresh it.

use crate::config::{ConfigFormat, NetatmoSettings, Section, SectionSource};
use crate::errors::{Error, Result};
use crate::netatmo::Token;
use std::fs;
use std::path::Path;
use tracing::info;

/// Returns the settings carrying `token`. The config file is rewritten only
/// when the token differs from what was loaded.
pub fn persist_token(
    source: &SectionSource,
    mut settings: NetatmoSettings,
    token: &Token,
) -> Result<NetatmoSettings> {
    if Token::from_settings(&settings).as_ref() == Some(token) {
        return Ok(settings);
    }

    info!("Access token changed, updating {}", source.path.display());
    rewrite_token(source, token).map_err(|reason| Error::ConfigRewrite {
        path: source.path.clone(),
        reason,
    })?;

    settings.access_token = Some(token.access_token.clone());
    settings.refresh_token = Some(token.refresh_token.clone());
    settings.expires_at = Some(token.expires_at);
    Ok(settings)
}

fn rewrite_token(source: &SectionSource, token: &Token) -> std::result::Result<(), String> {
    let current = fs::read_to_string(&source.path).map_err(|e| e.to_string())?;
    let section = source.nested.then(|| Section::Netatmo.key());

    let updated = match ConfigFormat::from_path(&source.path) {
        ConfigFormat::Toml => update_toml(&current, section, token)?,
        ConfigFormat::Yaml => update_yaml(&current, section, token)?,
    };

    write_replacing(&source.path, &updated).map_err(|e| e.to_string())
}

/// Edits the parsed document in place, so comments and key order survive.
fn update_toml(current: &str, section: Option<&str>, token: &Token) -> std::result::Result<String, String> {
    use toml_edit::{value, DocumentMut, Item, Table};

    let mut document: DocumentMut = current
        .parse()
        .map_err(|e: toml_edit::TomlError| e.to_string())?;

    let table = match section {
        Some(key) => document
            .entry(key)
            .or_insert(Item::Table(Table::new()))
            .as_table_mut()
            .ok_or_else(|| format!("`{}` is not a table", key))?,
        None => document.as_table_mut(),
    };

    table["access_token"] = value(token.access_token.as_str());
    table["refresh_token"] = value(token.refresh_token.as_str());
    table["expires_at"] = value(token.expires_at);

    Ok(document.to_string())
}

fn update_yaml(current: &str, section: Option<&str>, token: &Token) -> std::result::Result<String, String> {
    use serde_yaml::{Mapping, Value};

    let mut document: Value = serde_yaml::from_str(current).map_err(|e| e.to_string())?;
    if document.is_null() {
        document = Value::Mapping(Mapping::new());
    }

    let root = document
        .as_mapping_mut()
        .ok_or_else(|| "top level is not a mapping".to_string())?;
    let mapping = match section {
        Some(key) => root
            .entry(Value::String(key.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()))
            .as_mapping_mut()
            .ok_or_else(|| format!("`{}` is not a mapping", key))?,
        None => root,
    };

    mapping.insert(
        Value::String("access_token".to_string()),
        Value::String(token.access_token.clone()),
    );
    mapping.insert(
        Value::String("refresh_token".to_string()),
        Value::String(token.refresh_token.clone()),
    );
    mapping.insert(
        Value::String("expires_at".to_string()),
        Value::Number(token.expires_at.into()),
    );

    serde_yaml::to_string(&document).map_err(|e| e.to_string())
}

/// Writes next to the target and renames over it, so a failed write never
/// leaves a truncated config holding no refresh token.
fn write_replacing(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_section, ConfigSources};
    use tempfile::tempdir;

    const COMBINED_TOML: &str = r#"[influx]
url = "http://localhost:8086"
token = "t"
bucket = "b"
org = "o"

[netatmo]
client_id = "id"
client_secret = "secret"
access_token = "old-access"
refresh_token = "old-refresh"
expires_at = 1000
"#;

    fn token(access: &str, refresh: &str, expires_at: i64) -> Token {
        Token {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at,
        }
    }

    fn load(source: &SectionSource) -> NetatmoSettings {
        load_section(source, Section::Netatmo, |_| None).unwrap()
    }

    #[test]
    fn test_unchanged_token_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, COMBINED_TOML).unwrap();
        let source = ConfigSources::new(&path, None, None).netatmo;

        let settings = load(&source);
        let same = token("old-access", "old-refresh", 1000);
        let result = persist_token(&source, settings.clone(), &same).unwrap();

        assert_eq!(result, settings);
        assert_eq!(fs::read_to_string(&path).unwrap(), COMBINED_TOML);
    }

    #[test]
    fn test_changed_token_rewrites_nested_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, COMBINED_TOML).unwrap();
        let source = ConfigSources::new(&path, None, None).netatmo;

        let fresh = token("new-access", "new-refresh", 11800);
        let result = persist_token(&source, load(&source), &fresh).unwrap();
        assert_eq!(result.access_token.as_deref(), Some("new-access"));
        assert_eq!(result.expires_at, Some(11800));

        let reloaded = load(&source);
        assert_eq!(reloaded.access_token.as_deref(), Some("new-access"));
        assert_eq!(reloaded.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(reloaded.expires_at, Some(11800));
        assert_eq!(reloaded.client_secret, "secret");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("bucket = \"b\""));
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn test_toml_rewrite_keeps_comments_and_other_keys() {
        let original = "\
# Netatmo account
[netatmo]
client_id = \"id\" # from dev.netatmo.com
client_secret = \"secret\"
# refreshed tokens land here
refresh_token = \"old\"

[influx]
url = \"http://localhost:8086\"
";
        let dir = tempdir().unwrap();
        let path = dir.path().join("netatmo.toml");
        fs::write(&path, original).unwrap();
        let source = SectionSource {
            path: path.clone(),
            nested: true,
        };

        persist_token(&source, load(&source), &token("a", "r", 42)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Netatmo account\n[netatmo]\n"));
        assert!(text.contains("client_id = \"id\" # from dev.netatmo.com\n"));
        assert!(text.contains("# refreshed tokens land here\nrefresh_token = \"r\"\n"));
        assert!(text.contains("access_token = \"a\"\n"));
        assert!(text.contains("expires_at = 42\n"));
        assert!(text.ends_with("[influx]\nurl = \"http://localhost:8086\"\n"));
    }

    #[test]
    fn test_changed_token_rewrites_top_level_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("netatmo.yaml");
        fs::write(&path, "client_id: id\nclient_secret: secret\nrefresh_token: old\n").unwrap();
        let source = ConfigSources::new(&dir.path().join("unused.toml"), None, Some(&path)).netatmo;

        persist_token(&source, load(&source), &token("a", "r", 42)).unwrap();

        let reloaded = load(&source);
        assert_eq!(reloaded.access_token.as_deref(), Some("a"));
        assert_eq!(reloaded.refresh_token.as_deref(), Some("r"));
        assert_eq!(reloaded.expires_at, Some(42));
        assert_eq!(reloaded.client_id, "id");
    }

    #[test]
    fn test_unwritable_target_is_rewrite_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, COMBINED_TOML).unwrap();
        let source = ConfigSources::new(&path, None, None).netatmo;
        let settings = load(&source);
        fs::remove_file(&path).unwrap();

        let err = persist_token(&source, settings, &token("a", "r", 1)).unwrap_err();
        assert!(matches!(err, Error::ConfigRewrite { .. }));
    }
}
