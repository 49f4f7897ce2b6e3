//! Locations module

use camino::Utf8PathBuf;

pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const TOKEN_CACHE_FILE: &str = "token_cache.json";
pub const LOG_FILE: &str = "drivesync.log";

pub fn home_dir() -> anyhow::Result<Utf8PathBuf> {
    let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Can't get HOME directory"))?;
    Ok(Utf8PathBuf::try_from(dir)?)
}

pub fn config_dir() -> anyhow::Result<Utf8PathBuf> {
    let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Can't get config directory"))?;
    let dir = Utf8PathBuf::try_from(dir)?;
    Ok(dir.join("drivesync"))
}

pub fn cache_dir() -> anyhow::Result<Utf8PathBuf> {
    let dir = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Can't get cache directory"))?;
    let dir = Utf8PathBuf::try_from(dir)?;
    Ok(dir.join("drivesync"))
}

pub fn token_cache_file() -> anyhow::Result<Utf8PathBuf> {
    Ok(cache_dir()?.join(TOKEN_CACHE_FILE))
}

pub fn log_file() -> anyhow::Result<Utf8PathBuf> {
    Ok(cache_dir()?.join(LOG_FILE))
}

/// Expands a leading `~` to the home directory.
pub fn expand_user(path: &str) -> anyhow::Result<Utf8PathBuf> {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        Ok(home_dir()?.join(rest))
    } else {
        Ok(Utf8PathBuf::from(path))
    }
}

#[test]
fn test_expand_user() -> anyhow::Result<()> {
    let home = home_dir()?;
    assert_eq!(expand_user("~")?, home);
    assert_eq!(expand_user("~/Documents")?, home.join("Documents"));
    assert_eq!(expand_user("/srv/~/data")?, Utf8PathBuf::from("/srv/~/data"));
    assert_eq!(expand_user("relative")?, Utf8PathBuf::from("relative"));
    Ok(())
}
