use crate::config::{ENV_ALLOW_INSECURE, ENV_PASSWORD, ENV_URL, ENV_USERNAME};
use crate::error::{Error, Result};
use directories::BaseDirs;
use serde_json::{Map, Value, json};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the entry registered with the desktop host.
pub const SERVER_NAME: &str = "caldav";

/// Path of the desktop host's MCP configuration file.
///
/// `config_dir` resolves to `~/.config` on Linux, `~/Library/Application
/// Support` on macOS and `%APPDATA%` on Windows — the three places Claude
/// Desktop keeps `claude_desktop_config.json`.
pub fn host_config_path() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| {
        Error::Config("cannot determine the user home directory".to_string())
    })?;
    Ok(base
        .config_dir()
        .join("Claude")
        .join("claude_desktop_config.json"))
}

/// Register this binary as an MCP server with the desktop host.
///
/// Existing entries in the host configuration are preserved; an entry with
/// the same name is replaced. Returns the path that was written.
pub fn install() -> Result<PathBuf> {
    let path = host_config_path()?;
    let exe = env::current_exe()?;

    let mut root: Value = if path.exists() {
        serde_json::from_str(&fs::read_to_string(&path)?)?
    } else {
        json!({})
    };

    merge_server_entry(&mut root, SERVER_NAME, server_entry(&exe, collect_env()))?;

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    atomic_write(&path, serde_json::to_string_pretty(&root)?)?;
    Ok(path)
}

/// Carry whichever connection variables are currently set into the entry so
/// the host passes them back to the spawned server.
fn collect_env() -> Map<String, Value> {
    let mut env_block = Map::new();
    for var in [ENV_URL, ENV_USERNAME, ENV_PASSWORD] {
        match env::var(var) {
            Ok(v) => {
                env_block.insert(var.to_string(), Value::String(v));
            }
            Err(_) => warn!(
                "{} is not set; add it to the registered entry before first use",
                var
            ),
        }
    }
    if let Ok(v) = env::var(ENV_ALLOW_INSECURE) {
        env_block.insert(ENV_ALLOW_INSECURE.to_string(), Value::String(v));
    }
    env_block
}

fn server_entry(exe: &Path, env_block: Map<String, Value>) -> Value {
    json!({
        "command": exe.to_string_lossy(),
        "args": ["serve"],
        "env": env_block,
    })
}

fn merge_server_entry(root: &mut Value, name: &str, entry: Value) -> Result<()> {
    let obj = root.as_object_mut().ok_or_else(|| {
        Error::Config("host configuration file is not a JSON object".to_string())
    })?;
    let servers = obj
        .entry("mcpServers")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| {
            Error::Config("mcpServers in the host configuration is not an object".to_string())
        })?;
    servers.insert(name.to_string(), entry);
    Ok(())
}

/// Atomic write: write to .tmp file then rename
fn atomic_write(path: &Path, contents: String) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_into_empty_config() {
        let mut root = json!({});
        let entry = server_entry(Path::new("/usr/bin/caldav-mcp"), Map::new());
        merge_server_entry(&mut root, SERVER_NAME, entry).unwrap();

        assert_eq!(
            root["mcpServers"][SERVER_NAME]["command"],
            "/usr/bin/caldav-mcp"
        );
        assert_eq!(root["mcpServers"][SERVER_NAME]["args"][0], "serve");
    }

    #[test]
    fn test_merge_preserves_other_servers() {
        let mut root = json!({
            "mcpServers": {
                "other": { "command": "other-server" }
            },
            "theme": "dark"
        });
        merge_server_entry(
            &mut root,
            SERVER_NAME,
            server_entry(Path::new("/bin/x"), Map::new()),
        )
        .unwrap();

        assert_eq!(root["mcpServers"]["other"]["command"], "other-server");
        assert_eq!(root["theme"], "dark");
        assert_eq!(root["mcpServers"][SERVER_NAME]["command"], "/bin/x");
    }

    #[test]
    fn test_merge_replaces_existing_entry() {
        let mut root = json!({ "mcpServers": { SERVER_NAME: { "command": "stale" } } });
        merge_server_entry(
            &mut root,
            SERVER_NAME,
            server_entry(Path::new("/bin/fresh"), Map::new()),
        )
        .unwrap();
        assert_eq!(root["mcpServers"][SERVER_NAME]["command"], "/bin/fresh");
    }

    #[test]
    fn test_merge_rejects_non_object_config() {
        let mut root = json!([1, 2, 3]);
        let err = merge_server_entry(
            &mut root,
            SERVER_NAME,
            server_entry(Path::new("/bin/x"), Map::new()),
        );
        assert!(err.is_err());
    }
}
