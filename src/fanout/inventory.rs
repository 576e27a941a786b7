//! Inventory file loading and host filtering.
//!
//! ```yaml
//! servers:
//!   - host: web01
//!     port: 22
//!     username: deploy
//!     key_file: /home/deploy/.ssh/id_ed25519
//!     commands:
//!       - uptime
//!       - sudo -S systemctl restart nginx
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::error::FanoutError;
use super::types::HostRecord;

#[derive(Debug, Deserialize)]
struct Inventory {
    #[serde(default)]
    servers: Vec<HostRecord>,
}

/// Read and validate the inventory at `path`.
pub fn load(path: &Path) -> Result<Vec<HostRecord>, FanoutError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        FanoutError::Config(format!(
            "failed to read inventory {}: {}",
            path.display(),
            e
        ))
    })?;
    let hosts = parse(&text)?;
    debug!(path = %path.display(), hosts = hosts.len(), "inventory loaded");
    Ok(hosts)
}

/// Parse and validate inventory YAML.
pub fn parse(text: &str) -> Result<Vec<HostRecord>, FanoutError> {
    let inventory: Inventory = serde_yml::from_str(text)
        .map_err(|e| FanoutError::Config(format!("invalid inventory: {}", e)))?;

    for (index, host) in inventory.servers.iter().enumerate() {
        validate(index, host)?;
    }
    Ok(inventory.servers)
}

fn validate(index: usize, host: &HostRecord) -> Result<(), FanoutError> {
    if host.address.trim().is_empty() {
        return Err(FanoutError::Config(format!(
            "servers[{}]: host must not be empty",
            index
        )));
    }
    if host.username.trim().is_empty() {
        return Err(FanoutError::Config(format!(
            "servers[{}] ({}): username must not be empty",
            index, host.address
        )));
    }
    if host.commands.is_empty() {
        return Err(FanoutError::Config(format!(
            "servers[{}] ({}): at least one command is required",
            index, host.address
        )));
    }
    Ok(())
}

/// Keep only the records whose host equals `filter`.
///
/// Without a filter every record is kept. A filter that matches nothing is an error.
pub fn filter_hosts(
    hosts: Vec<HostRecord>,
    filter: Option<&str>,
) -> Result<Vec<HostRecord>, FanoutError> {
    let Some(filter) = filter else {
        return Ok(hosts);
    };

    let matched: Vec<HostRecord> = hosts
        .into_iter()
        .filter(|h| h.address == filter)
        .collect();

    if matched.is_empty() {
        return Err(FanoutError::Config(format!(
            "No servers matching filter: {}",
            filter
        )));
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
servers:
  - host: web01
    port: 22
    username: deploy
    key_file: /home/deploy/.ssh/id_ed25519
    commands:
      - uptime
      - df -h
  - host: web02
    port: "2222"
    username: admin
    password: s3cret
    fingerprint: "SHA256:9/M2QoBRYmK8ozeYGta0Q6P2D3ZJMTYyDLVGEZ4WSLw"
    commands:
      - sudo -S systemctl restart nginx
"#;

    mod parsing {
        use super::*;

        #[test]
        fn test_parses_all_fields() {
            let hosts = parse(SAMPLE).unwrap();
            assert_eq!(hosts.len(), 2);

            let web01 = &hosts[0];
            assert_eq!(web01.address, "web01");
            assert_eq!(web01.port, Some(22));
            assert_eq!(
                web01.key_file,
                Some(PathBuf::from("/home/deploy/.ssh/id_ed25519"))
            );
            assert_eq!(web01.commands, vec!["uptime", "df -h"]);

            let web02 = &hosts[1];
            assert_eq!(web02.port, Some(2222));
            assert_eq!(web02.configured_password(), Some("s3cret"));
            assert!(web02.fingerprint.is_some());
        }

        #[test]
        fn test_missing_port_defaults() {
            let hosts = parse(
                "servers:\n  - host: db01\n    username: root\n    commands: [uptime]\n",
            )
            .unwrap();
            assert_eq!(hosts[0].port, None);
            assert_eq!(hosts[0].port_or_default(), 22);
        }

        #[test]
        fn test_invalid_port_is_rejected() {
            let err = parse(
                "servers:\n  - host: db01\n    port: ssh\n    username: root\n    commands: [uptime]\n",
            )
            .err()
            .unwrap();
            assert!(matches!(err, FanoutError::Config(_)));
        }

        #[test]
        fn test_malformed_yaml_is_config_error() {
            let err = parse("servers: [").err().unwrap();
            assert!(err.to_string().contains("invalid inventory"));
        }

        #[test]
        fn test_empty_inventory_has_no_hosts() {
            assert!(parse("servers: []\n").unwrap().is_empty());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn test_missing_commands_names_index() {
            let err = parse(
                "servers:\n  - host: a\n    username: u\n    commands: [id]\n  - host: b\n    username: u\n",
            )
            .err()
            .unwrap();
            assert!(err.to_string().contains("servers[1]"));
        }

        #[test]
        fn test_empty_username_is_rejected() {
            let err = parse("servers:\n  - host: a\n    username: ''\n    commands: [id]\n")
                .err()
                .unwrap();
            assert!(err.to_string().contains("username"));
        }
    }

    mod filtering {
        use super::*;

        #[test]
        fn test_no_filter_keeps_everything() {
            let hosts = parse(SAMPLE).unwrap();
            assert_eq!(filter_hosts(hosts, None).unwrap().len(), 2);
        }

        #[test]
        fn test_filter_matches_exact_host() {
            let hosts = parse(SAMPLE).unwrap();
            let kept = filter_hosts(hosts, Some("web02")).unwrap();
            assert_eq!(kept.len(), 1);
            assert_eq!(kept[0].address, "web02");
        }

        #[test]
        fn test_filter_is_not_a_substring_match() {
            let hosts = parse(SAMPLE).unwrap();
            let err = filter_hosts(hosts, Some("web")).err().unwrap();
            assert!(err.to_string().contains("No servers matching filter"));
            assert_eq!(err.scope(), crate::fanout::ErrorScope::Fatal);
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let hosts = load(&path).unwrap();
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.yaml")).err().unwrap();
        assert!(matches!(err, FanoutError::Config(_)));
    }
}
