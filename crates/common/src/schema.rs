//! Cloud-init document schema
//!
//! Typed representation of every provisioning directive we emit, with
//! defaults matching the cloud-init module reference. Deserialization rejects
//! unknown fields instead of silently dropping them; `CloudConfig::validate`
//! checks the constraints serde cannot express.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Placeholder tokens the cloud-init consumer expands in the final message
pub const FINAL_MESSAGE_TOKENS: &[&str] = &["$version", "$timestamp", "$datasource", "$uptime"];

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_owner() -> String {
    "root:root".to_string()
}

fn default_encoding() -> String {
    "b64".to_string()
}

fn default_timezone() -> String {
    "America/Vancouver".to_string()
}

fn default_metadata_url() -> String {
    "http://169.254.169.254".to_string()
}

// ============================================================================
// Datasource
// ============================================================================

/// Connection parameters shared by every datasource provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct DatasourceParams {
    pub url: String,
    pub retries: u32,
    pub timeout: u32,
    pub wait: u32,
}

impl Default for DatasourceParams {
    fn default() -> Self {
        Self {
            url: default_metadata_url(),
            retries: 3,
            timeout: 2,
            wait: 2,
        }
    }
}

/// Closed set of datasource provider tags.
///
/// Serialized by hand as a single-key mapping (`Vultr: {...}`): the derived
/// externally-tagged form comes out of serde_yaml as a `!Vultr` local tag,
/// which the cloud-init consumer does not parse.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum Datasource {
    Vultr(DatasourceParams),
    DigitalOcean(DatasourceParams),
}

impl Datasource {
    fn parts(&self) -> (&'static str, &DatasourceParams) {
        match self {
            Datasource::Vultr(params) => ("Vultr", params),
            Datasource::DigitalOcean(params) => ("DigitalOcean", params),
        }
    }
}

impl Serialize for Datasource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let (provider, params) = self.parts();
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(provider, params)?;
        map.end()
    }
}

// ============================================================================
// Power state
// ============================================================================

/// Power-state delay: the literal "now" or a non-negative number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDelay {
    Now,
    Seconds(u32),
}

impl Serialize for PowerDelay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PowerDelay::Now => serializer.serialize_str("now"),
            PowerDelay::Seconds(s) => serializer.serialize_u32(*s),
        }
    }
}

impl<'de> Deserialize<'de> for PowerDelay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u32),
            Literal(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(s) => Ok(PowerDelay::Seconds(s)),
            Raw::Literal(s) if s == "now" => Ok(PowerDelay::Now),
            Raw::Literal(s) => Err(serde::de::Error::custom(format!(
                "power_state delay must be \"now\" or seconds, got {s:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    Reboot,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct PowerState {
    pub delay: PowerDelay,
    pub mode: PowerMode,
    pub message: String,
    pub condition: bool,
}

impl Default for PowerState {
    fn default() -> Self {
        Self {
            delay: PowerDelay::Now,
            mode: PowerMode::Reboot,
            message: "Rebooting machine".to_string(),
            condition: true,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// Sudo grant: a flat boolean, one rule, or a rule list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SudoSpec {
    Enabled(bool),
    Rule(String),
    Rules(Vec<String>),
}

impl Default for SudoSpec {
    fn default() -> Self {
        SudoSpec::Enabled(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub name: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub sudo: SudoSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_import_id: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_authorized_keys: Option<Vec<String>>,
}

// ============================================================================
// Files
// ============================================================================

/// One embedded file for the write_files section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteFile {
    /// Absolute target path on the destination host
    pub path: String,
    /// Transport-safe encoded content
    pub content: String,
    /// Four-digit octal permission string, e.g. "0644"
    pub permissions: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

// ============================================================================
// Package sources
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AptSource {
    pub source: String,
    pub keyid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyserver: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Apt {
    pub sources: BTreeMap<String, AptSource>,
}

// ============================================================================
// Misc sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Ntp {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
}

impl Default for Ntp {
    fn default() -> Self {
        Self {
            enabled: true,
            pools: None,
            servers: None,
            peers: None,
            allow: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PhoneHome {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Vec<String>>,
    #[serde(default = "PhoneHome::default_tries")]
    pub tries: u32,
}

impl PhoneHome {
    fn default_tries() -> u32 {
        10
    }
}

/// runcmd entry: argv-style sequence or a raw shell string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RunCmd {
    Shell(String),
    Argv(Vec<String>),
}

// ============================================================================
// Root document
// ============================================================================

/// The assembled provisioning document, serialized once per generation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    pub users: Vec<User>,
    #[serde(default)]
    pub write_files: Vec<WriteFile>,
    pub datasource: Datasource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<Apt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runcmd: Option<Vec<RunCmd>>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub package_update: bool,
    #[serde(default = "default_true")]
    pub package_upgrade: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
    #[serde(default)]
    pub ntp: Ntp,
    #[serde(default = "default_true")]
    pub resize_rootfs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_pwauth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_home: Option<PhoneHome>,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
}

impl CloudConfig {
    /// Load a manifest from a TOML file. `write_files` normally stays empty
    /// here and is filled by the embedder.
    pub fn load_manifest(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints the type system cannot enforce
    pub fn validate(&self) -> Result<()> {
        for user in &self.users {
            if user.name.is_empty() {
                return Err(Error::Validation("user with empty name".to_string()));
            }
        }

        for file in &self.write_files {
            if !is_octal_permissions(&file.permissions) {
                return Err(Error::Validation(format!(
                    "{}: permissions must be four octal digits, got {:?}",
                    file.path, file.permissions
                )));
            }
            if !file.path.starts_with('/') {
                return Err(Error::Validation(format!(
                    "write_files path must be absolute, got {:?}",
                    file.path
                )));
            }
        }

        if let Some(apt) = &self.apt {
            for (name, source) in &apt.sources {
                if source.keyid.is_empty() {
                    return Err(Error::Validation(format!("apt source {name}: empty keyid")));
                }
            }
        }

        if let Some(message) = &self.final_message {
            for token in placeholder_tokens(message) {
                if !FINAL_MESSAGE_TOKENS.contains(&token.as_str()) {
                    return Err(Error::Validation(format!(
                        "final_message: unrecognized placeholder {token}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_octal_permissions(s: &str) -> bool {
    s.len() == 4 && s.chars().all(|c| ('0'..='7').contains(&c))
}

fn placeholder_tokens(message: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let bytes = message.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                i += 1;
            }
            if i > start + 1 {
                tokens.push(message[start..i].to_string());
            }
        } else {
            i += 1;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CloudConfig {
        CloudConfig {
            users: vec![User {
                name: "admin".to_string(),
                shell: default_shell(),
                groups: None,
                sudo: SudoSpec::Rules(vec!["ALL=(ALL) NOPASSWD:ALL".to_string()]),
                ssh_import_id: Some(vec!["gh:admin".to_string()]),
                ssh_authorized_keys: None,
            }],
            write_files: Vec::new(),
            datasource: Datasource::Vultr(DatasourceParams::default()),
            apt: None,
            runcmd: None,
            timezone: default_timezone(),
            package_update: true,
            package_upgrade: true,
            packages: None,
            ntp: Ntp::default(),
            resize_rootfs: true,
            ssh_pwauth: None,
            disable_root: None,
            phone_home: None,
            power_state: PowerState::default(),
            final_message: None,
        }
    }

    #[test]
    fn validate_accepts_minimal() {
        minimal().validate().unwrap();
    }

    #[test]
    fn power_delay_round_trips() {
        let now: PowerDelay = serde_yaml::from_str("now").unwrap();
        assert_eq!(now, PowerDelay::Now);
        let secs: PowerDelay = serde_yaml::from_str("30").unwrap();
        assert_eq!(secs, PowerDelay::Seconds(30));
        assert!(serde_yaml::from_str::<PowerDelay>("later").is_err());
        assert!(serde_yaml::from_str::<PowerDelay>("-5").is_err());
    }

    #[test]
    fn power_mode_is_closed() {
        assert!(serde_yaml::from_str::<PowerMode>("reboot").is_ok());
        assert!(serde_yaml::from_str::<PowerMode>("shutdown").is_ok());
        assert!(serde_yaml::from_str::<PowerMode>("hibernate").is_err());
    }

    #[test]
    fn datasource_serializes_as_single_key_mapping() {
        let ds = Datasource::DigitalOcean(DatasourceParams::default());
        let yaml = serde_yaml::to_string(&ds).unwrap();
        assert!(yaml.starts_with("DigitalOcean:"));
        assert!(!yaml.contains('!'));

        let back: Datasource = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<User>("name = \"x\"\nlogin_shell = \"/bin/sh\"");
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_bad_permissions() {
        let mut config = minimal();
        config.write_files.push(WriteFile {
            path: "/etc/motd".to_string(),
            content: String::new(),
            permissions: "644".to_string(),
            owner: default_owner(),
            encoding: default_encoding(),
        });
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn validate_rejects_unknown_placeholder() {
        let mut config = minimal();
        config.final_message = Some("done at $timestamp on $hostname".to_string());
        assert!(matches!(config.validate(), Err(Error::Validation(_))));

        config.final_message =
            Some("version: $version uptime: $uptime ds: $datasource".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn manifest_toml_parses() {
        let manifest = r#"
packages = ["fail2ban", "wireguard"]
runcmd = [["systemctl", "enable", "fail2ban.service"], "wg show"]

[[users]]
name = "admin"
sudo = ["ALL=(ALL) NOPASSWD:ALL"]
ssh_import_id = ["gh:admin"]

[datasource.Vultr]

[apt.sources."docker.list"]
source = "deb [arch=amd64] https://download.docker.com/linux/ubuntu $RELEASE stable"
keyid = "9DC858229FC7DD38854AE2D88D81803C0EBFCD88"
"#;
        let config: CloudConfig = toml::from_str(manifest).unwrap();
        config.validate().unwrap();
        assert_eq!(config.users[0].name, "admin");
        assert!(matches!(config.datasource, Datasource::Vultr(_)));
        let runcmd = config.runcmd.unwrap();
        assert!(matches!(runcmd[0], RunCmd::Argv(_)));
        assert!(matches!(runcmd[1], RunCmd::Shell(_)));
    }
}
