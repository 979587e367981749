use errors::{ChannelError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

/// Transport endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Stdin,
    Stdout,
    Stderr,
    Side(u32),
    Named(String),
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Stdin => write!(f, "stdin"),
            ChannelId::Stdout => write!(f, "stdout"),
            ChannelId::Stderr => write!(f, "stderr"),
            ChannelId::Side(n) => write!(f, "side:{n}"),
            ChannelId::Named(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ChannelId {
    type Err = errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChannelError::InvalidId(s.to_string()).into());
        }
        Ok(match s {
            "stdin" => ChannelId::Stdin,
            "stdout" => ChannelId::Stdout,
            "stderr" => ChannelId::Stderr,
            other => match other.strip_prefix("side:") {
                Some(n) => match n.parse::<u32>() {
                    Ok(n) => ChannelId::Side(n),
                    Err(_) => return Err(ChannelError::InvalidId(other.to_string()).into()),
                },
                None => ChannelId::Named(other.to_string()),
            },
        })
    }
}

/// The two behavior bits attached to every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    /// Terminate the process on EOF (read) or broken pipe (write).
    pub exit_on_close: bool,
    /// Swallow transient write errors so the caller may retry.
    pub retry: bool,
}

impl ChannelPolicy {
    /// Built-in defaults: the standard streams are load-bearing, everything
    /// else is best-effort.
    pub fn default_for(id: &ChannelId) -> ChannelPolicy {
        match id {
            ChannelId::Stdin | ChannelId::Stdout | ChannelId::Stderr => ChannelPolicy {
                exit_on_close: true,
                retry: false,
            },
            _ => ChannelPolicy {
                exit_on_close: false,
                retry: false,
            },
        }
    }
}

/// Partial policy supplied by a module for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    pub exit_on_close: Option<bool>,
    pub retry: Option<bool>,
}

impl PolicyOverride {
    pub fn exit_on_close(value: bool) -> Self {
        PolicyOverride {
            exit_on_close: Some(value),
            retry: None,
        }
    }

    pub fn retry(value: bool) -> Self {
        PolicyOverride {
            exit_on_close: None,
            retry: Some(value),
        }
    }

    pub fn with_retry(mut self, value: bool) -> Self {
        self.retry = Some(value);
        self
    }
}

#[derive(Debug, Default)]
struct GlobalOverrides {
    exit_on_close: HashMap<ChannelId, bool>,
    retry: HashMap<ChannelId, bool>,
}

static GLOBAL: Lazy<RwLock<GlobalOverrides>> = Lazy::new(|| RwLock::new(GlobalOverrides::default()));

/// Parses the `channelId=bool,...` form of `--exit-on-close` / `--retry`.
pub fn parse_policy_map(raw: &str) -> Result<HashMap<ChannelId, bool>> {
    let mut map = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (id, value) = entry
            .split_once('=')
            .ok_or_else(|| ChannelError::InvalidOverride(entry.to_string()))?;
        let id = ChannelId::from_str(id)?;
        let value = match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => return Err(ChannelError::InvalidOverride(entry.to_string()).into()),
        };
        map.insert(id, value);
    }
    Ok(map)
}

/// Installs the process-wide policy maps from the global parameters.
pub fn set_global_overrides(
    exit_on_close: Option<&str>,
    retry: Option<&str>,
) -> Result<()> {
    let mut global = GLOBAL.write().expect("channel policy lock poisoned");
    if let Some(raw) = exit_on_close {
        global.exit_on_close = parse_policy_map(raw)?;
    }
    if let Some(raw) = retry {
        global.retry = parse_policy_map(raw)?;
    }
    Ok(())
}

#[cfg(test)]
pub fn clear_global_overrides() {
    let mut global = GLOBAL.write().expect("channel policy lock poisoned");
    global.exit_on_close.clear();
    global.retry.clear();
}

/// Effective policy for one operation.
///
/// Precedence, later wins: built-in default, module-supplied option, legacy
/// `linger` alias (`exit_on_close = !linger`), global parameter map.
pub fn resolve(
    id: &ChannelId,
    option: PolicyOverride,
    linger: Option<bool>,
) -> ChannelPolicy {
    let mut policy = ChannelPolicy::default_for(id);
    if let Some(value) = option.exit_on_close {
        policy.exit_on_close = value;
    }
    if let Some(value) = option.retry {
        policy.retry = value;
    }
    if let Some(linger) = linger {
        policy.exit_on_close = !linger;
    }
    let global = GLOBAL.read().expect("channel policy lock poisoned");
    if let Some(value) = global.exit_on_close.get(id) {
        policy.exit_on_close = *value;
    }
    if let Some(value) = global.retry.get(id) {
        policy.retry = *value;
    }
    policy
}
