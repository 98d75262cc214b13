//! Environment overrides (`VOX_*`).

use crate::error::ConfigError;
use crate::protocol::PermissionMode;
use std::path::PathBuf;

use super::Config;

pub(super) const ENV_PERMISSION_MODE: &str = "VOX_PERMISSION_MODE";
pub(super) const ENV_CWD: &str = "VOX_CWD";
pub(super) const ENV_MAX_TURNS: &str = "VOX_MAX_TURNS";

pub(super) fn apply_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(raw) = non_empty(env_lookup, ENV_PERMISSION_MODE) {
        config.session.permission_mode = raw
            .parse::<PermissionMode>()
            .map_err(|e| ConfigError::Invalid(format!("invalid {ENV_PERMISSION_MODE}: {e}")))?;
    }
    if let Some(raw) = non_empty(env_lookup, ENV_CWD) {
        config.session.cwd = Some(PathBuf::from(raw));
    }
    if let Some(raw) = non_empty(env_lookup, ENV_MAX_TURNS) {
        config.agent.max_turns = raw
            .parse::<u32>()
            .ok()
            .filter(|turns| *turns > 0)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "invalid {ENV_MAX_TURNS} value `{raw}`: expected a positive integer"
                ))
            })?;
    }
    Ok(())
}

fn non_empty<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
