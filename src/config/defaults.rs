//! Default configuration constants.

/// Embedded default `vox.toml`, printed by `vox config`. Parsing it yields
/// `Config::default()`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/vox.toml");
/// Agent turns allowed per host turn.
pub(super) const DEFAULT_MAX_TURNS: u32 = 50;
/// Log filter used when neither `VOX_LOG` nor `RUST_LOG` is set.
pub(super) const DEFAULT_LOG_FILTER: &str = "warn";
/// File name looked up in the working directory and the config root.
pub(super) const CONFIG_FILE_NAME: &str = "vox.toml";
