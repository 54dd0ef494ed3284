use clipsync_core::{CallError, ConfigSnapshot, ConnectionMode};
use url::Url;

pub const MAX_SERVER_URL_LEN: usize = 2048;
pub const MAX_DEVICE_NAME_LEN: usize = 128;

/// Checks a submitted settings form and returns the normalised snapshot the
/// host will persist and broadcast.
///
/// Only the fields of the active connection mode are validated. Fields of the
/// inactive mode are kept as submitted.
pub fn validate_settings(form: ConfigSnapshot) -> Result<ConfigSnapshot, CallError> {
    let mut config = form;
    config.server_url = config.server_url.trim().to_owned();
    config.token = config.token.trim().to_owned();
    config.username = config.username.trim().to_owned();
    config.password = config.password.trim().to_owned();
    config.lan_device_name = config.lan_device_name.trim().to_owned();
    config.max_image_kb = config.clamped_max_image_kb();

    let mut errors: Vec<String> = Vec::new();

    match config.connection_mode {
        ConnectionMode::Server => {
            let server_url = config.server_url.as_str();
            if server_url.is_empty() {
                errors.push("Server URL cannot be empty.".to_string());
            } else if server_url.len() > MAX_SERVER_URL_LEN {
                errors.push(format!(
                    "Server URL is too long ({} > {} chars).",
                    server_url.len(),
                    MAX_SERVER_URL_LEN
                ));
            } else {
                match Url::parse(server_url) {
                    Ok(url) => {
                        let scheme = url.scheme();
                        if scheme != "ws" && scheme != "wss" {
                            errors.push(
                                "Server URL must start with ws:// or wss:// (WebSocket).".to_string(),
                            );
                        }
                    }
                    Err(err) => errors.push(format!("Server URL is invalid: {err}")),
                }
            }

            let has_login = !config.username.is_empty() && !config.password.is_empty();
            if config.token.is_empty() && !has_login {
                errors.push("Please provide either a token or a username and password.".to_string());
            }
        }
        ConnectionMode::Lan => {
            if config.lan_device_name.len() > MAX_DEVICE_NAME_LEN {
                errors.push(format!(
                    "Device name is too long ({} > {} chars).",
                    config.lan_device_name.len(),
                    MAX_DEVICE_NAME_LEN
                ));
            }
        }
    }

    match errors.len() {
        0 => Ok(config),
        1 => Err(CallError::Command(errors.remove(0))),
        _ => Err(CallError::Command(format!(
            "Please fix the following:\n\n- {}",
            errors.join("\n- ")
        ))),
    }
}
