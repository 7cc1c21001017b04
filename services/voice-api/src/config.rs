use std::net::SocketAddr;
use std::path::PathBuf;

use common_auth::SesameSettings;
use common_config::{env_string, env_u64, service_port, ServiceConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceApiConfig {
    pub bind_address: String,
    pub port: u16,
    pub sesame: SesameSettings,
}

impl Default for VoiceApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            sesame: SesameSettings::default(),
        }
    }
}

impl VoiceApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_address, self.port).parse()
    }
}

impl ServiceConfig for VoiceApiConfig {
    const PREFIX: &'static str = "VOICE_API_";

    fn apply_environment_overrides(&mut self, prefix: &str) {
        if let Some(address) = env_string(&format!("{prefix}BIND_ADDRESS")) {
            self.bind_address = address;
        }
        self.port = service_port(&format!("{prefix}PORT"), self.port);

        let sesame = &mut self.sesame;
        let var = |name: &str| format!("{prefix}SESAME_{name}");
        if let Some(endpoint) = env_string(&var("TOKEN_ENDPOINT")) {
            sesame.token_endpoint = endpoint;
        }
        if let Some(key) = env_string(&var("API_KEY")) {
            sesame.api_key = key;
        }
        if let Some(token) = env_string(&var("REFRESH_TOKEN")) {
            sesame.refresh_token = Some(token);
        }
        if let Some(path) = env_string(&var("TOKEN_CACHE_PATH")) {
            sesame.token_cache_path = Some(PathBuf::from(path));
        }
        if let Some(skew) = env_u64(&var("REFRESH_SKEW_SECS")) {
            sesame.refresh_skew_secs = skew;
        }
        if let Some(timeout) = env_u64(&var("REQUEST_TIMEOUT_MS")) {
            sesame.request_timeout_ms = timeout;
        }
    }
}
