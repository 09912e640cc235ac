use secrecy::Secret;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub api: ApiSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Mark the session cookie `Secure`. Enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Deserialize, Clone)]
pub struct BackendSettings {
    /// Base URL of the backend service (auth + REST), e.g. http://localhost:54321.
    pub url: String,
    /// Public anon key sent as the `apikey` header on every backend call.
    pub anon_key: Secret<String>,
}

#[derive(Deserialize, Clone)]
pub struct ApiSettings {
    /// Base URL of the CRM API. Requests go to `<base_url>/api/<endpoint>`.
    pub base_url: String,
}

#[derive(Deserialize, Clone)]
pub struct ObservabilitySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP/gRPC collector endpoint. Span export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "crm-portal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("Failed to determine the current directory: {}", e)))?;

    // Support running from the workspace root or from the crate directory
    let configuration_directory = if base_path.ends_with("crm-portal") {
        base_path.join("config")
    } else {
        base_path.join("crm-portal").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn deserializes_without_observability_section() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
server:
  host: "127.0.0.1"
  port: 9000
backend:
  url: "http://backend"
  anon_key: "anon"
api:
  base_url: "http://api"
"#,
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert!(!settings.server.secure_cookies);
        assert_eq!(settings.backend.anon_key.expose_secret(), "anon");
        assert_eq!(settings.observability.service_name, "crm-portal");
        assert!(settings.observability.otlp_endpoint.is_none());
    }
}
