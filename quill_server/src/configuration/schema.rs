use crate::configuration::ApplicationProfile;
use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use quill::configuration::AppConfig;
use quill::web::server::IncomingStream;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::net::SocketAddr;

#[derive(serde::Deserialize, Debug, Clone)]
/// The top-level configuration object, determining the schema
/// we expect to see in the configuration files stored under `quill_server/configuration`.
///
/// It bundles together the app configuration ([`AppConfig`])
/// and the HTTP server configuration ([`ServerConfig`]).
/// The app configuration is used to build the application state,
/// while the HTTP server configuration is only used by the binary.
pub struct Config {
    pub server: ServerConfig,
    #[serde(flatten)]
    pub app: AppConfig,
}

impl Config {
    /// Retrieve the application configuration by merging multiple configuration sources.
    ///
    /// # Application profiles
    ///
    /// Configuration values may differ depending on the type of environment
    /// the application is running in.
    /// The values for different profiles are never co-located in the same file,
    /// which makes it harder to leak secrets by mistake.
    ///
    /// The profile is read from the `APP_PROFILE` environment variable.
    /// You can pass a `default_profile` value that will be used if the environment variable
    /// is not set.
    ///
    /// # Hierarchy
    ///
    /// The configuration sources are:
    ///
    /// 1. `base.yml` - Contains the default configuration values, common to all profiles.
    /// 2. `<profile>.yml` - Contains the configuration values specific to the desired profile.
    /// 3. Environment variables - Contains the configuration values specific to the current environment.
    ///
    /// The configuration sources are listed in priority order, i.e.
    /// the last source in the list will override any previous source.
    ///
    /// For example, `APP_SERVER__PORT=8080` overrides the `server.port` value
    /// set in either YAML file.
    pub fn load(default_profile: Option<ApplicationProfile>) -> Result<Config, anyhow::Error> {
        let application_profile = ApplicationProfile::load(default_profile)
            .context("Failed to load the desired application profile")?;
        Self::load_profile(application_profile)
    }

    /// Retrieve the configuration for the given profile, ignoring `APP_PROFILE`.
    ///
    /// See [`Config::load`] for the configuration hierarchy.
    pub fn load_profile(application_profile: ApplicationProfile) -> Result<Config, anyhow::Error> {
        let configuration_dir = {
            let manifest_dir = env!(
                "CARGO_MANIFEST_DIR",
                "`CARGO_MANIFEST_DIR` was not set. Are you using a custom build system?"
            );
            std::path::Path::new(manifest_dir).join("configuration")
        };

        let base_filepath = configuration_dir.join("base.yml");

        let profile_filename = format!("{}.yml", application_profile.as_str());
        let profile_filepath = configuration_dir.join(profile_filename);

        let figment = Figment::new()
            .merge(Yaml::file(base_filepath))
            .merge(Yaml::file(profile_filepath))
            .merge(Env::prefixed("APP_").split("__"));

        let configuration: Config = figment
            .extract()
            .context("Failed to load hierarchical configuration")?;
        Ok(configuration)
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
/// Configuration for the HTTP server used to expose the blog to users.
pub struct ServerConfig {
    /// The port that the server must listen on.
    ///
    /// Set it to `0` to let the OS pick a random port.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    /// The network interface that the server must be bound to.
    ///
    /// E.g. `0.0.0.0` for listening to incoming requests from
    /// all sources.
    pub ip: std::net::IpAddr,
    /// The timeout for graceful shutdown of the server.
    ///
    /// E.g. `1 minute` for a 1 minute timeout.
    ///
    /// Set to `0` if you want the application to immediately shutdown.
    #[serde(with = "humantime_serde")]
    pub graceful_shutdown_timeout: std::time::Duration,
}

impl ServerConfig {
    /// Bind a TCP listener according to the specified parameters.
    pub async fn listener(&self) -> Result<IncomingStream, std::io::Error> {
        let addr = SocketAddr::new(self.ip, self.port);
        IncomingStream::bind(addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::configuration::ApplicationProfile;

    #[test]
    fn every_profile_yields_a_complete_configuration() {
        // `prod` expects the cookie secret to come from the environment.
        for profile in [ApplicationProfile::Dev, ApplicationProfile::Test] {
            let config = Config::load_profile(profile)
                .unwrap_or_else(|e| panic!("Failed to load `{}`: {e:?}", profile.as_str()));
            assert!(config.app.cookie.key().is_ok());
        }
    }

    #[test]
    fn the_test_profile_allows_cookies_over_plain_http() {
        let config = Config::load_profile(ApplicationProfile::Test).unwrap();
        assert!(!config.app.session.cookie.secure);
        assert_eq!(config.server.port, 0);
    }
}
