use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use store_common::sink::KafkaConfig;

use crate::poller::MarkPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    #[envconfig(from = "FAKE_STORE_API_URL", default = "https://fakestoreapi.com")]
    pub api_base_url: String,

    #[envconfig(from = "API_REQUEST_TIMEOUT", default = "30")]
    pub api_request_timeout: EnvSecsDuration,

    #[envconfig(from = "POLL_INTERVAL_SECONDS", default = "60")]
    pub poll_interval: EnvSecsDuration,

    #[envconfig(default = "before_publish")]
    pub mark_policy: MarkPolicy,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvSecsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvSecsDurationError;

impl FromStr for EnvSecsDuration {
    type Err = ParseEnvSecsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s.parse::<u64>().map_err(|_| ParseEnvSecsDurationError)?;

        Ok(EnvSecsDuration(time::Duration::from_secs(secs)))
    }
}
