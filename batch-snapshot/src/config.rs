use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "FAKE_STORE_API_URL", default = "https://fakestoreapi.com")]
    pub api_base_url: String,

    #[envconfig(from = "API_REQUEST_TIMEOUT", default = "30")]
    pub api_request_timeout_secs: u64,

    #[envconfig(from = "GCS_RAW_BUCKET")]
    pub raw_bucket: String,
}
