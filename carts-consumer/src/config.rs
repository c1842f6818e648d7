use envconfig::Envconfig;
use rdkafka::ClientConfig;

use store_common::warehouse::WarehouseConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    /// Maximum number of messages being handled at once.
    #[envconfig(from = "MAX_IN_FLIGHT", default = "10")]
    pub max_in_flight: usize,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConsumerConfig,

    #[envconfig(nested = true)]
    pub warehouse: WarehouseConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConsumerConfig {
    #[envconfig(default = "kafka:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "carts_events")]
    pub kafka_topic: String,
    #[envconfig(default = "carts-consumer")]
    pub kafka_consumer_group: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

impl From<&KafkaConsumerConfig> for ClientConfig {
    fn from(config: &KafkaConsumerConfig) -> Self {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &config.kafka_consumer_group)
            // Offsets are stored only when a message is acked
            .set("enable.auto.offset.store", "false");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };
        client_config
    }
}
