use envconfig::Envconfig;

use crate::endpoints::EndpointSet;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "ingestion.zetta.so,app.posthog.com,us.posthog.com,eu.posthog.com")]
    pub capture_endpoints: EndpointSet,

    // Stamped on extracted events, the request URL is used when unset
    pub page_url: Option<String>,

    #[envconfig(default = "26214400")] // 25MiB
    pub max_decompressed_size: usize,

    // Log messages through tracing instead of writing them to stdout
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "false")]
    pub log_json: bool,
}
