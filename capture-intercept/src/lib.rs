pub mod api;
pub mod config;
pub mod endpoints;
pub mod event;
pub mod intercept;
pub mod lz64;
pub mod payload;
pub mod pipeline;
pub mod relay;
pub mod sinks;
pub mod time;
