pub mod avro;
pub mod cli;
pub mod config;
pub mod geoip;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod web;
