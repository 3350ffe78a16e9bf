pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod handlers;
pub mod humanize;
pub mod ingest;
pub mod ledger;
pub mod observability;
pub mod proto;
pub mod staging;
pub mod storage;
pub mod worker;
