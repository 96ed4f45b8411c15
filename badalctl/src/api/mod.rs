//! HTTP API layer: handlers and request/response models.

pub mod handlers;
pub mod models;
