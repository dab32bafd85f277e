//! Request and response types for the HTTP API.

use serde::Serialize;

pub use crate::catalog::CatalogResponse;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}
