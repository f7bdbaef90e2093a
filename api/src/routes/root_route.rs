//! GET /: liveness banner.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Banner {
    pub message: &'static str,
}

pub async fn root() -> Json<Banner> {
    Json(Banner {
        message: "Documentation Agent Backend is running",
    })
}
