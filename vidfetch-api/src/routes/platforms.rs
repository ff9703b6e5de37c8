/// Supported platforms endpoint
///
/// # Endpoint
///
/// ```text
/// GET /api/platforms
/// ```
///
/// # Response
///
/// ```json
/// {
///   "platforms": [
///     { "name": "YouTube", "id": "youtube", "supported": true },
///     ...
///   ]
/// }
/// ```

use axum::Json;
use serde::Serialize;

/// A video platform the downloader knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// Display name
    pub name: &'static str,

    /// Stable identifier
    pub id: &'static str,

    /// Whether downloads from this platform are supported
    pub supported: bool,
}

/// Known platforms, in display order
pub const PLATFORMS: &[Platform] = &[
    Platform { name: "YouTube", id: "youtube", supported: true },
    Platform { name: "Instagram", id: "instagram", supported: true },
    Platform { name: "TikTok", id: "tiktok", supported: true },
    Platform { name: "Facebook", id: "facebook", supported: true },
    Platform { name: "Twitter/X", id: "twitter", supported: true },
    Platform { name: "Vimeo", id: "vimeo", supported: true },
];

/// Platform list response
#[derive(Debug, Serialize)]
pub struct PlatformsResponse {
    pub platforms: &'static [Platform],
}

/// Lists supported platforms
pub async fn list_platforms() -> Json<PlatformsResponse> {
    Json(PlatformsResponse { platforms: PLATFORMS })
}
