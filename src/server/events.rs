//! Event ingestion endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use tracing::{debug, warn};

use super::AppState;
use crate::dispatch::{ExecutionBackend, TaskResult};
use crate::events::{ConfigResolver, EventRecord};
use crate::forge::Forge;

/// Runs one normalized event through the processor.
///
/// The body is decoded here rather than through the `Json` extractor so a
/// record no parser understands is still counted (as not handled) instead
/// of being refused before it reaches the processor. The response is always
/// 200 with the list of task results, possibly empty.
///
/// # Example
///
/// ```ignore
/// POST /events HTTP/1.1
/// Content-Type: application/json
///
/// {"kind": "comment", "on": "pull_request", "number": 42, "comment_id": 7,
///  "body": "/packit build", "forge": "github",
///  "project_url": "https://github.com/packit/ogr",
///  "created_at": "2024-01-01T00:00:00Z"}
///
/// HTTP/1.1 200 OK
///
/// [{"success": true, "details": {"msg": "Job created.", ...}}]
/// ```
pub async fn events_handler<R, F, B>(
    State(app_state): State<AppState<R, F, B>>,
    body: Bytes,
) -> Json<Vec<TaskResult>>
where
    R: ConfigResolver + 'static,
    F: Forge + 'static,
    B: ExecutionBackend + 'static,
{
    let record = match serde_json::from_slice::<EventRecord>(&body) {
        Ok(record) => {
            debug!(project = %record.project_url, "received event");
            Some(record)
        }
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "unrecognized event payload");
            None
        }
    };

    Json(app_state.processor().process_message(record).await)
}
