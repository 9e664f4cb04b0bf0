use actix_web::{HttpRequest, HttpResponse, web};
use log::error;
use serde::Serialize;
use serde_json::json;
use shared::{DetectionListResponse, VerifyDetectionRequest};

use crate::db::detection_repository::{DetectionRepository, RepositoryError};
use crate::detection::event::S3Event;
use crate::detection::pipeline::{ImageOutcome, IngestionPipeline};
use crate::labels::rekognition_service::RekognitionService;
use crate::storage::s3_service::S3Service;

/// The ingestion pipeline wired to the real AWS collaborators.
pub type AwsPipeline = IngestionPipeline<S3Service, RekognitionService, DetectionRepository>;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/events").route(web::post().to(handle_event)))
        .service(web::resource("/api/detections").route(web::get().to(list_detections)))
        .service(
            web::resource("/api/detections/{id}/verify").route(web::post().to(verify_detection)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Identity is established upstream; the header carries an already
/// authenticated user id.
fn owner_from_request(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Receives an S3 event notification body and runs the ingestion pipeline
/// over its records. Always answers 200: per-image failures are reported in
/// the body, never as a request failure that would requeue the whole batch.
async fn handle_event(
    pipeline: web::Data<AwsPipeline>,
    event: web::Json<S3Event>,
) -> HttpResponse {
    let outcomes = pipeline.process_event(&event).await;

    let results: Vec<serde_json::Value> = outcomes
        .into_iter()
        .map(|(key, outcome)| match outcome {
            ImageOutcome::Persisted { sort_key } => {
                json!({ "key": key, "status": "persisted", "sort_key": sort_key })
            }
            ImageOutcome::Skipped => json!({ "key": key, "status": "skipped" }),
            ImageOutcome::Failed { reason } => {
                json!({ "key": key, "status": "failed", "error": reason })
            }
        })
        .collect();

    HttpResponse::Ok().json(json!({ "results": results }))
}

async fn list_detections(
    repo: web::Data<DetectionRepository>,
    req: HttpRequest,
) -> HttpResponse {
    let Some(owner) = owner_from_request(&req) else {
        return HttpResponse::Unauthorized().json(ErrorResponse {
            error: "Missing x-user-id header".into(),
        });
    };

    match repo.list_detections(&owner).await {
        Ok(records) => HttpResponse::Ok().json(DetectionListResponse {
            detections: records.iter().map(|record| record.to_view()).collect(),
        }),
        Err(e) => {
            error!("Failed to query detections for {}: {:?}", owner, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to retrieve detections".into(),
            })
        }
    }
}

async fn verify_detection(
    repo: web::Data<DetectionRepository>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<VerifyDetectionRequest>,
) -> HttpResponse {
    let Some(owner) = owner_from_request(&req) else {
        return HttpResponse::Unauthorized().json(ErrorResponse {
            error: "Missing x-user-id header".into(),
        });
    };
    let detection_id = path.into_inner();

    match repo
        .verify_detection(&owner, &detection_id, body.is_verified, body.is_deer)
        .await
    {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(RepositoryError::NotFound) => HttpResponse::NotFound().json(ErrorResponse {
            error: "Detection not found".into(),
        }),
        Err(e) => {
            error!(
                "Failed to update detection {} for {}: {:?}",
                detection_id, owner, e
            );
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to update detection".into(),
            })
        }
    }
}
