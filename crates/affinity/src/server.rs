/// Actix-web HTTP server for the affinity service
///
/// Port: 8084
/// Endpoints:
/// - GET /health - Component health with aggregate status code
/// - GET /stats - Engine aggregate sizes and queue statistics
/// - POST /api/v1/actions - Submit a user action for processing
/// - GET /api/v1/events/{event_id}/similar - Similar events lookup
/// - GET /api/v1/interactions/count - Interaction weight totals
/// - GET /api/v1/users/{user_id}/predictions - Predicted event scores
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use agora_core::health::HealthChecker;
use agora_core::{ActionKind, UserActionEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::config::{ScoringConfig, ServerConfig};
use crate::engine::SimilarityEngine;
use crate::queue::{ActionQueue, QueueStats};
use crate::repository::ScoredEvent;
use crate::scorer::RecommendationScorer;

/// Server state shared across handlers
pub struct ServerState {
    pub scorer: Arc<RecommendationScorer>,
    pub queue: Arc<dyn ActionQueue>,
    pub engine: Arc<SimilarityEngine>,
    pub health_checker: Arc<HealthChecker>,
    pub scoring: ScoringConfig,
}

/// Health check endpoint
#[get("/health")]
async fn health_check(state: web::Data<ServerState>) -> impl Responder {
    let health = state.health_checker.check_all().await;

    let status = actix_web::http::StatusCode::from_u16(health.http_status_code())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(health)
}

/// Service statistics endpoint
#[get("/stats")]
async fn service_stats(state: web::Data<ServerState>) -> impl Responder {
    let store = state.engine.store();
    let aggregates = AggregateStats {
        tracked_users: store.tracked_users(),
        tracked_events: store.tracked_events(),
        tracked_pairs: store.tracked_pairs(),
    };

    match state.queue.stats().await {
        Ok(queue) => HttpResponse::Ok().json(StatsResponse { queue, aggregates }),
        Err(e) => {
            error!(error = %e, "Failed to read queue stats");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Queue unavailable"
            }))
        }
    }
}

/// Submit action endpoint
#[post("/api/v1/actions")]
async fn submit_action(
    req: web::Json<SubmitActionRequest>,
    state: web::Data<ServerState>,
) -> impl Responder {
    let action = UserActionEvent::new(req.user_id, req.event_id, req.action);

    if let Err(e) = action.validate() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": e.to_string()
        }));
    }

    match state.queue.enqueue(action.clone()).await {
        Ok(message_id) => HttpResponse::Accepted().json(SubmitActionResponse {
            accepted: true,
            message_id,
            action_id: action.action_id.to_string(),
        }),
        Err(e) => {
            error!(user_id = req.user_id, event_id = req.event_id, error = %e, "Failed to enqueue action");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Queue unavailable"
            }))
        }
    }
}

/// Similar events endpoint
#[get("/api/v1/events/{event_id}/similar")]
async fn similar_events(
    path: web::Path<i64>,
    query: web::Query<SimilarEventsQuery>,
    state: web::Data<ServerState>,
) -> impl Responder {
    let event_id = path.into_inner();

    let limit = match resolve_limit(query.limit, &state.scoring) {
        Ok(limit) => limit,
        Err(response) => return response,
    };

    // Without a user there is no history to exclude.
    let user_id = query.user_id.unwrap_or(0);

    let timeout = state.scoring.query_timeout(query.timeout_ms);
    match tokio::time::timeout(
        timeout,
        state.scorer.find_similar_events(event_id, user_id, limit),
    )
    .await
    {
        Ok(Ok(results)) => HttpResponse::Ok().json(SimilarEventsResponse {
            event_id,
            total: results.len(),
            results,
        }),
        Ok(Err(e)) => {
            error!(event_id = event_id, error = %e, "Similar events query failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query similar events"
            }))
        }
        Err(_) => HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": "Query timed out"
        })),
    }
}

/// Interaction count endpoint
#[get("/api/v1/interactions/count")]
async fn interactions_count(
    query: web::Query<InteractionsCountQuery>,
    state: web::Data<ServerState>,
) -> impl Responder {
    let event_ids: Result<Vec<i64>, _> = query
        .event_ids
        .split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect();

    let event_ids = match event_ids {
        Ok(ids) if !ids.is_empty() => ids,
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "event_ids must be a comma-separated list of integer ids"
            }));
        }
    };

    let timeout = state.scoring.query_timeout(query.timeout_ms);
    match tokio::time::timeout(timeout, state.scorer.interactions_count(&event_ids)).await {
        Ok(Ok(results)) => HttpResponse::Ok().json(InteractionsCountResponse {
            total: results.len(),
            results,
        }),
        Ok(Err(e)) => {
            error!(error = %e, "Interaction count query failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query interaction counts"
            }))
        }
        Err(_) => HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": "Query timed out"
        })),
    }
}

/// User predictions endpoint
#[get("/api/v1/users/{user_id}/predictions")]
async fn user_predictions(
    path: web::Path<i64>,
    query: web::Query<PredictionsQuery>,
    state: web::Data<ServerState>,
) -> impl Responder {
    let user_id = path.into_inner();

    let limit = match resolve_limit(query.limit, &state.scoring) {
        Ok(limit) => limit,
        Err(response) => return response,
    };

    let timeout = state.scoring.query_timeout(query.timeout_ms);
    match tokio::time::timeout(timeout, state.scorer.user_predictions(user_id, limit)).await {
        Ok(Ok(results)) => HttpResponse::Ok().json(PredictionsResponse {
            user_id,
            total: results.len(),
            results,
        }),
        Ok(Err(e)) => {
            error!(user_id = user_id, error = %e, "Prediction query failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to compute predictions"
            }))
        }
        Err(_) => HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": "Query timed out"
        })),
    }
}

fn resolve_limit(requested: Option<i64>, scoring: &ScoringConfig) -> Result<i64, HttpResponse> {
    match requested {
        Some(limit) if limit <= 0 => Err(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "limit must be a positive integer"
        }))),
        Some(limit) => Ok(limit),
        None => Ok(scoring.default_max_results as i64),
    }
}

/// Request/Response types

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub queue: QueueStats,
    pub aggregates: AggregateStats,
}

#[derive(Debug, Serialize)]
pub struct AggregateStats {
    pub tracked_users: usize,
    pub tracked_events: usize,
    pub tracked_pairs: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitActionRequest {
    pub user_id: i64,
    pub event_id: i64,
    pub action: ActionKind,
}

#[derive(Debug, Serialize)]
pub struct SubmitActionResponse {
    pub accepted: bool,
    pub message_id: String,
    pub action_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SimilarEventsQuery {
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SimilarEventsResponse {
    pub event_id: i64,
    pub results: Vec<ScoredEvent>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct InteractionsCountQuery {
    pub event_ids: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct InteractionsCountResponse {
    pub results: Vec<ScoredEvent>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct PredictionsQuery {
    pub limit: Option<i64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub user_id: i64,
    pub results: Vec<ScoredEvent>,
    pub total: usize,
}

/// Start the affinity server
pub async fn start_server(state: ServerState, config: &ServerConfig) -> std::io::Result<()> {
    tracing::info!(
        "Starting Agora Affinity Service on {}:{}",
        config.host,
        config.port
    );

    let state = web::Data::new(state);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(health_check)
            .service(service_stats)
            .service(submit_action)
            .service(similar_events)
            .service(interactions_count)
            .service(user_predictions)
    });

    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind((config.host.as_str(), config.port))?.run().await
}
