use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::InsightError;
use crate::interface::InsightFacade;
use crate::record::DatasetKind;

type Reply = (StatusCode, Json<Value>);

fn ok(result: Value) -> Reply {
    (StatusCode::OK, Json(json!({ "result": result })))
}

fn error(e: &InsightError) -> Reply {
    let status = match e {
        InsightError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    let msg = format!("{e}");
    warn!(%msg, code = %status.as_u16(), "request failed");
    (status, Json(json!({ "error": msg })))
}

fn join_error(e: tokio::task::JoinError) -> Reply {
    warn!(error = %e, "join error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Join error" })))
}

pub fn router(facade: Arc<InsightFacade>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_headers(Any);
    Router::new()
        .route("/dataset/:id/:kind", put(put_dataset))
        .route("/dataset/:id", delete(delete_dataset))
        .route("/query", post(query))
        .route("/datasets", get(list_datasets))
        .layer(cors)
        .with_state(facade)
}

async fn put_dataset(
    State(facade): State<Arc<InsightFacade>>,
    Path((id, kind)): Path<(String, String)>,
    Json(content): Json<Value>,
) -> Reply {
    info!(%id, %kind, "put dataset");
    let Some(kind) = DatasetKind::parse(&kind) else {
        return error(&InsightError::validation(format!("Invalid kind '{kind}'")));
    };
    let added = tokio::task::spawn_blocking(move || facade.add_dataset_json(&id, kind, &content)).await;
    match added {
        Ok(Ok(ids)) => ok(json!(ids)),
        Ok(Err(e)) => error(&e),
        Err(e) => join_error(e),
    }
}

async fn delete_dataset(State(facade): State<Arc<InsightFacade>>, Path(id): Path<String>) -> Reply {
    info!(%id, "delete dataset");
    let removed = tokio::task::spawn_blocking(move || facade.remove_dataset(&id)).await;
    match removed {
        Ok(Ok(id)) => ok(json!(id)),
        Ok(Err(e)) => error(&e),
        Err(e) => join_error(e),
    }
}

async fn query(State(facade): State<Arc<InsightFacade>>, Json(body): Json<Value>) -> Reply {
    // We run the query in a blocking thread since the engine is synchronous.
    let started = std::time::Instant::now();
    let rows = tokio::task::spawn_blocking(move || facade.perform_query(&body)).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match rows {
        Ok(Ok(rows)) => {
            info!(ms = elapsed_ms, rows = rows.len(), "query served");
            ok(json!(rows))
        }
        Ok(Err(e)) => error(&e),
        Err(e) => join_error(e),
    }
}

async fn list_datasets(State(facade): State<Arc<InsightFacade>>) -> Reply {
    let listed = tokio::task::spawn_blocking(move || facade.list_datasets()).await;
    match listed {
        Ok(Ok(infos)) => ok(json!(infos)),
        Ok(Err(e)) => error(&e),
        Err(e) => join_error(e),
    }
}
