//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use indexmap::IndexMap;

use super::AppState;
use super::types::{ErrorResponse, ObjectRecord, SummaryResponse};
use crate::glm::entity::Entity;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(error: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error }))
}

/// Returns entity counts by kind and object type plus the clock.
///
/// `GET /summary` → 200 + `SummaryResponse` JSON
pub async fn get_summary(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    let manager = &state.manager;
    let mut kinds: IndexMap<&'static str, usize> = IndexMap::new();
    for (_, entity) in manager.model().iter() {
        *kinds.entry(entity.kind_label()).or_default() += 1;
    }
    let modules = manager
        .model()
        .iter()
        .filter_map(|(_, e)| match e {
            Entity::Module(m) => Some(m.name.clone()),
            _ => None,
        })
        .collect();

    Json(SummaryResponse {
        entities: manager.model().len(),
        kinds,
        object_types: manager
            .object_counts()
            .into_iter()
            .map(|(t, n)| (t.to_string(), n))
            .collect(),
        modules,
        clock: manager.clock().cloned(),
    })
}

/// Returns every object of one type, named or not, in write order.
///
/// `GET /objects/{object_type}` → 200 + `Vec<ObjectRecord>` JSON
/// `GET /objects/unknown` → 404 + `ErrorResponse`
pub async fn get_objects(
    State(state): State<Arc<AppState>>,
    Path(object_type): Path<String>,
) -> Result<Json<Vec<ObjectRecord>>, ApiError> {
    let records: Vec<ObjectRecord> = state
        .manager
        .model()
        .objects()
        .filter(|(_, o)| o.type_name == object_type)
        .map(|(k, o)| ObjectRecord::new(k, o))
        .collect();
    if records.is_empty() {
        return Err(not_found(format!("no {object_type} objects in model")));
    }
    Ok(Json(records))
}

/// Returns one named object.
///
/// `GET /objects/{object_type}/{name}` → 200 + `ObjectRecord` JSON, or 404
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((object_type, name)): Path<(String, String)>,
) -> Result<Json<ObjectRecord>, ApiError> {
    let manager = &state.manager;
    manager
        .map()
        .object_key(&object_type, &name)
        .and_then(|key| {
            let object = manager.model().get(key).and_then(Entity::as_object)?;
            Some(Json(ObjectRecord::new(key, object)))
        })
        .ok_or_else(|| not_found(format!("{object_type} object {name} not found")))
}

/// Returns the model rendered as text.
///
/// `GET /glm` → 200 + `text/plain`
pub async fn get_glm(State(state): State<Arc<AppState>>) -> String {
    state.manager.render()
}
