use axum::{Extension, Json, extract::State};
use tracing::{error, info};

use roomly_types::api::{
    CandidateResponse, Claims, LikeRequest, LikeResponse, MatchSummary, PassRequest, PassResponse,
};
use roomly_types::events::GatewayEvent;
use roomly_types::models::{ProfileAttributes, compatibility_score};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{parse_db_time, parse_db_uuid};

pub async fn like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, ApiError> {
    let actor_id = claims.sub;
    let target_id = req.target_id;

    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let outcome = tokio::task::spawn_blocking(move || db.record_like(actor_id, target_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("task join failure")
        })??;

    // Alert both sides only when this call created (or revived) the match;
    // a repeated like is idempotent and stays quiet.
    if let (true, Some(match_id)) = (outcome.newly_matched, outcome.match_id) {
        info!(
            "Mutual like: {} and {} matched ({})",
            actor_id, target_id, match_id
        );

        // Both sides get a match alert on whatever connections they hold.
        let db = state.db.clone();
        let target_name =
            tokio::task::spawn_blocking(move || db.get_username_by_id(&target_id.to_string()))
                .await
                .map_err(|e| {
                    error!("spawn_blocking join error: {}", e);
                    ApiError::internal("task join failure")
                })??;

        state
            .dispatcher
            .notify_user(
                actor_id,
                GatewayEvent::NewMatch {
                    match_id,
                    other_user_id: target_id,
                    other_user_name: target_name,
                },
            )
            .await;
        state
            .dispatcher
            .notify_user(
                target_id,
                GatewayEvent::NewMatch {
                    match_id,
                    other_user_id: actor_id,
                    other_user_name: claims.username.clone(),
                },
            )
            .await;
    }

    Ok(Json(LikeResponse {
        success: true,
        is_match: outcome.matched,
        match_id: outcome.match_id,
    }))
}

pub async fn pass(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PassRequest>,
) -> Result<Json<PassResponse>, ApiError> {
    let actor_id = claims.sub;
    let target_id = req.target_id;

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.record_pass(actor_id, target_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("task join failure")
        })??;

    Ok(Json(PassResponse { success: true }))
}

pub async fn discover(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<CandidateResponse>>, ApiError> {
    let actor_id = claims.sub;

    let db = state.db.clone();
    let (me, candidates) = tokio::task::spawn_blocking(move || {
        let me = db
            .get_user_by_id(&actor_id.to_string())?
            .ok_or(roomly_db::StoreError::TargetNotFound(actor_id))?;
        let candidates = db.discover_candidates(actor_id, 50)?;
        Ok::<_, roomly_db::StoreError>((me, candidates))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::internal("task join failure")
    })??;

    let my_profile = ProfileAttributes {
        budget: me.budget,
        cleanliness: me.cleanliness,
        smoker: me.smoker,
        night_owl: me.night_owl,
    };

    let response = candidates
        .into_iter()
        .map(|c| {
            let profile = ProfileAttributes {
                budget: c.budget,
                cleanliness: c.cleanliness,
                smoker: c.smoker,
                night_owl: c.night_owl,
            };
            CandidateResponse {
                id: parse_db_uuid(&c.id, "candidate"),
                username: c.username,
                compatibility: compatibility_score(&my_profile, &profile),
            }
        })
        .collect();

    Ok(Json(response))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let user_id = claims.sub;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.matches_for(user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("task join failure")
        })??;

    let matches = rows
        .into_iter()
        .map(|row| MatchSummary {
            id: parse_db_uuid(&row.id, "match"),
            other_user_id: parse_db_uuid(&row.other_user_id, "match participant"),
            other_user_name: row.other_user_name,
            created_at: parse_db_time(&row.created_at, "match"),
        })
        .collect();

    Ok(Json(matches))
}
