use axum::http::{header, HeaderMap, StatusCode};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{instrument, warn, Span};

use super::AppState;
use crate::B3Digest;

fn parse_digest(digest_str: &str) -> Result<B3Digest, StatusCode> {
    B3Digest::from_hex(digest_str).map_err(|e| {
        warn!(err=%e, "invalid brick digest");
        StatusCode::BAD_REQUEST
    })
}

/// Rejects the request unless it carries the configured bearer token.
fn authorize(headers: &HeaderMap, auth_token: &Option<Arc<str>>) -> Result<(), StatusCode> {
    let Some(expected) = auth_token else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_ref()) {
        Ok(())
    } else {
        warn!("missing or wrong bearer token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[instrument(skip_all, fields(brick.digest=tracing::field::Empty))]
pub async fn head(
    axum::extract::Path(digest_str): axum::extract::Path<String>,
    axum::extract::State(AppState {
        transport,
        auth_token,
    }): axum::extract::State<AppState>,
    headers: HeaderMap,
) -> Result<&'static str, StatusCode> {
    authorize(&headers, &auth_token)?;
    let digest = parse_digest(&digest_str)?;
    Span::current().record("brick.digest", tracing::field::display(&digest));

    if transport.has(&digest).await.map_err(|e| {
        warn!(err=%e, "failed to look up brick");
        StatusCode::INTERNAL_SERVER_ERROR
    })? {
        Ok("")
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[instrument(skip_all, fields(brick.digest=tracing::field::Empty))]
pub async fn get(
    axum::extract::Path(digest_str): axum::extract::Path<String>,
    axum::extract::State(AppState {
        transport,
        auth_token,
    }): axum::extract::State<AppState>,
    headers: HeaderMap,
) -> Result<Bytes, StatusCode> {
    authorize(&headers, &auth_token)?;
    let digest = parse_digest(&digest_str)?;
    Span::current().record("brick.digest", tracing::field::display(&digest));

    transport
        .fetch_brick(&digest)
        .await
        .map_err(|e| {
            warn!(err=%e, "failed to fetch brick");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)
}

#[instrument(skip_all, fields(brick.digest=tracing::field::Empty, brick.size=body.len()))]
pub async fn put(
    axum::extract::Path(digest_str): axum::extract::Path<String>,
    axum::extract::State(AppState {
        transport,
        auth_token,
    }): axum::extract::State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    authorize(&headers, &auth_token)?;
    let digest = parse_digest(&digest_str)?;
    Span::current().record("brick.digest", tracing::field::display(&digest));

    // Only accept bricks stored under their own digest.
    let actual = B3Digest::of(&body);
    if actual != digest {
        warn!(brick.actual_digest=%actual, "digest mismatch");
        return Err(StatusCode::BAD_REQUEST);
    }

    transport.store_brick(&digest, body).await.map_err(|e| {
        warn!(err=%e, "failed to store brick");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(StatusCode::NO_CONTENT)
}
