//! HTTP handlers for object reads, uploads, deletes and copies under `/object`.
//! Object bodies are streamed from the backend straight into the response.

use crate::{
    app::AppState,
    errors::AppError,
    handlers::{
        bucket_handlers::MessageResponse,
        extract::{JsonBody, QueryParams},
    },
    models::{
        object::{ObjectMetadata, Preconditions, Validators},
        principal::Principal,
    },
    services::object_gateway::{ObjectRead, UploadRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header, header::AsHeaderName},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyObjectRequest {
    pub bucket_id: String,
    pub source_key: String,
    pub destination_key: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    #[serde(rename = "Key")]
    pub key: String,
}

/// `GET /object/public/{bucket}/{*key}`: anonymous read, public buckets only.
pub async fn get_public_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let preconditions = preconditions_from_headers(&headers);
    let read = state
        .gateway
        .get_object(&bucket, &key, None, &Principal::Anonymous, &preconditions)
        .await?;
    Ok(object_response(read))
}

/// `GET /object/authenticated/{bucket}/{*key}`
pub async fn get_authenticated_object(
    State(state): State<AppState>,
    principal: Principal,
    Path((bucket, key)): Path<(String, String)>,
    QueryParams(query): QueryParams<VersionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let preconditions = preconditions_from_headers(&headers);
    let read = state
        .gateway
        .get_object(&bucket, &key, query.version.as_deref(), &principal, &preconditions)
        .await?;
    Ok(object_response(read))
}

/// `POST|PUT /object/{bucket}/{*key}`
///
/// PUT always overwrites; POST only does so with `x-upsert: true`.
pub async fn upload_object(
    State(state): State<AppState>,
    principal: Principal,
    method: Method,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<KeyResponse>, AppError> {
    let data = axum::body::to_bytes(body, state.upload_limit).await.map_err(|err| {
        tracing::debug!("rejecting upload body: {}", err);
        AppError::new(
            StatusCode::BAD_REQUEST,
            "413",
            "Payload too large",
            "The object exceeded the maximum allowed size",
        )
    })?;

    let upsert = method == Method::PUT
        || header_str(&headers, "x-upsert").is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let request = UploadRequest {
        key: key.clone(),
        body: data,
        content_type: header_str(&headers, header::CONTENT_TYPE).map(str::to_string),
        cache_control: header_str(&headers, header::CACHE_CONTROL).map(str::to_string),
        upsert,
    };

    state
        .gateway
        .upload_object(&bucket, request, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;

    Ok(Json(KeyResponse {
        key: format!("{bucket}/{key}"),
    }))
}

/// `DELETE /object/{bucket}/{*key}`
pub async fn delete_object(
    State(state): State<AppState>,
    principal: Principal,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .gateway
        .delete_object(&bucket, &key, &principal)
        .await
        .map_err(|err| AppError::from(err).masked())?;
    Ok(Json(MessageResponse {
        message: "Successfully deleted",
    }))
}

/// `POST /object/copy`
pub async fn copy_object(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(request): JsonBody<CopyObjectRequest>,
) -> Result<Json<KeyResponse>, AppError> {
    state
        .gateway
        .copy_object(
            &request.bucket_id,
            &request.source_key,
            &request.destination_key,
            &principal,
        )
        .await
        .map_err(|err| AppError::from(err).masked())?;

    Ok(Json(KeyResponse {
        key: format!("{}/{}", request.bucket_id, request.destination_key),
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_date(headers: &HeaderMap, name: impl AsHeaderName) -> Option<DateTime<Utc>> {
    header_str(headers, name)
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .map(DateTime::<Utc>::from)
}

/// Conditional request headers, passed through verbatim. Unparseable dates
/// are ignored.
pub fn preconditions_from_headers(headers: &HeaderMap) -> Preconditions {
    Preconditions {
        if_none_match: header_str(headers, header::IF_NONE_MATCH).map(str::to_string),
        if_modified_since: header_date(headers, header::IF_MODIFIED_SINCE),
        if_match: header_str(headers, header::IF_MATCH).map(str::to_string),
        if_unmodified_since: header_date(headers, header::IF_UNMODIFIED_SINCE),
    }
}

fn http_date(value: &DateTime<Utc>) -> String {
    httpdate::fmt_http_date(SystemTime::from(*value))
}

fn object_response(read: ObjectRead) -> Response {
    match read {
        ObjectRead::Body(object) => {
            let status =
                StatusCode::from_u16(object.metadata.http_status_code).unwrap_or(StatusCode::OK);
            let mut response = Response::new(Body::from_stream(object.body));
            *response.status_mut() = status;
            set_object_headers(response.headers_mut(), &object.metadata);
            response
        }
        ObjectRead::NotModified(validators) => not_modified(&validators),
    }
}

fn not_modified(validators: &Validators) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    let headers = response.headers_mut();
    if let Some(value) = validators.e_tag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        headers.insert(header::ETAG, value);
    }
    if let Some(value) = validators
        .last_modified
        .as_ref()
        .and_then(|lm| HeaderValue::from_str(&http_date(lm)).ok())
    {
        headers.insert(header::LAST_MODIFIED, value);
    }
    response
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMetadata) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.mimetype)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.content_length));

    if let Ok(value) = HeaderValue::from_str(&meta.e_tag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(&meta.last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&meta.cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conditional_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        headers.insert(header::IF_UNMODIFIED_SINCE, HeaderValue::from_static("not a date"));

        let pre = preconditions_from_headers(&headers);
        assert_eq!(pre.if_none_match.as_deref(), Some("\"abc\""));
        assert_eq!(
            pre.if_modified_since,
            DateTime::from_timestamp(1_445_412_480, 0)
        );
        assert!(pre.if_unmodified_since.is_none());
        assert!(pre.if_match.is_none());
    }

    #[test]
    fn not_modified_carries_validators_only() {
        let response = not_modified(&Validators {
            e_tag: Some("\"abc\"".into()),
            last_modified: DateTime::from_timestamp(1_445_412_480, 0),
        });
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], "\"abc\"");
        assert_eq!(response.headers()[header::LAST_MODIFIED], "Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
