//! Request extractors that turn axum rejections into the gateway error body.

use crate::{app::AppState, errors::AppError, models::principal::Principal};
use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::de::DeserializeOwned;

/// Resolves the bearer token into a [`Principal`].
///
/// A missing header is rejected outright; tokens carrying the `anon` role
/// resolve to [`Principal::Anonymous`].
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(AppError::missing_authorization)?
            .to_str()
            .map_err(|_| AppError::invalid_jwt("authorization header is not valid ASCII"))?;

        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::invalid_jwt("authorization header must be a Bearer token"))?;

        let claims = state
            .verifier
            .verify(token)
            .map_err(|err| AppError::invalid_jwt(err.to_string()))?;
        Ok(Principal::from_claims(claims))
    }
}

/// `Json<T>` with malformed payloads reported as Invalid Input.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::invalid_input(rejection.body_text())
}

/// `Query<T>` with bad parameters reported as Invalid Input.
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection: QueryRejection| AppError::invalid_input(rejection.body_text()))
    }
}
