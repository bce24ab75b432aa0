use super::backend_error;
use crate::{
    auth::{AuthUser, ExtractAuth},
    backend::{BackendClient, Session, SignUpOutcome},
    error::{AppError, AppResult},
    forms::{ResetPasswordForm, SignInForm, SignUpForm},
    models::Profile,
    queries::{self, profiles::NewProfile},
    DbPool,
};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedIn {
    session: Session,
    profile: Option<Profile>,
}

async fn sign_in(
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Json(form): Json<SignInForm>,
) -> AppResult<Json<SignedIn>> {
    form.validate()?;

    let session = backend
        .sign_in(form.email.trim(), &form.password)
        .await
        .map_err(backend_error)?;
    let conn = &mut pool.get().await?;
    let profile = queries::profiles::find(conn, session.user.id).await?;
    if profile.is_none() {
        tracing::warn!(user_id = %session.user.id, "signed in without a profile");
    }

    tracing::info!(user_id = %session.user.id, "signed in");
    Ok(Json(SignedIn { session, profile }))
}

fn sign_up_error(err: anyhow::Error) -> AppError {
    let err = backend_error(err);
    let duplicate = err.message().contains("User already registered")
        || err.message().contains("User already exists");
    if duplicate {
        AppError::from(
            StatusCode::CONFLICT,
            "This email is already registered. Please sign in instead.",
        )
    } else {
        err
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUp {
    user: AuthUser,
    session: Option<Session>,
    confirmation_required: bool,
    profile: Profile,
}

async fn sign_up(
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Json(form): Json<SignUpForm>,
) -> AppResult<(StatusCode, Json<SignedUp>)> {
    form.validate()?;

    let outcome = backend
        .sign_up(form.email.trim(), &form.password)
        .await
        .map_err(sign_up_error)?;
    let user = outcome.user().clone();

    let conn = &mut pool.get().await?;
    let profile = queries::profiles::insert(
        conn,
        NewProfile {
            id: user.id,
            full_name: Some(form.full_name.trim().to_string()),
        },
    )
    .await?;

    let session = match outcome {
        SignUpOutcome::Session(session) => Some(session),
        SignUpOutcome::PendingConfirmation(_) => None,
    };
    tracing::info!(user_id = %user.id, confirmed = session.is_some(), "signed up");
    Ok((
        StatusCode::CREATED,
        Json(SignedUp {
            user,
            confirmation_required: session.is_none(),
            session,
            profile,
        }),
    ))
}

async fn sign_out(
    ExtractAuth(auth): ExtractAuth,
    Extension(backend): Extension<BackendClient>,
) -> AppResult<StatusCode> {
    backend
        .sign_out(&auth.token)
        .await
        .map_err(backend_error)?;
    tracing::info!(user_id = %auth.user_id(), "signed out");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

async fn reset_password(
    Extension(backend): Extension<BackendClient>,
    Json(form): Json<ResetPasswordForm>,
) -> AppResult<Json<Message>> {
    form.validate()?;
    backend
        .reset_password(form.email.trim())
        .await
        .map_err(backend_error)?;
    Ok(Json(Message {
        message: "Check your email for a password reset link.",
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Me {
    user: AuthUser,
    profile: Option<Profile>,
}

async fn me(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
) -> AppResult<Json<Me>> {
    let user = backend
        .current_user(&auth.token)
        .await
        .map_err(backend_error)?;
    let conn = &mut pool.get().await?;
    let profile = queries::profiles::find(conn, user.id).await?;
    Ok(Json(Me { user, profile }))
}

pub fn app() -> Router {
    Router::new()
        .route("/sign-in", post(sign_in))
        .route("/sign-up", post(sign_up))
        .route("/sign-out", post(sign_out))
        .route("/reset-password", post(reset_password))
        .route("/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn duplicate_accounts_are_conflicts() {
        let err = sign_up_error(
            BackendError {
                status: reqwest::StatusCode::BAD_REQUEST,
                message: "User already registered".to_string(),
            }
            .into(),
        );
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.message().starts_with("This email is already registered"));

        let weak = sign_up_error(
            BackendError {
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                message: "Password should be at least 6 characters".to_string(),
            }
            .into(),
        );
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
        assert_eq!(weak.message(), "Password should be at least 6 characters");
    }
}
