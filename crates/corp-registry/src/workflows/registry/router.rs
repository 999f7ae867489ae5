use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde_json::json;

use super::consent::ConsentError;
use super::domain::{Actor, ActorRole, ApplicationId, CompanyId, UserId};
use super::intent::ChangeIntent;
use super::repository::RegistryStore;
use super::service::{
    ActionCommand, ConsentDecision, RegistryError, RegistryService, SubmitRequest,
};
use crate::workflows::engine::WorkflowError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

/// Router builder exposing application, consent and company endpoints.
pub fn registry_router<S>(service: Arc<RegistryService<S>>) -> Router
where
    S: RegistryStore + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(submit_handler::<S>))
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/payload",
            put(revise_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/consents",
            get(consents_handler::<S>).post(decide_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/actions",
            post(action_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/withdraw",
            post(withdraw_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/resubmit",
            post(resubmit_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/history",
            get(history_handler::<S>),
        )
        .route("/api/v1/companies/:company_id", get(company_handler::<S>))
        .route(
            "/api/v1/companies/:company_id/audit",
            get(audit_handler::<S>),
        )
        .with_state(service)
}

/// Reads the already-verified actor from request headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let user_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("missing {ACTOR_ID_HEADER} header"),
            });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })?;

    let roles: BTreeSet<ActorRole> = headers
        .get(ACTOR_ROLES_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw.split(',').filter_map(ActorRole::from_key).collect())
        .unwrap_or_default();

    Ok(Actor {
        user_id: UserId(user_id.to_string()),
        roles,
    })
}

fn error_response(error: RegistryError) -> Response {
    let status = match &error {
        RegistryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::Conflict(_)
        | RegistryError::ConsentIncomplete(_)
        | RegistryError::Consistency(_)
        | RegistryError::Consent(ConsentError::NoPendingItems { .. }) => StatusCode::CONFLICT,
        RegistryError::Authorization(_) | RegistryError::Workflow(WorkflowError::Forbidden { .. }) => {
            StatusCode::FORBIDDEN
        }
        RegistryError::Workflow(
            WorkflowError::InvalidTransition { .. } | WorkflowError::InstanceInactive(_),
        ) => StatusCode::CONFLICT,
        RegistryError::NotFound(_)
        | RegistryError::Workflow(
            WorkflowError::InstanceNotFound(_) | WorkflowError::DefinitionNotFound(_),
        ) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.submit(&actor, request) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn application_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(record) => {
            let payload = json!({
                "application": record.status_view(),
                "intent": record.intent,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn revise_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(intent): axum::Json<ChangeIntent>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.revise(&actor, &ApplicationId(application_id), intent) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn consents_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
{
    match service.consent_items(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decide_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(decision): axum::Json<ConsentDecision>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.decide_consent(&actor, &ApplicationId(application_id), decision) {
        Ok(outcome) => {
            let payload = json!({
                "application": outcome.application.status_view(),
                "decided": outcome.decided.len(),
                "verdict": outcome.verdict,
                "terminated": outcome.terminated,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn action_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(command): axum::Json<ActionCommand>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.perform_action(&actor, &ApplicationId(application_id), command) {
        Ok(outcome) => {
            let payload = json!({
                "application": outcome.application.status_view(),
                "action": outcome.action,
                "next_state": outcome.next_state,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct CommentBody {
    #[serde(default)]
    comment: Option<String>,
}

pub(crate) async fn withdraw_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Option<axum::Json<CommentBody>>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let comment = body.and_then(|axum::Json(body)| body.comment);
    match service.withdraw(&actor, &ApplicationId(application_id), comment.as_deref()) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resubmit_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Option<axum::Json<CommentBody>>,
) -> Response
where
    S: RegistryStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let comment = body.and_then(|axum::Json(body)| body.comment);
    match service.resubmit(&actor, &ApplicationId(application_id), comment.as_deref()) {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(outcome.application.status_view()),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
{
    match service.workflow_history(&ApplicationId(application_id)) {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn company_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(company_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
{
    match service.company(&CompanyId(company_id)) {
        Ok(company) => (StatusCode::OK, axum::Json(company)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn audit_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    Path(company_id): Path<String>,
) -> Response
where
    S: RegistryStore + 'static,
{
    match service.audit_trail(&CompanyId(company_id)) {
        Ok(trail) => (StatusCode::OK, axum::Json(trail)).into_response(),
        Err(error) => error_response(error),
    }
}
