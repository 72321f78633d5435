use axum::extract::{Form, FromRequest, Query, Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use super::{error::ApiError, models::JobParams, response, state::AppState, utils};
use crate::handlers::{JobBody, JobRequest};

/// File operation endpoint (POST /handler)
///
/// ## Flow:
/// 1. Reject anything but POST
/// 2. Collect `cmd` and `url` from the query and, for urlencoded bodies, the form
/// 3. Stamp a fresh request id and dispatch through the handler registry
/// 4. Encode the handler's output, or answer `{"error": ...}`
///
/// The request body is always consumed, whether or not a handler reads it.
pub async fn serve_job(State(state): State<AppState>, request: Request) -> Response {
    if request.method() != Method::POST {
        JobBody::new(request.into_body()).drain().await;
        return ApiError::MethodNotAllowed.into_response();
    }

    let request_id = state.request_ids.next_id();
    let (params, mut body) = match read_params(request).await {
        Ok(parsed) => parsed,
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Rejected job parameters");
            return err.into_response();
        }
    };

    let job = JobRequest::new(
        params.cmd.unwrap_or_default(),
        params.url.unwrap_or_default(),
        request_id,
    );
    state.metrics.job_dispatched();
    info!(request_id = %job.request_id, cmd = %job.command, url = %job.source_url, "Job received");

    let output = match state.registry.route(&job, &mut body).await {
        Ok(output) => output,
        Err(err) => {
            state.metrics.job_failed();
            error!(
                request_id = %job.request_id,
                request = %serde_json::to_string(&job).unwrap_or_default(),
                code = err.code(),
                error = %err,
                "Job failed"
            );
            return ApiError::Job(err).into_response();
        }
    };

    let kind = output.kind();
    match response::encode(output, &state.http).await {
        Ok(response) => {
            info!(request_id = %job.request_id, output = kind, "Job done");
            response
        }
        Err(err) => {
            state.metrics.encode_failed();
            error!(request_id = %job.request_id, output = kind, error = %err, "Writing job result failed");
            err.into_response()
        }
    }
}

/// Query parameters, overridden field by field by a urlencoded form body
async fn read_params(request: Request) -> Result<(JobParams, JobBody), ApiError> {
    let query = match Query::<JobParams>::try_from_uri(request.uri()) {
        Ok(Query(query)) => query,
        Err(e) => {
            JobBody::new(request.into_body()).drain().await;
            return Err(ApiError::InvalidForm(e.to_string()));
        }
    };

    if !utils::is_form_urlencoded(request.headers()) {
        return Ok((query, JobBody::new(request.into_body())));
    }

    // a rejected form has already consumed the body
    let Form(form) = Form::<JobParams>::from_request(request, &())
        .await
        .map_err(|e| ApiError::InvalidForm(e.to_string()))?;
    Ok((form.or(query), JobBody::empty()))
}

/// Health check endpoint (GET /health)
pub async fn health() -> &'static str {
    "ok"
}
