//! Pre-flight checks for a generation request.
//!
//! Everything here runs before the first LLM call: a request that fails
//! any check costs two store reads at most and no tokens.

use serde_json::Value;
use tracing::{debug, warn};

use coursegen_db::models::{Course, CoursePlan};

use crate::error::GenerationError;
use crate::store::DocumentStore;

use super::token::{TokenConfig, validate_token};

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Auth uid, compared against `Course::creator_id`.
    pub uid: String,
}

impl CallerIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// Turn an `Authorization` header value into a caller identity.
///
/// No header means no identity. A header that is present but is not a
/// valid bearer token is rejected outright.
pub fn resolve_caller(
    config: &TokenConfig,
    authorization: Option<&str>,
) -> Result<Option<CallerIdentity>, GenerationError> {
    let Some(header) = authorization else {
        return Ok(None);
    };
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            GenerationError::Unauthenticated("expected 'Authorization: Bearer <token>'".to_string())
        })?;
    let uid = validate_token(config, token).map_err(|e| {
        warn!(error = %e, "rejected caller token");
        GenerationError::Unauthenticated(e.to_string())
    })?;
    Ok(Some(CallerIdentity { uid }))
}

/// Who wants which plan generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub caller_id: String,
    pub plan_id: String,
}

impl GenerationRequest {
    /// Build a request from the caller and the invocation body
    /// (`{"coursePlanId": "..."}`).
    pub fn from_body(
        caller: Option<&CallerIdentity>,
        body: &Value,
    ) -> Result<Self, GenerationError> {
        let caller = caller.ok_or_else(|| {
            GenerationError::Unauthenticated("no caller identity".to_string())
        })?;
        let plan_id = match body.get("coursePlanId") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            _ => {
                return Err(GenerationError::InvalidRequest(
                    "invalid or missing coursePlanId".to_string(),
                ));
            }
        };
        Ok(Self {
            caller_id: caller.uid.clone(),
            plan_id,
        })
    }
}

/// A plan the caller is allowed to regenerate, as read during the checks.
#[derive(Debug, Clone)]
pub struct AuthorizedPlan {
    pub plan: CoursePlan,
    pub course: Course,
}

impl AuthorizedPlan {
    /// Non-blank seed direction; checked by [`authorize_request`].
    pub fn direction(&self) -> &str {
        self.plan.direction.as_deref().unwrap_or_default()
    }
}

/// Validate the caller and body, then check ownership.
pub async fn authorize(
    store: &dyn DocumentStore,
    caller: Option<&CallerIdentity>,
    body: &Value,
) -> Result<AuthorizedPlan, GenerationError> {
    let request = GenerationRequest::from_body(caller, body)?;
    authorize_request(store, &request).await
}

/// Resolve the plan and its course and check that the caller created the
/// course. Reads the plan, then the course; never writes.
pub async fn authorize_request(
    store: &dyn DocumentStore,
    request: &GenerationRequest,
) -> Result<AuthorizedPlan, GenerationError> {
    let plan = store
        .get_plan(&request.plan_id)
        .await
        .map_err(GenerationError::StoreUnavailable)?
        .ok_or_else(|| {
            GenerationError::NotFound(format!("course plan {} not found", request.plan_id))
        })?;

    if plan.course_id.trim().is_empty() {
        return Err(GenerationError::NotFound(format!(
            "course plan {} has no course reference",
            plan.id
        )));
    }

    let course = store
        .get_course(&plan.course_id)
        .await
        .map_err(GenerationError::StoreUnavailable)?
        .ok_or_else(|| GenerationError::NotFound(format!("course {} not found", plan.course_id)))?;

    if course.creator_id != request.caller_id {
        warn!(
            plan_id = %plan.id,
            course_id = %course.id,
            caller = %request.caller_id,
            "caller is not the course creator"
        );
        return Err(GenerationError::Forbidden(
            "you are not the course creator".to_string(),
        ));
    }

    if plan
        .direction
        .as_deref()
        .is_none_or(|d| d.trim().is_empty())
    {
        return Err(GenerationError::InvalidRequest(format!(
            "course plan {} has no direction",
            plan.id
        )));
    }

    debug!(plan_id = %plan.id, revision = plan.revision, "caller authorized");
    Ok(AuthorizedPlan { plan, course })
}
