//! Member management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{MemberId, MemberView},
};

use super::{validated, MessageResponse};

/// Register member request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMemberRequest {
    /// Caller-assigned member ID
    #[validate(length(min = 1, max = 64))]
    pub member_id: String,
    /// Display name
    #[validate(length(max = 256))]
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct MemberResponse {
    pub member: MemberView,
    pub message: String,
}

/// Register a new member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    request_body = CreateMemberRequest,
    responses(
        (status = 201, description = "Member registered", body = MemberResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Member ID already exists")
    )
)]
pub async fn create_member(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateMemberRequest>,
) -> AppResult<(StatusCode, Json<MemberResponse>)> {
    let request = validated(request)?;
    let member_id = MemberId::parse(&request.member_id)?;

    let inventory = &state.services.inventory;
    let member = inventory
        .register_member(&member_id, &request.name, inventory.default_deadline())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            message: format!("Member {} added successfully.", member.name),
            member: MemberView::from(&member),
        }),
    ))
}

/// Get member details by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = String, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member details", body = MemberView),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MemberView>> {
    let member_id = MemberId::parse(&id)?;
    let member = state.services.query.get_member(&member_id).await?;
    Ok(Json(member))
}

/// Retire a member with no outstanding loans
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = String, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member deleted", body = MessageResponse),
        (status = 404, description = "Member not found"),
        (status = 422, description = "Member still holds books")
    )
)]
pub async fn delete_member(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let member_id = MemberId::parse(&id)?;

    let inventory = &state.services.inventory;
    inventory
        .retire_member(&member_id, inventory.default_deadline())
        .await?;

    Ok(Json(MessageResponse {
        message: format!("Member {} deleted successfully.", member_id),
    }))
}
