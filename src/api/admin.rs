use super::helper;
use crate::AppState;
use crate::errors::AppError;
use crate::model::Role;
use crate::model::admin::{
    InviteLinkResponse, LessonChangeset, LessonResponse, ModuleChangeset, ModuleResponse,
    NewLesson, NewLessonPresenter, NewLessonTag, NewModule, NewPeerGroup, NewPeerGroupInvite,
    NewPresenter, NewResource, NewResourceLegacy, NewTag, NewUser, PeerGroupResponse,
    PresenterChangeset, UserChangeset, UserResponse,
};
use crate::model::learner::{PresenterInfo, TagInfo};
use crate::payloads::admin::{
    AddResourcePayload, AssignPresenterPayload, CreateLessonPayload, CreateModulePayload,
    CreatePeerGroupPayload, CreatePresenterPayload, CreateTagPayload, CreateUserPayload,
    DeleteLessonPayload, DeleteModulePayload, DeletePeerGroupPayload, DeletePresenterPayload,
    DeleteTagPayload, DeleteUserPayload, GenerateGroupInvitePayload, ModifyLessonPayload,
    ModifyModulePayload, ModifyPresenterPayload, ModifyUserPayload, RemoveResourcePayload,
    RenamePeerGroupPayload, SetUserGroupPayload, TagLessonPayload, UnassignPresenterPayload,
    UntagLessonPayload,
};
use crate::response::ApiResponse;
use crate::schema::{
    lesson_presenters::dsl as lpr_dsl, lesson_progress::dsl as lp_dsl,
    lesson_resources::dsl as lr_dsl, lesson_tags::dsl as lt_dsl, lessons::dsl as lessons_dsl,
    modules::dsl as modules_dsl, peer_group_invites::dsl as pgi_dsl, peer_groups::dsl as pg_dsl,
    presenters::dsl as presenters_dsl, tags::dsl as tags_dsl, users::dsl as users_dsl,
};
use axum::extract::State;
use axum::response::Json;
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::HashMap;
use tracing::log::warn;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// users

/// Lists every user account.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<UserResponse>` ordered by id (200)
/// * `None` if failed (500)
#[instrument(skip(state))]
pub async fn get_users(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<UserResponse>>, AppError> {
    info!("Listing users");

    let users = helper::run_query(&state.pool, move |conn| {
        users_dsl::users
            .order(users_dsl::id.asc())
            .select((
                users_dsl::id,
                users_dsl::email,
                users_dsl::display_name,
                users_dsl::role,
                users_dsl::peer_group_id,
                users_dsl::created_at,
                users_dsl::last_active,
            ))
            .load::<UserResponse>(conn)
    })
    .await?;

    info!("Listed {} users", users.len());
    Ok(ApiResponse::ok(users))
}

/// Creates a user account.
///
/// Parameters
/// * email as `String` (unique)
/// * display_name as `Option<String>`
/// * role as `String`, one of admin/enhanced/normal
/// * peer_group_id as `Option<i64>`
///
/// Returns (wrapped in `ApiResponse`)
/// * the new user id as `i64` (200)
/// * `None` if the peer group does not exist (404)
/// * `None` if the email is taken (409)
/// * `None` if the role is invalid (422)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Attempting to create user with email: {}", payload.email);
    debug!("Create user payload: {:?}", payload);

    let role = validate_role(&payload.role)?;

    if let Some(group_id) = payload.peer_group_id {
        check_peer_group_exists(&state.pool, group_id).await?;
    }

    let new_user = NewUser {
        email: payload.email.clone(),
        display_name: payload.display_name,
        role: role.as_str().to_string(),
        peer_group_id: payload.peer_group_id,
    };

    let insert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(users_dsl::users)
            .values(&new_user)
            .returning(users_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match insert_result {
        Ok(new_id) => {
            info!("Created user {} with email {}", new_id, payload.email);
            Ok(ApiResponse::ok(new_id))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            warn!("Email '{}' is already taken.", payload.email);
            Err(AppError::Conflict(format!(
                "Email '{}' is already taken.",
                payload.email
            )))
        }
        Err(e) => Err(e),
    }
}

/// Updates a user's email, display name and/or role.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if no fields were provided (400)
/// * `None` if the user does not exist (404)
/// * `None` if the new email is taken (409)
/// * `None` if the role is invalid (422)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn modify_user(
    State(state): State<AppState>,
    Json(payload): Json<ModifyUserPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = payload.user_id;

    info!("Attempting to modify user {}", user_id);
    debug!("Modify user payload: {:?}", payload);

    if payload.email.is_none() && payload.display_name.is_none() && payload.role.is_none() {
        return Err(AppError::BadRequest(
            "No fields provided to update.".to_string(),
        ));
    }

    let role = match &payload.role {
        Some(raw) => Some(validate_role(raw)?.as_str().to_string()),
        None => None,
    };

    let changeset = UserChangeset {
        email: payload.email.clone(),
        display_name: payload.display_name,
        role,
    };

    let update_result = helper::run_query(&state.pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(&changeset)
            .execute(conn)
    })
    .await;

    match update_result {
        Ok(0) => {
            warn!("User with ID {} not found.", user_id);
            Err(AppError::NotFound(format!(
                "User with ID {} not found.",
                user_id
            )))
        }
        Ok(_) => {
            info!("Modified user {}", user_id);
            Ok(ApiResponse::ok(true))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            warn!("Modified email for user {} is already taken.", user_id);
            Err(AppError::Conflict("Email is already taken.".to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Assigns a user to a peer group, or clears the assignment.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the user or the target group does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn set_user_group(
    State(state): State<AppState>,
    Json(payload): Json<SetUserGroupPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = payload.user_id;
    let peer_group_id = payload.peer_group_id;

    info!(
        "Setting peer group of user {} to {:?}",
        user_id, peer_group_id
    );

    if let Some(group_id) = peer_group_id {
        check_peer_group_exists(&state.pool, group_id).await?;
    }

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::peer_group_id.eq(peer_group_id))
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("User with ID {} not found.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    info!("Set peer group of user {} to {:?}", user_id, peer_group_id);
    Ok(ApiResponse::ok(true))
}

/// Deletes a user and their progress rows.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the user does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn delete_user(
    State(state): State<AppState>,
    Json(payload): Json<DeleteUserPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = payload.user_id;

    info!("Attempting to delete user {}", user_id);

    let user_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(users_dsl::users.find(user_id))).get_result::<bool>(conn)
    })
    .await?;
    if !user_exists {
        warn!("Cannot delete user: User with ID {} not found.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::delete(lp_dsl::lesson_progress.filter(lp_dsl::user_id.eq(user_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                let user_deleted = diesel::delete(users_dsl::users.find(user_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                if user_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "User {} not found during final delete step.",
                        user_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted user {}", user_id);
    Ok(ApiResponse::ok(true))
}

// peer groups

/// Lists peer groups with their member counts.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<PeerGroupResponse>` ordered by id (200)
/// * `None` if failed (500)
#[instrument(skip(state))]
pub async fn get_peer_groups(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<PeerGroupResponse>>, AppError> {
    info!("Listing peer groups");

    let groups = helper::run_query(&state.pool, move |conn| {
        pg_dsl::peer_groups
            .order(pg_dsl::id.asc())
            .select((pg_dsl::id, pg_dsl::title))
            .load::<(i64, String)>(conn)
    })
    .await?;

    let memberships = helper::run_query(&state.pool, move |conn| {
        users_dsl::users
            .filter(users_dsl::peer_group_id.is_not_null())
            .select(users_dsl::peer_group_id)
            .load::<Option<i64>>(conn)
    })
    .await?;

    let mut counts: HashMap<i64, i64> = HashMap::new();
    for membership in memberships.into_iter().flatten() {
        *counts.entry(membership).or_insert(0) += 1;
    }

    let response: Vec<PeerGroupResponse> = groups
        .into_iter()
        .map(|(id, title)| PeerGroupResponse {
            id,
            title,
            member_count: counts.get(&id).copied().unwrap_or(0),
        })
        .collect();

    info!("Listed {} peer groups", response.len());
    Ok(ApiResponse::ok(response))
}

/// Creates a peer group, optionally assigning an initial member list.
///
/// Returns (wrapped in `ApiResponse`)
/// * the new group id as `i64` (200)
/// * `None` if a listed member does not exist (404)
/// * `None` if the title is taken (409)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn create_peer_group(
    State(state): State<AppState>,
    Json(payload): Json<CreatePeerGroupPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    let title = payload.title.clone();

    info!("Attempting to create peer group '{}'", title);
    debug!("Create peer group payload: {:?}", payload);

    let title_taken = helper::run_query(&state.pool, {
        let title = title.clone();
        move |conn| {
            diesel::select(exists(
                pg_dsl::peer_groups.filter(pg_dsl::title.eq(title)),
            ))
            .get_result::<bool>(conn)
        }
    })
    .await?;
    if title_taken {
        warn!("Peer group title '{}' is already taken.", title);
        return Err(AppError::Conflict(format!(
            "Peer group title '{}' is already taken.",
            title
        )));
    }

    let members_to_add = payload.member_list.clone();
    if !members_to_add.is_empty() {
        let existing_users_count = helper::run_query(&state.pool, {
            let member_ids = members_to_add.clone();
            move |conn| {
                users_dsl::users
                    .filter(users_dsl::id.eq_any(&member_ids))
                    .count()
                    .get_result::<i64>(conn)
            }
        })
        .await?;

        if existing_users_count != members_to_add.len() as i64 {
            warn!(
                "Cannot create peer group: expected {} members, found {}.",
                members_to_add.len(),
                existing_users_count
            );
            return Err(AppError::NotFound(
                "One or more users listed as members do not exist.".to_string(),
            ));
        }
    }

    let conn = state.pool.get().await?;
    let creation_result: Result<i64, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                let new_group = NewPeerGroup {
                    title: payload.title,
                };
                let new_group_id = diesel::insert_into(pg_dsl::peer_groups)
                    .values(&new_group)
                    .returning(pg_dsl::id)
                    .get_result::<i64>(tx_conn)
                    .map_err(AppError::from)?;

                if !payload.member_list.is_empty() {
                    diesel::update(
                        users_dsl::users.filter(users_dsl::id.eq_any(&payload.member_list)),
                    )
                    .set(users_dsl::peer_group_id.eq(Some(new_group_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;
                }

                Ok(new_group_id)
            })
        })
        .await?;

    let new_group_id = creation_result?;
    info!("Created peer group {} ('{}')", new_group_id, title);
    Ok(ApiResponse::ok(new_group_id))
}

/// Renames a peer group.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the group does not exist (404)
/// * `None` if the title is taken (409)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn rename_peer_group(
    State(state): State<AppState>,
    Json(payload): Json<RenamePeerGroupPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let group_id = payload.peer_group_id;
    let title = payload.title.clone();

    info!("Renaming peer group {} to '{}'", group_id, title);

    let title_taken = helper::run_query(&state.pool, {
        let title = title.clone();
        move |conn| {
            diesel::select(exists(
                pg_dsl::peer_groups
                    .filter(pg_dsl::title.eq(title))
                    .filter(pg_dsl::id.ne(group_id)),
            ))
            .get_result::<bool>(conn)
        }
    })
    .await?;
    if title_taken {
        warn!("Peer group title '{}' is already taken.", title);
        return Err(AppError::Conflict(format!(
            "Peer group title '{}' is already taken.",
            title
        )));
    }

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::update(pg_dsl::peer_groups.find(group_id))
            .set(pg_dsl::title.eq(payload.title))
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Peer group with ID {} not found.", group_id);
        return Err(AppError::NotFound(format!(
            "Peer group with ID {} not found.",
            group_id
        )));
    }

    info!("Renamed peer group {}", group_id);
    Ok(ApiResponse::ok(true))
}

/// Deletes a peer group, detaching its members and invalidating its invites.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the group does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn delete_peer_group(
    State(state): State<AppState>,
    Json(payload): Json<DeletePeerGroupPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let group_id = payload.peer_group_id;

    info!("Attempting to delete peer group {}", group_id);

    check_peer_group_exists(&state.pool, group_id).await?;

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::update(
                    users_dsl::users.filter(users_dsl::peer_group_id.eq(group_id)),
                )
                .set(users_dsl::peer_group_id.eq(None::<i64>))
                .execute(tx_conn)
                .map_err(AppError::from)?;

                diesel::delete(
                    pgi_dsl::peer_group_invites.filter(pgi_dsl::peer_group_id.eq(group_id)),
                )
                .execute(tx_conn)
                .map_err(AppError::from)?;

                let group_deleted = diesel::delete(pg_dsl::peer_groups.find(group_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                if group_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "Peer group {} not found during final delete step.",
                        group_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted peer group {}", group_id);
    Ok(ApiResponse::ok(true))
}

/// Mints a single-use invite for a peer group.
///
/// Returns (wrapped in `ApiResponse`)
/// * `InviteLinkResponse` carrying the invite UUID (200)
/// * `None` if the group does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn generate_group_invite(
    State(state): State<AppState>,
    Json(payload): Json<GenerateGroupInvitePayload>,
) -> Result<ApiResponse<InviteLinkResponse>, AppError> {
    let group_id = payload.peer_group_id;

    info!("Generating invite for peer group {}", group_id);

    check_peer_group_exists(&state.pool, group_id).await?;

    let new_invite = NewPeerGroupInvite {
        uuid: Uuid::new_v4(),
        peer_group_id: group_id,
    };

    let uuid = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(pgi_dsl::peer_group_invites)
            .values(&new_invite)
            .returning(pgi_dsl::uuid)
            .get_result::<Uuid>(conn)
    })
    .await?;

    info!("Generated invite {} for peer group {}", uuid, group_id);
    Ok(ApiResponse::ok(InviteLinkResponse { uuid }))
}

// modules

/// Lists lesson modules.
#[instrument(skip(state))]
pub async fn get_modules(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<ModuleResponse>>, AppError> {
    info!("Listing modules");

    let modules = helper::run_query(&state.pool, move |conn| {
        modules_dsl::modules
            .order((modules_dsl::position.asc(), modules_dsl::id.asc()))
            .select((modules_dsl::id, modules_dsl::title, modules_dsl::position))
            .load::<ModuleResponse>(conn)
    })
    .await?;

    info!("Listed {} modules", modules.len());
    Ok(ApiResponse::ok(modules))
}

/// Creates a module.
#[instrument(skip(state, payload))]
pub async fn create_module(
    State(state): State<AppState>,
    Json(payload): Json<CreateModulePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Creating module '{}'", payload.title);

    let new_module = NewModule {
        title: payload.title.clone(),
        position: payload.position,
    };

    let new_id = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(modules_dsl::modules)
            .values(&new_module)
            .returning(modules_dsl::id)
            .get_result::<i64>(conn)
    })
    .await?;

    info!("Created module {} ('{}')", new_id, payload.title);
    Ok(ApiResponse::ok(new_id))
}

/// Updates a module's title and/or position.
#[instrument(skip(state, payload))]
pub async fn modify_module(
    State(state): State<AppState>,
    Json(payload): Json<ModifyModulePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let module_id = payload.module_id;

    info!("Attempting to modify module {}", module_id);
    debug!("Modify module payload: {:?}", payload);

    if payload.title.is_none() && payload.position.is_none() {
        return Err(AppError::BadRequest(
            "No fields provided to update.".to_string(),
        ));
    }

    let changeset = ModuleChangeset {
        title: payload.title,
        position: payload.position,
    };

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::update(modules_dsl::modules.find(module_id))
            .set(&changeset)
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Module with ID {} not found.", module_id);
        return Err(AppError::NotFound(format!(
            "Module with ID {} not found.",
            module_id
        )));
    }

    info!("Modified module {}", module_id);
    Ok(ApiResponse::ok(true))
}

/// Deletes a module, detaching its lessons.
#[instrument(skip(state, payload))]
pub async fn delete_module(
    State(state): State<AppState>,
    Json(payload): Json<DeleteModulePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let module_id = payload.module_id;

    info!("Attempting to delete module {}", module_id);

    let module_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(modules_dsl::modules.find(module_id))).get_result::<bool>(conn)
    })
    .await?;
    if !module_exists {
        warn!("Module with ID {} not found.", module_id);
        return Err(AppError::NotFound(format!(
            "Module with ID {} not found.",
            module_id
        )));
    }

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::update(lessons_dsl::lessons.filter(lessons_dsl::module_id.eq(module_id)))
                    .set(lessons_dsl::module_id.eq(None::<i64>))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                let module_deleted = diesel::delete(modules_dsl::modules.find(module_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                if module_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "Module {} not found during final delete step.",
                        module_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted module {}", module_id);
    Ok(ApiResponse::ok(true))
}

// lessons

/// Lists every lesson, enhanced-only ones included.
#[instrument(skip(state))]
pub async fn get_lessons(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<LessonResponse>>, AppError> {
    info!("Listing lessons (admin view)");

    let lessons = helper::run_query(&state.pool, move |conn| {
        lessons_dsl::lessons
            .order((lessons_dsl::position.asc(), lessons_dsl::id.asc()))
            .select((
                lessons_dsl::id,
                lessons_dsl::module_id,
                lessons_dsl::title,
                lessons_dsl::description,
                lessons_dsl::is_enhanced_only,
                lessons_dsl::position,
                lessons_dsl::created_at,
                lessons_dsl::updated_at,
            ))
            .load::<LessonResponse>(conn)
    })
    .await?;

    info!("Listed {} lessons", lessons.len());
    Ok(ApiResponse::ok(lessons))
}

/// Creates a lesson.
///
/// Returns (wrapped in `ApiResponse`)
/// * the new lesson id as `i64` (200)
/// * `None` if the target module does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn create_lesson(
    State(state): State<AppState>,
    Json(payload): Json<CreateLessonPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Creating lesson '{}'", payload.title);
    debug!("Create lesson payload: {:?}", payload);

    if let Some(module_id) = payload.module_id {
        check_module_exists(&state.pool, module_id).await?;
    }

    let new_lesson = NewLesson {
        module_id: payload.module_id,
        title: payload.title.clone(),
        description: payload.description,
        is_enhanced_only: Some(payload.is_enhanced_only),
        position: payload.position,
    };

    let new_id = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(lessons_dsl::lessons)
            .values(&new_lesson)
            .returning(lessons_dsl::id)
            .get_result::<i64>(conn)
    })
    .await?;

    info!("Created lesson {} ('{}')", new_id, payload.title);
    Ok(ApiResponse::ok(new_id))
}

/// Updates a lesson. Always bumps `updated_at`.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the lesson or target module does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn modify_lesson(
    State(state): State<AppState>,
    Json(payload): Json<ModifyLessonPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;

    info!("Attempting to modify lesson {}", lesson_id);
    debug!("Modify lesson payload: {:?}", payload);

    if let Some(module_id) = payload.module_id {
        check_module_exists(&state.pool, module_id).await?;
    }

    let changeset = LessonChangeset {
        module_id: payload.module_id,
        title: payload.title,
        description: payload.description,
        is_enhanced_only: payload.is_enhanced_only,
        position: payload.position,
        updated_at: Some(Utc::now()),
    };

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::update(lessons_dsl::lessons.find(lesson_id))
            .set(&changeset)
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Lesson with ID {} not found.", lesson_id);
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }

    info!("Modified lesson {}", lesson_id);
    Ok(ApiResponse::ok(true))
}

/// Deletes a lesson and everything hanging off it.
#[instrument(skip(state, payload))]
pub async fn delete_lesson(
    State(state): State<AppState>,
    Json(payload): Json<DeleteLessonPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;

    info!("Attempting to delete lesson {}", lesson_id);

    let lesson_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(lessons_dsl::lessons.find(lesson_id))).get_result::<bool>(conn)
    })
    .await?;
    if !lesson_exists {
        warn!("Lesson with ID {} not found.", lesson_id);
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::delete(lp_dsl::lesson_progress.filter(lp_dsl::lesson_id.eq(lesson_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                diesel::delete(
                    lpr_dsl::lesson_presenters.filter(lpr_dsl::lesson_id.eq(lesson_id)),
                )
                .execute(tx_conn)
                .map_err(AppError::from)?;

                diesel::delete(lt_dsl::lesson_tags.filter(lt_dsl::lesson_id.eq(lesson_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                diesel::delete(lr_dsl::lesson_resources.filter(lr_dsl::lesson_id.eq(lesson_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                let lesson_deleted = diesel::delete(lessons_dsl::lessons.find(lesson_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                if lesson_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "Lesson {} not found during final delete step.",
                        lesson_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted lesson {}", lesson_id);
    Ok(ApiResponse::ok(true))
}

// presenters

/// Lists presenters.
#[instrument(skip(state))]
pub async fn get_presenters(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<PresenterInfo>>, AppError> {
    info!("Listing presenters");

    let presenters = helper::run_query(&state.pool, move |conn| {
        presenters_dsl::presenters
            .order(presenters_dsl::name.asc())
            .select((
                presenters_dsl::id,
                presenters_dsl::name,
                presenters_dsl::bio,
                presenters_dsl::photo_url,
            ))
            .load::<PresenterInfo>(conn)
    })
    .await?;

    info!("Listed {} presenters", presenters.len());
    Ok(ApiResponse::ok(presenters))
}

/// Creates a presenter.
#[instrument(skip(state, payload))]
pub async fn create_presenter(
    State(state): State<AppState>,
    Json(payload): Json<CreatePresenterPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Creating presenter '{}'", payload.name);

    let new_presenter = NewPresenter {
        name: payload.name.clone(),
        bio: payload.bio,
        photo_url: payload.photo_url,
    };

    let new_id = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(presenters_dsl::presenters)
            .values(&new_presenter)
            .returning(presenters_dsl::id)
            .get_result::<i64>(conn)
    })
    .await?;

    info!("Created presenter {} ('{}')", new_id, payload.name);
    Ok(ApiResponse::ok(new_id))
}

/// Updates a presenter.
#[instrument(skip(state, payload))]
pub async fn modify_presenter(
    State(state): State<AppState>,
    Json(payload): Json<ModifyPresenterPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let presenter_id = payload.presenter_id;

    info!("Attempting to modify presenter {}", presenter_id);
    debug!("Modify presenter payload: {:?}", payload);

    if payload.name.is_none() && payload.bio.is_none() && payload.photo_url.is_none() {
        return Err(AppError::BadRequest(
            "No fields provided to update.".to_string(),
        ));
    }

    let changeset = PresenterChangeset {
        name: payload.name,
        bio: payload.bio,
        photo_url: payload.photo_url,
    };

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::update(presenters_dsl::presenters.find(presenter_id))
            .set(&changeset)
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Presenter with ID {} not found.", presenter_id);
        return Err(AppError::NotFound(format!(
            "Presenter with ID {} not found.",
            presenter_id
        )));
    }

    info!("Modified presenter {}", presenter_id);
    Ok(ApiResponse::ok(true))
}

/// Deletes a presenter and their lesson assignments.
#[instrument(skip(state, payload))]
pub async fn delete_presenter(
    State(state): State<AppState>,
    Json(payload): Json<DeletePresenterPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let presenter_id = payload.presenter_id;

    info!("Attempting to delete presenter {}", presenter_id);

    let presenter_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(presenters_dsl::presenters.find(presenter_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !presenter_exists {
        warn!("Presenter with ID {} not found.", presenter_id);
        return Err(AppError::NotFound(format!(
            "Presenter with ID {} not found.",
            presenter_id
        )));
    }

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::delete(
                    lpr_dsl::lesson_presenters.filter(lpr_dsl::presenter_id.eq(presenter_id)),
                )
                .execute(tx_conn)
                .map_err(AppError::from)?;

                let presenter_deleted =
                    diesel::delete(presenters_dsl::presenters.find(presenter_id))
                        .execute(tx_conn)
                        .map_err(AppError::from)?;

                if presenter_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "Presenter {} not found during final delete step.",
                        presenter_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted presenter {}", presenter_id);
    Ok(ApiResponse::ok(true))
}

/// Assigns a presenter to a lesson. Idempotent.
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` (200)
/// * `None` if the lesson or presenter does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn assign_presenter(
    State(state): State<AppState>,
    Json(payload): Json<AssignPresenterPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;
    let presenter_id = payload.presenter_id;

    info!(
        "Assigning presenter {} to lesson {}",
        presenter_id, lesson_id
    );

    let new_link = NewLessonPresenter {
        lesson_id,
        presenter_id,
    };

    let insert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(lpr_dsl::lesson_presenters)
            .values(&new_link)
            .on_conflict((lpr_dsl::lesson_id, lpr_dsl::presenter_id))
            .do_nothing()
            .execute(conn)
    })
    .await;

    match insert_result {
        Ok(_) => {
            info!(
                "Presenter {} is assigned to lesson {}",
                presenter_id, lesson_id
            );
            Ok(ApiResponse::ok(true))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _,
        ))) => {
            warn!(
                "Assign presenter hit a foreign key violation for lesson_id: {} or presenter_id: {}",
                lesson_id, presenter_id
            );
            Err(AppError::NotFound(format!(
                "Lesson with ID {} or Presenter with ID {} not found.",
                lesson_id, presenter_id
            )))
        }
        Err(e) => Err(e),
    }
}

/// Removes a presenter from a lesson.
#[instrument(skip(state, payload))]
pub async fn unassign_presenter(
    State(state): State<AppState>,
    Json(payload): Json<UnassignPresenterPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;
    let presenter_id = payload.presenter_id;

    info!(
        "Unassigning presenter {} from lesson {}",
        presenter_id, lesson_id
    );

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::delete(
            lpr_dsl::lesson_presenters
                .filter(lpr_dsl::lesson_id.eq(lesson_id))
                .filter(lpr_dsl::presenter_id.eq(presenter_id)),
        )
        .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!(
            "Presenter {} is not assigned to lesson {}.",
            presenter_id, lesson_id
        );
        return Err(AppError::NotFound(format!(
            "Presenter {} is not assigned to lesson {}.",
            presenter_id, lesson_id
        )));
    }

    info!(
        "Unassigned presenter {} from lesson {}",
        presenter_id, lesson_id
    );
    Ok(ApiResponse::ok(true))
}

// tags

/// Lists tags.
#[instrument(skip(state))]
pub async fn get_tags(State(state): State<AppState>) -> Result<ApiResponse<Vec<TagInfo>>, AppError> {
    info!("Listing tags");

    let tags = helper::run_query(&state.pool, move |conn| {
        tags_dsl::tags
            .order(tags_dsl::name.asc())
            .select((tags_dsl::id, tags_dsl::name))
            .load::<TagInfo>(conn)
    })
    .await?;

    info!("Listed {} tags", tags.len());
    Ok(ApiResponse::ok(tags))
}

/// Creates a tag.
///
/// Returns (wrapped in `ApiResponse`)
/// * the new tag id as `i64` (200)
/// * `None` if the name is taken (409)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    Json(payload): Json<CreateTagPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Creating tag '{}'", payload.name);

    let new_tag = NewTag {
        name: payload.name.clone(),
    };

    let insert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(tags_dsl::tags)
            .values(&new_tag)
            .returning(tags_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match insert_result {
        Ok(new_id) => {
            info!("Created tag {} ('{}')", new_id, payload.name);
            Ok(ApiResponse::ok(new_id))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            warn!("Tag name '{}' is already taken.", payload.name);
            Err(AppError::Conflict(format!(
                "Tag name '{}' is already taken.",
                payload.name
            )))
        }
        Err(e) => Err(e),
    }
}

/// Deletes a tag and its lesson links.
#[instrument(skip(state, payload))]
pub async fn delete_tag(
    State(state): State<AppState>,
    Json(payload): Json<DeleteTagPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let tag_id = payload.tag_id;

    info!("Attempting to delete tag {}", tag_id);

    let tag_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(tags_dsl::tags.find(tag_id))).get_result::<bool>(conn)
    })
    .await?;
    if !tag_exists {
        warn!("Tag with ID {} not found.", tag_id);
        return Err(AppError::NotFound(format!(
            "Tag with ID {} not found.",
            tag_id
        )));
    }

    let conn = state.pool.get().await?;
    let deletion_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                diesel::delete(lt_dsl::lesson_tags.filter(lt_dsl::tag_id.eq(tag_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                let tag_deleted = diesel::delete(tags_dsl::tags.find(tag_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                if tag_deleted == 1 {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "Tag {} not found during final delete step.",
                        tag_id
                    )))
                }
            })
        })
        .await?;

    deletion_result?;
    info!("Deleted tag {}", tag_id);
    Ok(ApiResponse::ok(true))
}

/// Attaches a tag to a lesson. Idempotent.
#[instrument(skip(state, payload))]
pub async fn tag_lesson(
    State(state): State<AppState>,
    Json(payload): Json<TagLessonPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;
    let tag_id = payload.tag_id;

    info!("Tagging lesson {} with tag {}", lesson_id, tag_id);

    let new_link = NewLessonTag { lesson_id, tag_id };

    let insert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(lt_dsl::lesson_tags)
            .values(&new_link)
            .on_conflict((lt_dsl::lesson_id, lt_dsl::tag_id))
            .do_nothing()
            .execute(conn)
    })
    .await;

    match insert_result {
        Ok(_) => {
            info!("Lesson {} carries tag {}", lesson_id, tag_id);
            Ok(ApiResponse::ok(true))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _,
        ))) => {
            warn!(
                "Tag lesson hit a foreign key violation for lesson_id: {} or tag_id: {}",
                lesson_id, tag_id
            );
            Err(AppError::NotFound(format!(
                "Lesson with ID {} or Tag with ID {} not found.",
                lesson_id, tag_id
            )))
        }
        Err(e) => Err(e),
    }
}

/// Detaches a tag from a lesson.
#[instrument(skip(state, payload))]
pub async fn untag_lesson(
    State(state): State<AppState>,
    Json(payload): Json<UntagLessonPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let lesson_id = payload.lesson_id;
    let tag_id = payload.tag_id;

    info!("Untagging lesson {} from tag {}", lesson_id, tag_id);

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::delete(
            lt_dsl::lesson_tags
                .filter(lt_dsl::lesson_id.eq(lesson_id))
                .filter(lt_dsl::tag_id.eq(tag_id)),
        )
        .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Lesson {} does not carry tag {}.", lesson_id, tag_id);
        return Err(AppError::NotFound(format!(
            "Lesson {} does not carry tag {}.",
            lesson_id, tag_id
        )));
    }

    info!("Untagged lesson {} from tag {}", lesson_id, tag_id);
    Ok(ApiResponse::ok(true))
}

// resources

/// Adds a resource to a lesson.
///
/// Against a legacy schema the category/position fields are dropped from the
/// insert (and a warning is logged) instead of failing the request.
///
/// Returns (wrapped in `ApiResponse`)
/// * the new resource id as `i64` (200)
/// * `None` if the lesson does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn add_resource(
    State(state): State<AppState>,
    Json(payload): Json<AddResourcePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    let lesson_id = payload.lesson_id;

    info!(
        "Adding resource '{}' to lesson {}",
        payload.title, lesson_id
    );
    debug!("Add resource payload: {:?}", payload);

    let lesson_exists = helper::run_query(&state.pool, move |conn| {
        diesel::select(exists(lessons_dsl::lessons.find(lesson_id))).get_result::<bool>(conn)
    })
    .await?;
    if !lesson_exists {
        warn!("Lesson with ID {} not found.", lesson_id);
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }

    let new_id = if state.capabilities.lesson_resource_metadata {
        let new_resource = NewResource {
            lesson_id,
            title: payload.title.clone(),
            url: payload.url,
            category: payload.category,
            position: payload.position,
        };
        helper::run_query(&state.pool, move |conn| {
            diesel::insert_into(lr_dsl::lesson_resources)
                .values(&new_resource)
                .returning(lr_dsl::id)
                .get_result::<i64>(conn)
        })
        .await?
    } else {
        if payload.category.is_some() || payload.position.is_some() {
            warn!(
                "Dropping resource category/position for lesson {}: schema predates those columns",
                lesson_id
            );
        }
        let new_resource = NewResourceLegacy {
            lesson_id,
            title: payload.title.clone(),
            url: payload.url,
        };
        helper::run_query(&state.pool, move |conn| {
            diesel::insert_into(lr_dsl::lesson_resources)
                .values(&new_resource)
                .returning(lr_dsl::id)
                .get_result::<i64>(conn)
        })
        .await?
    };

    info!(
        "Added resource {} ('{}') to lesson {}",
        new_id, payload.title, lesson_id
    );
    Ok(ApiResponse::ok(new_id))
}

/// Removes a resource.
#[instrument(skip(state, payload))]
pub async fn remove_resource(
    State(state): State<AppState>,
    Json(payload): Json<RemoveResourcePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let resource_id = payload.resource_id;

    info!("Removing resource {}", resource_id);

    let rows_affected = helper::run_query(&state.pool, move |conn| {
        diesel::delete(lr_dsl::lesson_resources.find(resource_id)).execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("Resource with ID {} not found.", resource_id);
        return Err(AppError::NotFound(format!(
            "Resource with ID {} not found.",
            resource_id
        )));
    }

    info!("Removed resource {}", resource_id);
    Ok(ApiResponse::ok(true))
}

// shared checks

fn validate_role(raw: &str) -> Result<Role, AppError> {
    Role::try_parse(raw).ok_or_else(|| {
        AppError::UnprocessableEntity(format!(
            "Invalid role '{}'. Expected one of: admin, enhanced, normal.",
            raw
        ))
    })
}

async fn check_peer_group_exists(pool: &Pool, group_id: i64) -> Result<(), AppError> {
    let group_exists = helper::run_query(pool, move |conn| {
        diesel::select(exists(pg_dsl::peer_groups.find(group_id))).get_result::<bool>(conn)
    })
    .await?;

    if group_exists {
        Ok(())
    } else {
        warn!("Peer group with ID {} not found.", group_id);
        Err(AppError::NotFound(format!(
            "Peer group with ID {} not found.",
            group_id
        )))
    }
}

async fn check_module_exists(pool: &Pool, module_id: i64) -> Result<(), AppError> {
    let module_exists = helper::run_query(pool, move |conn| {
        diesel::select(exists(modules_dsl::modules.find(module_id))).get_result::<bool>(conn)
    })
    .await?;

    if module_exists {
        Ok(())
    } else {
        warn!("Module with ID {} not found.", module_id);
        Err(AppError::NotFound(format!(
            "Module with ID {} not found.",
            module_id
        )))
    }
}
