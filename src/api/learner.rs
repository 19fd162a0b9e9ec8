use super::helper;
use crate::AppState;
use crate::errors::AppError;
use crate::leaderboard::{self, LessonVisibility, Member, ProgressRow, clamp_percent};
use crate::model::learner::{
    LeaderboardResponse, LessonDataResponse, LessonSummary, NewLessonProgress, PeerGroupInfo,
    PresenterInfo, ResourceInfo, SessionUser, TagInfo,
};
use crate::model::{Role, display_name};
use crate::payloads::learner::{
    ClaimGroupInvitePayload, GetLeaderboardParams, GetLessonDataParams, GetLessonsParams,
    ResolveSessionParams, SaveProgressPayload,
};
use crate::response::ApiResponse;
use crate::schema::{
    lesson_presenters::dsl as lpr_dsl, lesson_progress::dsl as lp_dsl,
    lesson_resources::dsl as lr_dsl, lesson_tags::dsl as lt_dsl, lessons::dsl as lessons_dsl,
    modules::dsl as modules_dsl, peer_group_invites::dsl as pgi_dsl, peer_groups::dsl as pg_dsl,
    presenters::dsl as presenters_dsl, tags::dsl as tags_dsl, users::dsl as users_dsl,
};
use crate::session::{self, Session};
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::HashMap;
use tracing::log::warn;
use tracing::{debug, info, instrument};

fn empty_leaderboard() -> LeaderboardResponse {
    LeaderboardResponse {
        peer_group: None,
        entries: Vec::new(),
        last_updated: None,
    }
}

/// Computes the peer-group leaderboard for the requesting user.
///
/// Query Parameters:
/// * `user_id`: The ID of the requesting user (`userId` accepted).
///
/// Returns (wrapped in `ApiResponse`)
/// * `LeaderboardResponse` if succeeded (200). A user without a peer group
///   (or with a dangling group reference) gets the empty state, not an error.
/// * `None` if the user does not exist (404).
/// * `None` if failed (500).
#[instrument(skip(state, params))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<GetLeaderboardParams>,
) -> Result<ApiResponse<LeaderboardResponse>, AppError> {
    let user_id = params.user_id;

    info!("Computing leaderboard for user_id: {}", user_id);
    debug!("Get leaderboard params: {:?}", params);

    let user = helper::run_query(&state.pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select(users_dsl::peer_group_id)
            .first::<Option<i64>>(conn)
            .optional()
    })
    .await?;

    let peer_group_id = match user {
        Some(group_ref) => group_ref,
        None => {
            warn!("User with ID {} not found.", user_id);
            return Err(AppError::NotFound(format!(
                "User with ID {} not found.",
                user_id
            )));
        }
    };

    let group_id = match peer_group_id {
        Some(group_id) => group_id,
        None => {
            info!("User {} has no peer group; returning empty state", user_id);
            return Ok(ApiResponse::ok(empty_leaderboard()));
        }
    };

    let group_title = helper::run_query(&state.pool, move |conn| {
        pg_dsl::peer_groups
            .find(group_id)
            .select(pg_dsl::title)
            .first::<String>(conn)
            .optional()
    })
    .await?;

    let group_title = match group_title {
        Some(title) => title,
        None => {
            // Dangling reference: tolerated, same empty state as "no group".
            warn!(
                "User {} references peer group {} which does not exist; returning empty state",
                user_id, group_id
            );
            return Ok(ApiResponse::ok(empty_leaderboard()));
        }
    };

    // Member and lesson reads are independent of each other.
    let members_future = helper::run_query(&state.pool, move |conn| {
        users_dsl::users
            .filter(users_dsl::peer_group_id.eq(group_id))
            .order(users_dsl::id.asc())
            .select((
                users_dsl::id,
                users_dsl::display_name,
                users_dsl::email,
                users_dsl::role,
            ))
            .load::<(i64, Option<String>, String, String)>(conn)
    });
    let lessons_future = helper::run_query(&state.pool, move |conn| {
        lessons_dsl::lessons
            .select((lessons_dsl::id, lessons_dsl::is_enhanced_only))
            .load::<(i64, Option<bool>)>(conn)
    });
    let (member_rows, lesson_rows) = tokio::join!(members_future, lessons_future);
    let member_rows = member_rows?;
    let lesson_rows = lesson_rows?;

    let peer_group = Some(PeerGroupInfo {
        id: group_id,
        name: group_title,
    });

    if member_rows.is_empty() {
        info!("Peer group {} has no members", group_id);
        return Ok(ApiResponse::ok(LeaderboardResponse {
            peer_group,
            entries: Vec::new(),
            last_updated: None,
        }));
    }

    let members: Vec<Member> = member_rows
        .into_iter()
        .map(|(id, display_name, email, role)| Member {
            id,
            display_name,
            email,
            role: Role::parse(&role),
        })
        .collect();
    let lessons: Vec<LessonVisibility> = lesson_rows
        .into_iter()
        .map(|(id, enhanced_only)| LessonVisibility {
            id,
            enhanced_only: enhanced_only.unwrap_or(false),
        })
        .collect();

    let member_ids: Vec<i64> = members.iter().map(|member| member.id).collect();
    let lesson_ids: Vec<i64> = lessons.iter().map(|lesson| lesson.id).collect();

    let progress_rows = helper::run_query(&state.pool, move |conn| {
        lp_dsl::lesson_progress
            .filter(lp_dsl::user_id.eq_any(member_ids))
            .filter(lp_dsl::lesson_id.eq_any(lesson_ids))
            .select((
                lp_dsl::user_id,
                lp_dsl::lesson_id,
                lp_dsl::progress_percent,
                lp_dsl::updated_at,
            ))
            .load::<(i64, i64, Option<f64>, Option<DateTime<Utc>>)>(conn)
    })
    .await?;

    let progress: Vec<ProgressRow> = progress_rows
        .into_iter()
        .map(|(user_id, lesson_id, percent, updated_at)| ProgressRow {
            user_id,
            lesson_id,
            percent,
            updated_at,
        })
        .collect();

    let (entries, last_updated) = leaderboard::rank_members(&members, &lessons, &progress);

    info!(
        "Leaderboard for group {} computed with {} entries",
        group_id,
        entries.len()
    );
    Ok(ApiResponse::ok(LeaderboardResponse {
        peer_group,
        entries,
        last_updated,
    }))
}

/// Lists the lessons visible to a user, with their own progress attached.
///
/// Query Parameters:
/// * `user_id`: The ID of the requesting user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<LessonSummary>` ordered by module position then lesson position (200).
/// * `None` if the user does not exist (404).
/// * `None` if failed (500).
#[instrument(skip(state, params))]
pub async fn get_lessons(
    State(state): State<AppState>,
    Query(params): Query<GetLessonsParams>,
) -> Result<ApiResponse<Vec<LessonSummary>>, AppError> {
    let user_id = params.user_id;

    info!("Listing lessons for user_id: {}", user_id);

    let role = load_user_role(&state.pool, user_id).await?;

    let sees_enhanced = role.sees_enhanced_only();
    let lesson_rows = helper::run_query(&state.pool, move |conn| {
        let mut query = lessons_dsl::lessons
            .left_join(modules_dsl::modules)
            .select((
                lessons_dsl::id,
                lessons_dsl::module_id,
                lessons_dsl::title,
                lessons_dsl::is_enhanced_only,
                lessons_dsl::position,
            ))
            .order((
                modules_dsl::position.asc(),
                lessons_dsl::position.asc(),
                lessons_dsl::id.asc(),
            ))
            .into_boxed();

        if !sees_enhanced {
            query = query.filter(
                lessons_dsl::is_enhanced_only
                    .eq(false)
                    .or(lessons_dsl::is_enhanced_only.is_null()),
            );
        }

        query.load::<(i64, Option<i64>, String, Option<bool>, i32)>(conn)
    })
    .await?;

    let progress_rows = helper::run_query(&state.pool, move |conn| {
        lp_dsl::lesson_progress
            .filter(lp_dsl::user_id.eq(user_id))
            .select((lp_dsl::lesson_id, lp_dsl::progress_percent))
            .load::<(i64, Option<f64>)>(conn)
    })
    .await?;
    let progress_by_lesson: HashMap<i64, f64> = progress_rows
        .into_iter()
        .map(|(lesson_id, percent)| (lesson_id, clamp_percent(percent)))
        .collect();

    let summaries: Vec<LessonSummary> = lesson_rows
        .into_iter()
        .map(
            |(id, module_id, title, is_enhanced_only, position)| LessonSummary {
                id,
                module_id,
                title,
                is_enhanced_only: is_enhanced_only.unwrap_or(false),
                position,
                progress_percent: progress_by_lesson.get(&id).copied().unwrap_or(0.0),
            },
        )
        .collect();

    info!(
        "Listed {} lessons for user_id: {}",
        summaries.len(),
        user_id
    );
    Ok(ApiResponse::ok(summaries))
}

/// Retrieves one lesson with its presenters, tags and resources.
///
/// Query Parameters:
/// * `user_id`: The ID of the requesting user.
/// * `lesson_id`: The ID of the lesson.
///
/// Returns (wrapped in `ApiResponse`)
/// * `LessonDataResponse` if succeeded (200). Against a legacy schema the
///   resource category/position fields are omitted and flagged.
/// * `None` if the user does not exist, the lesson does not exist, or the
///   lesson is outside the user's visible set (404).
/// * `None` if failed (500).
#[instrument(skip(state, params))]
pub async fn get_lesson_data(
    State(state): State<AppState>,
    Query(params): Query<GetLessonDataParams>,
) -> Result<ApiResponse<LessonDataResponse>, AppError> {
    let user_id = params.user_id;
    let lesson_id = params.lesson_id;

    info!(
        "Fetching lesson data for lesson_id: {} requested by user_id: {}",
        lesson_id, user_id
    );

    let role = load_user_role(&state.pool, user_id).await?;

    let lesson = helper::run_query(&state.pool, move |conn| {
        lessons_dsl::lessons
            .find(lesson_id)
            .select((
                lessons_dsl::id,
                lessons_dsl::module_id,
                lessons_dsl::title,
                lessons_dsl::description,
                lessons_dsl::is_enhanced_only,
                lessons_dsl::position,
            ))
            .first::<(i64, Option<i64>, String, String, Option<bool>, i32)>(conn)
            .optional()
    })
    .await?;

    let (id, module_id, title, description, is_enhanced_only, position) = match lesson {
        Some(lesson) => lesson,
        None => {
            warn!("Lesson with ID {} not found.", lesson_id);
            return Err(AppError::NotFound(format!(
                "Lesson with ID {} not found.",
                lesson_id
            )));
        }
    };

    let is_enhanced_only = is_enhanced_only.unwrap_or(false);
    if is_enhanced_only && !role.sees_enhanced_only() {
        // Invisible lessons are reported exactly like missing ones.
        warn!(
            "User {} (role {}) requested enhanced-only lesson {}",
            user_id,
            role.as_str(),
            lesson_id
        );
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }

    let presenters = helper::run_query(&state.pool, move |conn| {
        lpr_dsl::lesson_presenters
            .filter(lpr_dsl::lesson_id.eq(lesson_id))
            .inner_join(presenters_dsl::presenters)
            .select((
                presenters_dsl::id,
                presenters_dsl::name,
                presenters_dsl::bio,
                presenters_dsl::photo_url,
            ))
            .order(presenters_dsl::name.asc())
            .load::<PresenterInfo>(conn)
    })
    .await?;

    let tags = helper::run_query(&state.pool, move |conn| {
        lt_dsl::lesson_tags
            .filter(lt_dsl::lesson_id.eq(lesson_id))
            .inner_join(tags_dsl::tags)
            .select((tags_dsl::id, tags_dsl::name))
            .order(tags_dsl::name.asc())
            .load::<TagInfo>(conn)
    })
    .await?;

    let legacy_resource_schema = !state.capabilities.lesson_resource_metadata;
    let resources: Vec<ResourceInfo> = if legacy_resource_schema {
        helper::run_query(&state.pool, move |conn| {
            lr_dsl::lesson_resources
                .filter(lr_dsl::lesson_id.eq(lesson_id))
                .select((lr_dsl::id, lr_dsl::title, lr_dsl::url))
                .order(lr_dsl::id.asc())
                .load::<(i64, String, String)>(conn)
        })
        .await?
        .into_iter()
        .map(|(id, title, url)| ResourceInfo {
            id,
            title,
            url,
            category: None,
            position: None,
        })
        .collect()
    } else {
        helper::run_query(&state.pool, move |conn| {
            lr_dsl::lesson_resources
                .filter(lr_dsl::lesson_id.eq(lesson_id))
                .select((
                    lr_dsl::id,
                    lr_dsl::title,
                    lr_dsl::url,
                    lr_dsl::category,
                    lr_dsl::position,
                ))
                .order((lr_dsl::position.asc(), lr_dsl::id.asc()))
                .load::<(i64, String, String, Option<String>, Option<i32>)>(conn)
        })
        .await?
        .into_iter()
        .map(|(id, title, url, category, position)| ResourceInfo {
            id,
            title,
            url,
            category,
            position,
        })
        .collect()
    };

    info!(
        "Fetched lesson {} with {} presenters, {} tags, {} resources",
        lesson_id,
        presenters.len(),
        tags.len(),
        resources.len()
    );
    Ok(ApiResponse::ok(LessonDataResponse {
        id,
        module_id,
        title,
        description,
        is_enhanced_only,
        position,
        presenters,
        tags,
        resources,
        legacy_resource_schema,
    }))
}

/// Saves a user's completion percentage for a lesson.
///
/// Parameters
/// * user_id as `i64`
/// * lesson_id as `i64`
/// * progress_percent as `f64`, clamped to [0, 100]
///
/// Returns (wrapped in `ApiResponse`)
/// * success as `bool` if succeeded (200). At most one row per
///   (user, lesson) exists; repeated saves update it in place.
/// * `None` if the value is not finite (400).
/// * `None` if user or lesson not found, or the lesson is outside the
///   user's eligible set (404).
/// * `None` if failed (500).
#[instrument(skip(state, payload))]
pub async fn save_progress(
    State(state): State<AppState>,
    Json(payload): Json<SaveProgressPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = payload.user_id;
    let lesson_id = payload.lesson_id;

    info!(
        "Saving progress for user_id: {} on lesson_id: {}",
        user_id, lesson_id
    );
    debug!("Save progress payload: {:?}", payload);

    if !payload.progress_percent.is_finite() {
        return Err(AppError::BadRequest(
            "progress_percent must be a finite number".to_string(),
        ));
    }
    let percent = payload.progress_percent.clamp(0.0, 100.0);

    let role = load_user_role(&state.pool, user_id).await?;

    let lesson_enhanced_only = helper::run_query(&state.pool, move |conn| {
        lessons_dsl::lessons
            .find(lesson_id)
            .select(lessons_dsl::is_enhanced_only)
            .first::<Option<bool>>(conn)
            .optional()
    })
    .await?;

    let lesson_enhanced_only = match lesson_enhanced_only {
        Some(flag) => flag.unwrap_or(false),
        None => {
            warn!("Lesson with ID {} not found.", lesson_id);
            return Err(AppError::NotFound(format!(
                "Lesson with ID {} not found.",
                lesson_id
            )));
        }
    };

    if lesson_enhanced_only && !role.sees_enhanced_only() {
        warn!(
            "User {} (role {}) attempted to save progress on enhanced-only lesson {}",
            user_id,
            role.as_str(),
            lesson_id
        );
        return Err(AppError::NotFound(format!(
            "Lesson with ID {} not found.",
            lesson_id
        )));
    }

    let saved_at = Utc::now();
    let record = NewLessonProgress {
        user_id,
        lesson_id,
        progress_percent: Some(percent),
        updated_at: Some(saved_at),
    };

    let upsert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(lp_dsl::lesson_progress)
            .values(&record)
            .on_conflict((lp_dsl::user_id, lp_dsl::lesson_id))
            .do_update()
            .set((
                lp_dsl::progress_percent.eq(percent),
                lp_dsl::updated_at.eq(saved_at),
            ))
            .execute(conn)
    })
    .await;

    match upsert_result {
        Ok(_) => {
            info!(
                "Saved progress {:.1}% for user {} on lesson {}",
                percent, user_id, lesson_id
            );
            Ok(ApiResponse::ok(true))
        }
        Err(AppError::DieselError(DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _,
        ))) => {
            warn!(
                "Progress upsert hit a foreign key violation for user_id: {} or lesson_id: {}",
                user_id, lesson_id
            );
            Err(AppError::NotFound(format!(
                "User with ID {} or Lesson with ID {} not found.",
                user_id, lesson_id
            )))
        }
        Err(e) => Err(e),
    }
}

/// Resolves the caller's identity from the presented credential sources.
///
/// Query Parameters:
/// * `sso_user_id` as `Option<i64>`
/// * `local_user_id` as `Option<i64>`
///
/// Returns (wrapped in `ApiResponse`)
/// * a tagged `Session` value: SSO wins over the local credential, which wins
///   over anonymous; an identity matching no user row falls through (200).
/// * `None` if failed (500).
#[instrument(skip(state, params))]
pub async fn resolve_session(
    State(state): State<AppState>,
    Query(params): Query<ResolveSessionParams>,
) -> Result<ApiResponse<Session<SessionUser>>, AppError> {
    debug!("Resolve session params: {:?}", params);

    let sso_user = match params.sso_user_id {
        Some(user_id) => load_session_user(&state.pool, user_id).await?,
        None => None,
    };

    // The local credential only matters when SSO did not resolve.
    let local_user = if sso_user.is_none() {
        match params.local_user_id {
            Some(user_id) => load_session_user(&state.pool, user_id).await?,
            None => None,
        }
    } else {
        None
    };

    let session = session::resolve(sso_user, local_user);
    info!(
        "Resolved session kind: {}",
        match &session {
            Session::Anonymous => "anonymous",
            Session::Local { .. } => "local",
            Session::Sso { .. } => "sso",
        }
    );
    Ok(ApiResponse::ok(session))
}

/// Claims a peer-group invite, assigning the user to the invite's group.
/// Invites are single-use: the claiming transaction deletes the row.
///
/// Parameters
/// * user_id as `i64`
/// * uuid as `Uuid`
///
/// Returns (wrapped in `ApiResponse`)
/// * the joined peer group id as `i64` if succeeded (200)
/// * `None` if the invite or user does not exist (404)
/// * `None` if failed (500)
#[instrument(skip(state, payload))]
pub async fn claim_group_invite(
    State(state): State<AppState>,
    Json(payload): Json<ClaimGroupInvitePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    let user_id = payload.user_id;
    let invite_uuid = payload.uuid;

    info!(
        "User {} attempting to claim group invite {}",
        user_id, invite_uuid
    );

    let conn = state.pool.get().await?;
    let claim_result: Result<i64, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx_conn| {
                let invite = pgi_dsl::peer_group_invites
                    .filter(pgi_dsl::uuid.eq(invite_uuid))
                    .select((pgi_dsl::id, pgi_dsl::peer_group_id))
                    .first::<(i64, i64)>(tx_conn)
                    .optional()
                    .map_err(AppError::from)?;

                let (invite_id, group_id) = match invite {
                    Some(invite) => invite,
                    None => {
                        return Err(AppError::NotFound(format!(
                            "Invite {} not found.",
                            invite_uuid
                        )));
                    }
                };

                let updated = diesel::update(users_dsl::users.find(user_id))
                    .set(users_dsl::peer_group_id.eq(Some(group_id)))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;
                if updated != 1 {
                    return Err(AppError::NotFound(format!(
                        "User with ID {} not found.",
                        user_id
                    )));
                }

                diesel::delete(pgi_dsl::peer_group_invites.find(invite_id))
                    .execute(tx_conn)
                    .map_err(AppError::from)?;

                Ok(group_id)
            })
        })
        .await?;

    let group_id = claim_result?;
    info!(
        "User {} joined peer group {} via invite {}",
        user_id, group_id, invite_uuid
    );
    Ok(ApiResponse::ok(group_id))
}

async fn load_user_role(pool: &Pool, user_id: i64) -> Result<Role, AppError> {
    let role = helper::run_query(pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select(users_dsl::role)
            .first::<String>(conn)
            .optional()
    })
    .await?;

    match role {
        Some(role) => Ok(Role::parse(&role)),
        None => {
            warn!("User with ID {} not found.", user_id);
            Err(AppError::NotFound(format!(
                "User with ID {} not found.",
                user_id
            )))
        }
    }
}

async fn load_session_user(pool: &Pool, user_id: i64) -> Result<Option<SessionUser>, AppError> {
    let row = helper::run_query(pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select((
                users_dsl::id,
                users_dsl::display_name,
                users_dsl::email,
                users_dsl::role,
                users_dsl::peer_group_id,
            ))
            .first::<(i64, Option<String>, String, String, Option<i64>)>(conn)
            .optional()
    })
    .await?;

    Ok(row.map(|(id, name, email, role, peer_group_id)| SessionUser {
        id,
        name: display_name(name.as_deref(), &email),
        email,
        role: Role::parse(&role).as_str().to_string(),
        peer_group_id,
    }))
}
