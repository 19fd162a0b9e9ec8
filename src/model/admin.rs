use crate::schema::{
    lesson_presenters, lesson_resources, lesson_tags, lessons, modules, peer_group_invites,
    peer_groups, presenters, tags, users,
};
use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Insertable, Queryable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub peer_group_id: Option<i64>,
    // created_at and last_active have DB defaults (CURRENT_TIMESTAMP)
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub peer_group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = peer_groups)]
pub struct NewPeerGroup {
    pub title: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PeerGroupResponse {
    pub id: i64,
    pub title: String,
    pub member_count: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = peer_group_invites)]
pub struct NewPeerGroupInvite {
    pub uuid: Uuid,
    pub peer_group_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct InviteLinkResponse {
    pub uuid: Uuid,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = modules)]
pub struct NewModule {
    pub title: String,
    pub position: i32,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = modules)]
pub struct ModuleChangeset {
    pub title: Option<String>,
    pub position: Option<i32>,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct ModuleResponse {
    pub id: i64,
    pub title: String,
    pub position: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lessons)]
pub struct NewLesson {
    pub module_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub is_enhanced_only: Option<bool>,
    pub position: i32,
    // created_at and updated_at have DB defaults (CURRENT_TIMESTAMP)
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = lessons)]
pub struct LessonChangeset {
    pub module_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_enhanced_only: Option<bool>,
    pub position: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct LessonResponse {
    pub id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub is_enhanced_only: Option<bool>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = presenters)]
pub struct NewPresenter {
    pub name: String,
    pub bio: String,
    pub photo_url: Option<String>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = presenters)]
pub struct PresenterChangeset {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lesson_presenters)]
pub struct NewLessonPresenter {
    pub lesson_id: i64,
    pub presenter_id: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tags)]
pub struct NewTag {
    pub name: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lesson_tags)]
pub struct NewLessonTag {
    pub lesson_id: i64,
    pub tag_id: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = lesson_resources)]
pub struct NewResource {
    pub lesson_id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub position: Option<i32>,
}

/// Insert shape used against schemas predating the resource metadata columns.
#[derive(Insertable, Debug)]
#[diesel(table_name = lesson_resources)]
pub struct NewResourceLegacy {
    pub lesson_id: i64,
    pub title: String,
    pub url: String,
}
