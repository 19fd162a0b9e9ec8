use crate::leaderboard::LeaderboardEntry;
use crate::schema::lesson_progress;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Insertable, Debug)]
#[diesel(table_name = lesson_progress)]
pub struct NewLessonProgress {
    pub user_id: i64,
    pub lesson_id: i64,
    pub progress_percent: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PeerGroupInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LeaderboardResponse {
    pub peer_group: Option<PeerGroupInfo>,
    pub entries: Vec<LeaderboardEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LessonSummary {
    pub id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub is_enhanced_only: bool,
    pub position: i32,
    pub progress_percent: f64,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct PresenterInfo {
    pub id: i64,
    pub name: String,
    pub bio: String,
    pub photo_url: Option<String>,
}

#[derive(Queryable, Deserialize, Serialize, Debug)]
pub struct TagInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ResourceInfo {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub position: Option<i32>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LessonDataResponse {
    pub id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub is_enhanced_only: bool,
    pub position: i32,

    pub presenters: Vec<PresenterInfo>,
    pub tags: Vec<TagInfo>,
    pub resources: Vec<ResourceInfo>,
    /// True when the running schema predates resource category/position
    /// columns and those fields were omitted.
    pub legacy_resource_schema: bool,
}

/// User shape returned by the session endpoint.
#[derive(Deserialize, Serialize, Debug)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub peer_group_id: Option<i64>,
}
