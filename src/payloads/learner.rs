use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct GetLeaderboardParams {
    /// `userId` accepted for compatibility with older clients.
    #[serde(alias = "userId")]
    pub user_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetLessonsParams {
    pub user_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetLessonDataParams {
    pub user_id: i64,
    pub lesson_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct SaveProgressPayload {
    pub user_id: i64,
    pub lesson_id: i64,
    pub progress_percent: f64,
}

#[derive(Deserialize, Debug)]
pub struct ResolveSessionParams {
    pub sso_user_id: Option<i64>,
    pub local_user_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct ClaimGroupInvitePayload {
    pub user_id: i64,
    pub uuid: Uuid,
}
