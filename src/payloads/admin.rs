use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct CreateUserPayload {
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub peer_group_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct ModifyUserPayload {
    pub user_id: i64,

    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SetUserGroupPayload {
    pub user_id: i64,
    /// None clears the assignment.
    pub peer_group_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct DeleteUserPayload {
    pub user_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreatePeerGroupPayload {
    pub title: String,
    #[serde(default)]
    pub member_list: Vec<i64>,
}

#[derive(Deserialize, Debug)]
pub struct RenamePeerGroupPayload {
    pub peer_group_id: i64,
    pub title: String,
}

#[derive(Deserialize, Debug)]
pub struct DeletePeerGroupPayload {
    pub peer_group_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GenerateGroupInvitePayload {
    pub peer_group_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreateModulePayload {
    pub title: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Deserialize, Debug)]
pub struct ModifyModulePayload {
    pub module_id: i64,

    pub title: Option<String>,
    pub position: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct DeleteModulePayload {
    pub module_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreateLessonPayload {
    pub module_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_enhanced_only: bool,
    #[serde(default)]
    pub position: i32,
}

#[derive(Deserialize, Debug)]
pub struct ModifyLessonPayload {
    pub lesson_id: i64,

    pub module_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_enhanced_only: Option<bool>,
    pub position: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct DeleteLessonPayload {
    pub lesson_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreatePresenterPayload {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    pub photo_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ModifyPresenterPayload {
    pub presenter_id: i64,

    pub name: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DeletePresenterPayload {
    pub presenter_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct AssignPresenterPayload {
    pub lesson_id: i64,
    pub presenter_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct UnassignPresenterPayload {
    pub lesson_id: i64,
    pub presenter_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CreateTagPayload {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct DeleteTagPayload {
    pub tag_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct TagLessonPayload {
    pub lesson_id: i64,
    pub tag_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct UntagLessonPayload {
    pub lesson_id: i64,
    pub tag_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct AddResourcePayload {
    pub lesson_id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub position: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct RemoveResourcePayload {
    pub resource_id: i64,
}
