use serde::{Deserialize, Deserializer, Serialize};

// ── Users ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub nickname: String,
    pub birth_year: Option<i32>,
    pub gender: Option<Gender>,
    pub created_at: String,
    pub last_login_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub name: String,
    pub nickname: String,
    pub birth_year: Option<i32>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: UserProfile,
    pub is_admin: bool,
}

// ── Categories ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub display_order: i64,
    pub image_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveCategory {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub image_path: String,
}

// ── Polls ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Ended,
}

/// Card-sized view of a poll, used by every listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category_slug: String,
    pub category_name: String,
    pub image: String,
    pub is_public: bool,
    pub has_password: bool,
    pub deadline: String,
    pub max_participants: Option<i64>,
    pub vote_count: i64,
    pub status: PollStatus,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: i64,
    pub text: String,
    pub image_url: Option<String>,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    #[serde(flatten)]
    pub summary: PollSummary,
    pub options: Vec<PollOption>,
    pub user_vote: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOption {
    pub text: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePoll {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_slug: String,
    pub options: Vec<NewOption>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub password: Option<String>,
    pub deadline: String,
    pub max_participants: Option<i64>,
}

/// Partial update; absent fields are left untouched. `password: ""` clears it,
/// as does `max_participants: null` for the participant limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePoll {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<String>,
    pub is_public: Option<bool>,
    pub password: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_participants: Option<Option<i64>>,
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratePoll {
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

// ── Votes ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVote {
    pub option_id: i64,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionResult {
    pub option_id: i64,
    pub text: String,
    pub votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: i64,
    pub total_votes: i64,
    pub options: Vec<OptionResult>,
    pub leading: Vec<i64>,
    pub user_vote: Option<i64>,
    pub status: PollStatus,
}

// ── Comments ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub poll_id: i64,
    pub parent_id: Option<i64>,
    pub author_uid: String,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub body: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditComment {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
