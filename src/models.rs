use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Record identifier as sent by the API. The backend hands out both integer
/// and string ids, so both are accepted and kept in string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => RecordId(s),
            RawId::Int(n) => RecordId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ApplicationStatus {
    Saved,
    Applied,
    PhoneScreen,
    Interviewing,
    Offer,
    Accepted,
    Rejected,
    #[default]
    Unknown,
}

impl ApplicationStatus {
    /// Board order; excludes `Unknown`.
    pub const ALL: [ApplicationStatus; 7] = [
        ApplicationStatus::Saved,
        ApplicationStatus::Applied,
        ApplicationStatus::PhoneScreen,
        ApplicationStatus::Interviewing,
        ApplicationStatus::Offer,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Saved => "saved",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::PhoneScreen => "phone_screen",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Saved => "Saved",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::PhoneScreen => "Phone Screen",
            ApplicationStatus::Interviewing => "Interviewing",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Unknown => "Unknown",
        }
    }

    /// Lenient parse: case-insensitive, spaces and hyphens count as underscores.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "saved" => ApplicationStatus::Saved,
            "applied" => ApplicationStatus::Applied,
            "phone_screen" => ApplicationStatus::PhoneScreen,
            "interviewing" => ApplicationStatus::Interviewing,
            "offer" => ApplicationStatus::Offer,
            "accepted" => ApplicationStatus::Accepted,
            "rejected" => ApplicationStatus::Rejected,
            _ => ApplicationStatus::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != ApplicationStatus::Unknown
    }
}

impl From<Option<String>> for ApplicationStatus {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(Self::parse).unwrap_or_default()
    }
}

impl Serialize for ApplicationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse(s) {
            ApplicationStatus::Unknown => Err(format!(
                "unknown status '{}' (expected one of: saved, applied, phone_screen, interviewing, offer, accepted, rejected)",
                s
            )),
            status => Ok(status),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    #[serde(alias = "application_id")]
    pub id: RecordId,
    #[serde(default)]
    pub job: Option<RecordId>,
    #[serde(default)]
    pub job_id: Option<RecordId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub applied_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Application {
    /// The job this application points at; the API uses either `job_id` or `job`.
    pub fn job_ref(&self) -> Option<&RecordId> {
        self.job_id.as_ref().or(self.job.as_ref())
    }

    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => format!("Application {}", self.id),
        }
    }

    pub fn display_company(&self) -> String {
        match (&self.company, self.job_ref()) {
            (Some(company), _) if !company.trim().is_empty() => company.clone(),
            (_, Some(job)) => format!("Job {}", job),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Salary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Option<String>,
    #[serde(rename = "type")]
    pub pay_type: Option<String>,
}

impl Salary {
    /// `None` when neither bound is present.
    pub fn describe(&self) -> Option<String> {
        let range = match (self.min, self.max) {
            (Some(min), Some(max)) => format!("{} - {}", whole(min), whole(max)),
            (Some(min), None) => format!("{}+", whole(min)),
            (None, Some(max)) => format!("up to {}", whole(max)),
            (None, None) => return None,
        };
        let currency = self.currency.as_deref().unwrap_or("USD");
        Some(match &self.pay_type {
            Some(kind) => format!("{} {} ({})", currency, range, kind),
            None => format!("{} {}", currency, range),
        })
    }
}

fn whole(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{:.2}", n)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub job_id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote_type: Option<String>,
    #[serde(default)]
    pub salary: Option<Salary>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub score: f64,
}

impl Recommendation {
    pub fn is_remote(&self) -> bool {
        self.remote_type
            .as_deref()
            .map(|r| r.to_lowercase().contains("remote"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsGap {
    pub job_id: RecordId,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    #[serde(default)]
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experience {
    pub company: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Education {
    pub institution: Option<String>,
    pub degree: Option<String>,
    pub field: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedResume {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub user_id: Option<RecordId>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl User {
    /// First name when the profile has one, username otherwise.
    pub fn greeting_name(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.first_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
    pub tokens: Tokens,
}
