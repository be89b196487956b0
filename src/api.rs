use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{
    Application, ApplicationStatus, AuthResponse, ParsedResume, Recommendation, RecordId,
    SkillsGap, User,
};
use crate::session::Session;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// --- Transport ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    File {
        field: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Relative to the API base URL, e.g. `applications/12/`.
    pub path: String,
    pub body: Body,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves one request over the wire. Non-2xx statuses are returned as
/// responses, not errors; only transport failures are `Err`.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("jobtrack/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::File {
                field,
                file_name,
                mime,
                bytes,
            } => {
                let part = reqwest::blocking::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)?;
                builder.multipart(reqwest::blocking::multipart::Form::new().part(field.clone(), part))
            }
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        tracing::debug!(method = %request.method, url = %url, status, "response received");
        Ok(ApiResponse { status, body })
    }
}

// --- Request / response payloads ---

#[derive(Debug, Clone, Serialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewApplication {
    pub job_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationUpdate {
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkillsResponse {
    #[serde(default)]
    skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    results: Vec<Recommendation>,
}

/// List endpoints return either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

// --- Client ---

pub struct ApiClient {
    transport: Box<dyn Transport>,
    session: Session,
}

impl ApiClient {
    pub fn new(transport: Box<dyn Transport>, session: Session) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends an authenticated request. A 401 gets exactly one
    /// refresh-and-replay; if that does not succeed the session is cleared.
    fn execute(&self, method: Method, path: &str, body: Body) -> Result<String, ApiError> {
        let mut request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            bearer: self.session.access_token(),
        };
        tracing::debug!(method = %method, path, "sending request");
        let response = self.transport.send(&request)?;

        if response.status != 401 {
            return finish(response);
        }

        tracing::info!(path, "access token rejected, refreshing");
        let access = match self.refresh_access_token() {
            Ok(access) => access,
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed, signing out");
                self.expire_session();
                return Err(ApiError::Unauthorized);
            }
        };

        request.bearer = Some(access);
        let replay = self.transport.send(&request)?;
        if replay.status == 401 {
            tracing::warn!(path, "request still unauthorized after refresh, signing out");
            self.expire_session();
            return Err(ApiError::Unauthorized);
        }
        finish(replay)
    }

    /// Sends a request without a bearer token and without refresh handling.
    fn execute_anonymous(&self, method: Method, path: &str, body: Body) -> Result<String, ApiError> {
        let request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            bearer: None,
        };
        tracing::debug!(method = %method, path, "sending anonymous request");
        finish(self.transport.send(&request)?)
    }

    fn refresh_access_token(&self) -> Result<String, ApiError> {
        let refresh = self.session.refresh_token().ok_or(ApiError::Unauthorized)?;
        let body = self.execute_anonymous(
            Method::Post,
            "auth/refresh/",
            Body::Json(serde_json::json!({ "refresh": refresh })),
        )?;
        let tokens: RefreshResponse = decode(&body)?;
        self.session
            .set_tokens(&tokens.access, tokens.refresh.as_deref())
            .map_err(|e| ApiError::Session(e.to_string()))?;
        Ok(tokens.access)
    }

    fn expire_session(&self) {
        if let Err(err) = self.session.clear() {
            tracing::error!(error = %err, "failed to clear session");
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(&self.execute(Method::Get, path, Body::Empty)?)
    }

    fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Body::Json(serde_json::to_value(body)?);
        decode(&self.execute(method, path, body)?)
    }

    // --- Auth ---

    pub fn register(&self, form: &RegisterForm) -> Result<AuthResponse, ApiError> {
        if form.password != form.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }
        let body = Body::Json(serde_json::to_value(form)?);
        let auth: AuthResponse = decode(&self.execute_anonymous(Method::Post, "auth/register/", body)?)?;
        self.remember(&auth)?;
        Ok(auth)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = Body::Json(serde_json::json!({ "username": username, "password": password }));
        let auth: AuthResponse = decode(&self.execute_anonymous(Method::Post, "auth/login/", body)?)?;
        self.remember(&auth)?;
        Ok(auth)
    }

    fn remember(&self, auth: &AuthResponse) -> Result<(), ApiError> {
        self.session
            .store_login(&auth.tokens, &auth.user)
            .map_err(|e| ApiError::Session(e.to_string()))?;
        tracing::info!(username = %auth.user.username, "signed in");
        Ok(())
    }

    /// Local only: the server keeps no session state to revoke.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.clear().map_err(|e| ApiError::Session(e.to_string()))
    }

    pub fn current_user(&self) -> Result<User, ApiError> {
        let user: User = self.get("auth/me/")?;
        self.session
            .set_user(&user)
            .map_err(|e| ApiError::Session(e.to_string()))?;
        Ok(user)
    }

    // --- Applications ---

    pub fn list_applications(&self) -> Result<Vec<Application>, ApiError> {
        let body = self.execute(Method::Get, "applications/", Body::Empty)?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }
        Ok(match decode::<ListPayload<Application>>(trimmed)? {
            ListPayload::Plain(apps) => apps,
            ListPayload::Paged { results } => results,
        })
    }

    pub fn get_application(&self, id: &RecordId) -> Result<Application, ApiError> {
        self.get(&format!("applications/{}/", id))
    }

    pub fn create_application(&self, new: &NewApplication) -> Result<Application, ApiError> {
        self.send_json(Method::Post, "applications/", new)
    }

    pub fn update_application(
        &self,
        id: &RecordId,
        update: &ApplicationUpdate,
    ) -> Result<Application, ApiError> {
        self.send_json(Method::Put, &format!("applications/{}/", id), update)
    }

    pub fn delete_application(&self, id: &RecordId) -> Result<(), ApiError> {
        self.execute(Method::Delete, &format!("applications/{}/", id), Body::Empty)?;
        Ok(())
    }

    /// Persists a single status change. The response body is ignored.
    pub fn patch_status(&self, id: &RecordId, status: ApplicationStatus) -> Result<(), ApiError> {
        let body = Body::Json(serde_json::json!({ "status": status }));
        self.execute(Method::Patch, &format!("applications/{}/", id), body)?;
        Ok(())
    }

    // --- Resumes ---

    pub fn save_resume_text(&self, text: &str) -> Result<(), ApiError> {
        require_text(text)?;
        let body = Body::Json(serde_json::json!({ "text": text }));
        self.execute(Method::Post, "resumes/text/", body)?;
        Ok(())
    }

    /// Uploads a PDF or DOCX and returns the text the server extracted.
    pub fn upload_resume(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let mime = resume_mime(file_name)?;
        let body = Body::File {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        let uploaded: UploadResponse = decode(&self.execute(Method::Post, "resumes/upload/", body)?)?;
        Ok(uploaded.text)
    }

    pub fn extract_skills(&self, text: &str) -> Result<Vec<String>, ApiError> {
        require_text(text)?;
        let response: SkillsResponse =
            self.send_json(Method::Post, "resumes/extract-skills/", &serde_json::json!({ "text": text }))?;
        Ok(response.skills)
    }

    pub fn parse_resume(&self, text: &str) -> Result<ParsedResume, ApiError> {
        require_text(text)?;
        self.send_json(Method::Post, "resumes/parse/", &serde_json::json!({ "text": text }))
    }

    // --- Recommendations & insights ---

    pub fn refresh_recommendations(&self) -> Result<Vec<Recommendation>, ApiError> {
        let response: RecommendationsResponse =
            decode(&self.execute(Method::Post, "recommendations/refresh/", Body::Empty)?)?;
        Ok(response.results)
    }

    pub fn skills_gap(&self, job_id: &RecordId) -> Result<SkillsGap, ApiError> {
        if job_id.as_str().trim().is_empty() {
            return Err(ApiError::Validation("Enter a Job ID to analyze".to_string()));
        }
        self.send_json(Method::Post, "insights/gap/", &serde_json::json!({ "job_id": job_id }))
    }
}

fn finish(response: ApiResponse) -> Result<String, ApiError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        tracing::warn!(status = response.status, "request failed");
        Err(ApiError::from_status(response.status, &response.body))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    Ok(serde_json::from_str(body)?)
}

fn require_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("Please provide resume text".to_string()));
    }
    Ok(())
}

/// Only PDF and DOCX uploads are accepted.
pub fn resume_mime(file_name: &str) -> Result<&'static str, ApiError> {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("pdf") => Ok("application/pdf"),
        Some("docx") => Ok(DOCX_MIME),
        _ => Err(ApiError::Validation(
            "Only PDF or DOCX files are supported for upload".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays scripted responses in order and records every request.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        responses: Rc<RefCell<VecDeque<Result<ApiResponse, ApiError>>>>,
        pub requests: Rc<RefCell<Vec<ApiRequest>>>,
    }

    impl FakeTransport {
        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.responses.borrow_mut().push_back(Ok(ApiResponse {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn fail_network(&self) -> &Self {
            self.responses
                .borrow_mut()
                .push_back(Err(ApiError::Network("connection refused".to_string())));
            self
        }

        pub fn sent(&self) -> Vec<ApiRequest> {
            self.requests.borrow().clone()
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            self.requests.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted response for {} {}", request.method, request.path))
        }
    }

    pub fn client_with(transport: &FakeTransport, access: Option<&str>, refresh: Option<&str>) -> ApiClient {
        let session = Session::in_memory();
        if let Some(access) = access {
            session.set_tokens(access, refresh).unwrap();
        }
        ApiClient::new(Box::new(transport.clone()), session)
    }
}
