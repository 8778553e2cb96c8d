use crate::assistant::ChatMessage;
use crate::database::Database;
use crate::error::{ArgusError, Result};
use crate::models::{Role, User};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use lazy_static::lazy_static;
use log::info;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

#[cfg(feature = "web")]
use crate::app::{SharedState, redirect_error, redirect_notice};
#[cfg(feature = "web")]
use crate::models::Page;
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar};
#[cfg(feature = "web")]
use log::{error, warn};
#[cfg(feature = "web")]
use serde::Deserialize;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Default session lifetime (24 hours)
pub const SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// User session data
///
/// Represents an authenticated browser session. The chat history of the AI
/// assistant page lives here so it disappears on logout.
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub username: String,

    /// Role the user registered with
    pub role: Role,

    /// Time when the session expires
    pub expires_at: SystemTime,

    /// Messages exchanged with the AI assistant, oldest first
    pub chat_history: Vec<ChatMessage>,
}

lazy_static! {
    /// All active sessions keyed by session id
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

/// Hash a password using Argon2
///
/// Creates a salted Argon2id hash in PHC string format, suitable for storage.
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ArgusError::PasswordHash(e.to_string()))
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `Ok(true)` if the password matches, `Ok(false)` if not
///
/// # Errors
/// * Returns an error if the stored hash is not a valid PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| ArgusError::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Validate username format
///
/// Rules, checked in order:
/// * cannot be empty
/// * alphanumeric characters only
/// * 3 to 20 characters long
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ArgusError::Validation("Username cannot be empty".into()));
    }
    if !username.chars().all(char::is_alphanumeric) {
        return Err(ArgusError::Validation(
            "Username must be alphanumeric only".into(),
        ));
    }
    let len = username.chars().count();
    if !(3..=20).contains(&len) {
        return Err(ArgusError::Validation(
            "Username must be 3-20 characters".into(),
        ));
    }
    Ok(())
}

/// Validate password strength
///
/// Rules, checked in order:
/// * at least 6 characters
/// * contains an uppercase letter
/// * contains a lowercase letter
/// * contains a digit
pub fn validate_password(password: &str) -> Result<()> {
    let fail = |msg: &str| Err(ArgusError::Validation(msg.to_string()));

    if password.chars().count() < 6 {
        return fail("Password must be at least 6 characters");
    }
    if !password.chars().any(char::is_uppercase) {
        return fail("Password must contain an uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        return fail("Password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return fail("Password must contain a number");
    }
    Ok(())
}

/// Register a new user
///
/// Validates the username and password, rejects taken usernames and stores
/// the Argon2 hash of the password.
///
/// # Returns
/// * The new user's id
///
/// # Errors
/// * `Validation` if a username or password rule is broken
/// * `UserExists` if the username is already registered
pub fn register_user(db: &Database, username: &str, password: &str, role: Role) -> Result<i64> {
    validate_username(username)?;
    validate_password(password)?;

    if db.user_exists(username)? {
        return Err(ArgusError::UserExists);
    }

    let password_hash = hash_password(password)?;
    let id = db
        .add_user(username, &password_hash, role)
        .map_err(|e| match e {
            // lost a race against a concurrent registration
            ArgusError::Database(rusqlite::Error::SqliteFailure(f, _))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ArgusError::UserExists
            }
            other => other,
        })?;

    info!("registered user {} with role {}", username, role);
    Ok(id)
}

/// Authenticate a user
///
/// # Errors
/// * `InvalidCredentials` for an unknown username or a wrong password alike
/// * `PasswordHash` if the stored hash is corrupt
pub fn login_user(db: &Database, username: &str, password: &str) -> Result<User> {
    let user = db.get_user(username)?.ok_or(ArgusError::InvalidCredentials)?;

    if verify_password(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(ArgusError::InvalidCredentials)
    }
}

/// Create a new user session
///
/// Expired sessions are purged on the way.
///
/// # Returns
/// * A unique session ID
pub fn create_session(username: &str, role: Role, ttl: Duration) -> String {
    let session_id = Uuid::new_v4().to_string();
    let session = Session {
        username: username.to_string(),
        role,
        expires_at: SystemTime::now() + ttl,
        chat_history: Vec::new(),
    };

    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    let now = SystemTime::now();
    sessions.retain(|_, s| s.expires_at > now);
    sessions.insert(session_id.clone(), session);

    session_id
}

/// Validate a session
///
/// # Returns
/// * A copy of the session if it exists and has not expired
pub fn validate_session(session_id: &str) -> Option<Session> {
    let sessions = SESSIONS.read().unwrap_or_else(|e| e.into_inner());

    sessions
        .get(session_id)
        .filter(|session| session.expires_at > SystemTime::now())
        .cloned()
}

/// Remove a session; unknown ids are ignored
pub fn destroy_session(session_id: &str) {
    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    sessions.remove(session_id);
}

/// Append a message to a session's chat history
pub fn push_chat_message(session_id: &str, message: ChatMessage) {
    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    if let Some(session) = sessions.get_mut(session_id) {
        session.chat_history.push(message);
    }
}

/// Empty a session's chat history
pub fn clear_chat_history(session_id: &str) {
    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    if let Some(session) = sessions.get_mut(session_id) {
        session.chat_history.clear();
    }
}

// Web handler functions below (only compiled with "web" feature)

/// Authenticated user attached to a request by [`require_auth`]
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: String,
    pub username: String,
    pub role: Role,
}

/// Login form data
#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Registration form data
#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub role: String,
}

/// Messages and tab selection carried in the login page query string
#[cfg(feature = "web")]
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    pub notice: Option<String>,
    pub tab: Option<String>,
}

/// Serve the login / registration page
///
/// Already authenticated sessions go straight to the dashboard.
#[cfg(feature = "web")]
pub async fn serve_login_page(
    State(state): State<SharedState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if validate_session(cookie.value()).is_some() {
            return Redirect::to(Page::Dashboard.path()).into_response();
        }
    }

    let roles: Vec<&str> = Role::ALL.iter().map(|r| r.as_str()).collect();
    state.render(
        "login",
        &serde_json::json!({
            "title": "A.R.G.U.S.",
            "background_css": state.theme.login_css,
            "button_css": crate::theme::BUTTON_CSS,
            "roles": roles,
            "error": query.error,
            "notice": query.notice,
            "register_tab": query.tab.as_deref() == Some("register"),
        }),
    )
}

/// Handle user login requests
///
/// Validates credentials and sets the session cookie on success.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(credentials): Form<LoginForm>,
) -> Response {
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return redirect_error("/", "Please fill in all fields");
    }

    let outcome = state
        .database()
        .and_then(|db| login_user(&db, &credentials.username, &credentials.password));

    match outcome {
        Ok(user) => {
            let session_id = create_session(&user.username, user.role, state.config.session_ttl);
            info!("user {} logged in", user.username);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            let welcome = format!("Welcome back, {}!", user.username);
            (jar.add(cookie), redirect_notice(Page::Dashboard.path(), &welcome)).into_response()
        }
        Err(ArgusError::InvalidCredentials) => {
            warn!("failed login attempt for {}", credentials.username);
            redirect_error("/", &ArgusError::InvalidCredentials.to_string())
        }
        Err(e) => {
            error!("login for {} failed: {}", credentials.username, e);
            redirect_error("/", "Authentication error")
        }
    }
}

/// Handle user registration
#[cfg(feature = "web")]
pub async fn handle_register(
    State(state): State<SharedState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    const REGISTER: &str = "/?tab=register";

    if form.username.is_empty() || form.password.is_empty() || form.confirm_password.is_empty() {
        return redirect_error(REGISTER, "Please fill in all fields");
    }
    if form.password != form.confirm_password {
        return redirect_error(REGISTER, "Passwords do not match");
    }
    let Ok(role) = form.role.parse::<Role>() else {
        return redirect_error(REGISTER, "Please select a valid role");
    };

    let outcome = state
        .database()
        .and_then(|db| register_user(&db, &form.username, &form.password, role));

    match outcome {
        Ok(_) => redirect_notice("/", "Registration successful! Please login."),
        Err(e @ (ArgusError::Validation(_) | ArgusError::UserExists)) => {
            redirect_error(REGISTER, &e.to_string())
        }
        Err(e) => {
            error!("registration of {} failed: {}", form.username, e);
            redirect_error(REGISTER, "Registration failed, please try again")
        }
    }
}

/// Handle user logout
///
/// Drops the server-side session and clears the cookie.
#[cfg(feature = "web")]
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        destroy_session(cookie.value());
    }

    (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), Redirect::to("/"))
}

/// Authentication middleware
///
/// Attaches the [`CurrentUser`] to the request when the session cookie is
/// valid, otherwise redirects to the login page.
#[cfg(feature = "web")]
pub async fn require_auth(jar: CookieJar, mut request: Request, next: Next) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = validate_session(cookie.value()) {
            request.extensions_mut().insert(CurrentUser {
                session_id: cookie.value().to_string(),
                username: session.username,
                role: session.role,
            });
            return next.run(request).await;
        }
    }

    redirect_error("/", "Please login first")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Speaker;

    fn validation_message(result: Result<()>) -> String {
        match result {
            Err(ArgusError::Validation(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("a1b2c3d4e5f6g7h8i9j0").is_ok());

        assert_eq!(validation_message(validate_username("")), "Username cannot be empty");
        assert_eq!(
            validation_message(validate_username("bad name")),
            "Username must be alphanumeric only"
        );
        assert_eq!(
            validation_message(validate_username("al_ice")),
            "Username must be alphanumeric only"
        );
        assert_eq!(
            validation_message(validate_username("ab")),
            "Username must be 3-20 characters"
        );
        assert_eq!(
            validation_message(validate_username("abcdefghijklmnopqrstu")),
            "Username must be 3-20 characters"
        );
    }

    #[test]
    fn password_rules_are_checked_in_order() {
        assert!(validate_password("Secret1").is_ok());

        assert_eq!(
            validation_message(validate_password("Ab1")),
            "Password must be at least 6 characters"
        );
        assert_eq!(
            validation_message(validate_password("secret1")),
            "Password must contain an uppercase letter"
        );
        assert_eq!(
            validation_message(validate_password("SECRET1")),
            "Password must contain a lowercase letter"
        );
        assert_eq!(
            validation_message(validate_password("Secrets")),
            "Password must contain a number"
        );
        for fancy_digit in ["Secret½", "SecretⅫ", "Secret٣"] {
            assert_eq!(
                validation_message(validate_password(fancy_digit)),
                "Password must contain a number"
            );
        }
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("Secret1").unwrap();
        assert_ne!(hash, "Secret1");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Secret1", &hash).unwrap());
        assert!(!verify_password("secret1", &hash).unwrap());

        // salted: the same password hashes differently each time
        assert_ne!(hash, hash_password("Secret1").unwrap());
    }

    #[test]
    fn corrupt_hash_is_an_error() {
        assert!(matches!(
            verify_password("Secret1", "not-a-phc-string"),
            Err(ArgusError::PasswordHash(_))
        ));
    }

    #[test]
    fn register_then_login() {
        let db = Database::open_in_memory().unwrap();
        let id = register_user(&db, "analyst1", "Secret1", Role::Cybersecurity).unwrap();

        let user = login_user(&db, "analyst1", "Secret1").unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Cybersecurity);
    }

    #[test]
    fn registration_rejects_invalid_and_taken_usernames() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            register_user(&db, "x", "Secret1", Role::User),
            Err(ArgusError::Validation(_))
        ));
        assert!(matches!(
            register_user(&db, "newuser", "weak", Role::User),
            Err(ArgusError::Validation(_))
        ));

        register_user(&db, "taken", "Secret1", Role::User).unwrap();
        assert!(matches!(
            register_user(&db, "taken", "Other22x", Role::ItAdmin),
            Err(ArgusError::UserExists)
        ));
    }

    #[test]
    fn login_failures_are_opaque() {
        let db = Database::open_in_memory().unwrap();
        register_user(&db, "dana", "Secret1", Role::User).unwrap();

        let unknown = login_user(&db, "nobody", "Secret1").unwrap_err();
        let mismatch = login_user(&db, "dana", "Wrong99").unwrap_err();
        assert!(matches!(unknown, ArgusError::InvalidCredentials));
        assert!(matches!(mismatch, ArgusError::InvalidCredentials));
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[test]
    fn session_lifecycle() {
        let id = create_session("erin", Role::DataScientist, SESSION_DURATION);
        let session = validate_session(&id).unwrap();
        assert_eq!(session.username, "erin");
        assert_eq!(session.role, Role::DataScientist);
        assert!(session.chat_history.is_empty());

        destroy_session(&id);
        assert!(validate_session(&id).is_none());
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let id = create_session("frank", Role::User, Duration::ZERO);
        assert!(validate_session(&id).is_none());
    }

    #[test]
    fn chat_history_is_kept_per_session() {
        let mine = create_session("gina", Role::User, SESSION_DURATION);
        let other = create_session("hank", Role::User, SESSION_DURATION);

        push_chat_message(&mine, ChatMessage::new(Speaker::User, "How many tickets?"));
        push_chat_message(&mine, ChatMessage::new(Speaker::Assistant, "There are 3."));

        let history = validate_session(&mine).unwrap().chat_history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].speaker, Speaker::User);
        assert_eq!(history[1].content, "There are 3.");
        assert!(validate_session(&other).unwrap().chat_history.is_empty());

        clear_chat_history(&mine);
        assert!(validate_session(&mine).unwrap().chat_history.is_empty());
    }
}
