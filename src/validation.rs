use crate::api::ApiClient;
use crate::debounce::Debouncer;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

const USERNAME_TAKEN: &str = "That username is already taken.";
const EMAIL_TAKEN: &str = "That email is already registered.";
const EMAIL_MALFORMED: &str = "Enter a valid email address.";
const USERNAME_REQUIRED: &str = "Enter a username.";
const PASSWORD_REQUIRED: &str = "Enter a password.";
const EMAIL_REQUIRED: &str = "Enter an email.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Username,
    Password,
    Email,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldState {
    Idle,
    Checking,
    Valid,
    Invalid(String),
}

impl FieldState {
    pub fn error(&self) -> Option<&str> {
        match self {
            FieldState::Invalid(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordClass {
    Lowercase,
    Symbol,
}

impl fmt::Display for PasswordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordClass::Lowercase => write!(f, "lowercase letter"),
            PasswordClass::Symbol => write!(f, "symbol"),
        }
    }
}

pub fn missing_password_classes(password: &str) -> Vec<PasswordClass> {
    let mut missing = Vec::new();
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push(PasswordClass::Lowercase);
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        missing.push(PasswordClass::Symbol);
    }
    missing
}

/// One message naming every missing class, or `None` if the password passes.
pub fn password_message(password: &str) -> Option<String> {
    let missing = missing_password_classes(password);
    if missing.is_empty() {
        return None;
    }
    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
    Some(format!("Password must include: {}.", names.join(", ")))
}

pub fn is_valid_email(value: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
        .is_match(value)
}

#[derive(Debug)]
pub enum ValidationEvent {
    /// The debounce timer for `field` fired.
    Due {
        field: Field,
        generation: u64,
        value: String,
    },
    /// An availability check finished; `Err` carries the failure text.
    Checked {
        field: Field,
        generation: u64,
        result: Result<bool, String>,
    },
}

#[derive(Debug, PartialEq)]
pub enum Submission {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        password: String,
        email: String,
    },
}

#[derive(Debug, PartialEq)]
pub enum SubmitOutcome {
    LoggedIn,
    Registered,
}

/// Login / register form with incremental validation.
///
/// Username and email run a debounced availability check; the password is
/// checked on every keystroke. Validation only happens in register mode.
/// Timer and check results come back through the form's own channel and are
/// applied by `pump`; results for an outdated keystroke are dropped.
pub struct AuthForm {
    mode: AuthMode,
    pub username: String,
    pub password: String,
    pub email: String,
    pub focus: Field,
    pub error: Option<String>,
    username_state: FieldState,
    password_state: FieldState,
    email_state: FieldState,
    username_generation: u64,
    email_generation: u64,
    debouncer: Debouncer<Field>,
    tx: UnboundedSender<ValidationEvent>,
    rx: UnboundedReceiver<ValidationEvent>,
}

impl AuthForm {
    pub fn new(debounce: Duration) -> AuthForm {
        let (tx, rx) = mpsc::unbounded_channel();
        AuthForm {
            mode: AuthMode::Login,
            username: String::new(),
            password: String::new(),
            email: String::new(),
            focus: Field::Username,
            error: None,
            username_state: FieldState::Idle,
            password_state: FieldState::Idle,
            email_state: FieldState::Idle,
            username_generation: 0,
            email_generation: 0,
            debouncer: Debouncer::new(debounce),
            tx,
            rx,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn state(&self, field: Field) -> &FieldState {
        match field {
            Field::Username => &self.username_state,
            Field::Password => &self.password_state,
            Field::Email => &self.email_state,
        }
    }

    fn state_mut(&mut self, field: Field) -> &mut FieldState {
        match field {
            Field::Username => &mut self.username_state,
            Field::Password => &mut self.password_state,
            Field::Email => &mut self.email_state,
        }
    }

    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Username => &self.username,
            Field::Password => &self.password,
            Field::Email => &self.email,
        }
    }

    fn generation(&self, field: Field) -> u64 {
        match field {
            Field::Username => self.username_generation,
            Field::Email => self.email_generation,
            Field::Password => 0,
        }
    }

    fn bump_generation(&mut self, field: Field) -> u64 {
        let generation = match field {
            Field::Username => &mut self.username_generation,
            Field::Email => &mut self.email_generation,
            Field::Password => return 0,
        };
        *generation += 1;
        *generation
    }

    pub fn switch_mode(&mut self) {
        self.debouncer.cancel_all();
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        for field in [Field::Username, Field::Password, Field::Email] {
            self.bump_generation(field);
            *self.state_mut(field) = FieldState::Idle;
        }
        self.error = None;
        if self.mode == AuthMode::Login && self.focus == Field::Email {
            self.focus = Field::Username;
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = match (self.focus, self.mode) {
            (Field::Username, _) => Field::Password,
            (Field::Password, AuthMode::Register) => Field::Email,
            (Field::Password, AuthMode::Login) | (Field::Email, _) => Field::Username,
        };
    }

    pub fn push_char(&mut self, c: char) {
        let mut value = self.value(self.focus).to_string();
        value.push(c);
        self.set_field(self.focus, value);
    }

    pub fn pop_char(&mut self) {
        let mut value = self.value(self.focus).to_string();
        value.pop();
        self.set_field(self.focus, value);
    }

    pub fn set_field(&mut self, field: Field, value: String) {
        match field {
            Field::Username => self.username = value,
            Field::Password => self.password = value,
            Field::Email => self.email = value,
        }
        if self.mode == AuthMode::Register {
            self.field_changed(field);
        }
    }

    fn field_changed(&mut self, field: Field) {
        if field == Field::Password {
            self.password_state = if self.password.is_empty() {
                FieldState::Idle
            } else {
                match password_message(&self.password) {
                    Some(message) => FieldState::Invalid(message),
                    None => FieldState::Valid,
                }
            };
            return;
        }

        let generation = self.bump_generation(field);
        *self.state_mut(field) = FieldState::Idle;

        let value = self.value(field).to_string();
        if value.trim().is_empty() {
            self.debouncer.cancel(field);
            return;
        }

        let tx = self.tx.clone();
        self.debouncer.schedule(field, move || {
            let _ = tx.send(ValidationEvent::Due {
                field,
                generation,
                value,
            });
        });
    }

    /// Apply every event that has arrived since the last call.
    pub fn pump(&mut self, api: &ApiClient) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event, api);
        }
    }

    pub fn handle_event(&mut self, event: ValidationEvent, api: &ApiClient) {
        match event {
            ValidationEvent::Due {
                field,
                generation,
                value,
            } => {
                if generation != self.generation(field) || self.mode != AuthMode::Register {
                    return;
                }
                if field == Field::Email && !is_valid_email(&value) {
                    self.email_state = FieldState::Invalid(EMAIL_MALFORMED.to_string());
                    return;
                }
                *self.state_mut(field) = FieldState::Checking;

                let api = api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = match field {
                        Field::Username => api.username_exists(&value).await,
                        Field::Email => api.email_exists(&value).await,
                        Field::Password => return,
                    };
                    let _ = tx.send(ValidationEvent::Checked {
                        field,
                        generation,
                        result: result.map_err(|err| err.user_message()),
                    });
                });
            }
            ValidationEvent::Checked {
                field,
                generation,
                result,
            } => {
                if generation != self.generation(field) {
                    tracing::debug!("Dropping stale {:?} check", field);
                    return;
                }
                *self.state_mut(field) = match result {
                    Ok(true) => FieldState::Invalid(
                        match field {
                            Field::Email => EMAIL_TAKEN,
                            _ => USERNAME_TAKEN,
                        }
                        .to_string(),
                    ),
                    Ok(false) => FieldState::Valid,
                    Err(message) => {
                        tracing::warn!("{:?} availability check failed: {}", field, message);
                        FieldState::Valid
                    }
                };
            }
        }
    }

    /// Required fields for the current mode, then any field already marked invalid.
    pub fn validate_for_submit(&self) -> Result<Submission, String> {
        if self.username.trim().is_empty() {
            return Err(USERNAME_REQUIRED.to_string());
        }

        if self.mode == AuthMode::Login {
            if self.password.trim().is_empty() {
                return Err(PASSWORD_REQUIRED.to_string());
            }
            return Ok(Submission::Login {
                username: self.username.clone(),
                password: self.password.clone(),
            });
        }

        if let Some(message) = self.username_state.error() {
            return Err(message.to_string());
        }
        if self.password.trim().is_empty() {
            return Err(PASSWORD_REQUIRED.to_string());
        }
        if let Some(message) = self.password_state.error() {
            return Err(message.to_string());
        }
        if self.email.trim().is_empty() {
            return Err(EMAIL_REQUIRED.to_string());
        }
        if let Some(message) = self.email_state.error() {
            return Err(message.to_string());
        }

        Ok(Submission::Register {
            username: self.username.clone(),
            password: self.password.clone(),
            email: self.email.clone(),
        })
    }

    /// Validate, then send. Failures land in `self.error`.
    pub async fn submit(&mut self, api: &ApiClient) -> Option<SubmitOutcome> {
        self.error = None;
        let submission = match self.validate_for_submit() {
            Ok(submission) => submission,
            Err(message) => {
                self.error = Some(message);
                return None;
            }
        };

        let result = match &submission {
            Submission::Login { username, password } => api.login(username, password).await,
            Submission::Register {
                username,
                password,
                email,
            } => api.register(username, password, Some(email)).await,
        };

        match (result, submission) {
            (Ok(()), Submission::Login { username, .. }) => {
                tracing::info!("Logged in as {}", username);
                Some(SubmitOutcome::LoggedIn)
            }
            (Ok(()), Submission::Register { username, .. }) => {
                tracing::info!("Registered {}", username);
                self.switch_mode();
                self.username.clear();
                self.password.clear();
                self.email.clear();
                Some(SubmitOutcome::Registered)
            }
            (Err(err), _) => {
                self.error = Some(err.user_message());
                None
            }
        }
    }
}
