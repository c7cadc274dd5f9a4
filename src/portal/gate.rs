use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Disabled,
    Expired,
}

impl UnavailableReason {
    pub fn message(self) -> &'static str {
        match self {
            UnavailableReason::Disabled => "This link has been disabled",
            UnavailableReason::Expired => "This link has expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    /// Password configured and not yet supplied
    Locked,
    Unlocked,
    /// Terminal; independent of the password
    Unavailable(UnavailableReason),
    Submitted,
}

/// Access state of a collection link.
#[derive(Debug, Clone)]
pub struct PortalGate {
    state: PortalState,
    password: Option<String>,
}

/// Link settings the gate is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings<'a> {
    pub disabled: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub password: Option<&'a str>,
}

impl PortalState {
    pub fn as_str(self) -> &'static str {
        match self {
            PortalState::Locked => "locked",
            PortalState::Unlocked => "unlocked",
            PortalState::Unavailable(_) => "unavailable",
            PortalState::Submitted => "submitted",
        }
    }
}

impl<'a> From<&'a Project> for LinkSettings<'a> {
    fn from(project: &'a Project) -> Self {
        LinkSettings {
            disabled: project.link_disabled,
            expiry: project.link_expiry,
            password: project.link_password.as_deref(),
        }
    }
}

/// Terminal state for a disabled or past-expiry link, if any.
pub fn unavailable(link: &LinkSettings<'_>, now: DateTime<Utc>) -> Option<UnavailableReason> {
    if link.disabled {
        Some(UnavailableReason::Disabled)
    } else if link.expiry.is_some_and(|expiry| expiry < now) {
        Some(UnavailableReason::Expired)
    } else {
        None
    }
}

/// Fail with the terminal link error when the link cannot accept visitors.
pub fn ensure_available(link: &LinkSettings<'_>, now: DateTime<Utc>) -> Result<(), AppError> {
    match unavailable(link, now) {
        Some(reason) => Err(AppError::LinkUnavailable(reason)),
        None => Ok(()),
    }
}

impl PortalGate {
    pub fn open(link: LinkSettings<'_>, now: DateTime<Utc>) -> Self {
        let password = link
            .password
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let state = match unavailable(&link, now) {
            Some(reason) => PortalState::Unavailable(reason),
            None if password.is_some() => PortalState::Locked,
            None => PortalState::Unlocked,
        };
        PortalGate { state, password }
    }

    pub fn state(&self) -> PortalState {
        self.state
    }

    pub fn requires_password(&self) -> bool {
        self.password.is_some()
    }

    /// Exact-match password check. Terminal states stay terminal.
    pub fn unlock(&mut self, attempt: &str) -> Result<PortalState, AppError> {
        match self.state {
            PortalState::Unavailable(reason) => Err(AppError::LinkUnavailable(reason)),
            PortalState::Locked => {
                let expected = self.password.as_deref().unwrap_or_default();
                if bool::from(attempt.as_bytes().ct_eq(expected.as_bytes())) {
                    self.state = PortalState::Unlocked;
                    Ok(self.state)
                } else {
                    Err(AppError::Unauthorized("Incorrect password"))
                }
            }
            PortalState::Unlocked | PortalState::Submitted => Ok(self.state),
        }
    }

    /// Unlock with an optional password; a locked gate without one fails
    /// with [`AppError::PasswordRequired`].
    pub fn admit(&mut self, attempt: Option<&str>) -> Result<(), AppError> {
        match (self.state, attempt) {
            (PortalState::Locked, None) => Err(AppError::PasswordRequired),
            (_, Some(password)) => self.unlock(password).map(|_| ()),
            (PortalState::Unavailable(reason), None) => Err(AppError::LinkUnavailable(reason)),
            _ => Ok(()),
        }
    }

    pub fn mark_submitted(&mut self) -> Result<(), AppError> {
        match self.state {
            PortalState::Unlocked => {
                self.state = PortalState::Submitted;
                Ok(())
            }
            PortalState::Submitted => Ok(()),
            PortalState::Locked => Err(AppError::PasswordRequired),
            PortalState::Unavailable(reason) => Err(AppError::LinkUnavailable(reason)),
        }
    }

    /// Return from the submitted view to a fresh form.
    pub fn resubmit(&mut self) {
        if self.state == PortalState::Submitted {
            self.state = PortalState::Unlocked;
        }
    }
}
