//! Username and password rules
//!
//! Both policies are read from configuration at startup and never change
//! afterwards.

/// Rules a username must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernamePolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 32,
        }
    }
}

impl UsernamePolicy {
    /// ASCII letters, digits, `_`, `-` and `.`, starting with a letter or
    /// digit, within the length bounds
    pub fn allows(&self, username: &str) -> bool {
        let len = username.chars().count();
        if len < self.min_length || len > self.max_length {
            return false;
        }

        let mut chars = username.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() => {}
            _ => return false,
        }

        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

/// Rules a password must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_letter: true,
            require_digit: true,
        }
    }
}

impl PasswordPolicy {
    pub fn allows(&self, password: &str) -> bool {
        let len = password.chars().count();
        if len < self.min_length || len > self.max_length {
            return false;
        }
        if password.chars().any(char::is_control) {
            return false;
        }
        if self.require_letter && !password.chars().any(char::is_alphabetic) {
            return false;
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        true
    }
}

/// Both policies, as configured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policies {
    pub username: UsernamePolicy,
    pub password: PasswordPolicy,
}
