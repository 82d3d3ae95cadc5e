//! Outgoing email

use async_trait::async_trait;

use crate::config::EmailConfig;
use crate::error::Result;

/// One outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text: String,
}

impl Email {
    /// Welcome message sent after signup
    pub fn welcome(config: &EmailConfig, to: &str, name: &str) -> Self {
        let first_name = name.split_whitespace().next().unwrap_or(name);
        Self {
            from: config.from.clone(),
            to: to.to_string(),
            subject: "Welcome to the Tourbook family!".to_string(),
            text: format!(
                "Hi {},\n\nWelcome aboard! Head to {}/me to complete your profile.",
                first_name, config.public_url
            ),
        }
    }

    /// Password reset message carrying the reset URL
    pub fn password_reset(config: &EmailConfig, to: &str, reset_url: &str, valid_minutes: i64) -> Self {
        Self {
            from: config.from.clone(),
            to: to.to_string(),
            subject: format!("Your password reset token (valid for {} min)", valid_minutes),
            text: format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 passwordConfirm to: {}.\nIf you didn't forget your password, please ignore this email!",
                reset_url
            ),
        }
    }
}

/// Delivers email
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message
    async fn send(&self, email: Email) -> Result<()>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email dispatched");
        tracing::debug!(body = %email.text, "Email body");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;

    /// Keeps sent messages for assertions; can be told to fail
    #[derive(Debug, Default)]
    pub(crate) struct RecordingMailer {
        pub(crate) sent: Mutex<Vec<Email>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<()> {
            if self.fail {
                return Err(Error::External("SMTP connection refused".to_string()));
            }
            self.sent.lock().map_err(|e| Error::Internal(e.to_string()))?.push(email);
            Ok(())
        }
    }
}
