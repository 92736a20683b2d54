use std::fs;
use std::path::PathBuf;

use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::models::BatchOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    /// Comma-separated recipient list.
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub trait Mailer {
    fn send(&mut self, email: &OutgoingEmail) -> HubResult<()>;
}

/// Rejects recipient lists the transport could never deliver.
pub fn validate_recipients(to: &str) -> HubResult<()> {
    let addresses: Vec<&str> = to.split(',').map(str::trim).collect();
    let valid = !addresses.is_empty()
        && addresses.iter().all(|address| {
            let mut parts = address.split('@');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(local), Some(domain), None)
                    if !local.is_empty() && domain.contains('.') && !address.contains(' ')
            )
        });
    if valid {
        Ok(())
    } else {
        Err(HubError::Delivery {
            to: to.to_string(),
            reason: "invalid recipient address".to_string(),
        })
    }
}

/// Writes each message as an HTML file for the relay to pick up.
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Mailer for OutboxMailer {
    fn send(&mut self, email: &OutgoingEmail) -> HubResult<()> {
        validate_recipients(&email.to)?;
        let failure = |reason: std::io::Error| HubError::Delivery {
            to: email.to.clone(),
            reason: reason.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(failure)?;
        let file_name = format!(
            "{}-{}.html",
            Local::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4()
        );
        let contents = format!(
            "<!-- To: {} -->\n<!-- Subject: {} -->\n{}",
            email.to, email.subject, email.html_body
        );
        fs::write(self.dir.join(file_name), contents).map_err(failure)?;
        Ok(())
    }
}

/// Sends one message, recording the result without propagating failures.
pub fn deliver(
    mailer: &mut dyn Mailer,
    recipient: &str,
    email: &OutgoingEmail,
    outcome: &mut BatchOutcome,
) -> bool {
    match mailer.send(email) {
        Ok(()) => {
            tracing::info!(recipient, to = %email.to, subject = %email.subject, "sent summary email");
            outcome.sent += 1;
            true
        }
        Err(err) => {
            tracing::error!(recipient, to = %email.to, error = %err, "failed to send email");
            outcome.failed += 1;
            outcome.warnings.push(format!("failed to send to {recipient}: {err}"));
            false
        }
    }
}
