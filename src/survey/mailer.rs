// Senders for the verification emails.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use technostress_core::verification::{PendingCode, CODE_VALIDITY_SECONDS};

use crate::survey::*;

/// Delivers one message. Failures are reported as `SurveyError::Delivery`.
pub trait Mailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> SurveyResult<()>;

    /// A short description for the logs.
    fn describe(&self) -> String {
        "custom sender".to_string()
    }
}

pub fn verification_message(pending: &PendingCode) -> (String, String) {
    let subject = "Your technostress survey verification code".to_string();
    let body = format!(
        "Hello,\n\nYour verification code is:\n\n    {}\n\nIt is valid for {} minutes. \
         If you did not request it, you can ignore this message.\n",
        pending.code,
        CODE_VALIDITY_SECONDS / 60
    );
    (subject, body)
}

/// Posts the message as JSON to an HTTP mail relay.
pub struct HttpRelayMailer {
    url: String,
    sender: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpRelayMailer {
    pub fn new(url: &str, sender: &str, token: Option<String>) -> HttpRelayMailer {
        HttpRelayMailer {
            url: url.to_string(),
            sender: sender.to_string(),
            token,
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(10))
                .build(),
        }
    }
}

impl Mailer for HttpRelayMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> SurveyResult<()> {
        let mut req = self.agent.post(&self.url);
        if let Some(t) = &self.token {
            req = req.set("Authorization", &format!("Bearer {}", t));
        }
        debug!("HttpRelayMailer: posting message for {} to {}", to, self.url);
        match req.send_json(ureq::json!({
            "from": self.sender,
            "to": to,
            "subject": subject,
            "body": body,
        })) {
            Result::Ok(resp) => {
                debug!("HttpRelayMailer: relay answered {}", resp.status());
                Ok(())
            }
            Result::Err(ureq::Error::Status(code, _)) => DeliverySnafu {
                to,
                reason: format!("the mail relay answered with status {}", code),
            }
            .fail(),
            Result::Err(e) => DeliverySnafu {
                to,
                reason: e.to_string(),
            }
            .fail(),
        }
    }

    fn describe(&self) -> String {
        format!("mail relay at {}", self.url)
    }
}

/// Appends the messages to a local file instead of sending them.
pub struct OutboxMailer {
    path: PathBuf,
    sender: String,
}

impl OutboxMailer {
    pub fn new(path: PathBuf, sender: &str) -> OutboxMailer {
        OutboxMailer {
            path,
            sender: sender.to_string(),
        }
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> SurveyResult<()> {
        let message = format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
            self.sender, to, subject, body
        );
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(message.as_bytes()));
        match res {
            Result::Ok(()) => {
                info!("OutboxMailer: message for {} written to {:?}", to, self.path);
                Ok(())
            }
            Result::Err(e) => DeliverySnafu {
                to,
                reason: e.to_string(),
            }
            .fail(),
        }
    }

    fn describe(&self) -> String {
        format!("outbox file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn pending() -> PendingCode {
        PendingCode {
            address: "student@uni.edu".to_string(),
            code: "482913".to_string(),
            expires_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap(),
        }
    }

    #[test]
    fn message_contains_code_and_validity() {
        let (subject, body) = verification_message(&pending());
        assert!(subject.contains("verification code"));
        assert!(body.contains("    482913\n"));
        assert!(body.contains("valid for 5 minutes"));
    }

    #[test]
    fn outbox_appends_messages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outbox.txt");
        let m = OutboxMailer::new(path.clone(), "survey@example.org");
        let (subject, body) = verification_message(&pending());
        m.send("student@uni.edu", &subject, &body).unwrap();
        m.send("other@uni.edu", &subject, &body).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("From: survey@example.org").count(), 2);
        assert!(contents.contains("To: other@uni.edu"));
    }

    #[test]
    fn outbox_failure_is_a_delivery_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending.
        let m = OutboxMailer::new(dir.path().to_path_buf(), "survey@example.org");
        assert!(matches!(
            m.send("a@b.c", "s", "b"),
            Err(SurveyError::Delivery { .. })
        ));
    }

    #[test]
    fn unreachable_relay_is_a_delivery_error() {
        // Nothing listens on the discard port.
        let m = HttpRelayMailer::new("http://127.0.0.1:9/send", "survey@example.org", None);
        assert!(matches!(
            m.send("a@b.c", "s", "b"),
            Err(SurveyError::Delivery { .. })
        ));
    }
}
