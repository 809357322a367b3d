//! Outgoing mail.

use log::{info, warn};
use tracker_api::{MailAddress, MailMessage, SendGridClient};

use crate::error::{Error, Result};

/// A plain-text notification. The sender is supplied by the [`Notifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub to_name: Option<String>,
    pub cc: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Mail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            cc: None,
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn named(mut self, name: Option<String>) -> Self {
        self.to_name = name.filter(|value| !value.trim().is_empty());
        self
    }

    /// Blank addresses are ignored.
    pub fn cc(mut self, cc: Option<&str>) -> Self {
        self.cc = cc
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        self
    }
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn mail(&self, mail: &Mail) -> Result<()>;
}

pub struct SendGridNotifier {
    client: SendGridClient,
    from: MailAddress,
}

impl SendGridNotifier {
    pub fn new(client: SendGridClient, from: &str) -> Self {
        Self {
            client,
            from: MailAddress::named(from, "BugYield"),
        }
    }

    fn message(&self, mail: &Mail) -> MailMessage {
        MailMessage {
            from: self.from.clone(),
            to: match &mail.to_name {
                Some(name) => MailAddress::named(&mail.to, name),
                None => MailAddress::new(&mail.to),
            },
            cc: mail.cc.as_deref().map(MailAddress::new),
            subject: mail.subject.clone(),
            body: mail.body.clone(),
        }
    }
}

impl Notifier for SendGridNotifier {
    async fn mail(&self, mail: &Mail) -> Result<()> {
        if mail.to.trim().is_empty() {
            return Err(Error::Notification(format!(
                "no recipient for '{}'",
                mail.subject
            )));
        }
        self.client
            .send(&self.message(mail))
            .await
            .map_err(|err| Error::Notification(err.to_string()))?;
        info!("Mail '{}' sent to {}", mail.subject, mail.to);
        Ok(())
    }
}

/// Used when no mail service is configured: mails end up in the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn mail(&self, mail: &Mail) -> Result<()> {
        warn!(
            "Mail delivery disabled, would send '{}' to {}{}:\n{}",
            mail.subject,
            mail.to,
            mail.cc
                .as_deref()
                .map(|cc| format!(" (cc {})", cc))
                .unwrap_or_default(),
            mail.body
        );
        Ok(())
    }
}

/// The notifier picked at startup.
pub enum AnyNotifier {
    SendGrid(SendGridNotifier),
    Log(LogNotifier),
}

impl Notifier for AnyNotifier {
    async fn mail(&self, mail: &Mail) -> Result<()> {
        match self {
            AnyNotifier::SendGrid(notifier) => notifier.mail(mail).await,
            AnyNotifier::Log(notifier) => notifier.mail(mail).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;
    use tracker_api::{Auth, ClientConfig};

    #[test]
    fn blank_cc_is_dropped() {
        let mail = Mail::new("ada@example.com", "s", "b").cc(Some("  "));
        assert_eq!(mail.cc, None);
        let mail = mail.cc(Some(" pm@example.com "));
        assert_eq!(mail.cc.as_deref(), Some("pm@example.com"));
    }

    #[tokio::test]
    async fn sendgrid_notifier_sends_from_bugyield() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/mail/send")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "from": {"email": "bugyield@example.com", "name": "BugYield"},
                "personalizations": [{"to": [{"email": "ada@example.com", "name": "Ada"}]}],
                "subject": "Hi"
            })))
            .with_status(202)
            .create_async()
            .await;

        let config = ClientConfig::new(server.url(), Auth::Bearer("SG.key".into()))
            .with_cooldown(Duration::ZERO)
            .with_retries(0, Duration::ZERO);
        let client = SendGridClient::with_config(config).expect("client builds");
        let notifier = SendGridNotifier::new(client, "bugyield@example.com");

        let mail = Mail::new("ada@example.com", "Hi", "Body").named(Some("Ada".into()));
        notifier.mail(&mail).await.expect("sent");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_recipient_is_a_notification_error() {
        let client = SendGridClient::new("SG.key").expect("client builds");
        let notifier = SendGridNotifier::new(client, "bugyield@example.com");
        let result = notifier.mail(&Mail::new("", "Hi", "Body")).await;
        assert!(matches!(result, Err(Error::Notification(_))));
    }
}
