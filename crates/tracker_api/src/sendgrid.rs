//! SendGrid v3 `mail/send` client for plain-text notifications.

use reqwest::Method;
use serde::Serialize;

use crate::config::{Auth, ClientConfig};
use crate::error::Result;
use crate::http::HttpClient;
use crate::models::{MailAddress, MailMessage};

pub const DEFAULT_SENDGRID_API: &str = "https://api.sendgrid.com/v3";

#[derive(Clone)]
pub struct SendGridClient {
    http: HttpClient,
    sandbox: bool,
}

impl SendGridClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(
            DEFAULT_SENDGRID_API,
            Auth::Bearer(api_key.to_string()),
        ))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            sandbox: false,
        })
    }

    /// In sandbox mode SendGrid validates the request but delivers nothing.
    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.sandbox = enabled;
        self
    }

    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }

    pub async fn send(&self, message: &MailMessage) -> Result<()> {
        let payload = SendRequest::from_message(message, self.sandbox);
        self.http
            .send_expect_empty(Method::POST, "mail/send", &[], Some(&payload))
            .await
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: &'a MailAddress,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mail_settings: Option<MailSettings>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<&'a MailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<&'a MailAddress>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct MailSettings {
    sandbox_mode: Toggle,
}

#[derive(Debug, Serialize)]
struct Toggle {
    enable: bool,
}

impl<'a> SendRequest<'a> {
    fn from_message(message: &'a MailMessage, sandbox: bool) -> Self {
        // SendGrid rejects a CC that repeats the recipient.
        let cc = message
            .cc
            .iter()
            .filter(|cc| !cc.email.eq_ignore_ascii_case(&message.to.email))
            .collect();
        Self {
            personalizations: vec![Personalization {
                to: vec![&message.to],
                cc,
            }],
            from: &message.from,
            subject: &message.subject,
            content: vec![Content {
                kind: "text/plain",
                value: &message.body,
            }],
            mail_settings: sandbox.then(|| MailSettings {
                sandbox_mode: Toggle { enable: true },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &mockito::Server) -> SendGridClient {
        let config = ClientConfig::new(server.url(), Auth::Bearer("SG.key".into()))
            .with_cooldown(Duration::ZERO)
            .with_retries(0, Duration::ZERO);
        SendGridClient::with_config(config).expect("client builds")
    }

    fn message(cc: Option<&str>) -> MailMessage {
        MailMessage {
            from: MailAddress::named("bugyield@example.com", "BugYield"),
            to: MailAddress::named("ada@example.com", "Ada Lovelace"),
            cc: cc.map(MailAddress::new),
            subject: "Hello".into(),
            body: "Body text".into(),
        }
    }

    #[test]
    fn duplicate_cc_is_dropped() {
        let msg = message(Some("ADA@example.com"));
        let request = SendRequest::from_message(&msg, false);
        assert!(request.personalizations[0].cc.is_empty());
        assert!(request.mail_settings.is_none());
    }

    #[tokio::test]
    async fn send_posts_plain_text_mail_in_sandbox() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/mail/send")
            .match_header("authorization", "Bearer SG.key")
            .match_body(Matcher::Json(json!({
                "personalizations": [{
                    "to": [{"email": "ada@example.com", "name": "Ada Lovelace"}],
                    "cc": [{"email": "admin@example.com"}]
                }],
                "from": {"email": "bugyield@example.com", "name": "BugYield"},
                "subject": "Hello",
                "content": [{"type": "text/plain", "value": "Body text"}],
                "mail_settings": {"sandbox_mode": {"enable": true}}
            })))
            .with_status(202)
            .create_async()
            .await;

        client_for(&server)
            .sandbox(true)
            .send(&message(Some("admin@example.com")))
            .await
            .expect("sent");
        mock.assert_async().await;
    }
}
