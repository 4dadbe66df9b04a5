use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::dispatch::transport::{MailTransport, SendError, SendErrorKind};
use crate::domain::subscriber_email::SubscriberEmail;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    api_key: Secret<String>,
}

#[derive(serde::Serialize)]
pub struct SendEmailBody {
    personalizations: Vec<SengridPersonalization>,
    from: SengridEmail,
    subject: String,
    content: Vec<SengridContent>,
}

#[derive(serde::Serialize)]
struct SengridEmail {
    email: String,
}

#[derive(serde::Serialize)]
struct SengridPersonalization {
    to: Vec<SengridEmail>,
}

#[derive(serde::Serialize)]
struct SengridContent {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        api_key: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> Result<EmailClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(EmailClient {
            http_client,
            base_url,
            sender,
            api_key,
        })
    }

    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/mail/send", self.base_url);
        let body = SendEmailBody {
            from: SengridEmail {
                email: String::from(self.sender.as_ref()),
            },
            personalizations: vec![SengridPersonalization {
                to: vec![SengridEmail {
                    email: String::from(recipient.as_ref()),
                }],
            }],
            subject: String::from(subject),
            // The provider requires text/plain to come before text/html
            content: vec![
                SengridContent {
                    content_type: String::from("text/plain"),
                    value: String::from(text_content),
                },
                SengridContent {
                    content_type: String::from("text/html"),
                    value: String::from(html_content),
                },
            ],
        };

        self.http_client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?; // return an error when server response status code is 4xx or 5xx

        Ok(())
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    #[tracing::instrument(name = "Send a campaign email", skip(self, subject, html, text))]
    async fn send(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), SendError> {
        self.send_email(recipient, subject, html, text)
            .await
            .map_err(|err| SendError {
                kind: classify(&err),
                message: err.to_string(),
            })
    }
}

/// Rate limiting, provider outages and network trouble may go away on their
/// own; every other rejection will not.
fn classify(err: &reqwest::Error) -> SendErrorKind {
    match err.status() {
        Some(StatusCode::TOO_MANY_REQUESTS) => SendErrorKind::Transient,
        Some(status) if status.is_server_error() => SendErrorKind::Transient,
        Some(_) => SendErrorKind::Permanent,
        None if err.is_timeout() || err.is_connect() || err.is_request() => {
            SendErrorKind::Transient
        }
        None => SendErrorKind::Permanent,
    }
}
