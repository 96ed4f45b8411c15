//! Email service for invitation and reminder sends.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::path::Path;
use std::time::Duration;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    portal_url: String,
    send_timeout: Duration,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                // File transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            portal_url: config.portal_url.clone(),
            send_timeout: email_config.send_timeout,
        })
    }

    /// Send the initial call-to-action email carrying the form link.
    pub async fn send_invitation(&self, to_email: &str, to_name: Option<&str>, link_token: &str) -> Result<(), Error> {
        let form_link = self.form_link(link_token);
        let body = self.create_invitation_body(to_name, &form_link);
        self.send_email(to_email, to_name, "Complete your Badal contributor profile", &body).await
    }

    /// Send a reminder with a fresh link. `attempt` is 1-based.
    pub async fn send_reminder(&self, to_email: &str, to_name: Option<&str>, link_token: &str, attempt: i32) -> Result<(), Error> {
        let form_link = self.form_link(link_token);
        let body = self.create_reminder_body(to_name, &form_link, attempt);
        self.send_email(to_email, to_name, "Reminder: your Badal contributor profile is waiting", &body)
            .await
    }

    fn form_link(&self, link_token: &str) -> String {
        format!("{}/onboard?token={}", self.portal_url, link_token)
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        // A hung SMTP connection must resolve to a failed send so the token
        // is recorded as `failed` rather than left pending forever.
        let send = async {
            match &self.transport {
                EmailTransport::Smtp(smtp) => smtp.send(message).await.map(|_| ()).map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                }),
                EmailTransport::File(file) => file.send(message).await.map(|_| ()).map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                }),
            }
        };

        tokio::time::timeout(self.send_timeout, send).await.map_err(|_| Error::Internal {
            operation: format!("send email: timed out after {:?}", self.send_timeout),
        })?
    }

    fn create_invitation_body(&self, to_name: Option<&str>, form_link: &str) -> String {
        let greeting = greeting(to_name);
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Badal Contributor Onboarding</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Welcome to Badal</h2>

        <p>{greeting}</p>

        <p>You have been invited to join the Badal community program. Complete your contributor profile using the link below:</p>

        <p><a href="{form_link}">Complete your profile</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{form_link}</p>

        <p>This link is valid for 24 hours. Once opened, the form stays available for 10 minutes.</p>

        <div class="footer">
            <p>If you did not expect this invitation, you can safely ignore this email.</p>
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
        )
    }

    fn create_reminder_body(&self, to_name: Option<&str>, form_link: &str, attempt: i32) -> String {
        let greeting = greeting(to_name);
        let note = if attempt >= 3 {
            "This is our final reminder."
        } else {
            "We will send at most a couple more reminders."
        };
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Badal Contributor Onboarding Reminder</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Your contributor profile is waiting</h2>

        <p>{greeting}</p>

        <p>Your Badal contributor profile has not been completed yet. Here is a fresh link:</p>

        <p><a href="{form_link}">Complete your profile</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{form_link}</p>

        <p>This link is valid for 24 hours. {note}</p>

        <div class="footer">
            <p>To stop receiving these reminders, use the unsubscribe option on the form page.</p>
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
        )
    }
}

fn greeting(to_name: Option<&str>) -> String {
    if let Some(name) = to_name {
        format!("Hello {name},")
    } else {
        "Hello,".to_string()
    }
}
