use async_trait::async_trait;
use fw_core::{EmailSettings, Error, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Plain-text mail over SMTP with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let from = parse_mailbox(&settings.sender, "GMAIL_USERNAME")?;
        let to = parse_mailbox(&settings.receiver, "RECEIVER_EMAIL")?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_server)
            .map_err(|e| Error::Email(format!("invalid SMTP relay {}: {}", settings.smtp_server, e)))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(settings.sender.clone(), settings.password.clone()))
            .build();
        Ok(Self { transport, from, to })
    }
}

fn parse_mailbox(address: &str, variable: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Config(format!("{} is not a valid address ({}): {}", variable, address, e)))
}

fn build_message(from: &Mailbox, to: &Mailbox, subject: &str, body: &str) -> Result<Message> {
    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| Error::Email(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = build_message(&self.from, &self.to, subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Email(e.to_string()))?;
        info!(to = %self.to, "Sent email '{}'", subject.chars().take(30).collect::<String>());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(sender: &str) -> EmailSettings {
        EmailSettings {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: sender.to_string(),
            password: "app-password".to_string(),
            receiver: "desk@example.com".to_string(),
        }
    }

    #[test]
    fn test_new_validates_addresses() {
        assert!(SmtpMailer::new(&settings("alerts@example.com")).is_ok());
        assert!(matches!(SmtpMailer::new(&settings("not an address")), Err(Error::Config(_))));
    }

    #[test]
    fn test_build_message_has_utf8_subject() {
        let from: Mailbox = "alerts@example.com".parse().unwrap();
        let to: Mailbox = "desk@example.com".parse().unwrap();
        let message = build_message(&from, &to, "每日新闻分析警报 - 1条重要新闻", "正文").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: desk@example.com"));
        assert!(raw.contains("Subject: "));
    }
}
