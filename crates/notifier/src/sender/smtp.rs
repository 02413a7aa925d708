//! SMTP email delivery.
//!
//! Wraps `lettre::AsyncSmtpTransport<Tokio1Executor>`. With `sslEnabled` the
//! transport uses implicit TLS through `relay`, otherwise a plain connection.

use std::time::Instant;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::retry::{Attempt, with_retry};
use crate::config::SmtpConfig;
use crate::error::NotifierError;
use crate::message::{MessageRequest, MessageResponse, codes};

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifierError> {
        let from: Mailbox = config.from_address().parse().map_err(|e| {
            NotifierError::Build(format!("invalid sender address '{}': {e}", config.from_address()))
        })?;

        let builder = if config.ssl_enabled {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotifierError::Build(format!("SMTP relay setup failed: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(config.connection_timeout))
            .build();

        Ok(Self {
            transport,
            from,
            config,
        })
    }

    pub async fn send(&self, message: &MessageRequest) -> MessageResponse {
        let to: Mailbox = match message.target.trim().parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return MessageResponse::failure(
                    codes::INVALID_RECIPIENT,
                    format!("Invalid recipient '{}': {e}", message.target),
                );
            }
        };

        let email = match Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.content.clone())
        {
            Ok(email) => email,
            Err(e) => {
                return MessageResponse::failure(
                    codes::MAIL_SEND_FAILED,
                    format!("Failed to build message: {e}"),
                );
            }
        };
        let message_id = email
            .headers()
            .get_raw("Message-ID")
            .map(|id| id.trim().to_string());

        let started = Instant::now();
        let response = with_retry(self.config.retry, "smtp", |_| {
            let email = email.clone();
            let message_id = message_id.clone();
            async move { self.attempt(email, message_id).await }
        })
        .await;

        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            success = response.is_success(),
            duration_ms = started.elapsed().as_millis() as u64,
            "SMTP send finished"
        );
        response
    }

    async fn attempt(&self, email: Message, message_id: Option<String>) -> Attempt {
        let deadline = self.config.connection_timeout + self.config.read_timeout;
        match tokio::time::timeout(deadline, self.transport.send(email)).await {
            Ok(Ok(_)) => Attempt::Done(MessageResponse::success(message_id)),
            Ok(Err(e)) => classify(&e),
            Err(_) => Attempt::Retry(MessageResponse::failure(
                codes::TIMEOUT,
                format!("SMTP send exceeded {} ms", deadline.as_millis()),
            )),
        }
    }
}

fn classify(err: &lettre::transport::smtp::Error) -> Attempt {
    if err.is_timeout() {
        return Attempt::Retry(MessageResponse::failure(codes::TIMEOUT, err.to_string()));
    }
    if err.is_permanent() {
        let rejected_recipient = err
            .status()
            .is_some_and(|code| matches!(code.to_string().as_str(), "550" | "551" | "553"));
        let code = if rejected_recipient {
            codes::INVALID_RECIPIENT
        } else {
            codes::MAIL_SEND_FAILED
        };
        return Attempt::Done(MessageResponse::failure(code, err.to_string()));
    }
    // Transient replies and connection-level failures.
    Attempt::Retry(MessageResponse::failure(codes::MAIL_SEND_FAILED, err.to_string()))
}
