use gather_core::{BookingSnapshot, EmailMessage, Mailer, NotifyError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Operator's chat number, digits with optional '+'.
    pub chat_phone: String,
    pub email_timeout: Duration,
    pub email_policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub booking_id: String,
    pub email: Result<(), NotifyError>,
}

/// Handle to a dispatched notification. Dropping it detaches the task.
pub struct NotificationHandle(JoinHandle<NotificationReport>);

impl std::fmt::Debug for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandle")
            .field("finished", &self.0.is_finished())
            .finish()
    }
}

impl NotificationHandle {
    /// Waits for the task; `None` if it panicked or was cancelled.
    pub async fn wait(self) -> Option<NotificationReport> {
        self.0.await.ok()
    }
}

/// Fires confirmation messages off the booking's critical path.
#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    settings: NotificationSettings,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, settings: NotificationSettings) -> Self {
        Self { mailer, settings }
    }

    pub fn chat_link(&self, snapshot: &BookingSnapshot) -> String {
        build_chat_deep_link(snapshot, &self.settings.chat_phone)
    }

    /// Spawns the e-mail send and returns immediately. Failures are logged
    /// and reported on the handle, never propagated.
    pub fn dispatch(&self, snapshot: BookingSnapshot) -> NotificationHandle {
        let mailer = self.mailer.clone();
        let settings = self.settings.clone();

        NotificationHandle(tokio::spawn(async move {
            let booking_id = snapshot.booking.id.to_string();
            let message = render_confirmation_email(&snapshot);
            let timeout = settings.email_timeout;

            let result = settings
                .email_policy
                .run(
                    "confirmation e-mail",
                    || {
                        let mailer = mailer.clone();
                        let message = message.clone();
                        async move {
                            tokio::time::timeout(timeout, mailer.send(&message))
                                .await
                                .unwrap_or(Err(NotifyError::TimedOut))
                        }
                    },
                    NotifyError::is_retryable,
                )
                .await;

            match &result {
                Ok(()) => tracing::info!(booking_id = %booking_id, "Confirmation e-mail sent"),
                Err(NotifyError::NotConfigured) => {
                    tracing::warn!(booking_id = %booking_id, "Confirmation e-mail skipped: mail transport not configured")
                }
                Err(e) => tracing::warn!(booking_id = %booking_id, "Confirmation e-mail failed: {}", e),
            }

            NotificationReport { booking_id, email: result }
        }))
    }
}

/// `https://wa.me/<phone>?text=<message>`; pure, no I/O.
pub fn build_chat_deep_link(snapshot: &BookingSnapshot, chat_phone: &str) -> String {
    let phone: String = chat_phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let message = chat_message(snapshot);
    format!("https://wa.me/{}?text={}", phone, urlencoding::encode(&message))
}

fn chat_message(snapshot: &BookingSnapshot) -> String {
    let b = &snapshot.booking;
    format!(
        "Hi! I just booked {title}.\n\
         Booking ID: {id}\n\
         Category: {category}\n\
         Amount: {amount}\n\
         When: {schedule}\n\
         Where: {venue}\n\
         Name: {name}",
        title = b.event_title,
        id = b.id,
        category = b.category,
        amount = b.amount.display(&b.currency),
        schedule = snapshot.schedule,
        venue = snapshot.venue,
        name = b.customer.name,
    )
}

pub fn render_confirmation_email(snapshot: &BookingSnapshot) -> EmailMessage {
    let b = &snapshot.booking;
    let amount = b.amount.display(&b.currency);

    let text_body = format!(
        "Hi {name},\n\n\
         Your booking is confirmed.\n\n\
         Booking ID: {id}\n\
         Event: {title}\n\
         Category: {category}\n\
         When: {schedule}\n\
         Where: {venue}\n\
         Amount: {amount}\n\n\
         Keep this e-mail for your records. Quote the booking ID if you contact us.\n",
        name = b.customer.name,
        id = b.id,
        title = b.event_title,
        category = b.category,
        schedule = snapshot.schedule,
        venue = snapshot.venue,
    );

    let html_body = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Booking confirmed</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #2563eb;">Your booking is confirmed</h2>
    <p>Hi {name},</p>
    <table style="border-collapse: collapse;">
      <tr><td style="padding: 4px 12px 4px 0;"><strong>Booking ID</strong></td><td>{id}</td></tr>
      <tr><td style="padding: 4px 12px 4px 0;"><strong>Event</strong></td><td>{title}</td></tr>
      <tr><td style="padding: 4px 12px 4px 0;"><strong>Category</strong></td><td>{category}</td></tr>
      <tr><td style="padding: 4px 12px 4px 0;"><strong>When</strong></td><td>{schedule}</td></tr>
      <tr><td style="padding: 4px 12px 4px 0;"><strong>Where</strong></td><td>{venue}</td></tr>
      <tr><td style="padding: 4px 12px 4px 0;"><strong>Amount</strong></td><td>{amount}</td></tr>
    </table>
    <p style="color: #666; font-size: 14px;">Quote the booking ID if you contact us.</p>
  </div>
</body>
</html>"#,
        name = escape_html(&b.customer.name),
        id = escape_html(b.id.as_str()),
        title = escape_html(&b.event_title),
        category = escape_html(b.category.as_str()),
        schedule = escape_html(&snapshot.schedule.to_string()),
        venue = escape_html(&snapshot.venue.to_string()),
        amount = escape_html(&amount),
    );

    EmailMessage {
        to: b.customer.email.clone(),
        to_name: b.customer.name.clone(),
        subject: format!("Booking confirmed: {} ({})", b.event_title, b.id),
        text_body,
        html_body,
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
