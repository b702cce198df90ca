// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patient-facing texts sent after payment events.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use medspa_core::events::PaymentSucceededV1;
use medspa_core::types::ClinicConfig;

pub const CANCELLATION_POLICY_REMINDER: &str = "Need to reschedule? Please let us know at least 24 hours ahead so your deposit stays applied to your visit.";

pub const PAYMENT_FAILED_TEXT: &str = "Payment failed - we didn't receive your deposit. If you'd still like to book, please reply and we can send a new secure payment link. Our team can also help by phone.";

const DEFAULT_CALLBACK_WINDOW: &str = "within 24 hours";

/// Formats an appointment time in the clinic's timezone, e.g.
/// `Tuesday, March 3 at 2:30 PM PST`. Unknown timezones fall back to UTC.
pub fn format_appointment_time(at: DateTime<Utc>, timezone: Option<&str>) -> String {
    let tz: Tz = timezone
        .and_then(|name| name.parse().ok())
        .unwrap_or(chrono_tz::UTC);
    at.with_timezone(&tz)
        .format("%A, %B %-d at %-I:%M %p %Z")
        .to_string()
}

/// Confirmation text for a paid deposit.
pub fn payment_confirmation_text(event: &PaymentSucceededV1, clinic: Option<&ClinicConfig>) -> String {
    let clinic_name = clinic
        .map(|c| c.clinic_name.trim())
        .filter(|n| !n.is_empty());

    match event.scheduled_for {
        Some(at) => {
            let service = event
                .service_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("{s} appointment"))
                .unwrap_or_else(|| "appointment".to_string());
            let place = clinic_name
                .map(|n| format!(" at {n}"))
                .unwrap_or_default();
            let when = format_appointment_time(at, clinic.map(|c| c.timezone.as_str()));
            format!(
                "Payment received! Your {service}{place} on {when} is confirmed. {CANCELLATION_POLICY_REMINDER}"
            )
        }
        None => {
            let who = clinic_name
                .map(|n| format!("A {n} team member"))
                .unwrap_or_else(|| "Our team".to_string());
            let callback = clinic
                .and_then(|c| c.callback_window.as_deref())
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .unwrap_or(DEFAULT_CALLBACK_WINDOW);
            format!(
                "Payment of ${:.2} received - thank you! {who} will call you {callback} to confirm your appointment.",
                event.amount_cents as f64 / 100.0
            )
        }
    }
}
