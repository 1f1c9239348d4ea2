//! Fire-and-forget patient messages raised by intents and lab routes.

use std::collections::HashMap;
use std::sync::Arc;

use medflow_core::{PatientVisit, Roster, time::format_date};
use medflow_notifications::{NotificationChannel, NotificationSender, TemplateRenderer, templates};
use serde_json::{Value, json};

/// Words in a prescription that imply a lab order.
pub const LAB_KEYWORDS: [&str; 9] = [
    "test", "lab", "cbc", "blood", "urine", "x-ray", "scan", "profile", "panel",
];

/// Prescriptions longer than this get a shareable portal link.
pub const SHAREABLE_PRESCRIPTION_MIN_CHARS: usize = 5;

/// Case-insensitive substring match against [`LAB_KEYWORDS`].
pub fn mentions_lab_work(text: &str) -> bool {
    let lower = text.to_lowercase();
    LAB_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn is_shareable_prescription(text: &str) -> bool {
    text.chars().count() > SHAREABLE_PRESCRIPTION_MIN_CHARS
}

pub fn prescription_link(base_url: &str, public_token: &str) -> String {
    format!("{base_url}/api/public/prescription/{public_token}")
}

#[derive(Clone)]
pub struct SideEffects {
    sender: Arc<dyn NotificationSender>,
    templates: Arc<TemplateRenderer>,
    roster: Arc<Roster>,
    portal_base_url: String,
}

impl SideEffects {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        templates: TemplateRenderer,
        roster: Arc<Roster>,
        portal_base_url: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            templates: Arc::new(templates),
            roster,
            portal_base_url: portal_base_url.into(),
        }
    }

    pub fn registration_confirmed(&self, visit: &PatientVisit) {
        self.dispatch(
            visit.phone.as_deref(),
            templates::REGISTRATION_CONFIRMED,
            [
                ("patient_name", json!(visit.name)),
                ("token", json!(visit.token)),
            ],
            NotificationChannel::Sms,
        );
    }

    pub fn follow_up_scheduled(&self, visit: &PatientVisit) {
        let Some(date) = visit.follow_up_date else {
            return;
        };
        self.dispatch(
            visit.phone.as_deref(),
            templates::FOLLOW_UP_SCHEDULED,
            [
                ("patient_name", json!(visit.name)),
                (
                    "doctor_name",
                    json!(self.roster.display_name(visit.doctor_id.as_deref())),
                ),
                ("follow_up_date", json!(format_date(date))),
            ],
            NotificationChannel::Sms,
        );
    }

    pub fn prescription_ready(&self, visit: &PatientVisit, public_token: &str) {
        self.dispatch(
            visit.phone.as_deref(),
            templates::PRESCRIPTION_READY,
            [
                ("patient_name", json!(visit.name)),
                (
                    "link",
                    json!(prescription_link(&self.portal_base_url, public_token)),
                ),
            ],
            NotificationChannel::Whatsapp,
        );
    }

    pub fn lab_result_ready(&self, phone: Option<&str>, test_name: &str) {
        self.dispatch(
            phone,
            templates::LAB_RESULT_READY,
            [("test_name", json!(test_name))],
            NotificationChannel::Sms,
        );
    }

    /// Renders now, sends on a spawned task. Never reports back.
    fn dispatch<const N: usize>(
        &self,
        phone: Option<&str>,
        template: &'static str,
        data: [(&str, Value); N],
        channel: NotificationChannel,
    ) {
        let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
            tracing::debug!(template, "no phone number, notification skipped");
            return;
        };

        let data: HashMap<String, Value> =
            data.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let body = match self.templates.render(template, &data) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(template, error = %e, "notification not rendered");
                return;
            }
        };

        let sender = self.sender.clone();
        let destination = phone.to_string();
        tokio::spawn(async move {
            let result = sender.send(&destination, &body, channel).await;
            if !result.success {
                tracing::warn!(
                    template,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "notification failed"
                );
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSender;
    use super::*;
    use medflow_core::{NewVisit, TenantId, now_utc};
    use time::macros::date;

    fn visit(phone: Option<&str>) -> PatientVisit {
        NewVisit {
            tenant_id: TenantId::new("h1"),
            name: "Ravi".into(),
            phone: phone.map(Into::into),
            department: "General".into(),
            doctor_id: Some("1".into()),
            ..Default::default()
        }
        .into_visit("v1".into(), 3, now_utc())
    }

    fn effects(sender: Arc<RecordingSender>) -> SideEffects {
        SideEffects::new(
            sender,
            TemplateRenderer::builtin("MedFlow"),
            Arc::new(Roster::builtin()),
            "https://portal.example.org",
        )
    }

    #[test]
    fn test_keyword_matching() {
        assert!(mentions_lab_work("Paracetamol; CBC tomorrow"));
        assert!(mentions_lab_work("chest X-RAY"));
        assert!(!mentions_lab_work("Rest and fluids"));
    }

    #[tokio::test]
    async fn test_registration_message_goes_by_sms() {
        let sender = Arc::new(RecordingSender::default());
        effects(sender.clone()).registration_confirmed(&visit(Some("+919800000000")));
        let sent = sender.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+919800000000");
        assert!(sent[0].1.contains("Token: #3"));
        assert_eq!(sent[0].2, NotificationChannel::Sms);
    }

    #[tokio::test]
    async fn test_prescription_link_goes_by_whatsapp() {
        let sender = Arc::new(RecordingSender::default());
        effects(sender.clone()).prescription_ready(&visit(Some("+91")), "abc");
        let sent = sender.wait_for(1).await;
        assert!(sent[0]
            .1
            .ends_with("https://portal.example.org/api/public/prescription/abc"));
        assert_eq!(sent[0].2, NotificationChannel::Whatsapp);
    }

    #[tokio::test]
    async fn test_follow_up_names_roster_doctor() {
        let sender = Arc::new(RecordingSender::default());
        let mut v = visit(Some("+91"));
        v.follow_up_date = Some(date!(2024 - 06 - 01));
        effects(sender.clone()).follow_up_scheduled(&v);
        let sent = sender.wait_for(1).await;
        assert!(sent[0].1.contains("Dr. Asha Patel has scheduled"));
        assert!(sent[0].1.contains("2024-06-01"));
    }

    #[tokio::test]
    async fn test_missing_phone_skips_send() {
        let sender = Arc::new(RecordingSender::default());
        effects(sender.clone()).registration_confirmed(&visit(None));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(sender.sent.lock().is_empty());
    }
}
