use std::collections::HashMap;

use crate::error::NotificationError;

pub const REGISTRATION_CONFIRMED: &str = "registration-confirmed";
pub const FOLLOW_UP_SCHEDULED: &str = "follow-up-scheduled";
pub const PRESCRIPTION_READY: &str = "prescription-ready";
pub const LAB_RESULT_READY: &str = "lab-result-ready";

/// Simple template renderer using {{variable}} syntax
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
    defaults: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub body: String,
}

impl Template {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    /// Renderer preloaded with the patient messages, signed with `hospital_name`.
    pub fn builtin(hospital_name: &str) -> Self {
        let mut renderer = Self::new();
        renderer.set_default("hospital_name", serde_json::json!(hospital_name));
        renderer.register(Template::new(
            REGISTRATION_CONFIRMED,
            "Welcome to {{hospital_name}}, {{patient_name}}. Your registration is confirmed. \
             Token: #{{token}}. Please wait for your turn.",
        ));
        renderer.register(Template::new(
            FOLLOW_UP_SCHEDULED,
            "Hello {{patient_name}}, {{doctor_name}} has scheduled your follow-up visit on \
             {{follow_up_date}}. Please visit {{hospital_name}}.",
        ));
        renderer.register(Template::new(
            PRESCRIPTION_READY,
            "Hello {{patient_name}}, your prescription is ready. View it here: {{link}}",
        ));
        renderer.register(Template::new(
            LAB_RESULT_READY,
            "{{hospital_name}}: Your lab report for {{test_name}} is now ready. \
             Please collect it from the counter or view online.",
        ));
        renderer
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Value used when render data does not supply `key`.
    pub fn set_default(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.defaults.insert(key.into(), value);
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.get(template_id)
    }

    pub fn render(
        &self,
        template_id: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<String, NotificationError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or(NotificationError::TemplateNotFound(template_id.to_string()))?;

        let body = Self::render_string(&template.body, data);
        Ok(Self::render_string(&body, &self.defaults))
    }

    fn render_string(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
        let mut result = template.to_string();

        for (key, value) in data {
            let placeholder = format!("{{{{{}}}}}", key);
            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                _ => value.to_string(),
            };
            result = result.replace(&placeholder, &replacement);
        }

        result
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
