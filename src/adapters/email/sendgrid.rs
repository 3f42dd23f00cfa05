//! SendGrid adapter. Implements MailerPort via the v3 mail send API.
//!
//! Bodies are dynamic templates maintained in SendGrid; this adapter only
//! ships the template data, keeping body construction out of the pipeline.

use crate::domain::{DomainError, JobSummary};
use crate::ports::{CapabilityMode, MailerPort};
use reqwest::Client;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendgridMailer {
    client: Client,
    api_key: String,
    from_address: String,
    completion_template_id: String,
    low_credit_template_id: String,
    send_url: String,
}

impl SendgridMailer {
    pub fn new(
        api_key: String,
        from_address: String,
        completion_template_id: String,
        low_credit_template_id: String,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from_address,
            completion_template_id,
            low_credit_template_id,
            send_url: SENDGRID_SEND_URL.to_string(),
        }
    }

    async fn send_template(
        &self,
        address: &str,
        template_id: &str,
        template_data: serde_json::Value,
    ) -> Result<(), DomainError> {
        let body = serde_json::json!({
            "from": {"email": self.from_address},
            "template_id": template_id,
            "personalizations": [{
                "to": [{"email": address}],
                "dynamic_template_data": template_data,
            }],
        });

        let res = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::Mailer(format!("Request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(DomainError::Mailer(format!(
                "SendGrid API error {status}: {text}"
            )));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl MailerPort for SendgridMailer {
    async fn send_job_completion(
        &self,
        address: &str,
        username: &str,
        summary: &JobSummary,
    ) -> Result<(), DomainError> {
        let data = serde_json::json!({
            "username": username,
            "job_id": summary.job_id,
            "filename": summary.filename,
            "total_numbers": summary.total_numbers,
            "whatsapp_active": summary.whatsapp_active,
            "telegram_active": summary.telegram_active,
            "inactive": summary.inactive,
            "errors": summary.errors,
            "credits_used": summary.credits_used,
        });
        self.send_template(address, &self.completion_template_id, data)
            .await
    }

    async fn send_low_credit_alert(
        &self,
        address: &str,
        username: &str,
        remaining_credits: i64,
    ) -> Result<(), DomainError> {
        let data = serde_json::json!({
            "username": username,
            "remaining_credits": remaining_credits,
        });
        self.send_template(address, &self.low_credit_template_id, data)
            .await
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}
