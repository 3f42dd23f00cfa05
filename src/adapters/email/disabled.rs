//! Disabled mailer for unconfigured deployments.
//!
//! Logs what would have been sent and succeeds. Reports itself as
//! Simulated so callers (and operators) can tell no mail actually leaves
//! the process.

use crate::domain::{DomainError, JobSummary};
use crate::ports::{CapabilityMode, MailerPort};
use tracing::info;

pub struct DisabledMailer;

impl DisabledMailer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DisabledMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MailerPort for DisabledMailer {
    async fn send_job_completion(
        &self,
        address: &str,
        _username: &str,
        summary: &JobSummary,
    ) -> Result<(), DomainError> {
        info!(
            address,
            job_id = %summary.job_id,
            total = summary.total_numbers,
            "[disabled] would send job completion email"
        );
        Ok(())
    }

    async fn send_low_credit_alert(
        &self,
        address: &str,
        _username: &str,
        remaining_credits: i64,
    ) -> Result<(), DomainError> {
        info!(
            address,
            remaining_credits, "[disabled] would send low-credit alert"
        );
        Ok(())
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_mailer_always_succeeds() {
        let mailer = DisabledMailer::new();
        assert_eq!(mailer.mode(), CapabilityMode::Simulated);
        mailer
            .send_low_credit_alert("budi@example.com", "budi", 42)
            .await
            .unwrap();
    }
}
