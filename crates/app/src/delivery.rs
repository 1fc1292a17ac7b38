use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use onboard_core::Invitation;
use onboard_mailer::{InvitationEmail, MailerClient};
use onboard_storage::{Database, GroupError, InvitationError};

const BATCH_LIMIT: i64 = 50;

/// Background worker that emails pending invitations and stamps `sent_at`.
#[derive(Clone)]
pub struct DeliveryWorker {
    database: Database,
    mailer: Option<MailerClient>,
    public_url: String,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    interval: Duration,
}

impl DeliveryWorker {
    /// Without a mailer, links are logged instead of sent.
    pub fn new(
        database: Database,
        mailer: Option<MailerClient>,
        public_url: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            database,
            mailer,
            public_url: public_url.into(),
            clock: Arc::new(Utc::now),
            interval,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the worker loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                error!(stage = "delivery", error = %err, "delivery run failed");
            }
        }
    }

    pub fn accept_url(&self, token: &str) -> String {
        format!("{}/invitations/{token}", self.public_url)
    }

    /// Delivers one batch of undelivered invitations.
    ///
    /// A failed send leaves `sent_at` empty so the invitation is retried next tick.
    pub async fn run_once(&self) -> Result<DeliveryReport, DeliveryError> {
        let pending = self
            .database
            .invitations()
            .list_undelivered(BATCH_LIMIT)
            .await?;

        let mut report = DeliveryReport::default();
        let mut group_names: HashMap<i64, String> = HashMap::new();

        for invitation in pending {
            let group_name = match group_names.get(&invitation.group_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .database
                        .groups()
                        .find(invitation.group_id)
                        .await?
                        .map(|group| group.name)
                        .unwrap_or_default();
                    group_names.insert(invitation.group_id, name.clone());
                    name
                }
            };

            match self.deliver(&invitation, &group_name).await {
                Ok(()) => {
                    self.database
                        .invitations()
                        .mark_sent(invitation.id, (self.clock)())
                        .await?;
                    counter!("invitation_deliveries_total", "result" => "sent").increment(1);
                    report.sent += 1;
                }
                Err(err) => {
                    counter!("invitation_deliveries_total", "result" => "failed").increment(1);
                    warn!(
                        stage = "delivery",
                        invitation_id = invitation.id,
                        error = %err,
                        "invitation email failed, will retry"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.sent + report.failed > 0 {
            info!(
                stage = "delivery",
                sent = report.sent,
                failed = report.failed,
                "delivery batch completed"
            );
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        invitation: &Invitation,
        group_name: &str,
    ) -> Result<(), onboard_mailer::MailerError> {
        let accept_url = self.accept_url(&invitation.token);
        let Some(mailer) = &self.mailer else {
            info!(
                stage = "delivery",
                invitation_id = invitation.id,
                to = %invitation.email,
                group = %group_name,
                link = %accept_url,
                "mailer not configured, logging invitation link"
            );
            return Ok(());
        };

        let sent = mailer
            .send_invitation(&InvitationEmail {
                to: &invitation.email,
                group_name,
                accept_url: &accept_url,
            })
            .await?;
        info!(
            stage = "delivery",
            invitation_id = invitation.id,
            message_id = %sent.id,
            "invitation email queued"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to access invitations: {0}")]
    Invitation(#[from] InvitationError),
    #[error("failed to load group: {0}")]
    Group(#[from] GroupError),
}
