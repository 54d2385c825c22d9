use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::action::ModAction;
use crate::domain::stream::Priority;

/// Wire-format version for queued units. Bump on any incompatible change to
/// `ActionUnit`; consumers drop units they cannot decode.
pub const ENVELOPE_VERSION: u32 = 1;

/// One unit of persistence work: a sub-chunk of canonical records plus the
/// flags the consumer needs (admin subset, live vs backlog origin).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionUnit {
    pub version: u32,
    pub unit_id: Uuid,
    pub priority: Priority,
    pub admin: bool,
    pub live: bool,
    pub actions: Vec<ModAction>,
}

impl ActionUnit {
    pub fn new(admin: bool, live: bool, actions: Vec<ModAction>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            unit_id: Uuid::new_v4(),
            priority: Priority::for_unit(live, admin),
            admin,
            live,
            actions,
        }
    }
}

#[derive(Debug)]
pub struct ReceivedUnit {
    pub unit: ActionUnit,
    pub receipt_handle: String,
    pub queue_url: String,
    /// Approximate delivery count reported by the broker; first delivery is 1.
    pub delivery_count: u32,
}

/// Client over the four physical queues: the two routing destinations
/// (ordinary vs privileged actions), each split live/backlog. The broker has
/// no native priority, so urgency is realized by strict polling order.
#[derive(Clone)]
pub struct QueueClient {
    client: Client,
    /// Queue urls indexed so that `urls[priority.level()]` is the right queue.
    urls: [String; 4],
}

impl QueueClient {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.queue_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.queue_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            sqs_builder = sqs_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(sqs_builder.build());

        let mut urls: [String; 4] = Default::default();
        for priority in [
            Priority::BacklogOrdinary,
            Priority::BacklogAdmin,
            Priority::LiveOrdinary,
            Priority::LiveAdmin,
        ] {
            let name = Self::queue_name(&config.queue_prefix, priority);
            urls[priority.level() as usize] = resolve_or_create_queue(
                &client,
                &name,
                config.queue_visibility_timeout_seconds,
            )
            .await?;
        }

        Ok(Self { client, urls })
    }

    fn queue_name(prefix: &str, priority: Priority) -> String {
        let destination = match priority {
            Priority::LiveAdmin | Priority::BacklogAdmin => format!("{}-admin", prefix),
            Priority::LiveOrdinary | Priority::BacklogOrdinary => prefix.to_string(),
        };
        match priority {
            Priority::LiveAdmin | Priority::LiveOrdinary => format!("{}-live", destination),
            Priority::BacklogAdmin | Priority::BacklogOrdinary => format!("{}-backlog", destination),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Submit one unit to the queue matching its priority.
    pub async fn submit(&self, unit: &ActionUnit) -> Result<()> {
        let body = serde_json::to_string(unit)?;
        self.client
            .send_message()
            .queue_url(&self.urls[unit.priority.level() as usize])
            .message_body(body)
            .send()
            .await?;
        Ok(())
    }

    /// Short-poll the queues in priority order and return the first unit
    /// found. Malformed or version-incompatible payloads are dropped in
    /// place.
    pub async fn receive(&self) -> Result<Option<ReceivedUnit>> {
        for queue_url in self.urls.iter().rev() {
            let response = self
                .client
                .receive_message()
                .queue_url(queue_url)
                .max_number_of_messages(1)
                .wait_time_seconds(0)
                .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
                .send()
                .await?;

            let message = match response.messages().first() {
                Some(message) => message,
                None => continue,
            };

            let receipt_handle = match message.receipt_handle() {
                Some(handle) => handle.to_string(),
                None => {
                    warn!(queue_url = %queue_url, "queue message missing receipt handle");
                    continue;
                }
            };

            let delivery_count = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(1);

            let body = match message.body() {
                Some(body) => body,
                None => {
                    warn!(queue_url = %queue_url, "queue message missing body, deleting");
                    let _ = self.delete(queue_url, &receipt_handle).await;
                    continue;
                }
            };

            let unit: ActionUnit = match serde_json::from_str(body) {
                Ok(unit) => unit,
                Err(err) => {
                    warn!(error = ?err, "failed to parse queued unit, deleting");
                    let _ = self.delete(queue_url, &receipt_handle).await;
                    continue;
                }
            };

            if unit.version != ENVELOPE_VERSION {
                warn!(
                    unit_id = %unit.unit_id,
                    version = unit.version,
                    "dropping unit with unsupported envelope version"
                );
                let _ = self.delete(queue_url, &receipt_handle).await;
                continue;
            }

            return Ok(Some(ReceivedUnit {
                unit,
                receipt_handle,
                queue_url: queue_url.clone(),
                delivery_count,
            }));
        }

        Ok(None)
    }

    pub async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;
        Ok(())
    }
}

async fn resolve_or_create_queue(
    client: &Client,
    queue_name: &str,
    visibility_timeout_seconds: u32,
) -> Result<String> {
    match client.get_queue_url().queue_name(queue_name).send().await {
        Ok(response) => Ok(response
            .queue_url()
            .ok_or_else(|| anyhow!("missing queue url for {}", queue_name))?
            .to_string()),
        Err(SdkError::ServiceError(service_err)) if service_err.err().is_queue_does_not_exist() => {
            let created = client
                .create_queue()
                .queue_name(queue_name)
                .attributes(
                    QueueAttributeName::VisibilityTimeout,
                    visibility_timeout_seconds.to_string(),
                )
                .send()
                .await?;
            Ok(created
                .queue_url()
                .ok_or_else(|| anyhow!("missing queue url for {}", queue_name))?
                .to_string())
        }
        Err(err) => Err(anyhow!(err)),
    }
}
