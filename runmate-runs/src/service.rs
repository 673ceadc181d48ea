use chrono::Utc;
use runmate_core::chat::Chat;
use runmate_core::outbox::{
    NewOutboxEvent, JOIN_REQUESTED, PARTICIPANT_LEFT, REQUEST_APPROVED, REQUEST_REJECTED, RUN_CANCELLED,
};
use runmate_core::pagination::Page;
use runmate_core::run_event::{
    ChatLink, JoinDecision, NewRunEvent, RequestOutcome, RunEvent, RunEventPatch, RunEventStatus,
};
use runmate_core::store::{ChatWrite, RunEventCommit, RunEventFilter, RunEventRepository};
use runmate_core::{Result, RunmateError, StoreError};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Listing filters accepted on `GET /runevents`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEventQuery {
    pub status: Option<RunEventStatus>,
    /// Only runs the caller takes part in.
    #[serde(default)]
    pub mine: bool,
    pub host: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDecision {
    pub user_id: Uuid,
    pub action: JoinDecision,
}

pub struct RunEventService {
    events: Arc<dyn RunEventRepository>,
}

fn event_payload(event: &RunEvent, user: Uuid) -> serde_json::Value {
    json!({
        "runEventId": event.id,
        "hostId": event.host,
        "userId": user,
        "title": event.title,
    })
}

/// Attempts per mutation before a concurrent-modification conflict is reported.
const MAX_ATTEMPTS: usize = 3;

/// Re-runs a load-decide-commit step while the commit finds the event changed
/// underneath it.
async fn retry_stale<T, F, Fut>(id: Uuid, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for _ in 0..MAX_ATTEMPTS {
        match attempt().await {
            Err(RunmateError::Store(StoreError::StaleWrite(_))) => {
                tracing::debug!("Run event {} changed concurrently, retrying", id);
            }
            other => return other,
        }
    }
    tracing::warn!("Giving up on run event {} after {} concurrent changes", id, MAX_ATTEMPTS);
    Err(RunmateError::conflict("run event was changed by someone else, please retry"))
}

impl RunEventService {
    pub fn new(events: Arc<dyn RunEventRepository>) -> Self {
        Self { events }
    }

    pub async fn create(&self, host: Uuid, input: NewRunEvent) -> Result<RunEvent> {
        let event = RunEvent::create(host, input, Utc::now())?;
        self.events.insert_event(&event).await?;
        tracing::info!("Run event {} created by {}", event.id, host);
        Ok(event)
    }

    pub async fn get(&self, id: Uuid) -> Result<RunEvent> {
        self.events
            .get_event(id)
            .await?
            .ok_or_else(|| RunmateError::not_found("run event"))
    }

    pub async fn list(&self, user: Uuid, query: RunEventQuery, page: Page) -> Result<Vec<RunEvent>> {
        let filter = RunEventFilter {
            status: query.status,
            host: query.host,
            participant: query.mine.then_some(user),
            before: None,
        };
        Ok(self.events.list_events(&filter, Some(page)).await?)
    }

    pub async fn update(&self, user: Uuid, id: Uuid, patch: RunEventPatch) -> Result<RunEvent> {
        retry_stale(id, || self.update_once(user, id, patch.clone())).await
    }

    async fn update_once(&self, user: Uuid, id: Uuid, patch: RunEventPatch) -> Result<RunEvent> {
        let mut event = self.get(id).await?;
        let version = event.updated_at;
        event.apply_patch(user, patch, Utc::now())?;

        let mut commit = RunEventCommit::new(event.clone()).expecting(version);
        if event.status == RunEventStatus::Cancelled {
            commit = commit.with_event(cancelled_event(&event));
        }
        self.events.commit(commit).await?;
        Ok(event)
    }

    pub async fn request_join(&self, user: Uuid, id: Uuid) -> Result<RunEvent> {
        retry_stale(id, || self.request_join_once(user, id)).await
    }

    async fn request_join_once(&self, user: Uuid, id: Uuid) -> Result<RunEvent> {
        let mut event = self.get(id).await?;
        let version = event.updated_at;
        event.request_join(user, Utc::now())?;

        let outbox = NewOutboxEvent::new(JOIN_REQUESTED, event.id, event_payload(&event, user));
        self.events
            .commit(RunEventCommit::new(event.clone()).expecting(version).with_event(outbox))
            .await?;
        tracing::info!("User {} requested to join run event {}", user, event.id);
        Ok(event)
    }

    /// Host approval or rejection. Approval admits the applicant to the event
    /// and its chat in one commit, creating the chat on first approval.
    pub async fn decide_request(&self, host: Uuid, id: Uuid, decision: RequestDecision) -> Result<RunEvent> {
        retry_stale(id, || self.decide_request_once(host, id, decision.clone())).await
    }

    async fn decide_request_once(&self, host: Uuid, id: Uuid, decision: RequestDecision) -> Result<RunEvent> {
        let now = Utc::now();
        let applicant = decision.user_id;
        let mut event = self.get(id).await?;
        let version = event.updated_at;
        let outcome = event.decide_request(host, applicant, decision.action, now)?;

        let mut payload = event_payload(&event, applicant);
        let commit = match outcome {
            RequestOutcome::Approved { chat, now_full } => {
                let write = match chat {
                    ChatLink::Create => {
                        let chat = Chat::for_run_event(event.id, event.host, applicant, &event.title, now);
                        event.chat_id = Some(chat.id);
                        ChatWrite::Insert(chat)
                    }
                    ChatLink::Join(chat_id) => ChatWrite::AddParticipant {
                        chat_id,
                        user: applicant,
                        at: now,
                    },
                };
                payload["chatId"] = json!(event.chat_id);
                payload["nowFull"] = json!(now_full);
                RunEventCommit::new(event.clone())
                    .expecting(version)
                    .with_chat(write)
                    .with_event(NewOutboxEvent::new(REQUEST_APPROVED, event.id, payload))
            }
            RequestOutcome::Rejected => RunEventCommit::new(event.clone())
                .expecting(version)
                .with_event(NewOutboxEvent::new(REQUEST_REJECTED, event.id, payload)),
            RequestOutcome::CapacityReached => {
                payload["reason"] = json!("full");
                RunEventCommit::new(event.clone())
                    .expecting(version)
                    .with_event(NewOutboxEvent::new(REQUEST_REJECTED, event.id, payload))
            }
        };
        self.events.commit(commit).await?;

        if outcome == RequestOutcome::CapacityReached {
            tracing::info!("Run event {} is full, request from {} dropped", event.id, applicant);
            return Err(RunmateError::validation("run event is full"));
        }
        tracing::info!("Host {} handled request from {} on run event {}", host, applicant, event.id);
        Ok(event)
    }

    pub async fn leave(&self, user: Uuid, id: Uuid) -> Result<RunEvent> {
        retry_stale(id, || self.leave_once(user, id)).await
    }

    async fn leave_once(&self, user: Uuid, id: Uuid) -> Result<RunEvent> {
        let now = Utc::now();
        let mut event = self.get(id).await?;
        let version = event.updated_at;
        let chat_id = event.leave(user, now)?;

        let mut commit = RunEventCommit::new(event.clone())
            .expecting(version)
            .with_event(NewOutboxEvent::new(PARTICIPANT_LEFT, event.id, event_payload(&event, user)));
        if let Some(chat_id) = chat_id {
            commit = commit.with_chat(ChatWrite::RemoveParticipant { chat_id, user, at: now });
        }
        self.events.commit(commit).await?;
        Ok(event)
    }

    pub async fn cancel(&self, host: Uuid, id: Uuid) -> Result<RunEvent> {
        retry_stale(id, || self.cancel_once(host, id)).await
    }

    async fn cancel_once(&self, host: Uuid, id: Uuid) -> Result<RunEvent> {
        let mut event = self.get(id).await?;
        let version = event.updated_at;
        event.cancel(host, Utc::now())?;

        self.events
            .commit(
                RunEventCommit::new(event.clone())
                    .expecting(version)
                    .with_event(cancelled_event(&event)),
            )
            .await?;
        tracing::info!("Run event {} cancelled", event.id);
        Ok(event)
    }
}

fn cancelled_event(event: &RunEvent) -> NewOutboxEvent {
    let participants: Vec<Uuid> = event.participants.iter().copied().filter(|p| *p != event.host).collect();
    NewOutboxEvent::new(
        RUN_CANCELLED,
        event.id,
        json!({
            "runEventId": event.id,
            "hostId": event.host,
            "title": event.title,
            "participants": participants,
            "pendingRequests": event.pending_requests,
        }),
    )
}
