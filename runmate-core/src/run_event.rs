use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RunmateError;

pub const DEFAULT_MAX_PARTICIPANTS: u32 = 4;
pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 100;
/// Slowest accepted pace, one hour per kilometre.
pub const MAX_PACE: u32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunEventStatus {
    Open,
    Full,
    InProgress,
    Completed,
    Cancelled,
}

impl RunEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventStatus::Open => "open",
            RunEventStatus::Full => "full",
            RunEventStatus::InProgress => "in-progress",
            RunEventStatus::Completed => "completed",
            RunEventStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further membership changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEventStatus::Completed | RunEventStatus::Cancelled)
    }
}

impl fmt::Display for RunEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunEventStatus {
    type Err = RunmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RunEventStatus::Open),
            "full" => Ok(RunEventStatus::Full),
            "in-progress" => Ok(RunEventStatus::InProgress),
            "completed" => Ok(RunEventStatus::Completed),
            "cancelled" => Ok(RunEventStatus::Cancelled),
            other => Err(RunmateError::validation(format!("unknown run event status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    fn validate(&self) -> Result<(), RunmateError> {
        if self.name.trim().is_empty() {
            return Err(RunmateError::validation("location name is required"));
        }
        match (self.latitude, self.longitude) {
            (None, None) => Ok(()),
            (Some(lat), Some(lng)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) => Ok(()),
            (Some(_), Some(_)) => Err(RunmateError::validation("coordinates out of range")),
            _ => Err(RunmateError::validation("latitude and longitude must be given together")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub id: Uuid,
    pub host: Uuid,
    pub title: String,
    pub description: String,
    pub location: Location,
    /// Kilometres.
    pub distance: f64,
    /// Seconds per kilometre.
    pub pace: u32,
    pub date: DateTime<Utc>,
    pub max_participants: u32,
    pub participants: Vec<Uuid>,
    pub pending_requests: Vec<Uuid>,
    pub status: RunEventStatus,
    pub chat_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload. Every field except `max_participants` is required; they
/// are optional here so missing fields surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRunEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub distance: Option<f64>,
    pub pace: Option<u32>,
    pub date: Option<DateTime<Utc>>,
    pub max_participants: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub distance: Option<f64>,
    pub pace: Option<u32>,
    pub date: Option<DateTime<Utc>>,
    pub max_participants: Option<u32>,
    pub status: Option<RunEventStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinDecision {
    Approve,
    Reject,
}

/// What happens to the event chat when a request is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatLink {
    Create,
    Join(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Approved { chat: ChatLink, now_full: bool },
    Rejected,
    /// The applicant was dropped from the pending list but could not be
    /// admitted because the event is at capacity.
    CapacityReached,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, RunmateError> {
    value.ok_or_else(|| RunmateError::validation(format!("{} is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, RunmateError> {
    let text = required(value, field)?.trim().to_string();
    if text.is_empty() {
        return Err(RunmateError::validation(format!("{} is required", field)));
    }
    Ok(text)
}

fn check_distance(distance: f64) -> Result<(), RunmateError> {
    if !distance.is_finite() || distance <= 0.0 {
        return Err(RunmateError::validation("distance must be greater than 0"));
    }
    Ok(())
}

fn check_pace(pace: u32) -> Result<(), RunmateError> {
    if pace == 0 {
        return Err(RunmateError::validation("pace must be greater than 0"));
    }
    if pace > MAX_PACE {
        return Err(RunmateError::validation(format!(
            "pace cannot exceed {} seconds per km",
            MAX_PACE
        )));
    }
    Ok(())
}

fn check_capacity(max: u32) -> Result<(), RunmateError> {
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&max) {
        return Err(RunmateError::validation(format!(
            "maxParticipants must be between {} and {}",
            MIN_PARTICIPANTS, MAX_PARTICIPANTS
        )));
    }
    Ok(())
}

impl RunEvent {
    /// Builds a new open event with the host as its first participant.
    pub fn create(host: Uuid, input: NewRunEvent, now: DateTime<Utc>) -> Result<Self, RunmateError> {
        let title = required_text(input.title, "title")?;
        let description = required_text(input.description, "description")?;
        let location = required(input.location, "location")?;
        location.validate()?;
        let distance = required(input.distance, "distance")?;
        check_distance(distance)?;
        let pace = required(input.pace, "pace")?;
        check_pace(pace)?;
        let date = required(input.date, "date")?;
        let max_participants = input.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
        check_capacity(max_participants)?;

        Ok(RunEvent {
            id: Uuid::new_v4(),
            host,
            title,
            description,
            location,
            distance,
            pace,
            date,
            max_participants,
            participants: vec![host],
            pending_requests: Vec::new(),
            status: RunEventStatus::Open,
            chat_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_host(&self, user: Uuid) -> bool {
        self.host == user
    }

    pub fn is_participant(&self, user: Uuid) -> bool {
        self.participants.contains(&user)
    }

    pub fn has_pending_request(&self, user: Uuid) -> bool {
        self.pending_requests.contains(&user)
    }

    pub fn is_at_capacity(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }

    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        self.date < now
    }

    fn ensure_host(&self, user: Uuid, action: &str) -> Result<(), RunmateError> {
        if !self.is_host(user) {
            return Err(RunmateError::unauthorized(format!("only the host can {}", action)));
        }
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), RunmateError> {
        if self.status.is_terminal() {
            return Err(RunmateError::validation(format!("run event is {}", self.status)));
        }
        Ok(())
    }

    /// Keeps `full` in step with the participant count while the event is
    /// still in its open/full phase.
    fn sync_capacity_status(&mut self) {
        if matches!(self.status, RunEventStatus::Open | RunEventStatus::Full) {
            self.status = if self.is_at_capacity() {
                RunEventStatus::Full
            } else {
                RunEventStatus::Open
            };
        }
    }

    pub fn request_join(&mut self, user: Uuid, now: DateTime<Utc>) -> Result<(), RunmateError> {
        if self.status != RunEventStatus::Open {
            return Err(RunmateError::validation(format!(
                "run event is not open for requests ({})",
                self.status
            )));
        }
        if self.is_host(user) {
            return Err(RunmateError::validation("the host cannot request to join their own run"));
        }
        if self.is_participant(user) {
            return Err(RunmateError::validation("already a participant"));
        }
        if self.has_pending_request(user) {
            return Err(RunmateError::validation("join request already pending"));
        }
        self.pending_requests.push(user);
        self.updated_at = now;
        Ok(())
    }

    /// Host decision on a pending request. The applicant leaves the pending
    /// list whatever the outcome.
    pub fn decide_request(
        &mut self,
        by: Uuid,
        applicant: Uuid,
        decision: JoinDecision,
        now: DateTime<Utc>,
    ) -> Result<RequestOutcome, RunmateError> {
        self.ensure_host(by, "handle join requests")?;
        self.ensure_not_terminal()?;
        if !self.has_pending_request(applicant) {
            return Err(RunmateError::not_found("join request"));
        }

        self.pending_requests.retain(|u| *u != applicant);
        self.updated_at = now;

        if decision == JoinDecision::Reject {
            return Ok(RequestOutcome::Rejected);
        }
        if self.is_at_capacity() {
            return Ok(RequestOutcome::CapacityReached);
        }

        self.participants.push(applicant);
        self.sync_capacity_status();

        let chat = match self.chat_id {
            Some(chat_id) => ChatLink::Join(chat_id),
            None => ChatLink::Create,
        };
        Ok(RequestOutcome::Approved {
            chat,
            now_full: self.status == RunEventStatus::Full,
        })
    }

    /// Returns the event chat the user should be removed from, if any.
    pub fn leave(&mut self, user: Uuid, now: DateTime<Utc>) -> Result<Option<Uuid>, RunmateError> {
        if self.is_host(user) {
            return Err(RunmateError::validation("the host cannot leave; cancel the run instead"));
        }
        self.ensure_not_terminal()?;
        if !self.is_participant(user) {
            return Err(RunmateError::validation("not a participant of this run"));
        }

        self.participants.retain(|u| *u != user);
        if self.status == RunEventStatus::Full {
            self.status = RunEventStatus::Open;
        }
        self.updated_at = now;
        Ok(self.chat_id)
    }

    pub fn cancel(&mut self, by: Uuid, now: DateTime<Utc>) -> Result<(), RunmateError> {
        self.ensure_host(by, "cancel the run")?;
        if self.status == RunEventStatus::Cancelled {
            return Err(RunmateError::validation("run event is already cancelled"));
        }
        self.status = RunEventStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_patch(&mut self, by: Uuid, patch: RunEventPatch, now: DateTime<Utc>) -> Result<(), RunmateError> {
        self.ensure_host(by, "update the run")?;
        self.ensure_not_terminal()?;

        let mut next = self.clone();
        if let Some(title) = patch.title {
            next.title = required_text(Some(title), "title")?;
        }
        if let Some(description) = patch.description {
            next.description = required_text(Some(description), "description")?;
        }
        if let Some(location) = patch.location {
            location.validate()?;
            next.location = location;
        }
        if let Some(distance) = patch.distance {
            check_distance(distance)?;
            next.distance = distance;
        }
        if let Some(pace) = patch.pace {
            check_pace(pace)?;
            next.pace = pace;
        }
        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(max) = patch.max_participants {
            check_capacity(max)?;
            if (max as usize) < next.participants.len() {
                return Err(RunmateError::validation(
                    "maxParticipants cannot be lower than the current participant count",
                ));
            }
            next.max_participants = max;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        next.sync_capacity_status();
        next.updated_at = now;

        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(max: Option<u32>) -> NewRunEvent {
        NewRunEvent {
            title: Some("Morning 10k".into()),
            description: Some("Easy pace along the water".into()),
            location: Some(Location {
                name: "Djurgården".into(),
                latitude: Some(59.326),
                longitude: Some(18.115),
            }),
            distance: Some(10.0),
            pace: Some(330),
            date: Some(Utc::now() + Duration::days(2)),
            max_participants: max,
        }
    }

    fn event(max: u32) -> RunEvent {
        RunEvent::create(Uuid::new_v4(), input(Some(max)), Utc::now()).unwrap()
    }

    #[test]
    fn create_adds_host_and_defaults_capacity() {
        let host = Uuid::new_v4();
        let ev = RunEvent::create(host, input(None), Utc::now()).unwrap();
        assert_eq!(ev.participants, vec![host]);
        assert_eq!(ev.max_participants, DEFAULT_MAX_PARTICIPANTS);
        assert_eq!(ev.status, RunEventStatus::Open);
    }

    #[test]
    fn create_requires_fields() {
        let host = Uuid::new_v4();
        let mut missing = input(None);
        missing.location = None;
        assert!(matches!(RunEvent::create(host, missing, Utc::now()), Err(RunmateError::Validation(_))));

        let mut bad_distance = input(None);
        bad_distance.distance = Some(0.0);
        assert!(RunEvent::create(host, bad_distance, Utc::now()).is_err());

        assert!(RunEvent::create(host, input(Some(1)), Utc::now()).is_err());
    }

    #[test]
    fn join_rejected_for_host() {
        let mut ev = event(4);
        let host = ev.host;
        assert!(ev.request_join(host, Utc::now()).is_err());
    }

    #[test]
    fn join_rejected_for_participant() {
        let mut ev = event(4);
        let user = Uuid::new_v4();
        ev.request_join(user, Utc::now()).unwrap();
        ev.decide_request(ev.host, user, JoinDecision::Approve, Utc::now()).unwrap();
        assert!(ev.request_join(user, Utc::now()).is_err());
    }

    #[test]
    fn join_rejected_when_pending() {
        let mut ev = event(4);
        let user = Uuid::new_v4();
        ev.request_join(user, Utc::now()).unwrap();
        assert!(ev.request_join(user, Utc::now()).is_err());
        assert_eq!(ev.pending_requests, vec![user]);
    }

    #[test]
    fn join_rejected_when_not_open() {
        let mut ev = event(4);
        ev.status = RunEventStatus::InProgress;
        assert!(ev.request_join(Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn approvals_fill_then_leave_reopens() {
        let mut ev = event(3);
        let host = ev.host;
        let runners: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        for r in &runners {
            ev.request_join(*r, Utc::now()).unwrap();
        }

        let first = ev.decide_request(host, runners[0], JoinDecision::Approve, Utc::now()).unwrap();
        assert_eq!(first, RequestOutcome::Approved { chat: ChatLink::Create, now_full: false });
        ev.chat_id = Some(Uuid::new_v4());

        let second = ev.decide_request(host, runners[1], JoinDecision::Approve, Utc::now()).unwrap();
        assert!(matches!(second, RequestOutcome::Approved { chat: ChatLink::Join(_), now_full: true }));
        assert_eq!(ev.status, RunEventStatus::Full);

        assert_eq!(ev.leave(runners[0], Utc::now()).unwrap(), ev.chat_id);
        assert_eq!(ev.status, RunEventStatus::Open);
    }

    #[test]
    fn capacity_rejection_still_clears_pending() {
        let mut ev = event(2);
        let host = ev.host;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        ev.request_join(a, Utc::now()).unwrap();
        ev.request_join(b, Utc::now()).unwrap();
        ev.decide_request(host, a, JoinDecision::Approve, Utc::now()).unwrap();

        let outcome = ev.decide_request(host, b, JoinDecision::Approve, Utc::now()).unwrap();
        assert_eq!(outcome, RequestOutcome::CapacityReached);
        assert!(ev.pending_requests.is_empty());
        assert_eq!(ev.participants, vec![host, a]);
    }

    #[test]
    fn only_host_decides() {
        let mut ev = event(4);
        let user = Uuid::new_v4();
        ev.request_join(user, Utc::now()).unwrap();
        let err = ev.decide_request(user, user, JoinDecision::Approve, Utc::now()).unwrap_err();
        assert!(matches!(err, RunmateError::Unauthorized(_)));
    }

    #[test]
    fn host_cannot_leave() {
        let mut ev = event(4);
        let host = ev.host;
        assert!(ev.leave(host, Utc::now()).is_err());
    }

    #[test]
    fn cancelled_is_locked() {
        let mut ev = event(4);
        let host = ev.host;
        let user = Uuid::new_v4();
        ev.request_join(user, Utc::now()).unwrap();
        ev.cancel(host, Utc::now()).unwrap();

        assert!(ev.decide_request(host, user, JoinDecision::Approve, Utc::now()).is_err());
        assert!(ev.request_join(Uuid::new_v4(), Utc::now()).is_err());
        assert!(ev.apply_patch(host, RunEventPatch::default(), Utc::now()).is_err());
    }

    #[test]
    fn patch_cannot_shrink_below_participants() {
        let mut ev = event(3);
        let host = ev.host;
        let user = Uuid::new_v4();
        ev.request_join(user, Utc::now()).unwrap();
        ev.decide_request(host, user, JoinDecision::Approve, Utc::now()).unwrap();

        let shrink = RunEventPatch { max_participants: Some(2), ..Default::default() };
        ev.apply_patch(host, shrink, Utc::now()).unwrap();
        assert_eq!(ev.status, RunEventStatus::Full);

        let too_small = RunEventPatch { max_participants: Some(1), ..Default::default() };
        assert!(ev.apply_patch(host, too_small, Utc::now()).is_err());
        assert_eq!(ev.max_participants, 2);
    }

    #[test]
    fn pace_and_capacity_are_bounded() {
        let mut at_limit = input(Some(MAX_PARTICIPANTS));
        at_limit.pace = Some(MAX_PACE);
        assert!(RunEvent::create(Uuid::new_v4(), at_limit, Utc::now()).is_ok());

        let mut slow = input(None);
        slow.pace = Some(3_000_000_000);
        let err = RunEvent::create(Uuid::new_v4(), slow, Utc::now()).unwrap_err();
        assert!(matches!(err, RunmateError::Validation(_)));

        let crowded = input(Some(u32::MAX));
        assert!(matches!(
            RunEvent::create(Uuid::new_v4(), crowded, Utc::now()),
            Err(RunmateError::Validation(_))
        ));

        let mut ev = event(4);
        let host = ev.host;
        let patch = RunEventPatch { max_participants: Some(MAX_PARTICIPANTS + 1), ..Default::default() };
        assert!(ev.apply_patch(host, patch, Utc::now()).is_err());
        let patch = RunEventPatch { pace: Some(MAX_PACE + 1), ..Default::default() };
        assert!(ev.apply_patch(host, patch, Utc::now()).is_err());
        assert_eq!(ev.max_participants, 4);
        assert_eq!(ev.pace, 330);
    }
}
