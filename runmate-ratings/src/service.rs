use chrono::{DateTime, Utc};
use runmate_core::outbox::{NewOutboxEvent, RATING_CREATED};
use runmate_core::pagination::Page;
use runmate_core::rating::{NewRating, NewSupportReport, Rating, RatingStats, RatingSummary};
use runmate_core::run_event::{RunEvent, RunEventStatus};
use runmate_core::store::{expand_users, RatingRepository, RunEventFilter, RunEventRepository, UserRepository};
use runmate_core::user::UserSummary;
use runmate_core::{Result, RunmateError, StoreError};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRunEvent {
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
}

/// A co-runner from a finished run that the caller has not rated yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRating {
    pub run_event: PendingRunEvent,
    pub user: UserSummary,
}

pub struct RatingService {
    ratings: Arc<dyn RatingRepository>,
    events: Arc<dyn RunEventRepository>,
    users: Arc<dyn UserRepository>,
}

fn duplicate(err: StoreError) -> RunmateError {
    match err {
        StoreError::UniqueViolation(_) => RunmateError::conflict("you have already rated this runner for this run"),
        other => other.into(),
    }
}

fn ensure_not_cancelled(event: &RunEvent) -> Result<()> {
    if event.status == RunEventStatus::Cancelled {
        return Err(RunmateError::validation("cancelled runs cannot be rated"));
    }
    Ok(())
}

impl RatingService {
    pub fn new(
        ratings: Arc<dyn RatingRepository>,
        events: Arc<dyn RunEventRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self { ratings, events, users }
    }

    pub async fn create(&self, rater: Uuid, input: NewRating) -> Result<Rating> {
        let now = Utc::now();
        let rating = Rating::create(rater, input, now)?;
        let event = self.load_event(rating.related_event).await?;

        if !event.is_participant(rater) {
            return Err(RunmateError::unauthorized("you did not take part in this run"));
        }
        ensure_not_cancelled(&event)?;
        if !event.is_participant(rating.ratee) {
            return Err(RunmateError::validation("the rated runner did not take part in this run"));
        }
        if !event.has_passed(now) {
            return Err(RunmateError::validation("runs can only be rated after they have taken place"));
        }
        if self
            .ratings
            .find_rating(rater, rating.ratee, rating.related_event)
            .await?
            .is_some()
        {
            return Err(RunmateError::conflict("you have already rated this runner for this run"));
        }

        let outbox = NewOutboxEvent::new(
            RATING_CREATED,
            rating.id,
            json!({
                "ratingId": rating.id,
                "raterId": rater,
                "rateeId": rating.ratee,
                "runEventId": event.id,
                "title": event.title,
                "overallRating": rating.overall_rating,
            }),
        );
        self.ratings.insert_rating(&rating, &[outbox]).await.map_err(duplicate)?;
        tracing::info!("Rating {} stored for {} on run event {}", rating.id, rating.ratee, event.id);

        // Rating is already committed; cache refresh failures are only logged.
        if let Err(e) = self.refresh_cached_stats(rating.ratee).await {
            tracing::error!("Failed to cache rating stats for {}: {}", rating.ratee, e);
        }
        Ok(rating)
    }

    /// Stores a report for support staff. Reports never show up in ratings
    /// listings or statistics.
    pub async fn report(&self, reporter: Uuid, input: NewSupportReport) -> Result<Rating> {
        let report = Rating::report(reporter, input, Utc::now())?;
        let event = self.load_event(report.related_event).await?;
        if !event.is_participant(reporter) {
            return Err(RunmateError::unauthorized("you did not take part in this run"));
        }
        ensure_not_cancelled(&event)?;

        self.ratings.insert_rating(&report, &[]).await.map_err(duplicate)?;
        tracing::warn!(
            "Support report {} filed against {} ({:?})",
            report.id,
            report.ratee,
            report.report_to_support.reason
        );
        Ok(report)
    }

    /// Approved ratings received by the user, newest first.
    pub async fn user_ratings(&self, user: Uuid, page: Page) -> Result<Vec<Rating>> {
        Ok(self.ratings.approved_for(user, Some(page)).await?)
    }

    pub async fn user_stats(&self, user: Uuid) -> Result<RatingStats> {
        let ratings = self.ratings.approved_for(user, None).await?;
        Ok(RatingStats::from_ratings(&ratings))
    }

    /// Co-participants of the user's past, non-cancelled runs that the user
    /// has not rated yet, soonest run first.
    pub async fn pending(&self, user: Uuid) -> Result<Vec<PendingRating>> {
        let filter = RunEventFilter {
            participant: Some(user),
            before: Some(Utc::now()),
            ..Default::default()
        };
        let events = self.events.list_events(&filter, None).await?;
        let rated: HashSet<(Uuid, Uuid)> = self
            .ratings
            .given_by(user)
            .await?
            .into_iter()
            .map(|r| (r.related_event, r.ratee))
            .collect();

        let mut pending = Vec::new();
        for event in events.iter().filter(|e| e.status != RunEventStatus::Cancelled) {
            let others: Vec<Uuid> = event
                .participants
                .iter()
                .copied()
                .filter(|p| *p != user && !rated.contains(&(event.id, *p)))
                .collect();
            for summary in expand_users(self.users.as_ref(), &others).await? {
                pending.push(PendingRating {
                    run_event: PendingRunEvent {
                        id: event.id,
                        title: event.title.clone(),
                        date: event.date,
                    },
                    user: summary,
                });
            }
        }
        Ok(pending)
    }

    async fn load_event(&self, id: Uuid) -> Result<RunEvent> {
        self.events
            .get_event(id)
            .await?
            .ok_or_else(|| RunmateError::not_found("run event"))
    }

    async fn refresh_cached_stats(&self, user: Uuid) -> Result<RatingSummary> {
        let ratings = self.ratings.approved_for(user, None).await?;
        let summary = RatingSummary::from_ratings(&ratings);
        self.users.cache_rating_stats(user, &summary).await?;
        Ok(summary)
    }
}
