use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RunmateError;

pub const MAX_COMMENT_LENGTH: usize = 500;
pub const MAX_REPORT_DETAILS_LENGTH: usize = 1000;
pub const RECENT_RATINGS: usize = 5;

/// Positive traits a runner can be recognised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingCategories {
    pub punctual: bool,
    pub friendly: bool,
    pub motivating: bool,
    pub good_pace: bool,
    pub supportive: bool,
    pub communicative: bool,
    pub reliable: bool,
    pub fun: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub punctual: u32,
    pub friendly: u32,
    pub motivating: u32,
    pub good_pace: u32,
    pub supportive: u32,
    pub communicative: u32,
    pub reliable: u32,
    pub fun: u32,
}

impl CategoryStats {
    fn add(&mut self, c: &RatingCategories) {
        self.punctual += c.punctual as u32;
        self.friendly += c.friendly as u32;
        self.motivating += c.motivating as u32;
        self.good_pace += c.good_pace as u32;
        self.supportive += c.supportive as u32;
        self.communicative += c.communicative as u32;
        self.reliable += c.reliable as u32;
        self.fun += c.fun as u32;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Inappropriate,
    Harassment,
    Safety,
    NoShow,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Harassment => "harassment",
            ReportReason::Safety => "safety",
            ReportReason::NoShow => "no_show",
            ReportReason::Other => "other",
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportReason {
    type Err = RunmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inappropriate" => Ok(ReportReason::Inappropriate),
            "harassment" => Ok(ReportReason::Harassment),
            "safety" => Ok(ReportReason::Safety),
            "no_show" => Ok(ReportReason::NoShow),
            "other" => Ok(ReportReason::Other),
            other => Err(RunmateError::validation(format!("unknown report reason: {}", other))),
        }
    }
}

/// Support-only sub-record. Never serialised into public rating views.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportReport {
    pub has_report: bool,
    pub reason: Option<ReportReason>,
    pub details: Option<String>,
    pub is_handled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub rater: Uuid,
    pub ratee: Uuid,
    pub related_event: Uuid,
    pub categories: RatingCategories,
    pub comment: Option<String>,
    pub overall_rating: u8,
    pub is_approved: bool,
    #[serde(skip_serializing, default)]
    pub report_to_support: SupportReport,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRating {
    pub ratee: Uuid,
    pub related_event: Uuid,
    #[serde(default)]
    pub categories: RatingCategories,
    pub comment: Option<String>,
    pub overall_rating: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupportReport {
    pub ratee: Uuid,
    pub related_event: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub overall_rating: Option<u8>,
}

fn check_overall(value: u8) -> Result<(), RunmateError> {
    if !(1..=5).contains(&value) {
        return Err(RunmateError::validation("overallRating must be between 1 and 5"));
    }
    Ok(())
}

fn clean_text(text: Option<String>, max: usize, field: &str) -> Result<Option<String>, RunmateError> {
    let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    if let Some(t) = &text {
        if t.chars().count() > max {
            return Err(RunmateError::validation(format!("{} cannot exceed {} characters", field, max)));
        }
    }
    Ok(text)
}

impl Rating {
    pub fn create(rater: Uuid, input: NewRating, now: DateTime<Utc>) -> Result<Self, RunmateError> {
        if rater == input.ratee {
            return Err(RunmateError::validation("you cannot rate yourself"));
        }
        check_overall(input.overall_rating)?;
        let comment = clean_text(input.comment, MAX_COMMENT_LENGTH, "comment")?;

        Ok(Rating {
            id: Uuid::new_v4(),
            rater,
            ratee: input.ratee,
            related_event: input.related_event,
            categories: input.categories,
            comment,
            overall_rating: input.overall_rating,
            is_approved: true,
            report_to_support: SupportReport::default(),
            created_at: now,
        })
    }

    /// Reports are stored as unapproved ratings so they stay out of stats
    /// and listings. Without an explicit score they carry the lowest one.
    pub fn report(rater: Uuid, input: NewSupportReport, now: DateTime<Utc>) -> Result<Self, RunmateError> {
        if rater == input.ratee {
            return Err(RunmateError::validation("you cannot report yourself"));
        }
        let overall_rating = input.overall_rating.unwrap_or(1);
        check_overall(overall_rating)?;
        let details = clean_text(input.details, MAX_REPORT_DETAILS_LENGTH, "details")?;

        Ok(Rating {
            id: Uuid::new_v4(),
            rater,
            ratee: input.ratee,
            related_event: input.related_event,
            categories: RatingCategories::default(),
            comment: None,
            overall_rating,
            is_approved: false,
            report_to_support: SupportReport {
                has_report: true,
                reason: Some(input.reason),
                details,
                is_handled: false,
            },
            created_at: now,
        })
    }
}

/// Coarse standing derived from how many ratings a runner has and how good
/// they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub level: &'static str,
    pub badge: Option<&'static str>,
}

pub const NEW_RUNNER: &str = "Ny löpare";

pub fn tier_for(total: usize, average: f64) -> Tier {
    match (total, average) {
        (n, avg) if n >= 20 && avg >= 4.7 => Tier { level: "Legendarisk löpare", badge: Some("legend") },
        (n, avg) if n >= 5 && avg >= 4.5 => Tier { level: "Topplöpare", badge: Some("gold") },
        (n, avg) if n >= 3 && avg >= 4.0 => Tier { level: "Pålitlig löpare", badge: Some("silver") },
        (n, avg) if n >= 1 && avg >= 3.0 => Tier { level: "Aktiv löpare", badge: Some("bronze") },
        _ => Tier { level: NEW_RUNNER, badge: None },
    }
}

/// Aggregate snapshot cached on the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_ratings: usize,
    pub category_stats: CategoryStats,
    pub level: String,
    pub badge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    #[serde(flatten)]
    pub summary: RatingSummary,
    pub recent_ratings: Vec<Rating>,
}

impl RatingSummary {
    /// Only approved ratings count.
    pub fn from_ratings(ratings: &[Rating]) -> Self {
        let approved: Vec<&Rating> = ratings.iter().filter(|r| r.is_approved).collect();
        let total = approved.len();
        let mut category_stats = CategoryStats::default();
        let mut sum = 0u64;
        for r in &approved {
            sum += r.overall_rating as u64;
            category_stats.add(&r.categories);
        }

        let average_rating = if total == 0 {
            0.0
        } else {
            ((sum as f64 / total as f64) * 10.0).round() / 10.0
        };
        let tier = tier_for(total, average_rating);

        RatingSummary {
            average_rating,
            total_ratings: total,
            category_stats,
            level: tier.level.to_string(),
            badge: tier.badge.map(str::to_string),
        }
    }
}

impl RatingStats {
    pub fn from_ratings(ratings: &[Rating]) -> Self {
        let mut recent: Vec<Rating> = ratings.iter().filter(|r| r.is_approved).cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_RATINGS);

        RatingStats {
            summary: RatingSummary::from_ratings(ratings),
            recent_ratings: recent,
        }
    }
}
