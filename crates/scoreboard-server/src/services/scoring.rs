//! Score assignment shared by the scoring service and QR scans

use crate::error::{ApiError, ApiResult};
use crate::services::LeaderboardService;
use crate::storage::{Database, NewScore};
use scoreboard_core::{AssignedVia, Score, ScoreAggregate, ScoreTarget, DEFAULT_CATEGORY};
use std::sync::Arc;
use tracing::info;

/// A score assignment request after parsing
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: ScoreTarget,
    pub score_value: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub assigned_via: AssignedVia,
}

pub struct ScoringService {
    db: Arc<Database>,
    leaderboards: Arc<LeaderboardService>,
}

impl ScoringService {
    pub fn new(db: Arc<Database>, leaderboards: Arc<LeaderboardService>) -> Self {
        Self { db, leaderboards }
    }

    /// Records a score for a user or group of the organization
    pub async fn assign(
        &self,
        organization_id: &str,
        assigned_by: &str,
        assignment: Assignment,
    ) -> ApiResult<(Score, Option<ScoreAggregate>)> {
        self.ensure_target(organization_id, &assignment.target).await?;

        let category = assignment
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);
        let description = assignment
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let (score, aggregate) = self
            .db
            .insert_score(NewScore {
                target: &assignment.target,
                score_value: assignment.score_value,
                category,
                description,
                organization_id,
                assigned_by,
                assigned_via: assignment.assigned_via,
            })
            .await?;

        self.leaderboards.invalidate(organization_id);
        info!(
            "Assigned {} points to {} {} in {} ({})",
            score.score_value,
            assignment.target.kind(),
            assignment.target.id(),
            category,
            assignment.assigned_via.as_str()
        );
        Ok((score, aggregate))
    }

    pub async fn update(
        &self,
        organization_id: &str,
        score_id: &str,
        score_value: Option<i64>,
        description: Option<&str>,
    ) -> ApiResult<(Score, Option<ScoreAggregate>)> {
        let updated = self
            .db
            .update_score(organization_id, score_id, score_value, description)
            .await?
            .ok_or_else(|| ApiError::not_found("Score not found"))?;
        self.leaderboards.invalidate(organization_id);
        Ok(updated)
    }

    pub async fn delete(&self, organization_id: &str, score_id: &str) -> ApiResult<Score> {
        let deleted = self
            .db
            .delete_score(organization_id, score_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Score not found"))?;
        self.leaderboards.invalidate(organization_id);
        info!("Deleted score {} from {}", score_id, organization_id);
        Ok(deleted)
    }

    /// The target must be an active member or an active group of the organization
    async fn ensure_target(&self, organization_id: &str, target: &ScoreTarget) -> ApiResult<()> {
        match target {
            ScoreTarget::User(user_id) => {
                if self.db.active_membership(user_id, organization_id).await?.is_none() {
                    return Err(ApiError::not_found("User not found in organization"));
                }
            }
            ScoreTarget::Group(group_id) => {
                if self.db.get_group(organization_id, group_id).await?.is_none() {
                    return Err(ApiError::not_found("Group not found in organization"));
                }
            }
        }
        Ok(())
    }
}
