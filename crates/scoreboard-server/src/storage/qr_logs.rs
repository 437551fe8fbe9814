//! QR scan audit trail

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::Utc;
use scoreboard_core::{QrScanLog, ScanResult};

/// A scan to record
#[derive(Debug, Clone)]
pub struct NewScanLog<'a> {
    pub scanned_user_id: &'a str,
    pub scanner_user_id: &'a str,
    pub organization_id: &'a str,
    pub qr_token: &'a str,
    pub scan_result: ScanResult,
    pub score_assigned: Option<i64>,
    pub score_type: Option<&'a str>,
    pub scan_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl Database {
    pub async fn insert_scan_log(&self, log: NewScanLog<'_>) -> Result<QrScanLog> {
        let id = new_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO qr_scan_logs
                (id, scanned_user_id, scanner_user_id, organization_id, qr_token, scan_result,
                 score_assigned, score_type, scan_ip, user_agent, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&id)
        .bind(log.scanned_user_id)
        .bind(log.scanner_user_id)
        .bind(log.organization_id)
        .bind(log.qr_token)
        .bind(log.scan_result.as_str())
        .bind(log.score_assigned)
        .bind(log.score_type)
        .bind(log.scan_ip)
        .bind(log.user_agent)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(QrScanLog {
            id,
            scanned_user_id: log.scanned_user_id.to_string(),
            scanner_user_id: log.scanner_user_id.to_string(),
            organization_id: log.organization_id.to_string(),
            scan_result: log.scan_result,
            score_assigned: log.score_assigned,
            score_type: log.score_type.map(str::to_string),
            scan_ip: log.scan_ip.map(str::to_string),
            user_agent: log.user_agent.map(str::to_string),
            created_at: now,
        })
    }

    pub async fn count_scan_logs(&self, organization_id: &str, result: ScanResult) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM qr_scan_logs WHERE organization_id = ?1 AND scan_result = ?2",
        )
        .bind(organization_id)
        .bind(result.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewUser;

    #[tokio::test]
    async fn scan_is_recorded() {
        let db = Database::in_memory().await.unwrap();
        let admin = db
            .create_user(NewUser {
                username: "admin",
                email: "admin@example.com",
                password_hash: "hash",
                first_name: "Ada",
                last_name: "Admin",
            })
            .await
            .unwrap();
        let org = db.create_organization("Acme", None, &admin.id).await.unwrap();

        let log = db
            .insert_scan_log(NewScanLog {
                scanned_user_id: &admin.id,
                scanner_user_id: &admin.id,
                organization_id: &org.id,
                qr_token: "token",
                scan_result: ScanResult::ScoreAssigned,
                score_assigned: Some(5),
                score_type: Some("user"),
                scan_ip: Some("127.0.0.1"),
                user_agent: None,
            })
            .await
            .unwrap();

        assert_eq!(log.score_assigned, Some(5));
        assert_eq!(
            db.count_scan_logs(&org.id, ScanResult::ScoreAssigned).await.unwrap(),
            1
        );
        assert_eq!(db.count_scan_logs(&org.id, ScanResult::Success).await.unwrap(), 0);
    }
}
