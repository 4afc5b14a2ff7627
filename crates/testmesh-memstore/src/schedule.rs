use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use testmesh_domain::{Schedule, ScheduleId, ScheduleRepository, ScheduleRun, ScheduleRunId};
use testmesh_foundation::Result;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: RwLock<HashMap<ScheduleId, Schedule>>,
    runs: RwLock<HashMap<ScheduleRunId, ScheduleRun>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn put(&self, schedule: Schedule) -> Result<()> {
        self.schedules.write().await.insert(schedule.id, schedule);
        Ok(())
    }

    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        Ok(self.schedules.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Schedule>> {
        Ok(self.schedules.read().await.values().cloned().collect())
    }

    async fn list_due(&self, as_of: DateTime<Utc>) -> Result<Vec<Schedule>> {
        Ok(self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.next_run_at.is_some_and(|t| t <= as_of))
            .cloned()
            .collect())
    }

    async fn put_run(&self, run: ScheduleRun) -> Result<()> {
        self.runs.write().await.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, id: ScheduleRunId) -> Result<Option<ScheduleRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_runs_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<ScheduleRun>> {
        let mut runs: Vec<ScheduleRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.schedule_id == schedule_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.scheduled_for);
        Ok(runs)
    }

    async fn latest_run(&self, schedule_id: ScheduleId) -> Result<Option<ScheduleRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.schedule_id == schedule_id)
            .max_by_key(|r| r.scheduled_for)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_domain::{FlowId, OverlapPolicy, ScheduleRunResult, ScheduleStatus};

    fn sample_schedule(next_run_at: Option<DateTime<Utc>>) -> Schedule {
        Schedule {
            id: ScheduleId::new(),
            name: "nightly".to_string(),
            flow_id: FlowId::new(),
            cron_expr: "@daily".to_string(),
            timezone: "UTC".to_string(),
            status: ScheduleStatus::Active,
            overlap_policy: OverlapPolicy::Skip,
            next_run_at,
            last_run_at: None,
            last_run_result: None,
            max_retries: 2,
            retry_delay_ms: 1000,
            notify_on_success: false,
            notify_on_failure: true,
        }
    }

    #[tokio::test]
    async fn list_due_returns_only_schedules_at_or_before_cutoff() {
        let repo = InMemoryScheduleRepository::new();
        let now = Utc::now();
        let due = sample_schedule(Some(now - chrono::Duration::seconds(1)));
        let not_due = sample_schedule(Some(now + chrono::Duration::seconds(60)));
        repo.put(due.clone()).await.unwrap();
        repo.put(not_due).await.unwrap();
        let result = repo.list_due(now).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, due.id);
    }

    #[tokio::test]
    async fn latest_run_picks_most_recently_scheduled() {
        let repo = InMemoryScheduleRepository::new();
        let schedule_id = ScheduleId::new();
        let now = Utc::now();
        for offset in [0, 2, 1] {
            repo.put_run(ScheduleRun {
                id: ScheduleRunId::new(),
                schedule_id,
                execution_id: None,
                scheduled_for: now + chrono::Duration::seconds(offset),
                started_at: None,
                finished_at: None,
                result: ScheduleRunResult::Succeeded,
                retry_count: 0,
            })
            .await
            .unwrap();
        }
        let latest = repo.latest_run(schedule_id).await.unwrap().unwrap();
        assert_eq!(latest.scheduled_for, now + chrono::Duration::seconds(2));
    }
}
