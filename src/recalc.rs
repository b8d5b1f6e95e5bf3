use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::calendar::{self, WorkingCalendar};
use crate::config::ScoringSettings;
use crate::error::{ScoringError, SourceError, StoreError};
use crate::models::{PerformanceResult, Period, Scope, Teacher};
use crate::source::{PerformanceSource, ReplaceSummary, ResultStore};
use crate::{academic, attendance, score, survey, test_return};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Previewing,
    Previewed,
    Committing,
    Committed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Previewing => "previewing",
            RunState::Previewed => "previewed",
            RunState::Committing => "committing",
            RunState::Committed => "committed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle | Previewed | Committed | Failed | Cancelled, Previewing)
                | (Previewing, Previewed | Failed | Cancelled)
                | (Previewed, Committing | Cancelled)
                | (Committing, Committed | Failed | Previewed)
        )
    }
}

/// One preview/commit cycle for a scope. Results computed by the preview
/// are the exact set a later commit persists.
#[derive(Debug, Clone)]
pub struct RecalculationRun {
    scope: Scope,
    state: RunState,
    results: Vec<PerformanceResult>,
    summary: Option<ReplaceSummary>,
}

impl RecalculationRun {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            state: RunState::Idle,
            results: Vec::new(),
            summary: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn results(&self) -> &[PerformanceResult] {
        &self.results
    }

    pub fn summary(&self) -> Option<ReplaceSummary> {
        self.summary
    }

    fn transition_to(&mut self, next: RunState, action: &'static str) -> Result<(), ScoringError> {
        if !self.state.can_transition_to(next) {
            return Err(ScoringError::InvalidState {
                action,
                state: self.state.label(),
            });
        }
        debug!(scope = %self.scope, from = self.state.label(), to = next.label(), "run transition");
        self.state = next;
        Ok(())
    }
}

/// Held for the duration of a commit. Keyed by period so an all-campus
/// commit and a single-campus commit of the same month exclude each other.
struct CommitLock {
    in_flight: Arc<DashSet<Period>>,
    period: Period,
}

impl CommitLock {
    fn acquire(in_flight: &Arc<DashSet<Period>>, period: Period) -> Option<Self> {
        in_flight.insert(period).then(|| Self {
            in_flight: Arc::clone(in_flight),
            period,
        })
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        self.in_flight.remove(&self.period);
    }
}

pub struct RecalculationOrchestrator<S, R> {
    source: Arc<S>,
    store: Arc<R>,
    settings: ScoringSettings,
    commits_in_flight: Arc<DashSet<Period>>,
}

impl<S, R> RecalculationOrchestrator<S, R>
where
    S: PerformanceSource,
    R: ResultStore,
{
    pub fn new(source: Arc<S>, store: Arc<R>, settings: ScoringSettings) -> Self {
        Self {
            source,
            store,
            settings,
            commits_in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Computes results for every active teacher in scope without persisting
    /// anything. May be repeated; each call replaces the run's results.
    pub async fn preview(
        &self,
        run: &mut RecalculationRun,
        cancel: &CancellationToken,
    ) -> Result<(), ScoringError> {
        run.transition_to(RunState::Previewing, "preview")?;
        run.results.clear();
        run.summary = None;

        info!(scope = %run.scope, "preview started");
        match self.compute(&run.scope, cancel).await {
            Ok(results) => {
                info!(scope = %run.scope, teachers = results.len(), "preview finished");
                run.results = results;
                run.transition_to(RunState::Previewed, "preview")
            }
            Err(ScoringError::Cancelled) => {
                warn!(scope = %run.scope, "preview cancelled");
                run.transition_to(RunState::Cancelled, "preview")?;
                Err(ScoringError::Cancelled)
            }
            Err(err) => {
                error!(scope = %run.scope, error = %err, "preview failed");
                run.transition_to(RunState::Failed, "preview")?;
                Err(err)
            }
        }
    }

    /// Atomically replaces the scope's stored results with the previewed set.
    /// Cancellation is honoured only before the replacement starts.
    pub async fn commit(
        &self,
        run: &mut RecalculationRun,
        cancel: &CancellationToken,
    ) -> Result<ReplaceSummary, ScoringError> {
        if run.state != RunState::Previewed {
            return Err(ScoringError::InvalidState {
                action: "commit",
                state: run.state.label(),
            });
        }

        let scope = run.scope;
        if let Some(stray) = run
            .results
            .iter()
            .find(|result| !scope.includes(result.campus_id, result.month, result.year))
        {
            return Err(ScoringError::InvalidScope(format!(
                "result for teacher {} ({}-{:02}) lies outside {}",
                stray.teacher_id, stray.year, stray.month, scope
            )));
        }

        if cancel.is_cancelled() {
            warn!(scope = %scope, "commit cancelled before start");
            run.transition_to(RunState::Cancelled, "commit")?;
            return Err(ScoringError::Cancelled);
        }

        let _lock = match CommitLock::acquire(&self.commits_in_flight, scope.period) {
            Some(lock) => lock,
            None => {
                warn!(scope = %scope, "commit already in progress for period");
                return Err(ScoringError::Conflict { scope });
            }
        };

        run.transition_to(RunState::Committing, "commit")?;
        match self.store.replace_scope(&scope, &run.results).await {
            Ok(summary) => {
                info!(
                    scope = %scope,
                    deleted = summary.deleted,
                    inserted = summary.inserted,
                    "scope replaced"
                );
                run.summary = Some(summary);
                run.transition_to(RunState::Committed, "commit")?;
                Ok(summary)
            }
            Err(StoreError::Conflict) => {
                warn!(scope = %scope, "store rejected commit: scope locked");
                run.transition_to(RunState::Previewed, "commit")?;
                Err(ScoringError::Conflict { scope })
            }
            Err(source) => {
                error!(scope = %scope, error = %source, "commit failed; scope rolled back");
                run.transition_to(RunState::Failed, "commit")?;
                Err(ScoringError::Store { scope, source })
            }
        }
    }

    pub async fn recalculate(
        &self,
        scope: Scope,
        cancel: &CancellationToken,
    ) -> Result<RecalculationRun, ScoringError> {
        let mut run = RecalculationRun::new(scope);
        self.preview(&mut run, cancel).await?;
        self.commit(&mut run, cancel).await?;
        Ok(run)
    }

    async fn compute(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<Vec<PerformanceResult>, ScoringError> {
        let period = scope.period;
        let mut teachers = self.source.active_teachers(scope.campus_id).await?;
        if let Some(campus_id) = scope.campus_id {
            teachers.retain(|teacher| teacher.campus_id == campus_id);
        }
        teachers.sort_by_key(|teacher| teacher.id);
        teachers.dedup_by_key(|teacher| teacher.id);

        let mut calendars: HashMap<Uuid, WorkingCalendar> = HashMap::new();
        for teacher in &teachers {
            if calendars.contains_key(&teacher.campus_id) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(ScoringError::Cancelled);
            }
            let holidays = self
                .source
                .holiday_ranges(teacher.campus_id, period.start, period.end)
                .await?;
            let calendar = calendar::resolve(teacher.campus_id, period, &holidays);
            debug!(
                campus_id = %teacher.campus_id,
                working_days = calendar.working_days(),
                "working calendar resolved"
            );
            calendars.insert(teacher.campus_id, calendar);
        }

        let jobs: Vec<(&Teacher, &WorkingCalendar)> = teachers
            .iter()
            .filter_map(|teacher| calendars.get(&teacher.campus_id).map(|cal| (teacher, cal)))
            .collect();

        // `buffered` keeps teacher order, so the first error reported is
        // always the same teacher's for the same data.
        stream::iter(jobs)
            .map(|(teacher, calendar)| self.score_teacher(teacher, calendar, cancel))
            .buffered(self.settings.max_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn score_teacher(
        &self,
        teacher: &Teacher,
        calendar: &WorkingCalendar,
        cancel: &CancellationToken,
    ) -> Result<PerformanceResult, ScoringError> {
        if cancel.is_cancelled() {
            return Err(ScoringError::Cancelled);
        }

        let period = calendar.period;
        let for_teacher = |source: SourceError| ScoringError::TeacherSource {
            teacher_id: teacher.id,
            source,
        };

        let (entries, assignments, answers, returns) = tokio::try_join!(
            self.source.attendance_entries(teacher.id, period.start, period.end),
            self.source.active_assignments(teacher.id),
            self.source.survey_answers(teacher.id, period.start, period.end),
            self.source.test_returns(teacher.id, period.start, period.end),
        )
        .map_err(for_teacher)?;

        let marks = try_join_all(academic::active_triples(&assignments).into_iter().map(
            |(subject_id, class_id, section_id)| {
                self.source
                    .exam_marks(subject_id, class_id, section_id, period.start, period.end)
            },
        ))
        .await
        .map_err(for_teacher)?
        .concat();

        let attendance = attendance::calculate(
            calendar,
            &entries,
            teacher.shift_start,
            attendance::tolerance_for(teacher, self.settings.late_tolerance_minutes),
        );
        let academic = academic::calculate(&assignments, &marks, &period);
        let survey = survey::calculate(&assignments, &answers, &period);
        let test_return =
            test_return::calculate(&returns, &period, self.settings.return_flexibility_days);

        let result = score::aggregate(teacher, &period, &attendance, &academic, &survey, &test_return);
        debug!(
            teacher_id = %teacher.id,
            total_score = result.total_score,
            working_days = result.working_days,
            fallbacks = result.fallbacks.len(),
            "teacher scored"
        );
        Ok(result)
    }
}
