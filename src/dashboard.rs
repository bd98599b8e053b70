//! Role dashboards and attendance views.
//!
//! Every read path here follows the same rules: a failed backend query is
//! logged and replaced by an empty value, and results are only handed back
//! while the caller's [`RequestToken`] is still live.

use std::future::Future;

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::MAX_WINDOW_DAYS;
use crate::error::RequestError;
use crate::models::{
    AttendanceRecord, AttendanceStats, LeaderboardEntry, PendingSetoran, SetoranItem, SetoranStats,
    StudentAttendance, TodayRollup, UserProfile,
};
use crate::scope::{resolve_scope, Scope, Session};
use crate::stats;
use crate::store::RecordStore;

const RECENT_ACTIVITY: usize = 3;

/// Cancellable handle for one in-flight view fetch.
#[derive(Debug, Clone, Default)]
pub struct RequestToken(CancellationToken);

impl RequestToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Hands `value` back only if the request is still live.
    pub fn apply<T>(&self, value: T) -> Option<T> {
        if self.is_cancelled() {
            tracing::debug!("request cancelled, dropping result");
            None
        } else {
            Some(value)
        }
    }

    /// Runs `fetch` until it completes or the token is cancelled.
    pub async fn run<T>(&self, fetch: impl Future<Output = T>) -> Result<T, RequestError> {
        tokio::select! {
            _ = self.0.cancelled() => {
                tracing::debug!("request cancelled while in flight");
                Err(RequestError::Interrupted)
            }
            value = fetch => self.apply(value).ok_or(RequestError::Interrupted),
        }
    }

    /// Drives a whole command. When `signal` fires first the token is
    /// cancelled, `work` is dropped mid-flight and the command fails.
    pub async fn until<T>(
        &self,
        work: impl Future<Output = anyhow::Result<T>>,
        signal: impl Future<Output = ()>,
    ) -> anyhow::Result<T> {
        tokio::select! {
            result = work => result,
            () = signal => {
                self.cancel();
                Err(RequestError::Interrupted.into())
            }
        }
    }
}

/// First day of a look-back window ending at `today`. The window is clamped
/// to `1..=MAX_WINDOW_DAYS`.
pub fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(days.clamp(1, MAX_WINDOW_DAYS)))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    pub today: NaiveDate,
    pub history_limit: i64,
    pub parent_window_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Dashboard {
    Student(StudentDashboard),
    Teacher(TeacherDashboard),
    Parent(ParentDashboard),
    Admin(AdminDashboard),
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub setoran: SetoranStats,
    pub total_poin: i64,
    pub label_count: i64,
    pub recent: Vec<SetoranItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherDashboard {
    pub pending_setoran: i64,
    pub total_siswa: i64,
    pub recent_pending: Vec<PendingSetoran>,
    pub today: TodayRollup,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParentDashboard {
    pub child_id: Uuid,
    pub setoran: SetoranStats,
    pub total_poin: i64,
    pub recent: Vec<SetoranItem>,
    pub attendance: AttendanceStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_users: i64,
    pub total_organizes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum AttendanceView {
    Individual {
        student_id: Uuid,
        records: Vec<AttendanceRecord>,
        stats: AttendanceStats,
    },
    Roster {
        since: NaiveDate,
        students: Vec<StudentAttendance>,
    },
    Pending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum SetoranView {
    Individual {
        student_id: Uuid,
        items: Vec<SetoranItem>,
        stats: SetoranStats,
    },
    Pending,
}

fn or_empty<T: Default>(result: anyhow::Result<T>, what: &'static str) -> T {
    result.unwrap_or_else(|error| {
        tracing::error!(error = %error, query = what, "backend query failed");
        T::default()
    })
}

pub async fn fetch_dashboard<S: RecordStore>(
    store: &S,
    session: &Session,
    options: ViewOptions,
    token: &RequestToken,
) -> Result<Dashboard, RequestError> {
    token.run(build_dashboard(store, session, options)).await
}

async fn build_dashboard<S: RecordStore>(
    store: &S,
    session: &Session,
    options: ViewOptions,
) -> Dashboard {
    let scope = resolve_scope(store, session).await;

    match (session, scope) {
        (_, Scope::Pending) => Dashboard::Pending,
        (Session::Student { .. }, Scope::Student(id)) => {
            let items = or_empty(store.setoran_for_student(id).await, "setoran");
            let total_poin = or_empty(store.total_poin(id).await, "siswa_poin").unwrap_or(0);
            let label_count = or_empty(store.label_count(id).await, "labels");
            Dashboard::Student(StudentDashboard {
                setoran: stats::setoran_stats(&items),
                total_poin,
                label_count,
                recent: items.into_iter().take(RECENT_ACTIVITY).collect(),
            })
        }
        (Session::Parent { .. }, Scope::Student(child_id)) => {
            let items = or_empty(store.setoran_for_student(child_id).await, "setoran");
            let total_poin =
                or_empty(store.total_poin(child_id).await, "siswa_poin").unwrap_or(0);
            let since = window_start(options.today, options.parent_window_days);
            let attendance =
                or_empty(store.attendance_since(child_id, since).await, "attendance");
            Dashboard::Parent(ParentDashboard {
                child_id,
                setoran: stats::setoran_stats(&items),
                total_poin,
                recent: items.into_iter().take(RECENT_ACTIVITY).collect(),
                attendance: stats::attendance_stats(&attendance),
            })
        }
        (Session::Teacher { .. }, Scope::Organization(organize_id)) => {
            let pending_setoran =
                or_empty(store.count_pending_setoran(organize_id).await, "setoran");
            let total_siswa =
                or_empty(store.count_students_in_organize(organize_id).await, "users");
            let recent_pending = or_empty(
                store
                    .recent_pending_setoran(organize_id, RECENT_ACTIVITY as i64)
                    .await,
                "setoran",
            );
            let today = today_attendance(store, organize_id, options.today).await;
            Dashboard::Teacher(TeacherDashboard {
                pending_setoran,
                total_siswa,
                recent_pending,
                today,
            })
        }
        (Session::Admin { .. }, _) => Dashboard::Admin(AdminDashboard {
            total_users: or_empty(store.count_users().await, "users"),
            total_organizes: or_empty(store.count_organizes().await, "organizes"),
        }),
        (session, scope) => {
            tracing::warn!(role = %session.role(), ?scope, "no dashboard for scope");
            Dashboard::Pending
        }
    }
}

/// Today's rollup for a class, one attendance query per student.
pub async fn today_attendance<S: RecordStore>(
    store: &S,
    organize_id: Uuid,
    today: NaiveDate,
) -> TodayRollup {
    let students = or_empty(store.students_in_organize(organize_id, None).await, "users");
    let lookups = students.iter().map(|student| async move {
        match store.attendance_on(student.id, today).await {
            Ok(record) => record.map(|record| record.status),
            Err(error) => {
                tracing::error!(error = %error, student_id = %student.id, "attendance lookup failed");
                None
            }
        }
    });
    let statuses = join_all(lookups).await;
    stats::today_rollup(&statuses)
}

/// Per-student attendance stats for a class since `since`, one query per
/// student.
pub async fn class_roster<S: RecordStore>(
    store: &S,
    students: &[UserProfile],
    since: NaiveDate,
) -> Vec<StudentAttendance> {
    let lookups = students.iter().map(|student| async move {
        let records = or_empty(store.attendance_since(student.id, since).await, "attendance");
        StudentAttendance {
            student_id: student.id,
            student_name: student.name.clone(),
            stats: stats::attendance_stats(&records),
        }
    });
    let mut roster = join_all(lookups).await;
    roster.sort_by(|a, b| a.student_name.cmp(&b.student_name));
    roster
}

pub async fn fetch_attendance_view<S: RecordStore>(
    store: &S,
    scope: Scope,
    options: ViewOptions,
    token: &RequestToken,
) -> Result<AttendanceView, RequestError> {
    token
        .run(async {
            match scope {
                Scope::Pending => AttendanceView::Pending,
                Scope::Student(student_id) => {
                    let records = or_empty(
                        store
                            .attendance_history(student_id, options.history_limit)
                            .await,
                        "attendance",
                    );
                    let stats = stats::attendance_stats(&records);
                    AttendanceView::Individual {
                        student_id,
                        records,
                        stats,
                    }
                }
                Scope::Organization(organize_id) => {
                    let since = window_start(options.today, options.parent_window_days);
                    let students = or_empty(
                        store.students_in_organize(organize_id, None).await,
                        "users",
                    );
                    AttendanceView::Roster {
                        since,
                        students: class_roster(store, &students, since).await,
                    }
                }
                Scope::SystemWide => {
                    tracing::warn!("system-wide attendance needs an organization filter");
                    AttendanceView::Pending
                }
            }
        })
        .await
}

pub async fn fetch_setoran_view<S: RecordStore>(
    store: &S,
    scope: Scope,
    token: &RequestToken,
) -> Result<SetoranView, RequestError> {
    token
        .run(async {
            match scope {
                Scope::Student(student_id) => {
                    let items = or_empty(store.setoran_for_student(student_id).await, "setoran");
                    SetoranView::Individual {
                        student_id,
                        stats: stats::setoran_stats(&items),
                        items,
                    }
                }
                _ => SetoranView::Pending,
            }
        })
        .await
}

/// Points ranking for the caller's class, or every class for an admin.
pub async fn fetch_leaderboard<S: RecordStore>(
    store: &S,
    session: &Session,
    organize_filter: Option<Uuid>,
    limit: i64,
) -> Vec<LeaderboardEntry> {
    let organize_id = match session {
        Session::Admin { .. } => organize_filter,
        other => match other.organize_id() {
            Some(id) => Some(id),
            None => return Vec::new(),
        },
    };
    let rows = or_empty(store.leaderboard(organize_id, limit).await, "siswa_poin");
    stats::rank_leaderboard(rows)
}
