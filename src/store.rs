use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AttendanceExportRow, AttendanceRecord, AttendanceStatus, LeaderboardRow, PendingSetoran, Role,
    SetoranItem, UserProfile,
};
use crate::scope::Scope;
use crate::submission::{AttendanceMark, NewSetoran, Review};

/// Read side of the backend. Every query is keyed by an explicit id taken
/// from the caller's session or resolved scope.
pub trait RecordStore {
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>>;

    async fn students_in_organize(
        &self,
        organize_id: Uuid,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<UserProfile>>;

    async fn count_students_in_organize(&self, organize_id: Uuid) -> anyhow::Result<i64>;

    /// Most recent records first.
    async fn attendance_history(
        &self,
        student_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<AttendanceRecord>>;

    async fn attendance_since(
        &self,
        student_id: Uuid,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceRecord>>;

    async fn attendance_on(
        &self,
        student_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>>;

    /// Most recent submissions first.
    async fn setoran_for_student(&self, siswa_id: Uuid) -> anyhow::Result<Vec<SetoranItem>>;

    async fn count_pending_setoran(&self, organize_id: Uuid) -> anyhow::Result<i64>;

    async fn recent_pending_setoran(
        &self,
        organize_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PendingSetoran>>;

    async fn total_poin(&self, siswa_id: Uuid) -> anyhow::Result<Option<i64>>;

    async fn label_count(&self, siswa_id: Uuid) -> anyhow::Result<i64>;

    async fn count_users(&self) -> anyhow::Result<i64>;

    async fn count_organizes(&self) -> anyhow::Result<i64>;

    async fn organize_name(&self, organize_id: Uuid) -> anyhow::Result<Option<String>>;

    /// Attendance joined with student names, ordered by date then name.
    /// Callers never pass `Scope::Pending`.
    async fn attendance_export_rows(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceExportRow>>;

    async fn leaderboard(
        &self,
        organize_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<LeaderboardRow>>;
}

/// Write side of the backend. Each method is a single unit of work.
pub trait RecordWriter: RecordStore {
    /// Stores a setoran as pending and records the student as `hadir` for its
    /// date unless a record for that day already exists.
    async fn insert_setoran(&self, setoran: &NewSetoran) -> anyhow::Result<Uuid>;

    /// Applies a verdict to a pending setoran of the reviewer's class and adds
    /// positive points to the student's total. Refuses with
    /// [`WriteError`](crate::error::WriteError) when the setoran is not in the
    /// class or was already reviewed.
    async fn review_setoran(&self, review: &Review) -> anyhow::Result<SetoranItem>;

    /// Inserts or overwrites the record for `(student, date)`.
    async fn upsert_attendance(&self, mark: &AttendanceMark) -> anyhow::Result<()>;

    /// Inserts a record unless `(student, date)` already has one. Returns
    /// whether a row was written.
    async fn insert_attendance_if_absent(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        status: &AttendanceStatus,
        noted_by: Option<Uuid>,
    ) -> anyhow::Result<bool>;

    async fn user_id_by_email(&self, email: &str, role: Option<Role>)
        -> anyhow::Result<Option<Uuid>>;
}
