use anyhow::{bail, Context};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::WriteError;
use crate::models::{
    AttendanceExportRow, AttendanceRecord, AttendanceStatus, LeaderboardRow, PendingSetoran, Role,
    SetoranItem, SetoranStatus, UserProfile,
};
use crate::scope::Scope;
use crate::store::{RecordStore, RecordWriter};
use crate::submission::{AttendanceMark, NewSetoran, Review};

const SETORAN_COLUMNS: &str = "s.id, s.siswa_id, s.organize_id, s.jenis, s.surah, s.juz, \
     s.ayat_mulai, s.ayat_selesai, s.status, s.catatan, s.poin, s.file_url, s.tanggal, s.created_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        organize_id: row.get("organize_id"),
    }
}

fn attendance_from_row(row: &PgRow) -> AttendanceRecord {
    AttendanceRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        date: row.get("date"),
        status: AttendanceStatus::from(row.get::<String, _>("status")),
        noted_by: row.get("noted_by"),
        created_at: row.get("created_at"),
    }
}

fn setoran_from_row(row: &PgRow) -> SetoranItem {
    SetoranItem {
        id: row.get("id"),
        siswa_id: row.get("siswa_id"),
        organize_id: row.get("organize_id"),
        jenis: row.get::<String, _>("jenis").into(),
        surah: row.get("surah"),
        juz: row.get("juz"),
        ayat_mulai: row.get("ayat_mulai"),
        ayat_selesai: row.get("ayat_selesai"),
        status: row.get::<String, _>("status").into(),
        catatan: row.get("catatan"),
        poin: row.get("poin"),
        file_url: row.get("file_url"),
        tanggal: row.get("tanggal"),
        created_at: row.get("created_at"),
    }
}

impl RecordStore for PgPool {
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, name, email, role, organize_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn students_in_organize(
        &self,
        organize_id: Uuid,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<UserProfile>> {
        let rows = sqlx::query(
            "SELECT id, name, email, role, organize_id FROM users \
             WHERE organize_id = $1 AND role = 'siswa' \
             ORDER BY created_at, id \
             LIMIT $2",
        )
        .bind(organize_id)
        .bind(limit)
        .fetch_all(self)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn count_students_in_organize(&self, organize_id: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE organize_id = $1 AND role = 'siswa'",
        )
        .bind(organize_id)
        .fetch_one(self)
        .await?;
        Ok(count)
    }

    async fn attendance_history(
        &self,
        student_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, date, status, noted_by, created_at FROM attendance \
             WHERE student_id = $1 ORDER BY date DESC LIMIT $2",
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(self)
        .await?;
        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn attendance_since(
        &self,
        student_id: Uuid,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, date, status, noted_by, created_at FROM attendance \
             WHERE student_id = $1 AND date >= $2 ORDER BY date DESC",
        )
        .bind(student_id)
        .bind(since)
        .fetch_all(self)
        .await?;
        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn attendance_on(
        &self,
        student_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>> {
        let row = sqlx::query(
            "SELECT id, student_id, date, status, noted_by, created_at FROM attendance \
             WHERE student_id = $1 AND date = $2",
        )
        .bind(student_id)
        .bind(date)
        .fetch_optional(self)
        .await?;
        Ok(row.as_ref().map(attendance_from_row))
    }

    async fn setoran_for_student(&self, siswa_id: Uuid) -> anyhow::Result<Vec<SetoranItem>> {
        let query = format!(
            "SELECT {SETORAN_COLUMNS} FROM setoran s WHERE s.siswa_id = $1 ORDER BY s.created_at DESC"
        );
        let rows = sqlx::query(&query).bind(siswa_id).fetch_all(self).await?;
        Ok(rows.iter().map(setoran_from_row).collect())
    }

    async fn count_pending_setoran(&self, organize_id: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM setoran WHERE organize_id = $1 AND status = 'pending'",
        )
        .bind(organize_id)
        .fetch_one(self)
        .await?;
        Ok(count)
    }

    async fn recent_pending_setoran(
        &self,
        organize_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PendingSetoran>> {
        let query = format!(
            "SELECT {SETORAN_COLUMNS}, u.name AS siswa_name \
             FROM setoran s JOIN users u ON u.id = s.siswa_id \
             WHERE s.organize_id = $1 AND s.status = 'pending' \
             ORDER BY s.created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(organize_id)
            .bind(limit)
            .fetch_all(self)
            .await?;
        Ok(rows
            .iter()
            .map(|row| PendingSetoran {
                item: setoran_from_row(row),
                siswa_name: row.get("siswa_name"),
            })
            .collect())
    }

    async fn total_poin(&self, siswa_id: Uuid) -> anyhow::Result<Option<i64>> {
        let total = sqlx::query_scalar("SELECT total_poin FROM siswa_poin WHERE siswa_id = $1")
            .bind(siswa_id)
            .fetch_optional(self)
            .await?;
        Ok(total)
    }

    async fn label_count(&self, siswa_id: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labels WHERE siswa_id = $1")
            .bind(siswa_id)
            .fetch_one(self)
            .await?;
        Ok(count)
    }

    async fn count_users(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self)
            .await?;
        Ok(count)
    }

    async fn count_organizes(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizes")
            .fetch_one(self)
            .await?;
        Ok(count)
    }

    async fn organize_name(&self, organize_id: Uuid) -> anyhow::Result<Option<String>> {
        let name = sqlx::query_scalar("SELECT name FROM organizes WHERE id = $1")
            .bind(organize_id)
            .fetch_optional(self)
            .await?;
        Ok(name)
    }

    async fn attendance_export_rows(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceExportRow>> {
        let mut query = String::from(
            "SELECT a.date, u.name, a.status \
             FROM attendance a \
             JOIN users u ON u.id = a.student_id \
             WHERE a.date >= $1 AND a.date <= $2",
        );

        let filter = match scope {
            Scope::Student(id) => {
                query.push_str(" AND a.student_id = $3");
                Some(*id)
            }
            Scope::Organization(id) => {
                query.push_str(" AND u.organize_id = $3");
                Some(*id)
            }
            Scope::SystemWide => None,
            Scope::Pending => bail!("attendance export needs a resolved scope"),
        };
        query.push_str(" ORDER BY a.date, u.name");

        let mut rows = sqlx::query(&query).bind(start).bind(end);
        if let Some(id) = filter {
            rows = rows.bind(id);
        }

        let records = rows.fetch_all(self).await?;
        let mut export = Vec::with_capacity(records.len());

        for row in records {
            export.push(AttendanceExportRow {
                date: row.get("date"),
                student_name: row.get("name"),
                status: AttendanceStatus::from(row.get::<String, _>("status")),
            });
        }

        Ok(export)
    }

    async fn leaderboard(
        &self,
        organize_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<LeaderboardRow>> {
        let rows = sqlx::query(
            "SELECT p.siswa_id, u.name, p.total_poin \
             FROM siswa_poin p JOIN users u ON u.id = p.siswa_id \
             WHERE ($1::uuid IS NULL OR u.organize_id = $1) \
             ORDER BY p.total_poin DESC, u.name \
             LIMIT $2",
        )
        .bind(organize_id)
        .bind(limit)
        .fetch_all(self)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LeaderboardRow {
                siswa_id: row.get("siswa_id"),
                name: row.get("name"),
                total_poin: row.get("total_poin"),
            })
            .collect())
    }
}

impl RecordWriter for PgPool {
    async fn insert_setoran(&self, setoran: &NewSetoran) -> anyhow::Result<Uuid> {
        let mut tx = self.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO setoran
            (id, siswa_id, organize_id, jenis, surah, juz, ayat_mulai, ayat_selesai, file_url, tanggal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(setoran.siswa_id)
        .bind(setoran.organize_id)
        .bind(setoran.jenis.as_str())
        .bind(&setoran.surah)
        .bind(setoran.juz)
        .bind(setoran.ayat_mulai)
        .bind(setoran.ayat_selesai)
        .bind(&setoran.file_url)
        .bind(setoran.tanggal)
        .execute(&mut *tx)
        .await
        .context("failed to store setoran")?;

        sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, date, status)
            VALUES ($1, $2, $3, 'hadir')
            ON CONFLICT (student_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(setoran.siswa_id)
        .bind(setoran.tanggal)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn review_setoran(&self, review: &Review) -> anyhow::Result<SetoranItem> {
        let mut tx = self.begin().await?;

        let query = format!(
            "SELECT {SETORAN_COLUMNS} FROM setoran s WHERE s.id = $1 AND s.organize_id = $2 FOR UPDATE"
        );
        let current = sqlx::query(&query)
            .bind(review.setoran_id)
            .bind(review.organize_id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(setoran_from_row)
            .ok_or(WriteError::SetoranNotFound(review.setoran_id))?;

        if current.status != SetoranStatus::Pending {
            return Err(WriteError::AlreadyReviewed {
                id: current.id,
                status: current.status.as_str().to_string(),
            }
            .into());
        }

        let query = format!(
            "UPDATE setoran s SET status = $2, poin = $3, catatan = $4 WHERE s.id = $1 \
             RETURNING {SETORAN_COLUMNS}"
        );
        let updated = sqlx::query(&query)
            .bind(review.setoran_id)
            .bind(review.verdict.as_str())
            .bind(review.poin)
            .bind(&review.catatan)
            .fetch_one(&mut *tx)
            .await?;
        let updated = setoran_from_row(&updated);

        if review.poin > 0 {
            sqlx::query(
                r#"
                INSERT INTO siswa_poin (siswa_id, total_poin)
                VALUES ($1, $2)
                ON CONFLICT (siswa_id) DO UPDATE
                SET total_poin = siswa_poin.total_poin + EXCLUDED.total_poin
                "#,
            )
            .bind(updated.siswa_id)
            .bind(i64::from(review.poin))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn upsert_attendance(&self, mark: &AttendanceMark) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, date, status, noted_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, date) DO UPDATE
            SET status = EXCLUDED.status, noted_by = EXCLUDED.noted_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mark.student_id)
        .bind(mark.date)
        .bind(mark.status.as_str())
        .bind(mark.noted_by)
        .execute(self)
        .await?;
        Ok(())
    }

    async fn insert_attendance_if_absent(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        status: &AttendanceStatus,
        noted_by: Option<Uuid>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, date, status, noted_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(date)
        .bind(status.as_str())
        .bind(noted_by)
        .execute(self)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn user_id_by_email(
        &self,
        email: &str,
        role: Option<Role>,
    ) -> anyhow::Result<Option<Uuid>> {
        let id = sqlx::query_scalar(
            "SELECT id FROM users WHERE email = $1 AND ($2::text IS NULL OR role = $2)",
        )
        .bind(email)
        .bind(role.map(|role| role.as_str()))
        .fetch_optional(self)
        .await?;
        Ok(id)
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let organize_id = Uuid::parse_str("6b1f0c2e-5d0a-4c43-9f0e-2a7d1b9c4e11")?;
    sqlx::query(
        r#"
        INSERT INTO organizes (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(organize_id)
    .bind("Halaqah Al-Falah")
    .execute(pool)
    .await?;

    let users = vec![
        (
            Uuid::parse_str("0f8a3c71-2b6e-4f4d-8d0c-5b9e7a1c2d31")?,
            "Ustadz Hamid",
            "hamid@alfalah.example.org",
            "guru",
        ),
        (
            Uuid::parse_str("f4f56c86-2c45-4c3d-bcf4-e13c18422575")?,
            "Ali Rahman",
            "ali@alfalah.example.org",
            "siswa",
        ),
        (
            Uuid::parse_str("8f41192e-433f-40ed-8028-9aad4f563f27")?,
            "Zaid Hakim",
            "zaid@alfalah.example.org",
            "siswa",
        ),
        (
            Uuid::parse_str("5003abdc-9aa5-4c8c-be16-38e39faf376f")?,
            "Umar Rahman",
            "umar@alfalah.example.org",
            "ortu",
        ),
    ];

    for (id, name, email, role) in &users {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, organize_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, role = EXCLUDED.role, organize_id = EXCLUDED.organize_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role)
        .bind(organize_id)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, 'admin') \
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(Uuid::parse_str("9e4c2a10-7f3b-4d8e-a1c6-0b5d3e2f4a77")?)
    .bind("Admin Madrasah")
    .bind("admin@alfalah.example.org")
    .execute(pool)
    .await?;

    let guru_id = users[0].0;
    let attendance = vec![
        ("ali@alfalah.example.org", (2026, 2, 2), "hadir"),
        ("ali@alfalah.example.org", (2026, 2, 3), "hadir"),
        ("ali@alfalah.example.org", (2026, 2, 4), "izin"),
        ("zaid@alfalah.example.org", (2026, 2, 2), "hadir"),
        ("zaid@alfalah.example.org", (2026, 2, 3), "tidak_hadir"),
    ];

    for (email, (year, month, day), status) in attendance {
        let date = NaiveDate::from_ymd_opt(year, month, day).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, date, status, noted_by)
            SELECT $1, id, $2, $3, $4 FROM users WHERE email = $5
            ON CONFLICT (student_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(date)
        .bind(status)
        .bind(guru_id)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let setoran = vec![
        (
            Uuid::parse_str("a1c3e5f7-1b2d-4e6f-8a9b-0c1d2e3f4a5b")?,
            "ali@alfalah.example.org",
            "hafalan",
            "An-Naba",
            30,
            "diterima",
            20,
        ),
        (
            Uuid::parse_str("b2d4f6a8-2c3e-4f70-9bac-1d2e3f4a5b6c")?,
            "ali@alfalah.example.org",
            "murojaah",
            "Al-Mulk",
            29,
            "pending",
            0,
        ),
        (
            Uuid::parse_str("c3e5a7b9-3d4f-4081-acbd-2e3f4a5b6c7d")?,
            "zaid@alfalah.example.org",
            "hafalan",
            "Al-Fatihah",
            1,
            "pending",
            0,
        ),
    ];

    for (id, email, jenis, surah, juz, status, poin) in setoran {
        sqlx::query(
            r#"
            INSERT INTO setoran
            (id, siswa_id, organize_id, jenis, surah, juz, status, poin, file_url, tanggal)
            SELECT $1, u.id, u.organize_id, $2, $3, $4, $5, $6, $7, CURRENT_DATE
            FROM users u WHERE u.email = $8
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(jenis)
        .bind(surah)
        .bind(juz)
        .bind(status)
        .bind(poin)
        .bind(format!("https://files.example.org/seed/{id}.mp3"))
        .bind(email)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO siswa_poin (siswa_id, total_poin)
        SELECT id, 20 FROM users WHERE email = 'ali@alfalah.example.org'
        ON CONFLICT (siswa_id) DO NOTHING
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
