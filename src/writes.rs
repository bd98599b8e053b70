use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::WriteError;
use crate::models::{AttendanceStatus, Role, SetoranItem};
use crate::store::RecordWriter;
use crate::submission::{AttendanceMark, NewSetoran, Review};

pub async fn submit_setoran<S: RecordWriter>(
    store: &S,
    setoran: &NewSetoran,
) -> anyhow::Result<Uuid> {
    let id = store.insert_setoran(setoran).await?;
    tracing::info!(setoran_id = %id, siswa_id = %setoran.siswa_id, "setoran submitted");
    Ok(id)
}

pub async fn review_setoran<S: RecordWriter>(
    store: &S,
    review: &Review,
) -> anyhow::Result<SetoranItem> {
    let updated = store.review_setoran(review).await?;
    tracing::info!(
        setoran_id = %updated.id,
        status = updated.status.as_str(),
        poin = updated.poin,
        "setoran reviewed"
    );
    Ok(updated)
}

/// Records or corrects attendance for a student of the teacher's own class.
pub async fn mark_attendance<S: RecordWriter>(
    store: &S,
    mark: &AttendanceMark,
) -> anyhow::Result<()> {
    let student = store.profile(mark.student_id).await?;
    let in_class = student.is_some_and(|student| {
        student.role == Role::Siswa.as_str() && student.organize_id == Some(mark.organize_id)
    });
    if !in_class {
        return Err(WriteError::NotInClass(mark.student_id).into());
    }

    store.upsert_attendance(mark).await?;
    tracing::info!(
        student_id = %mark.student_id,
        date = %mark.date,
        status = mark.status.as_str(),
        "attendance marked"
    );
    Ok(())
}

#[derive(serde::Deserialize)]
struct AttendanceCsvRow {
    student_email: String,
    date: NaiveDate,
    status: String,
    noted_by_email: Option<String>,
}

pub async fn import_attendance_file<S: RecordWriter>(
    store: &S,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_attendance(store, file).await
}

/// Imports attendance rows (`student_email,date,status[,noted_by_email]`).
/// Rows for an existing `(student, date)` are skipped, so re-running an
/// import writes nothing new.
pub async fn import_attendance<S: RecordWriter>(
    store: &S,
    input: impl Read,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_reader(input);
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<AttendanceCsvRow>().enumerate() {
        let row = result?;
        let status = AttendanceStatus::from(row.status);
        if !status.is_known() {
            tracing::warn!(line = line + 2, status = status.as_str(), "skipping unknown status");
            continue;
        }

        let Some(student_id) = store
            .user_id_by_email(&row.student_email, Some(Role::Siswa))
            .await?
        else {
            tracing::warn!(line = line + 2, email = %row.student_email, "skipping unknown student");
            continue;
        };

        let noted_by = match row.noted_by_email.as_deref() {
            Some(email) if !email.is_empty() => store.user_id_by_email(email, None).await?,
            _ => None,
        };

        if store
            .insert_attendance_if_absent(student_id, row.date, &status, noted_by)
            .await?
        {
            inserted += 1;
        }
    }

    tracing::info!(inserted, "attendance import finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SetoranJenis, SetoranStatus};
    use crate::store::memory::MemoryStore;
    use crate::store::RecordStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn new_setoran(siswa_id: Uuid, organize_id: Uuid, tanggal: NaiveDate) -> NewSetoran {
        NewSetoran {
            siswa_id,
            organize_id,
            jenis: SetoranJenis::Hafalan,
            surah: "Al-Mulk".to_string(),
            juz: 29,
            ayat_mulai: Some(1),
            ayat_selesai: Some(15),
            file_url: "https://files.example.org/ali-mulk.mp3".to_string(),
            tanggal,
        }
    }

    fn review(setoran_id: Uuid, organize_id: Uuid, verdict: SetoranStatus, poin: i32) -> Review {
        Review {
            setoran_id,
            organize_id,
            verdict,
            poin,
            catatan: None,
        }
    }

    #[tokio::test]
    async fn submission_records_presence_for_the_day() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let ali = store.add_user("Ali", "siswa", Some(org));

        let id = submit_setoran(&store, &new_setoran(ali, org, day(10))).await.unwrap();

        let item = store.setoran_item(id).unwrap();
        assert_eq!(item.status, SetoranStatus::Pending);
        assert_eq!(item.poin, 0);
        let record = store.attendance_on(ali, day(10)).await.unwrap().unwrap();
        assert_eq!(record.status, AttendanceStatus::Hadir);
        assert_eq!(record.noted_by, None);
    }

    #[tokio::test]
    async fn submission_keeps_existing_attendance() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let ali = store.add_user("Ali", "siswa", Some(org));
        store.add_attendance(ali, day(10), "izin");

        submit_setoran(&store, &new_setoran(ali, org, day(10))).await.unwrap();
        submit_setoran(&store, &new_setoran(ali, org, day(10))).await.unwrap();

        let rows = store.attendance_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Izin);
    }

    #[tokio::test]
    async fn accepted_points_accumulate() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let ali = store.add_user("Ali", "siswa", Some(org));
        let first = store.add_setoran(ali, "hafalan", "pending", 0);
        let second = store.add_setoran(ali, "murojaah", "pending", 0);
        let third = store.add_setoran(ali, "hafalan", "pending", 0);

        let updated = review_setoran(&store, &review(first, org, SetoranStatus::Diterima, 20))
            .await
            .unwrap();
        assert_eq!(updated.status, SetoranStatus::Diterima);
        assert_eq!(updated.poin, 20);
        assert_eq!(store.total_poin(ali).await.unwrap(), Some(20));

        review_setoran(&store, &review(second, org, SetoranStatus::Diterima, 15))
            .await
            .unwrap();
        review_setoran(&store, &review(third, org, SetoranStatus::Ditolak, 0))
            .await
            .unwrap();
        assert_eq!(store.total_poin(ali).await.unwrap(), Some(35));
        assert_eq!(store.setoran_item(third).unwrap().status, SetoranStatus::Ditolak);
    }

    #[tokio::test]
    async fn only_pending_setoran_can_be_reviewed() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let ali = store.add_user("Ali", "siswa", Some(org));
        let done = store.add_setoran(ali, "hafalan", "diterima", 10);
        store.set_poin(ali, 10);

        let error = review_setoran(&store, &review(done, org, SetoranStatus::Diterima, 50))
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<WriteError>(),
            Some(&WriteError::AlreadyReviewed {
                id: done,
                status: "diterima".to_string(),
            })
        );
        assert_eq!(store.total_poin(ali).await.unwrap(), Some(10));
        assert_eq!(store.setoran_item(done).unwrap().poin, 10);
    }

    #[tokio::test]
    async fn review_is_limited_to_own_class() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let other = store.add_organize("Halaqah An-Nur");
        let ali = store.add_user("Ali", "siswa", Some(org));
        let pending = store.add_setoran(ali, "hafalan", "pending", 0);

        let error = review_setoran(&store, &review(pending, other, SetoranStatus::Diterima, 5))
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<WriteError>(),
            Some(&WriteError::SetoranNotFound(pending))
        );
        assert_eq!(store.setoran_item(pending).unwrap().status, SetoranStatus::Pending);
    }

    #[tokio::test]
    async fn marking_overwrites_the_day_for_own_students_only() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let other = store.add_organize("Halaqah An-Nur");
        let guru = store.add_user("Hamid", "guru", Some(org));
        let ali = store.add_user("Ali", "siswa", Some(org));
        let hasan = store.add_user("Hasan", "siswa", Some(other));
        store.add_attendance(ali, day(10), "hadir");

        let mark = |student_id| AttendanceMark {
            student_id,
            organize_id: org,
            date: day(10),
            status: AttendanceStatus::TidakHadir,
            noted_by: guru,
        };

        mark_attendance(&store, &mark(ali)).await.unwrap();
        let rows = store.attendance_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::TidakHadir);
        assert_eq!(rows[0].noted_by, Some(guru));

        let error = mark_attendance(&store, &mark(hasan)).await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<WriteError>(),
            Some(&WriteError::NotInClass(hasan))
        );
        let error = mark_attendance(&store, &mark(guru)).await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<WriteError>(),
            Some(&WriteError::NotInClass(guru))
        );
        assert_eq!(store.attendance_rows().len(), 1);
    }

    #[tokio::test]
    async fn import_skips_existing_days_and_unknown_rows() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let guru = store.add_user("Hamid", "guru", Some(org));
        let ali = store.add_user("Ali", "siswa", Some(org));
        let zaid = store.add_user("Zaid", "siswa", Some(org));
        store.add_attendance(zaid, day(4), "izin");

        let csv = "student_email,date,status,noted_by_email\n\
                   ali@halaqah.example.org,2024-03-04,hadir,hamid@halaqah.example.org\n\
                   zaid@halaqah.example.org,2024-03-04,hadir,\n\
                   zaid@halaqah.example.org,2024-03-05,tidak_hadir,\n\
                   ghost@halaqah.example.org,2024-03-05,hadir,\n\
                   ali@halaqah.example.org,2024-03-05,sakit,\n\
                   hamid@halaqah.example.org,2024-03-05,hadir,\n";

        assert_eq!(import_attendance(&store, csv.as_bytes()).await.unwrap(), 2);
        assert_eq!(import_attendance(&store, csv.as_bytes()).await.unwrap(), 0);

        let rows = store.attendance_rows();
        assert_eq!(rows.len(), 3);
        let ali_day = store.attendance_on(ali, day(4)).await.unwrap().unwrap();
        assert_eq!(ali_day.noted_by, Some(guru));
        let zaid_day = store.attendance_on(zaid, day(4)).await.unwrap().unwrap();
        assert_eq!(zaid_day.status, AttendanceStatus::Izin);
    }
}
