use std::io::Write;

use anyhow::Context;
use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::models::AttendanceExportRow;
use crate::scope::Scope;
use crate::store::RecordStore;

pub const HEADER: [&str; 3] = ["Tanggal", "Nama Siswa", "Status"];

/// Both ends of the export window must be given, in order.
pub fn validate_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), ValidationError> {
    let start = start.ok_or(ValidationError::Missing("start date"))?;
    let end = end.ok_or(ValidationError::Missing("end date"))?;
    if start > end {
        return Err(ValidationError::DateRangeReversed { start, end });
    }
    Ok((start, end))
}

pub fn write_attendance_csv<W: Write>(rows: &[AttendanceExportRow], out: W) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(HEADER)?;
    for row in rows {
        let date = row.date.format("%Y-%m-%d").to_string();
        writer.write_record([date.as_str(), row.student_name.as_str(), row.status.label()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn attendance_csv(rows: &[AttendanceExportRow]) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    write_attendance_csv(rows, &mut buffer)?;
    String::from_utf8(buffer).context("export produced invalid UTF-8")
}

/// Validates the window, fetches the scoped rows and renders them. A pending
/// scope exports the header only.
pub async fn export_attendance<S: RecordStore>(
    store: &S,
    scope: Scope,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<(String, usize)> {
    let (start, end) = validate_range(start, end)?;

    let rows = match scope {
        Scope::Pending => Vec::new(),
        scope => store
            .attendance_export_rows(&scope, start, end)
            .await
            .context("failed to fetch attendance for export")?,
    };
    tracing::info!(%start, %end, rows = rows.len(), "attendance export prepared");

    Ok((attendance_csv(&rows)?, rows.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use crate::store::memory::MemoryStore;

    fn row(date: &str, name: &str, status: &str) -> AttendanceExportRow {
        AttendanceExportRow {
            date: date.parse().unwrap(),
            student_name: name.to_string(),
            status: AttendanceStatus::from(status.to_string()),
        }
    }

    #[test]
    fn single_row_matches_expected_text() {
        let csv = attendance_csv(&[row("2024-01-05", "Ali", "hadir")]).unwrap();
        assert_eq!(csv, "Tanggal,Nama Siswa,Status\n2024-01-05,Ali,Hadir\n");
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(attendance_csv(&[]).unwrap(), "Tanggal,Nama Siswa,Status\n");
    }

    #[test]
    fn statuses_use_display_labels() {
        let csv = attendance_csv(&[
            row("2024-01-05", "Ali", "izin"),
            row("2024-01-05", "Zaid", "tidak_hadir"),
            row("2024-01-06", "Hasan", "sakit"),
        ])
        .unwrap();
        assert_eq!(
            csv,
            "Tanggal,Nama Siswa,Status\n\
             2024-01-05,Ali,Izin\n\
             2024-01-05,Zaid,Tidak Hadir\n\
             2024-01-06,Hasan,sakit\n"
        );
    }

    #[test]
    fn names_with_delimiters_are_quoted() {
        let csv = attendance_csv(&[
            row("2024-01-05", "Abdullah, Jr.", "hadir"),
            row("2024-01-05", "Ahmad \"Mamat\"", "hadir"),
        ])
        .unwrap();
        assert_eq!(
            csv,
            "Tanggal,Nama Siswa,Status\n\
             2024-01-05,\"Abdullah, Jr.\",Hadir\n\
             2024-01-05,\"Ahmad \"\"Mamat\"\"\",Hadir\n"
        );
    }

    #[test]
    fn missing_dates_are_rejected() {
        let day: NaiveDate = "2024-01-05".parse().unwrap();
        assert_eq!(
            validate_range(None, Some(day)),
            Err(ValidationError::Missing("start date"))
        );
        assert_eq!(
            validate_range(Some(day), None),
            Err(ValidationError::Missing("end date"))
        );
        let earlier: NaiveDate = "2024-01-01".parse().unwrap();
        assert!(matches!(
            validate_range(Some(day), Some(earlier)),
            Err(ValidationError::DateRangeReversed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_date_fails_before_querying() {
        let store = MemoryStore {
            failing: true,
            ..MemoryStore::default()
        };
        let error = export_attendance(&store, Scope::SystemWide, None, None)
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<ValidationError>(),
            Some(&ValidationError::Missing("start date"))
        );
    }

    #[tokio::test]
    async fn export_is_limited_to_scope_and_window() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let other = store.add_organize("Halaqah An-Nur");
        let ali = store.add_user("Ali", "siswa", Some(org));
        let zaid = store.add_user("Zaid", "siswa", Some(org));
        let hasan = store.add_user("Hasan", "siswa", Some(other));
        store.add_attendance(ali, "2024-01-05".parse().unwrap(), "hadir");
        store.add_attendance(zaid, "2024-01-05".parse().unwrap(), "izin");
        store.add_attendance(hasan, "2024-01-05".parse().unwrap(), "hadir");
        store.add_attendance(ali, "2024-02-01".parse().unwrap(), "hadir");

        let (csv, count) = export_attendance(
            &store,
            Scope::Organization(org),
            "2024-01-01".parse().ok(),
            "2024-01-31".parse().ok(),
        )
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            csv,
            "Tanggal,Nama Siswa,Status\n2024-01-05,Ali,Hadir\n2024-01-05,Zaid,Izin\n"
        );
    }

    #[tokio::test]
    async fn pending_scope_exports_header_only() {
        let store = MemoryStore::default();
        let (csv, count) = export_attendance(
            &store,
            Scope::Pending,
            "2024-01-01".parse().ok(),
            "2024-01-31".parse().ok(),
        )
        .await
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(csv, "Tanggal,Nama Siswa,Status\n");
    }
}
