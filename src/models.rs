use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Siswa,
    Guru,
    Ortu,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Siswa => "siswa",
            Role::Guru => "guru",
            Role::Ortu => "ortu",
            Role::Admin => "admin",
        }
    }

    /// Title shown next to a user's name on the dashboard.
    pub fn title(self) -> &'static str {
        match self {
            Role::Siswa => "Santri",
            Role::Guru => "Ustadz/Ustadzah",
            Role::Ortu => "Wali Santri",
            Role::Admin => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "siswa" => Ok(Role::Siswa),
            "guru" => Ok(Role::Guru),
            "ortu" => Ok(Role::Ortu),
            "admin" => Ok(Role::Admin),
            other => Err(SessionError::UnknownRole(other.to_string())),
        }
    }
}

/// Attendance status as stored in `attendance.status`. Values outside the
/// known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum AttendanceStatus {
    Hadir,
    Izin,
    TidakHadir,
    Unknown(String),
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AttendanceStatus::Hadir => "hadir",
            AttendanceStatus::Izin => "izin",
            AttendanceStatus::TidakHadir => "tidak_hadir",
            AttendanceStatus::Unknown(raw) => raw,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            AttendanceStatus::Hadir => "Hadir",
            AttendanceStatus::Izin => "Izin",
            AttendanceStatus::TidakHadir => "Tidak Hadir",
            AttendanceStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AttendanceStatus::Unknown(_))
    }
}

impl From<String> for AttendanceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hadir" => AttendanceStatus::Hadir,
            "izin" => AttendanceStatus::Izin,
            "tidak_hadir" => AttendanceStatus::TidakHadir,
            _ => AttendanceStatus::Unknown(value),
        }
    }
}

impl From<AttendanceStatus> for String {
    fn from(value: AttendanceStatus) -> Self {
        match value {
            AttendanceStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum SetoranStatus {
    Pending,
    Diterima,
    Ditolak,
    Unknown(String),
}

impl SetoranStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SetoranStatus::Pending => "pending",
            SetoranStatus::Diterima => "diterima",
            SetoranStatus::Ditolak => "ditolak",
            SetoranStatus::Unknown(raw) => raw,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SetoranStatus::Pending => "Menunggu",
            SetoranStatus::Diterima => "Diterima",
            SetoranStatus::Ditolak => "Ditolak",
            SetoranStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for SetoranStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => SetoranStatus::Pending,
            "diterima" => SetoranStatus::Diterima,
            "ditolak" => SetoranStatus::Ditolak,
            _ => SetoranStatus::Unknown(value),
        }
    }
}

impl From<SetoranStatus> for String {
    fn from(value: SetoranStatus) -> Self {
        match value {
            SetoranStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum SetoranJenis {
    Hafalan,
    Murojaah,
    Unknown(String),
}

impl SetoranJenis {
    pub fn as_str(&self) -> &str {
        match self {
            SetoranJenis::Hafalan => "hafalan",
            SetoranJenis::Murojaah => "murojaah",
            SetoranJenis::Unknown(raw) => raw,
        }
    }
}

impl From<String> for SetoranJenis {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hafalan" => SetoranJenis::Hafalan,
            "murojaah" => SetoranJenis::Murojaah,
            _ => SetoranJenis::Unknown(value),
        }
    }
}

impl From<SetoranJenis> for String {
    fn from(value: SetoranJenis) -> Self {
        match value {
            SetoranJenis::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub organize_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub noted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetoranItem {
    pub id: Uuid,
    pub siswa_id: Uuid,
    pub organize_id: Uuid,
    pub jenis: SetoranJenis,
    pub surah: String,
    pub juz: i32,
    pub ayat_mulai: Option<i32>,
    pub ayat_selesai: Option<i32>,
    pub status: SetoranStatus,
    pub catatan: Option<String>,
    pub poin: i32,
    pub file_url: String,
    pub tanggal: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A pending setoran joined with the submitting student's name.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSetoran {
    #[serde(flatten)]
    pub item: SetoranItem,
    pub siswa_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceExportRow {
    pub date: NaiveDate,
    pub student_name: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub total_days: usize,
    pub hadir_count: usize,
    pub izin_count: usize,
    pub tidak_hadir_count: usize,
    pub unknown_count: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceBand {
    Good,
    Fair,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetoranStats {
    pub total: usize,
    pub diterima: usize,
    pub pending: usize,
    pub ditolak: usize,
    pub unknown: usize,
    pub total_poin: i64,
    pub hafalan_diterima: usize,
    pub murojaah_diterima: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodayRollup {
    pub total_students: usize,
    pub present: usize,
    pub excused: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAttendance {
    pub student_id: Uuid,
    pub student_name: String,
    pub stats: AttendanceStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub siswa_id: Uuid,
    pub name: String,
    pub total_poin: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub siswa_id: Uuid,
    pub name: String,
    pub total_poin: i64,
}
