use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{RequestError, SessionError, ValidationError};
use crate::models::{AttendanceStatus, Role, SetoranJenis, SetoranStatus};
use crate::scope::Session;

const JUZ_RANGE: std::ops::RangeInclusive<i32> = 1..=30;

/// Raw setoran form as entered by a student.
#[derive(Debug, Clone)]
pub struct SetoranForm {
    pub jenis: SetoranJenis,
    pub surah: String,
    pub juz: Option<i32>,
    pub ayat_mulai: Option<i32>,
    pub ayat_selesai: Option<i32>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSetoran {
    pub siswa_id: Uuid,
    pub organize_id: Uuid,
    pub jenis: SetoranJenis,
    pub surah: String,
    pub juz: i32,
    pub ayat_mulai: Option<i32>,
    pub ayat_selesai: Option<i32>,
    pub file_url: String,
    pub tanggal: NaiveDate,
}

pub fn validate_setoran(
    session: &Session,
    form: SetoranForm,
    today: NaiveDate,
) -> Result<NewSetoran, RequestError> {
    session.require(Role::Siswa, "submitting a setoran")?;

    let surah = form.surah.trim();
    if surah.is_empty() {
        return Err(ValidationError::Missing("surah").into());
    }
    let juz = form.juz.ok_or(ValidationError::Missing("juz"))?;
    let file_url = form
        .file_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or(ValidationError::Missing("recording"))?;

    if !JUZ_RANGE.contains(&juz) {
        return Err(ValidationError::JuzOutOfRange(juz).into());
    }
    for ayat in [form.ayat_mulai, form.ayat_selesai].into_iter().flatten() {
        if ayat < 1 {
            return Err(ValidationError::AyatNotPositive(ayat).into());
        }
    }
    if let (Some(start), Some(end)) = (form.ayat_mulai, form.ayat_selesai) {
        if start > end {
            return Err(ValidationError::AyatRangeReversed { start, end }.into());
        }
    }

    let organize_id = session.organize_id().ok_or(SessionError::NoOrganize)?;
    if matches!(form.jenis, SetoranJenis::Unknown(_)) {
        return Err(ValidationError::Missing("jenis").into());
    }

    Ok(NewSetoran {
        siswa_id: session.user_id(),
        organize_id,
        jenis: form.jenis,
        surah: surah.to_string(),
        juz,
        ayat_mulai: form.ayat_mulai,
        ayat_selesai: form.ayat_selesai,
        file_url,
        tanggal: today,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub setoran_id: Uuid,
    pub organize_id: Uuid,
    pub verdict: SetoranStatus,
    pub poin: i32,
    pub catatan: Option<String>,
}

/// Points are only kept on accepted submissions.
pub fn validate_review(
    session: &Session,
    setoran_id: Uuid,
    verdict: SetoranStatus,
    poin: i32,
    catatan: Option<String>,
) -> Result<Review, RequestError> {
    session.require(Role::Guru, "reviewing a setoran")?;
    let organize_id = session.organize_id().ok_or(SessionError::NoOrganize)?;

    let poin = match &verdict {
        SetoranStatus::Diterima if poin < 0 => {
            return Err(ValidationError::NegativePoin(poin).into())
        }
        SetoranStatus::Diterima => poin,
        SetoranStatus::Ditolak => 0,
        other => return Err(ValidationError::InvalidVerdict(other.as_str().to_string()).into()),
    };

    Ok(Review {
        setoran_id,
        organize_id,
        verdict,
        poin,
        catatan: catatan.map(|note| note.trim().to_string()).filter(|note| !note.is_empty()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceMark {
    pub student_id: Uuid,
    pub organize_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub noted_by: Uuid,
}

pub fn validate_mark(
    session: &Session,
    student_id: Uuid,
    date: NaiveDate,
    status: AttendanceStatus,
) -> Result<AttendanceMark, RequestError> {
    session.require(Role::Guru, "marking attendance")?;
    let organize_id = session.organize_id().ok_or(SessionError::NoOrganize)?;
    if !status.is_known() {
        return Err(ValidationError::UnknownStatus(status.as_str().to_string()).into());
    }

    Ok(AttendanceMark {
        student_id,
        organize_id,
        date,
        status,
        noted_by: session.user_id(),
    })
}
