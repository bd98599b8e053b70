use crate::models::{
    AttendanceBand, AttendanceRecord, AttendanceStats, AttendanceStatus, LeaderboardEntry,
    LeaderboardRow, SetoranItem, SetoranJenis, SetoranStats, SetoranStatus, TodayRollup,
};

pub fn attendance_stats(records: &[AttendanceRecord]) -> AttendanceStats {
    summarize_statuses(records.iter().map(|record| &record.status))
}

pub fn summarize_statuses<'a>(
    statuses: impl IntoIterator<Item = &'a AttendanceStatus>,
) -> AttendanceStats {
    let mut stats = AttendanceStats::default();

    for status in statuses {
        stats.total_days += 1;
        match status {
            AttendanceStatus::Hadir => stats.hadir_count += 1,
            AttendanceStatus::Izin => stats.izin_count += 1,
            AttendanceStatus::TidakHadir => stats.tidak_hadir_count += 1,
            AttendanceStatus::Unknown(_) => stats.unknown_count += 1,
        }
    }

    stats.percentage = percentage(stats.hadir_count, stats.total_days);
    stats
}

/// Rounded share of `part` in `total`, half-up, 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let part = part.min(total) as u64;
    let total = total as u64;
    ((part * 200 + total) / (total * 2)) as u8
}

impl AttendanceStats {
    pub fn band(&self) -> AttendanceBand {
        match self.percentage {
            80..=100 => AttendanceBand::Good,
            60..=79 => AttendanceBand::Fair,
            _ => AttendanceBand::Low,
        }
    }
}

pub fn setoran_stats(items: &[SetoranItem]) -> SetoranStats {
    let mut stats = SetoranStats::default();

    for item in items {
        stats.total += 1;
        stats.total_poin += i64::from(item.poin);
        match item.status {
            SetoranStatus::Diterima => {
                stats.diterima += 1;
                match item.jenis {
                    SetoranJenis::Hafalan => stats.hafalan_diterima += 1,
                    SetoranJenis::Murojaah => stats.murojaah_diterima += 1,
                    SetoranJenis::Unknown(_) => {}
                }
            }
            SetoranStatus::Pending => stats.pending += 1,
            SetoranStatus::Ditolak => stats.ditolak += 1,
            SetoranStatus::Unknown(_) => stats.unknown += 1,
        }
    }

    stats
}

/// Class-wide attendance for one day. `None` means the student has no record
/// for the day and counts as absent.
pub fn today_rollup(statuses: &[Option<AttendanceStatus>]) -> TodayRollup {
    let mut rollup = TodayRollup {
        total_students: statuses.len(),
        ..TodayRollup::default()
    };

    for status in statuses {
        match status {
            Some(AttendanceStatus::Hadir) => rollup.present += 1,
            Some(AttendanceStatus::Izin) => rollup.excused += 1,
            Some(AttendanceStatus::TidakHadir) | None => rollup.absent += 1,
            Some(AttendanceStatus::Unknown(_)) => {}
        }
    }

    rollup
}

pub fn rank_leaderboard(mut rows: Vec<LeaderboardRow>) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| b.total_poin.cmp(&a.total_poin).then_with(|| a.name.cmp(&b.name)));

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(previous) if previous.total_poin == row.total_poin => previous.rank,
            _ => index + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            siswa_id: row.siswa_id,
            name: row.name,
            total_poin: row.total_poin,
        });
    }

    entries
}
