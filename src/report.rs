use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AttendanceBand, LeaderboardEntry, StudentAttendance, TodayRollup};

pub struct ClassReport<'a> {
    pub class_name: &'a str,
    pub today: NaiveDate,
    pub since: NaiveDate,
    pub rollup: TodayRollup,
    pub roster: &'a [StudentAttendance],
    pub leaderboard: &'a [LeaderboardEntry],
}

pub fn students_needing_attention(roster: &[StudentAttendance]) -> Vec<&StudentAttendance> {
    let mut flagged: Vec<&StudentAttendance> = roster
        .iter()
        .filter(|row| row.stats.total_days > 0 && row.stats.band() == AttendanceBand::Low)
        .collect();
    flagged.sort_by(|a, b| a.stats.percentage.cmp(&b.stats.percentage));
    flagged
}

pub fn build_report(report: &ClassReport<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Laporan Kelas {}", report.class_name);
    let _ = writeln!(
        output,
        "Generated {} (attendance since {})",
        report.today, report.since
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Kehadiran Hari Ini");

    if report.rollup.total_students == 0 {
        let _ = writeln!(output, "No students in this class yet.");
    } else {
        let _ = writeln!(output, "- Hadir: {}", report.rollup.present);
        let _ = writeln!(output, "- Izin: {}", report.rollup.excused);
        let _ = writeln!(output, "- Tidak Hadir: {}", report.rollup.absent);
        let _ = writeln!(output, "- Total Siswa: {}", report.rollup.total_students);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rekap Per Siswa");

    if report.roster.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this window.");
    } else {
        let _ = writeln!(output, "| Nama Siswa | Hadir | Izin | Tidak Hadir | Persentase |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for row in report.roster {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {}% |",
                row.student_name,
                row.stats.hadir_count,
                row.stats.izin_count,
                row.stats.tidak_hadir_count,
                row.stats.percentage
            );
        }
    }

    let flagged = students_needing_attention(report.roster);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Perlu Perhatian");

    if flagged.is_empty() {
        let _ = writeln!(output, "All students are at or above 60% attendance.");
    } else {
        for row in flagged {
            let _ = writeln!(
                output,
                "- {}: {}% across {} days",
                row.student_name, row.stats.percentage, row.stats.total_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Peringkat Poin");

    if report.leaderboard.is_empty() {
        let _ = writeln!(output, "No points awarded yet.");
    } else {
        for entry in report.leaderboard {
            let _ = writeln!(
                output,
                "{}. {} ({} poin)",
                entry.rank, entry.name, entry.total_poin
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStats;
    use uuid::Uuid;

    fn student(name: &str, hadir: usize, total: usize) -> StudentAttendance {
        StudentAttendance {
            student_id: Uuid::new_v4(),
            student_name: name.to_string(),
            stats: AttendanceStats {
                total_days: total,
                hadir_count: hadir,
                izin_count: 0,
                tidak_hadir_count: total - hadir,
                unknown_count: 0,
                percentage: crate::stats::percentage(hadir, total),
            },
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn low_attendance_is_flagged_lowest_first() {
        let roster = vec![
            student("Ali", 9, 10),
            student("Zaid", 2, 10),
            student("Hasan", 5, 10),
            student("Baru", 0, 0),
        ];
        let flagged: Vec<_> = students_needing_attention(&roster)
            .into_iter()
            .map(|row| row.student_name.as_str())
            .collect();
        assert_eq!(flagged, vec!["Zaid", "Hasan"]);
    }

    #[test]
    fn report_includes_every_section() {
        let roster = vec![student("Ali", 9, 10), student("Zaid", 2, 10)];
        let leaderboard = vec![LeaderboardEntry {
            rank: 1,
            siswa_id: Uuid::new_v4(),
            name: "Ali".to_string(),
            total_poin: 120,
        }];
        let report = build_report(&ClassReport {
            class_name: "Halaqah Al-Falah",
            today: day(10),
            since: day(1),
            rollup: TodayRollup {
                total_students: 2,
                present: 1,
                excused: 0,
                absent: 1,
            },
            roster: &roster,
            leaderboard: &leaderboard,
        });

        assert!(report.starts_with("# Laporan Kelas Halaqah Al-Falah\n"));
        assert!(report.contains("- Tidak Hadir: 1"));
        assert!(report.contains("| Ali | 9 | 0 | 1 | 90% |"));
        assert!(report.contains("- Zaid: 20% across 10 days"));
        assert!(report.contains("1. Ali (120 poin)"));
    }

    #[test]
    fn empty_class_report_has_placeholders() {
        let report = build_report(&ClassReport {
            class_name: "Halaqah Baru",
            today: day(10),
            since: day(1),
            rollup: TodayRollup::default(),
            roster: &[],
            leaderboard: &[],
        });
        assert!(report.contains("No students in this class yet."));
        assert!(report.contains("No attendance recorded for this window."));
        assert!(report.contains("No points awarded yet."));
    }
}
