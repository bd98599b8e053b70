use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;
mod dashboard;
mod db;
mod error;
mod export;
mod models;
mod report;
mod scope;
mod stats;
mod store;
mod submission;
mod writes;

use crate::config::{Config, MAX_ROW_LIMIT, MAX_WINDOW_DAYS};
use crate::dashboard::{AttendanceView, Dashboard, RequestToken, SetoranView, ViewOptions};
use crate::models::{AttendanceStatus, Role, SetoranJenis, SetoranStatus};
use crate::scope::{load_session, resolve_scope, Scope};
use crate::store::RecordStore;

#[derive(Parser)]
#[command(name = "setoran-tracker")]
#[command(about = "Attendance and setoran tracker for madrasah classes", long_about = None)]
struct Cli {
    /// Id of the acting user
    #[arg(long, global = true)]
    user: Option<Uuid>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum JenisArg {
    Hafalan,
    Murojaah,
}

#[derive(Clone, Copy, ValueEnum)]
enum VerdictArg {
    Diterima,
    Ditolak,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Hadir,
    Izin,
    TidakHadir,
}

impl From<JenisArg> for SetoranJenis {
    fn from(value: JenisArg) -> Self {
        match value {
            JenisArg::Hafalan => SetoranJenis::Hafalan,
            JenisArg::Murojaah => SetoranJenis::Murojaah,
        }
    }
}

impl From<VerdictArg> for SetoranStatus {
    fn from(value: VerdictArg) -> Self {
        match value {
            VerdictArg::Diterima => SetoranStatus::Diterima,
            VerdictArg::Ditolak => SetoranStatus::Ditolak,
        }
    }
}

impl From<StatusArg> for AttendanceStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Hadir => AttendanceStatus::Hadir,
            StatusArg::Izin => AttendanceStatus::Izin,
            StatusArg::TidakHadir => AttendanceStatus::TidakHadir,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample class with students, a teacher and a parent
    Seed,
    /// Import attendance from a CSV file (student_email,date,status[,noted_by_email])
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the home dashboard for the acting user
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Show attendance history, or the class roster for teachers
    Attendance {
        /// Class to inspect (admin only)
        #[arg(long)]
        organize: Option<Uuid>,
    },
    /// Show setoran history and progress
    Setoran,
    /// Submit a new setoran
    Submit {
        #[arg(long, value_enum, default_value = "hafalan")]
        jenis: JenisArg,
        #[arg(long, default_value = "")]
        surah: String,
        #[arg(long)]
        juz: Option<i32>,
        #[arg(long)]
        ayat_mulai: Option<i32>,
        #[arg(long)]
        ayat_selesai: Option<i32>,
        /// URL of the uploaded recording
        #[arg(long)]
        file_url: Option<String>,
    },
    /// Accept or reject a pending setoran
    Review {
        #[arg(long)]
        setoran: Uuid,
        #[arg(long, value_enum)]
        verdict: VerdictArg,
        #[arg(long, default_value_t = 0)]
        poin: i32,
        #[arg(long)]
        catatan: Option<String>,
    },
    /// Record or correct a student's attendance
    Mark {
        #[arg(long)]
        student: Uuid,
        #[arg(long, value_enum)]
        status: StatusArg,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the points leaderboard
    Leaderboard {
        #[arg(long)]
        organize: Option<Uuid>,
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(1..=MAX_ROW_LIMIT))]
        limit: i64,
    },
    /// Export attendance in a date range as CSV
    Export {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        organize: Option<Uuid>,
        /// Output file, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown class report
    Report {
        #[arg(long)]
        organize: Option<Uuid>,
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS))]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setoran_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    check_offline(&cli.command)?;

    let token = RequestToken::new();
    token.until(run(cli, config, &token), interrupt_signal()).await
}

async fn interrupt_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl-C, cancelling in-flight request");
}

/// Argument checks that must fail before any connection is opened.
fn check_offline(command: &Commands) -> anyhow::Result<()> {
    if let Commands::Export { start, end, .. } = command {
        export::validate_range(*start, *end)?;
    }
    Ok(())
}

async fn run(cli: Cli, config: Config, token: &RequestToken) -> anyhow::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Utc::now().date_naive();
    let options = ViewOptions {
        today,
        history_limit: config.attendance_history_limit,
        parent_window_days: config.parent_window_days,
    };

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportAttendance { csv } => {
            let inserted = writes::import_attendance_file(&pool, &csv).await?;
            println!("Inserted {inserted} attendance records from {}.", csv.display());
        }
        Commands::Dashboard { json } => {
            let session = load_session(&pool, cli.user).await?;
            let dashboard =
                dashboard::fetch_dashboard(&pool, &session, options, &token.child()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                println!("{} ({})", session.name(), session.role().title());
                print_dashboard(&dashboard);
            }
        }
        Commands::Attendance { organize } => {
            let session = load_session(&pool, cli.user).await?;
            let scope = resolve_scope(&pool, &session).await.within(organize);
            let view =
                dashboard::fetch_attendance_view(&pool, scope, options, &token.child()).await?;
            print_attendance(&view);
        }
        Commands::Setoran => {
            let session = load_session(&pool, cli.user).await?;
            let scope = resolve_scope(&pool, &session).await;
            let view = dashboard::fetch_setoran_view(&pool, scope, &token.child()).await?;
            print_setoran(&view);
        }
        Commands::Submit {
            jenis,
            surah,
            juz,
            ayat_mulai,
            ayat_selesai,
            file_url,
        } => {
            let session = load_session(&pool, cli.user).await?;
            let form = submission::SetoranForm {
                jenis: jenis.into(),
                surah,
                juz,
                ayat_mulai,
                ayat_selesai,
                file_url,
            };
            let new = submission::validate_setoran(&session, form, today)?;
            let id = writes::submit_setoran(&pool, &new).await?;
            println!("Setoran {id} sent and waiting for review.");
        }
        Commands::Review {
            setoran,
            verdict,
            poin,
            catatan,
        } => {
            let session = load_session(&pool, cli.user).await?;
            let review =
                submission::validate_review(&session, setoran, verdict.into(), poin, catatan)?;
            let updated = writes::review_setoran(&pool, &review).await?;
            println!(
                "Setoran {} {} with {} poin.",
                updated.id,
                updated.status.label(),
                updated.poin
            );
        }
        Commands::Mark {
            student,
            status,
            date,
        } => {
            let session = load_session(&pool, cli.user).await?;
            let mark = submission::validate_mark(
                &session,
                student,
                date.unwrap_or(today),
                status.into(),
            )?;
            writes::mark_attendance(&pool, &mark).await?;
            println!(
                "Attendance for {} on {} set to {}.",
                mark.student_id,
                mark.date,
                mark.status.label()
            );
        }
        Commands::Leaderboard { organize, limit } => {
            let session = load_session(&pool, cli.user).await?;
            let board = dashboard::fetch_leaderboard(&pool, &session, organize, limit).await;
            if board.is_empty() {
                println!("No points awarded yet.");
            }
            for entry in board {
                println!("{:>3}. {} ({} poin)", entry.rank, entry.name, entry.total_poin);
            }
        }
        Commands::Export {
            start,
            end,
            organize,
            out,
        } => {
            let session = load_session(&pool, cli.user).await?;
            let scope = resolve_scope(&pool, &session).await.within(organize);
            let (csv, rows) = export::export_attendance(&pool, scope, start, end).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Exported {rows} rows to {}.", path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::Report {
            organize,
            since_days,
            out,
        } => {
            let session = load_session(&pool, cli.user).await?;
            let organize_id = match (session.role(), organize) {
                (Role::Admin, Some(id)) => id,
                (Role::Guru, _) | (Role::Admin, _) => match resolve_scope(&pool, &session)
                    .await
                    .within(organize)
                {
                    Scope::Organization(id) => id,
                    _ => anyhow::bail!("choose a class with --organize"),
                },
                (role, _) => {
                    return Err(error::SessionError::Forbidden {
                        action: "class reports",
                        role,
                    }
                    .into())
                }
            };

            let since = dashboard::window_start(today, since_days);
            let class_name = pool
                .organize_name(organize_id)
                .await?
                .with_context(|| format!("class {organize_id} not found"))?;
            let students = pool.students_in_organize(organize_id, None).await?;
            let roster = dashboard::class_roster(&pool, &students, since).await;
            let rollup = dashboard::today_attendance(&pool, organize_id, today).await;
            let leaderboard =
                dashboard::fetch_leaderboard(&pool, &session, Some(organize_id), 5).await;

            let report = report::build_report(&report::ClassReport {
                class_name: &class_name,
                today,
                since,
                rollup,
                roster: &roster,
                leaderboard: &leaderboard,
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_dashboard(dashboard: &Dashboard) {
    match dashboard {
        Dashboard::Pending => println!("Waiting for a class or linked student."),
        Dashboard::Student(student) => {
            println!("Total poin: {}", student.total_poin);
            println!(
                "Setoran: {} total, {} diterima, {} menunggu",
                student.setoran.total, student.setoran.diterima, student.setoran.pending
            );
            println!(
                "Progress: {} hafalan, {} murojaah diterima",
                student.setoran.hafalan_diterima, student.setoran.murojaah_diterima
            );
            println!("Labels: {}", student.label_count);
            for item in &student.recent {
                println!(
                    "- {} {} juz {} ({})",
                    item.tanggal,
                    item.surah,
                    item.juz,
                    item.status.label()
                );
            }
        }
        Dashboard::Parent(parent) => {
            println!("Total poin: {}", parent.total_poin);
            println!(
                "Setoran: {} total, {} diterima, {} menunggu",
                parent.setoran.total, parent.setoran.diterima, parent.setoran.pending
            );
            println!(
                "Kehadiran: {}% ({} hadir, {} izin, {} tidak hadir)",
                parent.attendance.percentage,
                parent.attendance.hadir_count,
                parent.attendance.izin_count,
                parent.attendance.tidak_hadir_count
            );
        }
        Dashboard::Teacher(teacher) => {
            println!("Setoran menunggu: {}", teacher.pending_setoran);
            println!("Total siswa: {}", teacher.total_siswa);
            println!(
                "Hari ini: {} hadir, {} izin, {} tidak hadir",
                teacher.today.present, teacher.today.excused, teacher.today.absent
            );
            for pending in &teacher.recent_pending {
                println!(
                    "- {} {} {} juz {}",
                    pending.item.id, pending.siswa_name, pending.item.surah, pending.item.juz
                );
            }
        }
        Dashboard::Admin(admin) => {
            println!("Total users: {}", admin.total_users);
            println!("Total classes: {}", admin.total_organizes);
        }
    }
}

fn print_attendance(view: &AttendanceView) {
    match view {
        AttendanceView::Pending => println!("Waiting for a class or linked student."),
        AttendanceView::Individual { records, stats, .. } => {
            println!(
                "Kehadiran {}% dari {} hari ({} hadir, {} izin, {} tidak hadir)",
                stats.percentage,
                stats.total_days,
                stats.hadir_count,
                stats.izin_count,
                stats.tidak_hadir_count
            );
            if records.is_empty() {
                println!("Belum ada data absensi.");
            }
            for record in records {
                println!("- {} {}", record.date, record.status.label());
            }
        }
        AttendanceView::Roster { since, students } => {
            println!("Attendance since {since}:");
            for row in students {
                println!(
                    "- {}: {}% ({} hadir / {} hari)",
                    row.student_name, row.stats.percentage, row.stats.hadir_count, row.stats.total_days
                );
            }
        }
    }
}

fn print_setoran(view: &SetoranView) {
    match view {
        SetoranView::Pending => println!("Setoran history is only available for students."),
        SetoranView::Individual { items, stats, .. } => {
            println!(
                "Total poin {} | {} diterima | {} menunggu | {} ditolak",
                stats.total_poin, stats.diterima, stats.pending, stats.ditolak
            );
            if items.is_empty() {
                println!("Belum ada setoran.");
            }
            for item in items {
                let ayat = match (item.ayat_mulai, item.ayat_selesai) {
                    (Some(start), Some(end)) => format!(" ayat {start}-{end}"),
                    (Some(start), None) => format!(" ayat {start}"),
                    _ => String::new(),
                };
                println!(
                    "- {} [{}] {} juz {}{} ({}, {} poin)",
                    item.tanggal,
                    item.jenis.as_str(),
                    item.surah,
                    item.juz,
                    ayat,
                    item.status.label(),
                    item.poin
                );
            }
        }
    }
}
