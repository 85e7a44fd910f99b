use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use obi_connectors::{
    FileBlobStore, MemoryAnchorLedger, RecordingFunctionInvoker, StaticIdentityProvider,
    TextCertificateRenderer,
};
use obi_runtime::{DojoRuntime, GradingOutcome, IssuanceStatus, RuntimeConfig};
use obi_storage::{InMemoryDojoStorage, StateSnapshot};
use obi_types::{
    CertificateId, DojoId, EnrollmentId, ExamId, GradeLabel, SenseiId, Student, StudentId,
};
use obi_workflow::{GradePolicy, ResultSheet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "obi", about = "Dojo administration: exams, belt progression, certificates")]
#[command(version)]
struct Cli {
    /// State file (defaults to ~/.obi/state.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Enrollment belt-selection policy
    #[arg(long, global = true, value_enum, default_value = "next-grade-only")]
    policy: PolicyArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a dojo
    AddDojo {
        #[arg(long)]
        name: String,
        #[arg(long)]
        city: String,
    },

    /// Register a sensei
    AddSensei {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        dojo: String,
    },

    /// Register a student
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        dojo: String,
        /// Starting belt (defaults to the bottom of the ladder)
        #[arg(long)]
        belt: Option<String>,
    },

    /// Deactivate a student (keeps exam and certificate history)
    DeactivateStudent {
        #[arg(long)]
        student: String,
    },

    /// Schedule an exam
    AddExam {
        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        sensei: String,
        #[arg(long)]
        dojo: String,
        /// Venue, when different from the organizing dojo
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value = "")]
        observations: String,
    },

    /// Enroll a student in an exam
    Enroll {
        #[arg(long)]
        exam: String,
        #[arg(long)]
        student: String,
        /// Explicit attempted belt (policy permitting)
        #[arg(long)]
        belt: Option<String>,
    },

    /// Record the result of an enrollment and run promotion + issuance
    Grade(GradeArgs),

    /// Re-run promotion and issuance for an already graded enrollment
    Promote {
        #[arg(long)]
        enrollment: String,
    },

    /// Complete a previously unfinished certificate issuance
    Resume {
        #[arg(long)]
        certificate: String,
    },

    /// Mark a certificate valid (anchors its hash)
    Validate {
        #[arg(long)]
        certificate: String,
        /// Validating sensei (defaults to the OBI_SENSEI session identity)
        #[arg(long)]
        sensei: Option<String>,
    },

    /// Mark a certificate revoked
    Revoke {
        #[arg(long)]
        certificate: String,
        /// Revoking sensei (defaults to the OBI_SENSEI session identity)
        #[arg(long)]
        sensei: Option<String>,
    },

    /// List students of a dojo
    Students {
        #[arg(long)]
        dojo: String,
    },

    /// List certificates of a student
    Certificates {
        #[arg(long)]
        student: String,
    },

    /// Print the belt ladder
    Ladder,
}

#[derive(Args)]
struct GradeArgs {
    #[arg(long)]
    enrollment: String,

    #[arg(long)]
    kata: Option<String>,

    #[arg(long)]
    kumite: Option<String>,

    #[arg(long)]
    kihon: Option<String>,

    /// Final grade (A+ .. F)
    #[arg(long)]
    final_grade: String,

    #[arg(long, default_value = "")]
    observations: String,

    /// Mark the student as absent
    #[arg(long)]
    absent: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    NextGradeOnly,
    SenseiChoice,
}

impl PolicyArg {
    fn as_policy(self) -> GradePolicy {
        match self {
            PolicyArg::NextGradeOnly => GradePolicy::NextGradeOnly,
            PolicyArg::SenseiChoice => GradePolicy::SenseiChoice,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let state_path = match cli.state {
        Some(path) => path,
        None => default_state_path()?,
    };
    let storage = Arc::new(load_state(&state_path)?);
    let artifacts_dir = state_path
        .parent()
        .map(|p| p.join("artifacts"))
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    let session = std::env::var("OBI_SENSEI").unwrap_or_else(|_| "cli".to_string());
    let runtime = DojoRuntime::new(
        storage.clone(),
        Arc::new(FileBlobStore::new(artifacts_dir)),
        Arc::new(TextCertificateRenderer::new()),
        Arc::new(MemoryAnchorLedger::new()),
        Arc::new(StaticIdentityProvider::new(
            session.clone(),
            format!("{session}@obi.local"),
        )),
        Arc::new(RecordingFunctionInvoker::new()),
        RuntimeConfig {
            grade_policy: cli.policy.as_policy(),
            ..RuntimeConfig::default()
        },
    );

    match cli.command {
        Commands::AddDojo { name, city } => {
            let dojo = runtime.register_dojo(name, city).await?;
            println!("dojo registered: {} ({}, {})", dojo.id, dojo.name, dojo.city);
        }
        Commands::AddSensei { name, email, dojo } => {
            let sensei = runtime
                .register_sensei(name, email, &DojoId::new(dojo))
                .await?;
            println!("sensei registered: {} ({})", sensei.id, sensei.name);
        }
        Commands::AddStudent { name, dojo, belt } => {
            let student = runtime
                .register_student(name, &DojoId::new(dojo), belt.map(GradeLabel::new))
                .await?;
            println!(
                "student registered: {} ({}, {})",
                student.id, student.name, student.current_belt
            );
        }
        Commands::DeactivateStudent { student } => {
            let student = runtime
                .deactivate_student(&StudentId::new(student))
                .await?;
            println!("student deactivated: {} ({})", student.id, student.name);
        }
        Commands::AddExam {
            date,
            sensei,
            dojo,
            location,
            observations,
        } => {
            let organizing = DojoId::new(dojo);
            let location = location.map(DojoId::new).unwrap_or_else(|| organizing.clone());
            let exam = runtime
                .create_exam(date, &SenseiId::new(sensei), &organizing, &location, observations)
                .await?;
            println!("exam scheduled: {} on {}", exam.id, exam.date);
        }
        Commands::Enroll {
            exam,
            student,
            belt,
        } => {
            let enrollment = runtime
                .enroll(
                    &ExamId::new(exam),
                    &StudentId::new(student),
                    belt.map(GradeLabel::new),
                )
                .await?;
            println!(
                "enrolled: {} attempting {}",
                enrollment.id, enrollment.belt
            );
        }
        Commands::Grade(args) => {
            let sheet = ResultSheet::parse(
                args.kata.as_deref(),
                args.kumite.as_deref(),
                args.kihon.as_deref(),
                &args.final_grade,
                args.observations,
                !args.absent,
            )?;
            let outcome = runtime
                .grade_enrollment(&EnrollmentId::new(args.enrollment), sheet)
                .await?;
            println!(
                "result recorded: {} (present={})",
                outcome.result.final_grade, outcome.result.present
            );
            print_outcome(&outcome);
        }
        Commands::Promote { enrollment } => {
            let outcome = runtime
                .promote_enrollment(&EnrollmentId::new(enrollment))
                .await?;
            print_outcome(&outcome);
        }
        Commands::Resume { certificate } => {
            let certificate = runtime
                .resume_certificate(&CertificateId::new(certificate))
                .await?;
            println!(
                "certificate completed: {} ({})",
                certificate.id,
                certificate.pdf_url.as_deref().unwrap_or("-")
            );
        }
        Commands::Validate {
            certificate,
            sensei,
        } => {
            let sensei = sensei.map(SenseiId::new);
            let outcome = runtime
                .validate_certificate(&CertificateId::new(certificate), sensei.as_ref())
                .await?;
            println!("certificate validated: {}", outcome.certificate.id);
            if outcome.anchored {
                println!("hash anchored");
            } else if let Some(reason) = outcome.anchor_failure {
                println!("anchoring pending: {reason}");
            }
        }
        Commands::Revoke {
            certificate,
            sensei,
        } => {
            let sensei = sensei.map(SenseiId::new);
            let outcome = runtime
                .revoke_certificate(&CertificateId::new(certificate), sensei.as_ref())
                .await?;
            println!("certificate revoked: {}", outcome.certificate.id);
        }
        Commands::Students { dojo } => {
            let students = runtime.list_students(&DojoId::new(dojo)).await?;
            print_students(&students);
        }
        Commands::Certificates { student } => {
            let certificates = runtime
                .list_certificates(&StudentId::new(student))
                .await?;
            println!(
                "{:<40} {:<20} {:<10} {:<16}",
                "CERTIFICATE", "BELT", "STATUS", "HASH"
            );
            for cert in certificates {
                println!(
                    "{:<40} {:<20} {:<10} {:<16}",
                    cert.id.to_string(),
                    cert.belt.to_string(),
                    cert.status.to_string(),
                    cert.hash
                        .as_deref()
                        .map(|h| h.get(..16).unwrap_or(h))
                        .unwrap_or("-"),
                );
            }
        }
        Commands::Ladder => {
            for (index, grade) in RuntimeConfig::default().ladder.grades().iter().enumerate() {
                println!("{:>2}. {grade}", index + 1);
            }
        }
    }

    save_state(&state_path, &storage)?;
    Ok(())
}

fn print_outcome(outcome: &GradingOutcome) {
    match &outcome.new_belt {
        Some(belt) => println!("promoted to {belt}"),
        None => println!("no promotion"),
    }
    match &outcome.issuance {
        IssuanceStatus::NotAttempted => {}
        IssuanceStatus::Issued { certificate } => {
            println!(
                "certificate issued: {} ({})",
                certificate.id,
                certificate.pdf_url.as_deref().unwrap_or("-")
            );
        }
        IssuanceStatus::Unfinished {
            certificate_id,
            error,
        } => {
            println!("certificate issuance unfinished: {certificate_id} ({error})");
            println!("run `obi resume --certificate {certificate_id}` to complete it");
        }
        IssuanceStatus::Failed { error } => {
            println!("certificate issuance failed: {error}");
        }
    }
}

fn print_students(students: &[Student]) {
    println!(
        "{:<40} {:<24} {:<20} {:<8}",
        "STUDENT", "NAME", "BELT", "ACTIVE"
    );
    for student in students {
        println!(
            "{:<40} {:<24} {:<20} {:<8}",
            student.id.to_string(),
            student.name,
            student.current_belt.to_string(),
            student.is_active,
        );
    }
}

fn default_state_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let home = std::env::var("HOME").map_err(|_| "HOME environment variable is not set")?;
    Ok(Path::new(&home).join(".obi").join("state.json"))
}

fn load_state(path: &Path) -> Result<InMemoryDojoStorage, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(InMemoryDojoStorage::new());
    }
    let content = fs::read_to_string(path)?;
    let snapshot = serde_json::from_str::<StateSnapshot>(&content)?;
    Ok(InMemoryDojoStorage::from_snapshot(snapshot))
}

fn save_state(
    path: &Path,
    storage: &InMemoryDojoStorage,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let snapshot = storage.snapshot()?;
    fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}
