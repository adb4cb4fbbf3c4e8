use api_shared::convert::{parse_date, parse_enum};
use api_shared::*;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use triage_core::{
    constants::DEFAULT_TRIAGE_DATA_DIR, AssessmentUpdate, NewAssessment, NewProtocol,
    NewReassessment, RecordId, RedFlags, RequestContext, Store, TimeWindow, TriageConfig,
    TriageLevel, TriageService, VitalSigns,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Clinic triage queue CLI")]
struct Cli {
    /// Journal directory
    #[arg(long, env = "TRIAGE_DATA_DIR", default_value = DEFAULT_TRIAGE_DATA_DIR)]
    data_dir: PathBuf,
    /// Optional YAML configuration file
    #[arg(long, env = "TRIAGE_CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Caller recorded on every change
    #[arg(long, env = "TRIAGE_CALLER", default_value = "cli")]
    caller: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new arrival and enqueue it
    Assess {
        patient_id: RecordId,
        department_id: RecordId,
        /// Presenting complaint
        complaint: String,
        /// Triage level, 1 (resuscitation) to 5 (non-urgent)
        #[arg(long, value_parser = parse_level)]
        level: TriageLevel,
        #[arg(long, default_value_t = 0)]
        priority: u32,
        #[command(flatten)]
        vitals: VitalsArgs,
        #[arg(long)]
        sepsis: bool,
        #[arg(long)]
        stroke: bool,
        #[arg(long)]
        acs: bool,
        #[arg(long)]
        trauma: bool,
        /// contact, droplet, airborne or protective
        #[arg(long)]
        isolation: Option<String>,
        #[arg(long)]
        pregnant: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show one assessment
    Show { id: RecordId },
    /// List open assessments
    List {
        #[arg(long)]
        department: Option<RecordId>,
    },
    /// Correct level, priority or notes without a reassessment
    Update {
        id: RecordId,
        #[arg(long, value_parser = parse_level)]
        level: Option<TriageLevel>,
        #[arg(long)]
        priority: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
        /// Reject the change if the stored version differs
        #[arg(long)]
        expected_version: Option<u64>,
    },
    /// Complete an open assessment
    Complete {
        id: RecordId,
        #[arg(long)]
        department: Option<RecordId>,
        #[arg(long)]
        doctor: Option<RecordId>,
    },
    /// Cancel an open assessment
    Cancel { id: RecordId, reason: String },
    /// Record a reassessment
    Reassess {
        id: RecordId,
        /// routine, clinical_change, protocol_driven, patient_request, staff_concern or other
        #[arg(long, default_value = "routine")]
        reason: String,
        #[arg(long, value_parser = parse_level)]
        level: Option<TriageLevel>,
        #[arg(long)]
        changes: Option<String>,
        #[arg(long)]
        actions: Option<String>,
        /// Record a fresh set of vitals with the reassessment
        #[arg(long)]
        with_vitals: bool,
        #[command(flatten)]
        vitals: VitalsArgs,
    },
    /// List reassessments of an assessment, oldest first
    History { id: RecordId },
    /// Call the most urgent waiting patient of a department
    CallNext { department_id: RecordId },
    /// Finish a called patient by queue entry id
    FinishVisit { queue_id: RecordId },
    /// Show a department's waiting list
    Queue { department_id: RecordId },
    /// Queue counters for a department
    QueueStats {
        department_id: RecordId,
        /// UTC day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Refresh a department's queue ordering from its assessments
    Reorder { department_id: RecordId },
    /// Add a protocol to the catalogue
    ProtocolAdd {
        name: String,
        /// cardiac, respiratory, neuro, trauma, pediatric or general
        protocol_type: String,
        criteria: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        actions: Option<String>,
        #[arg(long, default_value_t = 0)]
        weight: u32,
    },
    /// List the protocol catalogue
    Protocols {
        #[arg(long)]
        active_only: bool,
    },
    /// Deactivate a protocol
    ProtocolDeactivate { id: RecordId },
    /// Rank active protocols for an assessment
    Suggest {
        assessment_id: RecordId,
        #[arg(long = "type")]
        protocol_type: Option<String>,
    },
    /// Record that a protocol was applied to an assessment
    Apply {
        assessment_id: RecordId,
        protocol_id: RecordId,
    },
    /// Daily rollup
    Daily {
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        department: Option<RecordId>,
    },
    /// Operational health signal
    Health,
    /// Waiting entries past their acceptable wait
    Overdue {
        #[arg(long)]
        department: Option<RecordId>,
    },
    /// Overdue or flagged waiting entries
    Alerts,
}

#[derive(clap::Args, Default)]
struct VitalsArgs {
    #[arg(long)]
    systolic_bp: Option<u16>,
    #[arg(long)]
    diastolic_bp: Option<u16>,
    #[arg(long)]
    heart_rate: Option<u16>,
    #[arg(long)]
    respiratory_rate: Option<u16>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    spo2: Option<u8>,
    #[arg(long)]
    gcs_eye: Option<u8>,
    #[arg(long)]
    gcs_verbal: Option<u8>,
    #[arg(long)]
    gcs_motor: Option<u8>,
    #[arg(long)]
    on_oxygen: bool,
    #[arg(long)]
    oxygen_flow: Option<f64>,
}

impl VitalsArgs {
    fn into_vitals(self) -> VitalSigns {
        VitalSigns {
            systolic_bp: self.systolic_bp,
            diastolic_bp: self.diastolic_bp,
            heart_rate: self.heart_rate,
            respiratory_rate: self.respiratory_rate,
            temperature_c: self.temperature,
            oxygen_saturation: self.spo2,
            gcs_eye: self.gcs_eye,
            gcs_verbal: self.gcs_verbal,
            gcs_motor: self.gcs_motor,
            on_oxygen: self.on_oxygen,
            oxygen_flow_lpm: self.oxygen_flow,
            ..VitalSigns::empty(Utc::now())
        }
    }
}

fn parse_level(input: &str) -> Result<TriageLevel, String> {
    let ordinal: u8 = input.parse().map_err(|e| format!("{e}"))?;
    TriageLevel::try_from(ordinal).map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_service(
    data_dir: &Path,
    config: Option<&Path>,
) -> Result<TriageService, Box<dyn std::error::Error>> {
    let cfg = TriageConfig::resolve(config)?;
    let store = Store::open(data_dir)?;
    Ok(TriageService::new(Arc::new(store), Arc::new(cfg)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'triage --help' for commands");
        return Ok(());
    };

    let service = open_service(&cli.data_dir, cli.config.as_deref())?;
    let ctx = RequestContext::new(&cli.caller)?;

    match command {
        Commands::Assess {
            patient_id,
            department_id,
            complaint,
            level,
            priority,
            vitals,
            sepsis,
            stroke,
            acs,
            trauma,
            isolation,
            pregnant,
            notes,
        } => {
            let isolation = isolation
                .as_deref()
                .map(|i| parse_enum("isolation", i))
                .transpose()?;
            let new = NewAssessment {
                patient_id,
                department_id,
                chief_complaint: complaint,
                level,
                priority,
                vitals: vitals.into_vitals(),
                red_flags: RedFlags {
                    sepsis,
                    stroke,
                    acute_coronary_syndrome: acs,
                    trauma,
                },
                isolation,
                is_pregnant: pregnant,
                notes,
            };
            let assessment = service.lifecycle().create(&ctx, new)?;
            if assessment.evaluation.requires_immediate_attention {
                eprintln!("Warning: vitals require immediate attention");
            }
            print_json(&AssessmentRes::from(&assessment))?;
        }
        Commands::Show { id } => {
            print_json(&AssessmentRes::from(&service.lifecycle().get(id)?))?;
        }
        Commands::List { department } => {
            let assessments = service.lifecycle().list_open(department)?;
            if assessments.is_empty() {
                println!("No open assessments.");
            } else {
                for a in assessments {
                    println!(
                        "ID: {}, Level: {}, Status: {:?}, Complaint: {}",
                        a.id, a.level, a.status, a.chief_complaint
                    );
                }
            }
        }
        Commands::Update {
            id,
            level,
            priority,
            notes,
            expected_version,
        } => {
            let update = AssessmentUpdate {
                level,
                priority,
                notes,
                expected_version,
            };
            print_json(&AssessmentRes::from(
                &service.lifecycle().update(&ctx, id, update)?,
            ))?;
        }
        Commands::Complete {
            id,
            department,
            doctor,
        } => {
            let assessment = service.lifecycle().complete(&ctx, id, department, doctor)?;
            println!("Completed assessment {}", assessment.id);
        }
        Commands::Cancel { id, reason } => {
            let assessment = service.lifecycle().cancel(&ctx, id, &reason)?;
            println!("Cancelled assessment {}", assessment.id);
        }
        Commands::Reassess {
            id,
            reason,
            level,
            changes,
            actions,
            with_vitals,
            vitals,
        } => {
            let input = NewReassessment {
                vitals: with_vitals.then(|| vitals.into_vitals()),
                new_level: level,
                changes,
                actions,
                reason: parse_enum("reason", &reason)?,
            };
            let row = service.reassessments().create(&ctx, id, input)?;
            print_json(&ReassessmentRes::from(&row))?;
        }
        Commands::History { id } => {
            let rows = service.reassessments().list(id)?;
            print_json(&ListReassessmentsRes {
                reassessments: rows.iter().map(ReassessmentRes::from).collect(),
            })?;
        }
        Commands::CallNext { department_id } => {
            let entry = service.queue().call_next(&ctx, department_id)?;
            println!(
                "Called assessment {} (level {}), queue entry {}",
                entry.assessment_id, entry.level, entry.id
            );
        }
        Commands::FinishVisit { queue_id } => {
            let entry = service.queue().complete(&ctx, queue_id)?;
            println!("Completed queue entry {}", entry.id);
        }
        Commands::Queue { department_id } => {
            let waiting = service.queue().waiting(department_id)?;
            if waiting.is_empty() {
                println!("Nobody waiting.");
            }
            for w in waiting {
                println!(
                    "Level {} | {} min{} | {} | {}",
                    w.entry.level,
                    w.wait_minutes,
                    if w.overdue { " OVERDUE" } else { "" },
                    w.patient_name.as_deref().unwrap_or("-"),
                    w.chief_complaint
                );
            }
        }
        Commands::QueueStats {
            department_id,
            date,
        } => {
            let window = date
                .as_deref()
                .map(|d| parse_date("date", d).map(TimeWindow::day))
                .transpose()?;
            let stats = service.queue().stats(department_id, window)?;
            print_json(&QueueStatsRes::from(&stats))?;
        }
        Commands::Reorder { department_id } => {
            let entries = service.queue().reorder(&ctx, department_id)?;
            println!("Reordered {} waiting entries", entries.len());
        }
        Commands::ProtocolAdd {
            name,
            protocol_type,
            criteria,
            description,
            actions,
            weight,
        } => {
            let new = NewProtocol {
                name,
                description,
                protocol_type: parse_enum("protocol_type", &protocol_type)?,
                criteria,
                required_actions: actions,
                priority_weight: weight,
            };
            let protocol = service.protocols().create(&ctx, new)?;
            println!("Created protocol with ID: {}", protocol.id);
        }
        Commands::Protocols { active_only } => {
            let protocols = service.protocols().list(active_only)?;
            print_json(&ListProtocolsRes {
                protocols: protocols.iter().map(ProtocolRes::from).collect(),
            })?;
        }
        Commands::ProtocolDeactivate { id } => {
            let protocol = service.protocols().deactivate(&ctx, id)?;
            println!("Deactivated protocol {}", protocol.id);
        }
        Commands::Suggest {
            assessment_id,
            protocol_type,
        } => {
            let protocol_type = protocol_type
                .as_deref()
                .map(|t| parse_enum("protocol_type", t))
                .transpose()?;
            let suggestions = service.protocols().suggest(assessment_id, protocol_type)?;
            if suggestions.is_empty() {
                println!("No matching protocols.");
            }
            for s in suggestions {
                println!(
                    "{} [{}] score {} ({})",
                    s.protocol.name,
                    s.protocol.id,
                    s.score,
                    s.matched_keywords.join(", ")
                );
            }
        }
        Commands::Apply {
            assessment_id,
            protocol_id,
        } => {
            let application = service.protocols().apply(&ctx, assessment_id, protocol_id)?;
            println!(
                "Applied {} to assessment {}",
                application.protocol_name, application.assessment_id
            );
        }
        Commands::Daily { date, department } => {
            let date = match date.as_deref() {
                Some(d) => parse_date("date", d)?,
                None => service.now().date_naive(),
            };
            let stats = service.statistics().daily_stats(date, department)?;
            print_json(&DailyStatsRes::from(&stats))?;
        }
        Commands::Health => {
            print_json(&SystemHealthRes::from(&service.statistics().system_health()?))?;
        }
        Commands::Overdue { department } => {
            let overdue = service.statistics().scan_overdue(department)?;
            print_json(&OverdueListRes {
                overdue: overdue.iter().map(OverdueEntryRes::from).collect(),
            })?;
        }
        Commands::Alerts => {
            let alerts = service.statistics().active_alerts()?;
            print_json(&ActiveAlertsRes {
                alerts: alerts.iter().map(ActiveAlertRes::from).collect(),
            })?;
        }
    }

    Ok(())
}
