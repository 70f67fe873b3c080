use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracker_core::config::{data_file_from_env_value, stage_order_from_env_value};
use tracker_core::url_state::split_list;
use tracker_core::{
    filter_referrals, kpi_report, weekly_trends, DateWindow, FilterCriteria, InMemoryStore,
    KpiReport, RecordStore, Referral, StageOrder, TrackerResult, UrlState, DATA_FILE_ENV,
    STAGES_FILE_ENV,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "referral")]
#[command(about = "Referral tracker CLI")]
struct Cli {
    /// Seed JSON file (defaults to $REFERRAL_DATA_FILE, then referral_data.json)
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    /// Stage order YAML (defaults to $REFERRAL_STAGES_FILE, then the built-in stages)
    #[arg(long, global = true)]
    stages_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List referrals matching the filters
    List {
        /// URL query string, e.g. "archive_status=all&insurance=Aetna"
        #[arg(long)]
        query: Option<String>,
        /// Free-text search
        #[arg(long)]
        search: Option<String>,
        /// Comma-separated stages to show
        #[arg(long)]
        stages: Option<String>,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// KPIs for a window compared with the window before it
    Metrics {
        /// Window start (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Window end (RFC 3339, default now)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Trailing window in days when --from is omitted
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Weekly trend buckets
    Trends,
    /// Show the configured stage order
    Stages,
    /// Say whether moving between two stages is a regression
    CheckTransition {
        /// Current stage
        from: String,
        /// Target stage
        to: String,
    },
    /// Rewrite a URL query string in canonical form
    NormalizeQuery {
        /// URL query string
        query: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let stages = stage_order_from_env_value(
        cli.stages_file
            .map(|p| p.display().to_string())
            .or_else(|| std::env::var(STAGES_FILE_ENV).ok()),
    )?;
    let data_file = data_file_from_env_value(
        cli.data
            .map(|p| p.display().to_string())
            .or_else(|| std::env::var(DATA_FILE_ENV).ok()),
    );

    match cli.command {
        Some(Commands::List {
            query,
            search,
            stages: stage_list,
            json,
        }) => {
            let criteria = match list_criteria(query.as_deref(), search, stage_list.as_deref()) {
                Ok(criteria) => criteria,
                Err(e) => {
                    eprintln!("Error parsing filters: {}", e);
                    return Ok(());
                }
            };
            let store = InMemoryStore::from_json_file(stages, &data_file)?;
            let referrals = store.fetch_referrals()?;
            let rows = filter_referrals(&referrals, &criteria);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No referrals found.");
            } else {
                for referral in rows {
                    println!(
                        "ID: {}, Name: {}, Stage: {}, Docs: {}, Created: {}",
                        referral.id,
                        referral.patient.display_name(),
                        referral.stage,
                        referral.readiness(),
                        referral.created_at
                    );
                }
            }
        }
        Some(Commands::Metrics { from, to, days }) => {
            let store = InMemoryStore::from_json_file(stages.clone(), &data_file)?;
            let referrals = store.fetch_referrals()?;
            match metrics_report(&referrals, &stages, from, to, days, Utc::now()) {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e) => eprintln!("Error building window: {}", e),
            }
        }
        Some(Commands::Trends) => {
            let store = InMemoryStore::from_json_file(stages, &data_file)?;
            let series = weekly_trends(&store.fetch_referrals()?);
            if !series.is_renderable() {
                println!("Not enough data for a trend line.");
            }
            for bucket in &series.buckets {
                println!(
                    "{}: new {}, docs ready {}, archived {}",
                    bucket.week, bucket.new_referrals, bucket.docs_ready, bucket.archived
                );
            }
        }
        Some(Commands::Stages) => {
            for (i, name) in stages.names().enumerate() {
                println!("{}. {}", i + 1, name);
            }
        }
        Some(Commands::CheckTransition { from, to }) => {
            match describe_transition(&stages, &from, &to) {
                Ok(verdict) => println!("{} -> {}: {}", from, to, verdict),
                Err(e) => eprintln!("Error checking transition: {}", e),
            }
        }
        Some(Commands::NormalizeQuery { query }) => match normalize_query(&query) {
            Ok(normalized) => println!("{}", normalized),
            Err(e) => eprintln!("Error normalizing query: {}", e),
        },
        None => {
            println!("Use 'referral --help' for commands");
        }
    }

    Ok(())
}

fn list_criteria(
    query: Option<&str>,
    search: Option<String>,
    stages: Option<&str>,
) -> TrackerResult<FilterCriteria> {
    let mut criteria = match query {
        Some(query) => UrlState::parse(query)?.to_criteria()?,
        None => FilterCriteria::default(),
    };
    if let Some(search) = search {
        criteria.search = search;
    }
    if let Some(stages) = stages {
        criteria.stages = split_list(stages).into_iter().collect();
    }
    criteria.validate()?;
    Ok(criteria)
}

fn metrics_report(
    referrals: &[Referral],
    stages: &StageOrder,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    days: i64,
    now: DateTime<Utc>,
) -> TrackerResult<KpiReport> {
    let window = match from {
        Some(from) => DateWindow::new(from, to.unwrap_or(now))?,
        None => DateWindow::trailing_days(now, days)?,
    };
    kpi_report(referrals, stages, window, now)
}

fn describe_transition(stages: &StageOrder, from: &str, to: &str) -> TrackerResult<&'static str> {
    let regression = stages.is_regression(from, to)?;
    Ok(if from == to {
        "no change"
    } else if regression {
        "regression (reason required)"
    } else {
        "forward"
    })
}

fn normalize_query(query: &str) -> TrackerResult<String> {
    let state = UrlState::parse(query)?;
    let open: Option<Uuid> = state.open_patient()?;
    UrlState::from_criteria(&state.to_criteria()?, open).to_query_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::ArchiveMode;

    #[test]
    fn list_flags_override_query_string() {
        let query = Some("?archive_status=all");
        let criteria = list_criteria(query, Some("ada".into()), Some("Docs,PAR")).unwrap();
        assert_eq!(criteria.archive_mode, ArchiveMode::All);
        assert_eq!(criteria.search, "ada");
        assert!(criteria.stages.contains("PAR"));
    }

    #[test]
    fn transitions_are_classified() {
        let stages = StageOrder::default();
        assert_eq!(
            describe_transition(&stages, "PAR", "Verification").unwrap(),
            "regression (reason required)"
        );
        assert_eq!(describe_transition(&stages, "Verification", "PAR").unwrap(), "forward");
        assert_eq!(describe_transition(&stages, "PAR", "PAR").unwrap(), "no change");
        assert!(describe_transition(&stages, "PAR", "Limbo").is_err());
    }

    #[test]
    fn huge_trailing_window_is_an_error_not_a_panic() {
        let stages = StageOrder::default();
        let now = Utc::now();
        let err = metrics_report(&[], &stages, None, None, 200_000_000, now).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(metrics_report(&[], &stages, None, None, 7, now).is_ok());
    }

    #[test]
    fn default_values_are_dropped_from_normalized_query() {
        let normalized = normalize_query("archive_status=active&region=West").unwrap();
        assert_eq!(normalized, "region=West");
    }
}
