//! Project RED CLI
//!
//! Administrative commands that work directly on the database file:
//! - Create staff accounts and hospitals
//! - Report on donations, blood tests and notifications
//! - Repair donations that lost their hospital assignment

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use project_red::auth::PasswordHasher;
use project_red::config::{generate_default_config, Config};
use project_red::domain::{BloodGroup, Gender};
use project_red::geo::{distance_km, round_km, Coordinates};
use project_red::logging;
use project_red::storage::{Database, NewHospital, NewHospitalAccount, NewUser};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "project-red-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Administration tool for the Project RED backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides the config)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a staff account
    CreateAdmin {
        username: String,
        email: String,
        /// Password (min 8 characters)
        #[arg(short, long)]
        password: String,
        #[arg(long, default_value = "O+")]
        blood_group: String,
    },

    /// Register a hospital, optionally with a dashboard login
    AddHospital {
        name: String,
        lat: f64,
        lng: f64,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "")]
        phone: String,
        /// Dashboard username; requires --email and --password
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Donation status report
    Donations,

    /// Report donations with a hospital but no assignment
    VerifyAssignments {
        /// Create the missing assignments
        #[arg(long)]
        fix: bool,
    },

    /// Show a user's notifications
    Notifications { username: String },

    /// List blood tests with their predictions
    BloodTests,

    /// Great-circle distance between two points in km
    Distance {
        lat1: f64,
        lng1: f64,
        lat2: f64,
        lng2: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that need no database
    match &cli.command {
        Commands::Config { output } => {
            let config = generate_default_config();
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", config),
            }
            return Ok(());
        }
        Commands::Distance {
            lat1,
            lng1,
            lat2,
            lng2,
        } => {
            let a = Coordinates::parse(*lat1, *lng1)?;
            let b = Coordinates::parse(*lat2, *lng2)?;
            println!("{:.2} km", round_km(distance_km(a, b)));
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load_from(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(path) = cli.database.clone() {
        config.database.path = path;
    }
    logging::init(&config.logging);

    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    let json = cli.format.eq_ignore_ascii_case("json");

    match cli.command {
        Commands::CreateAdmin {
            username,
            email,
            password,
            blood_group,
        } => {
            project_red::auth::validate_password(&password).map_err(anyhow::Error::msg)?;
            let blood_group: BloodGroup = blood_group.parse()?;
            let hash = PasswordHasher::new(config.auth.password_iterations).hash(&password)?;

            let user = db.create_user(&NewUser {
                username,
                email,
                password_hash: hash,
                first_name: String::new(),
                last_name: String::new(),
                blood_group,
                allergies: None,
                age: 30,
                gender: Gender::Other,
                address: String::new(),
                phone_number: String::new(),
                is_donor: false,
                is_recipient: false,
                is_staff: true,
                location: None,
            })?;
            println!("Created staff account {} ({})", user.username, user.id);
        }

        Commands::AddHospital {
            name,
            lat,
            lng,
            address,
            phone,
            username,
            email,
            password,
        } => {
            let new = NewHospital {
                name,
                address,
                phone_number: phone,
                email: email.clone(),
                location: Coordinates::parse(lat, lng)?,
            };

            match (username, email, password) {
                (Some(username), Some(email), Some(password)) => {
                    project_red::auth::validate_password(&password)
                        .map_err(anyhow::Error::msg)?;
                    let hash =
                        PasswordHasher::new(config.auth.password_iterations).hash(&password)?;
                    let (hospital, account) = db.create_hospital_with_account(
                        &new,
                        &NewHospitalAccount {
                            username,
                            email,
                            password_hash: hash,
                        },
                    )?;
                    println!(
                        "Created hospital {} ({}) with login {}",
                        hospital.name, hospital.id, account.username
                    );
                }
                (None, _, None) => {
                    let hospital = db.create_hospital(&new)?;
                    println!("Created hospital {} ({})", hospital.name, hospital.id);
                }
                _ => bail!("--username needs both --email and --password"),
            }
        }

        Commands::Donations => {
            let donations = db.list_donations()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&donations)?);
            } else if donations.is_empty() {
                println!("No donations");
            } else {
                println!(
                    "{:<36}  {:<10}  {:<20}  {:<20}",
                    "Donation", "Status", "Donor", "Hospital"
                );
                println!("{}", "-".repeat(92));
                for donation in &donations {
                    let donor = db
                        .get_user(donation.donor_id)
                        .map(|u| u.username)
                        .unwrap_or_else(|_| "-".to_string());
                    let hospital = match donation.hospital_id {
                        Some(id) => db
                            .get_hospital(id)
                            .map(|h| h.name)
                            .unwrap_or_else(|_| "-".to_string()),
                        None => "-".to_string(),
                    };
                    println!(
                        "{:<36}  {:<10}  {:<20}  {:<20}",
                        donation.id, donation.status, donor, hospital
                    );
                }
                println!();
                println!("{} donation(s)", donations.len());
            }
        }

        Commands::VerifyAssignments { fix } => {
            let missing = db.list_unassigned_donations()?;
            if missing.is_empty() {
                println!("All hospital donations have an assignment");
                return Ok(());
            }

            println!("{} donation(s) without an assignment:", missing.len());
            for donation in &missing {
                println!("  {} ({})", donation.id, donation.status);
            }

            if fix {
                let mut created = 0;
                for donation in &missing {
                    let Some(hospital_id) = donation.hospital_id else {
                        continue;
                    };
                    db.create_assignment(donation, hospital_id, donation.ai_recommended_hospital)?;
                    created += 1;
                }
                println!("Created {} assignment(s)", created);
            } else {
                println!("Run again with --fix to create them");
            }
        }

        Commands::Notifications { username } => {
            let Some(user) = db.get_user_by_username(&username)? else {
                bail!("No user named {}", username);
            };
            let notifications = db.list_notifications_for_user(user.id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notifications)?);
            } else if notifications.is_empty() {
                println!("No notifications for {}", username);
            } else {
                for n in &notifications {
                    println!(
                        "{} {} [{}] {}: {}",
                        n.created_at.format("%Y-%m-%d %H:%M"),
                        if n.is_read { " " } else { "*" },
                        n.notification_type,
                        n.title,
                        n.message
                    );
                }
            }
        }

        Commands::BloodTests => {
            let tests = db.list_blood_tests()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tests)?);
            } else if tests.is_empty() {
                println!("No blood tests");
            } else {
                for test in &tests {
                    println!(
                        "{}  donation={}  hb={:.1}  sugar={:.0}  confidence={}  life_saved={}",
                        test.created_at.format("%Y-%m-%d"),
                        test.donation_id,
                        test.panel.hemoglobin,
                        test.panel.sugar_level,
                        test.prediction_confidence
                            .map(|c| format!("{c}%"))
                            .unwrap_or_else(|| "-".to_string()),
                        test.life_saved
                    );
                    if let Some(summary) = &test.health_risk_prediction {
                        let first = summary.lines().next().unwrap_or_default();
                        println!("    {}", first);
                    }
                }
            }
        }

        Commands::Config { .. } | Commands::Distance { .. } => {}
    }

    Ok(())
}
