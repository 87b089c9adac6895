//! FOS trust core command-line tool
//!
//! Offline checks for support staff and integrators:
//!
//!   fos-trust cert-id parse FOS-ABC-2410-0001-5
//!   fos-trust license check license.json
//!   fos-trust audit verify --dir /var/lib/fos/audit
//!   fos-trust cert verify certificate.json
//!
//! Nothing here contacts a server.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fos_audit::{
    list_log_files, verify_file_with_key, AuditKey, BoundaryStatus, ChainReport, MemoryAuditSink,
};
use fos_certificate::CertificateVerifier;
use fos_crypto::KeyRing;
use fos_license::{
    collect_local_fingerprints, evaluate, LastSeenStore, LocalFingerprints, OfflineLicenseGrant,
};
use fos_trust::keys::parse_public_key;
use fos_trust::{TrustConfig, TrustCore};
use fos_types::CertificateId;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fos-trust")]
#[command(about = "FOS offline trust core tooling")]
struct Args {
    /// Path to fos-trust.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra trusted public key as ID:HEX (repeatable)
    #[arg(long = "trust-key", global = true)]
    trust_keys: Vec<String>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Certificate id tools
    #[command(subcommand)]
    CertId(CertIdCommand),
    /// License grant tools
    #[command(subcommand)]
    License(LicenseCommand),
    /// Audit trail tools
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Processing certificate tools
    #[command(subcommand)]
    Cert(CertCommand),
    /// Start the trust core once and report the gate state
    Status,
}

#[derive(Subcommand, Debug)]
enum CertIdCommand {
    /// Validate an id and show its parts
    Parse { id: String },
    /// Build an id for the current month
    Generate { code: String, sequence: u16 },
}

#[derive(Subcommand, Debug)]
enum LicenseCommand {
    /// Validate a grant against this machine without changing any state
    Check {
        grant: PathBuf,
        /// Use these fingerprints instead of reading the machine (repeatable)
        #[arg(long = "fingerprint")]
        fingerprints: Vec<String>,
    },
    /// Print this machine's fingerprints
    Fingerprints,
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Replay every log file and check the chain
    Verify {
        /// Log directory, overriding the config
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Key file, overriding the config
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CertCommand {
    /// Check a certificate's hash and signature
    Verify { certificate: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => TrustConfig::load_from(path),
        None => TrustConfig::load(),
    }
    .context("Failed to load configuration")?;
    let keyring = build_keyring(&args.trust_keys)?;

    match args.command {
        Command::CertId(cmd) => cert_id(cmd),
        Command::License(cmd) => license(cmd, &config, &keyring),
        Command::Audit(AuditCommand::Verify { dir, key }) => audit_verify(
            dir.as_deref().unwrap_or(&config.audit.directory),
            key.as_deref().unwrap_or(&config.audit.key_file),
        ),
        Command::Cert(CertCommand::Verify { certificate }) => cert_verify(&certificate, keyring),
        Command::Status => status(config, keyring).await,
    }
}

fn build_keyring(extra: &[String]) -> Result<KeyRing> {
    let mut keyring = KeyRing::embedded();
    for arg in extra {
        let key = parse_public_key(arg).with_context(|| format!("Bad --trust-key {arg:?}"))?;
        debug!(key_id = %key.key_id, "Trusting extra key");
        keyring.insert(key);
    }
    Ok(keyring)
}

fn cert_id(cmd: CertIdCommand) -> Result<ExitCode> {
    match cmd {
        CertIdCommand::Parse { id } => match CertificateId::parse(&id) {
            Ok(parsed) => {
                println!("{parsed}");
                println!("  licensee:    {}", parsed.licensee_code());
                println!("  year/month:  {}", parsed.year_month());
                println!("  sequence:    {}", parsed.sequence());
                println!("  check digit: {}", parsed.check_digit());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("INVALID  {e}");
                Ok(ExitCode::FAILURE)
            }
        },
        CertIdCommand::Generate { code, sequence } => {
            let id = CertificateId::generate(&code, sequence)?;
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn license(cmd: LicenseCommand, config: &TrustConfig, keyring: &KeyRing) -> Result<ExitCode> {
    match cmd {
        LicenseCommand::Check {
            grant,
            fingerprints,
        } => {
            let json = fs::read_to_string(&grant)
                .with_context(|| format!("Failed to read grant {}", grant.display()))?;
            let grant = OfflineLicenseGrant::from_json(&json)?;

            let local: BTreeSet<String> = if fingerprints.is_empty() {
                collect_local_fingerprints()
            } else {
                fingerprints.into_iter().collect()
            };
            let last_seen = LastSeenStore::open(&config.license.last_seen_path)
                .context("Failed to read last-seen store")?
                .last_seen();

            let result = evaluate(
                &grant,
                keyring,
                Utc::now(),
                &local,
                last_seen,
                config.license.clock_tolerance(),
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.is_usable() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        LicenseCommand::Fingerprints => {
            for fingerprint in collect_local_fingerprints() {
                println!("{fingerprint}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn audit_verify(dir: &Path, key_file: &Path) -> Result<ExitCode> {
    if !key_file.exists() {
        bail!("Audit key {} not found", key_file.display());
    }
    let key = AuditKey::load_or_create(key_file).context("Failed to load audit key")?;

    let files = list_log_files(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .iter()
        .map(|path| verify_file_with_key(path, &key))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read audit log")?;
    let report = ChainReport::from_files(files);

    if report.files.is_empty() {
        println!("No audit log files in {}", dir.display());
    }
    for (file, boundary) in report.files.iter().zip(&report.boundaries) {
        let name = file
            .path
            .file_name()
            .map_or_else(|| file.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match file.first_invalid() {
            None => println!("OK      {name} ({} entries)", file.entries.len()),
            Some(bad) => println!(
                "BROKEN  {name} at line {} (sequence {}): {:?}",
                bad.line,
                bad.sequence.map_or_else(|| "?".to_string(), |s| s.to_string()),
                bad.fault
            ),
        }
        match boundary {
            BoundaryStatus::RecordedBreak => println!("        chain restarted with a recorded break"),
            BoundaryStatus::Unlinked { .. } => {
                println!("        does not link to the previous file");
            }
            _ => {}
        }
    }

    Ok(if report.all_files_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cert_verify(path: &Path, keyring: KeyRing) -> Result<ExitCode> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read certificate {}", path.display()))?;
    // One-off checks from the command line are not part of the trail.
    let verifier = CertificateVerifier::new(keyring, Arc::new(MemoryAuditSink::new()));
    let outcome = verifier.verify_json(&json);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn status(config: TrustConfig, keyring: KeyRing) -> Result<ExitCode> {
    let core = TrustCore::start(config, keyring, Arc::new(LocalFingerprints))
        .await
        .context("Failed to start trust core")?;

    let status = core.status();
    let result = core.validator().last_result();
    println!("status: {status}");
    if let Some(result) = &result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }

    core.shutdown().await.context("Failed to stop trust core")?;
    Ok(if status.is_usable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
